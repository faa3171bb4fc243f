use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contracts::error::FlushError;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

id_newtype!(
    /// Identifier of a region, unique across the cluster.
    RegionId
);
id_newtype!(
    /// Identifier of a region server process.
    ServerId
);
id_newtype!(
    /// Name of a table, the unit of cluster-wide flush.
    TableName
);

/// Target of a flush request, one of the three supported granularities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushTarget {
    Region(RegionId),
    Server(ServerId),
    Table(TableName),
}

impl fmt::Display for FlushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushTarget::Region(r) => write!(f, "region {}", r),
            FlushTarget::Server(s) => write!(f, "server {}", s),
            FlushTarget::Table(t) => write!(f, "table {}", t),
        }
    }
}

/// Outcome of one region's flush.
///
/// `Skipped` means the memstore was already empty; flushing an
/// already-flushed region is a no-op, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Flushed { segments: usize, bytes: u64 },
    Skipped,
}

/// Outcome of one dispatched sub-operation, success or failure.
///
/// Per-region flushes carry a `Region` target; failures that never reached a
/// region (unknown table, unknown server) carry the target they failed at.
#[derive(Debug, Clone)]
pub struct FlushReport {
    pub target: FlushTarget,
    pub outcome: Result<FlushOutcome, FlushError>,
}

impl FlushReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The region this report is about, if it got that far.
    pub fn region(&self) -> Option<&RegionId> {
        match &self.target {
            FlushTarget::Region(region) => Some(region),
            _ => None,
        }
    }
}

/// Composite result of a flush dispatch.
///
/// Complete only once every dispatched sub-operation has finished
/// (succeeded, skipped, or failed). Partial failures are kept per region,
/// never collapsed into a single failure.
#[derive(Debug, Clone, Default)]
pub struct FlushSummary {
    pub reports: Vec<FlushReport>,
}

impl FlushSummary {
    pub fn single(report: FlushReport) -> Self {
        Self {
            reports: vec![report],
        }
    }

    /// A summary consisting of one dispatch-level failure, e.g. an unknown
    /// table or server.
    pub fn failed(target: FlushTarget, err: FlushError) -> Self {
        Self::single(FlushReport {
            target,
            outcome: Err(err),
        })
    }

    pub fn is_success(&self) -> bool {
        self.reports.iter().all(|r| r.is_success())
    }

    /// Number of regions that actually wrote segments (skips excluded).
    pub fn regions_flushed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, Ok(FlushOutcome::Flushed { .. })))
            .count()
    }

    pub fn first_failure(&self) -> Option<&FlushError> {
        self.reports.iter().find_map(|r| r.outcome.as_ref().err())
    }

    /// Collapses the summary for blocking callers: `Err` carries the first
    /// per-region failure, `Ok` keeps the full summary for inspection.
    pub fn into_result(self) -> Result<FlushSummary, FlushError> {
        match self.first_failure() {
            Some(err) => Err(err.clone()),
            None => Ok(self),
        }
    }
}
