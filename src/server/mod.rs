//! Region server: owns the regions assigned to it and coordinates their
//! flushes.
//!
//! Regions flush concurrently, optionally bounded by a per-server permit
//! count; a single region's flush stays serialized inside `Region::flush`.
//! Partial failures are reported per region, never collapsed, so a caller
//! flushing a whole server can tell exactly which regions failed.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::contracts::{
    FlushError, FlushOutcome, FlushReport, FlushSummary, FlushTarget, RegionId, SegmentWriter,
    ServerId, WriteAheadLog,
};
use crate::metrics::FlushMetrics;
use crate::region::Region;

/// Per-server flush coordination settings.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// Maximum regions flushing at once on this server. `None` is unbounded.
    pub max_concurrent_flushes: Option<usize>,
}

impl CoordinatorConfig {
    /// Reads `RANGEKV_MAX_CONCURRENT_FLUSHES` (unset or 0 means unbounded).
    pub fn from_env() -> Self {
        let max_concurrent_flushes = std::env::var("RANGEKV_MAX_CONCURRENT_FLUSHES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0);
        Self {
            max_concurrent_flushes,
        }
    }
}

/// A region server process: the set of regions it hosts plus their flush
/// coordinator.
pub struct RegionServer<W, L> {
    id: ServerId,
    regions: DashMap<RegionId, Arc<Region<W, L>>>,
    flush_permits: Option<Arc<Semaphore>>,
    metrics: Arc<FlushMetrics>,
}

impl<W, L> RegionServer<W, L>
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
{
    pub fn new(id: impl Into<ServerId>, config: CoordinatorConfig, metrics: Arc<FlushMetrics>) -> Self {
        Self {
            id: id.into(),
            regions: DashMap::new(),
            flush_permits: config
                .max_concurrent_flushes
                .map(|n| Arc::new(Semaphore::new(n))),
            metrics,
        }
    }

    pub fn id(&self) -> &ServerId {
        &self.id
    }

    /// Takes ownership of a region (assignment by the placement layer).
    pub fn assign_region(&self, region: Arc<Region<W, L>>) {
        tracing::debug!(server = %self.id, region = %region.id(), "region assigned");
        self.regions.insert(region.id().clone(), region);
    }

    /// Releases a region, e.g. when it moves to another server. An in-flight
    /// flush on it runs to completion; later requests here get `StaleTarget`.
    pub fn unassign_region(&self, region: &RegionId) -> Option<Arc<Region<W, L>>> {
        self.regions.remove(region).map(|(_, r)| r)
    }

    pub fn region(&self, id: &RegionId) -> Option<Arc<Region<W, L>>> {
        self.regions.get(id).map(|r| Arc::clone(r.value()))
    }

    /// All regions currently owned by this server.
    pub fn regions(&self) -> Vec<Arc<Region<W, L>>> {
        self.regions
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    async fn flush_region_inner(
        &self,
        region_id: &RegionId,
    ) -> Result<FlushOutcome, FlushError> {
        // A placement snapshot may still name this server after the region
        // moved; that request must fail loudly, never flush the wrong data.
        let region = self
            .region(region_id)
            .ok_or_else(|| FlushError::StaleTarget {
                region: region_id.to_string(),
                server: self.id.to_string(),
            })?;

        let _permit = match &self.flush_permits {
            Some(sem) => Some(Arc::clone(sem).acquire_owned().await.map_err(|e| {
                FlushError::Io(format!("flush semaphore closed: {}", e))
            })?),
            None => None,
        };

        region.flush().await
    }

    /// Flushes one owned region, reporting the per-region outcome.
    pub async fn flush_one_region(&self, region_id: &RegionId) -> FlushReport {
        let started = Instant::now();
        let outcome = self.flush_region_inner(region_id).await;
        let elapsed_us = started.elapsed().as_micros() as u64;

        match &outcome {
            Ok(FlushOutcome::Flushed { segments, bytes }) => {
                self.metrics.record_flush(*segments as u64, *bytes, elapsed_us);
            }
            Ok(FlushOutcome::Skipped) => self.metrics.record_skipped(),
            Err(e) => {
                tracing::warn!(server = %self.id, region = %region_id, error = %e, "region flush failed");
                self.metrics.record_failure();
            }
        }

        FlushReport {
            target: FlushTarget::Region(region_id.clone()),
            outcome,
        }
    }

    /// Flushes every region owned at call time, concurrently, bounded by the
    /// configured permit count. No cross-region ordering.
    pub async fn flush_all_regions(&self) -> FlushSummary {
        let region_ids: Vec<RegionId> = self.regions.iter().map(|r| r.key().clone()).collect();
        tracing::debug!(server = %self.id, regions = region_ids.len(), "flushing all regions");

        let reports = join_all(
            region_ids
                .iter()
                .map(|region_id| self.flush_one_region(region_id)),
        )
        .await;

        FlushSummary { reports }
    }
}
