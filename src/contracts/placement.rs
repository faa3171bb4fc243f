use crate::contracts::error::FlushError;
use crate::contracts::flush::{RegionId, ServerId, TableName};

/// A versioned view of region-to-server assignments, taken at dispatch time.
///
/// Advisory only: by the time a sub-request reaches a server the region may
/// have moved, which the target server reports as `StaleTarget`. The
/// dispatcher never trusts a snapshot beyond building the fan-out list.
#[derive(Debug, Clone)]
pub struct PlacementSnapshot {
    /// Version of the assignment state this snapshot was taken from.
    pub version: u64,
    /// (owning server, region) pairs for the resolved table.
    pub assignments: Vec<(ServerId, RegionId)>,
}

impl PlacementSnapshot {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Region-to-server assignment lookup.
///
/// External collaborator: cluster membership and assignment are maintained
/// elsewhere; this subsystem only reads them, and treats every answer as
/// possibly stale.
pub trait PlacementService: Send + Sync {
    /// Resolves a table to its current (server, region) assignments.
    fn regions_of(&self, table: &TableName) -> Result<PlacementSnapshot, FlushError>;

    /// Lists the regions currently assigned to a server.
    fn regions_on_server(&self, server: &ServerId) -> Result<Vec<RegionId>, FlushError>;

    /// Resolves the server currently assigned a region.
    fn server_of(&self, region: &RegionId) -> Result<ServerId, FlushError>;
}
