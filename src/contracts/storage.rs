use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::contracts::error::FlushError;
use crate::contracts::flush::{RegionId, TableName};
use crate::memstore::MemStoreSnapshot;

/// Handle to one immutable on-disk segment produced by a flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHandle {
    /// Writer-assigned identifier (for the filesystem writer, the file path).
    pub segment_id: String,
    /// Highest sequence number contained in the segment.
    pub seq: u64,
    /// Number of cells in the segment.
    pub cell_count: usize,
    /// Serialized size in bytes.
    pub size_bytes: u64,
}

/// Durable writer for memstore snapshots.
///
/// Failures of the `PersistFailure` kind are retryable; the flush executor
/// retains the snapshot and surfaces the error instead of retrying, so a
/// persistent storage outage is never masked as a transient blip.
pub trait SegmentWriter: Send + Sync {
    /// Persists a snapshot as a new immutable segment.
    fn write_segment(
        &self,
        table: &TableName,
        region: &RegionId,
        snapshot: &MemStoreSnapshot,
    ) -> impl Future<Output = Result<SegmentHandle, FlushError>> + Send;
}

/// Write-ahead log collaborator.
///
/// The log itself is written by the ingest path; the flush executor only
/// reports the durable low-water mark after segment registration, so the log
/// may discard entries already covered by flushed segments. Entries are never
/// droppable before that call.
pub trait WriteAheadLog: Send + Sync {
    /// Marks all entries of `region` up to and including `seq` as durably
    /// persisted in a registered segment.
    fn flushed_up_to(&self, region: &RegionId, seq: u64) -> Result<(), FlushError>;
}
