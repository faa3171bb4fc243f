//! Write-ahead log stand-in.
//!
//! The real log lives in the ingest path; the flush pipeline only reports
//! durable low-water marks to it. `NoopWal` satisfies that contract for
//! deployments and tests that manage recovery elsewhere.

use crate::contracts::{FlushError, RegionId, WriteAheadLog};

/// WAL collaborator that discards low-water-mark notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWal;

impl WriteAheadLog for NoopWal {
    fn flushed_up_to(&self, region: &RegionId, seq: u64) -> Result<(), FlushError> {
        tracing::trace!(region = %region, seq, "WAL low-water mark advanced");
        Ok(())
    }
}
