//! Admin entry points for flush, in blocking and future-based forms.
//!
//! Both forms run the same dispatch path; `Admin` is a thin wrapper that
//! blocks on the `AsyncAdmin` future, so the completion semantics cannot
//! drift between the two.

use std::sync::Arc;

use crate::cluster::ClusterFlushDispatcher;
use crate::contracts::{
    FlushError, FlushSummary, FlushTarget, PlacementService, RegionId, SegmentWriter, ServerId,
    TableName, WriteAheadLog,
};

/// Future-based admin handle.
///
/// Each method resolves once every dispatched sub-operation has completed.
/// The returned summary keeps per-region outcomes; callers decide how to
/// treat partial failure. Dropping a returned future before first poll
/// issues nothing; after that, already-spawned sub-flushes run to
/// completion.
pub struct AsyncAdmin<W, L, P> {
    dispatcher: Arc<ClusterFlushDispatcher<W, L, P>>,
}

impl<W, L, P> Clone for AsyncAdmin<W, L, P> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<W, L, P> AsyncAdmin<W, L, P>
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService,
{
    pub fn new(dispatcher: Arc<ClusterFlushDispatcher<W, L, P>>) -> Self {
        Self { dispatcher }
    }

    /// Flushes every region of a table.
    pub async fn flush(&self, table: &TableName) -> FlushSummary {
        self.dispatcher
            .dispatch(&FlushTarget::Table(table.clone()))
            .await
    }

    /// Flushes a single region.
    pub async fn flush_region(&self, region: &RegionId) -> FlushSummary {
        self.dispatcher
            .dispatch(&FlushTarget::Region(region.clone()))
            .await
    }

    /// Flushes every region on a region server.
    pub async fn flush_region_server(&self, server: &ServerId) -> FlushSummary {
        self.dispatcher
            .dispatch(&FlushTarget::Server(server.clone()))
            .await
    }
}

/// Blocking admin handle.
///
/// Calls block the current thread until the whole composite operation has
/// completed, then surface the first per-region failure as `Err` (the full
/// summary stays reachable through [`AsyncAdmin`] for callers that need
/// per-region detail). Must be called from outside the runtime's worker
/// threads.
pub struct Admin<W, L, P> {
    inner: AsyncAdmin<W, L, P>,
    runtime: tokio::runtime::Handle,
}

impl<W, L, P> Admin<W, L, P>
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService,
{
    pub fn new(inner: AsyncAdmin<W, L, P>, runtime: tokio::runtime::Handle) -> Self {
        Self { inner, runtime }
    }

    /// Blocking table flush; `Ok` only if every region succeeded or skipped.
    pub fn flush(&self, table: &TableName) -> Result<FlushSummary, FlushError> {
        self.runtime.block_on(self.inner.flush(table)).into_result()
    }

    /// Blocking single-region flush.
    pub fn flush_region(&self, region: &RegionId) -> Result<FlushSummary, FlushError> {
        self.runtime
            .block_on(self.inner.flush_region(region))
            .into_result()
    }

    /// Blocking whole-server flush.
    pub fn flush_region_server(&self, server: &ServerId) -> Result<FlushSummary, FlushError> {
        self.runtime
            .block_on(self.inner.flush_region_server(server))
            .into_result()
    }
}
