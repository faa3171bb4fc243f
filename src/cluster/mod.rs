//! Cluster-facing flush dispatch.
//!
//! `ClusterFlushDispatcher` resolves a flush target through the placement
//! service, fans sub-requests out to the owning region servers, and joins the
//! per-region reports into one `FlushSummary`. Placement answers are
//! advisory: a server that no longer owns a named region answers
//! `StaleTarget`, which the dispatcher passes through untouched.
//!
//! Table-wide dispatch spawns one task per (server, region) pair at first
//! poll. Once spawned, a sub-flush runs to completion even if the caller
//! drops the composite future; only the aggregation is abandoned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use futures::future::join_all;

use crate::contracts::{
    FlushError, FlushReport, FlushSummary, FlushTarget, LockResultExt, PlacementService,
    PlacementSnapshot, RegionId, SegmentWriter, ServerId, TableName, WriteAheadLog,
};
use crate::server::RegionServer;

/// Lookup of live region servers by id.
///
/// Identifier-based on purpose: regions, servers, and the dispatcher refer to
/// each other through ids resolved here, never through back-references.
pub struct ServerRegistry<W, L> {
    servers: DashMap<ServerId, Arc<RegionServer<W, L>>>,
}

impl<W, L> Default for ServerRegistry<W, L> {
    fn default() -> Self {
        Self {
            servers: DashMap::new(),
        }
    }
}

impl<W, L> ServerRegistry<W, L>
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, server: Arc<RegionServer<W, L>>) {
        self.servers.insert(server.id().clone(), server);
    }

    pub fn server(&self, id: &ServerId) -> Option<Arc<RegionServer<W, L>>> {
        self.servers.get(id).map(|s| Arc::clone(s.value()))
    }

    pub fn servers(&self) -> Vec<Arc<RegionServer<W, L>>> {
        self.servers.iter().map(|s| Arc::clone(s.value())).collect()
    }
}

/// In-memory placement service with explicit versioning.
///
/// Assignments are updated by whoever plays the placement role (tests, the
/// bootstrap code in `main`); each mutation bumps the version so dispatchers
/// can tell which snapshot they acted on.
#[derive(Default)]
pub struct StaticPlacement {
    version: AtomicU64,
    by_table: RwLock<HashMap<TableName, Vec<(ServerId, RegionId)>>>,
    by_region: RwLock<HashMap<RegionId, ServerId>>,
}

impl StaticPlacement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `region` of `table` is assigned to `server`. Reassigning
    /// a region replaces its previous assignment; a snapshot never names two
    /// owners for one region.
    pub fn assign(
        &self,
        table: &TableName,
        server: &ServerId,
        region: &RegionId,
    ) -> Result<(), FlushError> {
        let mut by_table = self.by_table.write().map_lock_err()?;
        for assignments in by_table.values_mut() {
            assignments.retain(|(_, r)| r != region);
        }
        by_table
            .entry(table.clone())
            .or_default()
            .push((server.clone(), region.clone()));
        drop(by_table);
        self.by_region
            .write()
            .map_lock_err()?
            .insert(region.clone(), server.clone());
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

impl PlacementService for StaticPlacement {
    fn regions_of(&self, table: &TableName) -> Result<PlacementSnapshot, FlushError> {
        let by_table = self.by_table.read().map_lock_err()?;
        let assignments = by_table
            .get(table)
            .cloned()
            .ok_or_else(|| FlushError::NotFound(format!("table {}", table)))?;
        Ok(PlacementSnapshot {
            version: self.version(),
            assignments,
        })
    }

    fn regions_on_server(&self, server: &ServerId) -> Result<Vec<RegionId>, FlushError> {
        let by_region = self.by_region.read().map_lock_err()?;
        Ok(by_region
            .iter()
            .filter(|(_, s)| *s == server)
            .map(|(r, _)| r.clone())
            .collect())
    }

    fn server_of(&self, region: &RegionId) -> Result<ServerId, FlushError> {
        self.by_region
            .read()
            .map_lock_err()?
            .get(region)
            .cloned()
            .ok_or_else(|| FlushError::NotFound(format!("region {}", region)))
    }
}

/// Fans flush requests out across the cluster and aggregates the results.
pub struct ClusterFlushDispatcher<W, L, P> {
    registry: Arc<ServerRegistry<W, L>>,
    placement: Arc<P>,
}

impl<W, L, P> ClusterFlushDispatcher<W, L, P>
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService,
{
    pub fn new(registry: Arc<ServerRegistry<W, L>>, placement: Arc<P>) -> Self {
        Self {
            registry,
            placement,
        }
    }

    pub fn registry(&self) -> &Arc<ServerRegistry<W, L>> {
        &self.registry
    }

    /// Single dispatch path shared by the blocking and future-based admin
    /// entry points.
    pub async fn dispatch(&self, target: &FlushTarget) -> FlushSummary {
        match target {
            FlushTarget::Region(region) => self.flush_region(region).await,
            FlushTarget::Server(server) => self.flush_region_server(server).await,
            FlushTarget::Table(table) => self.flush_table(table).await,
        }
    }

    /// Flushes one region, resolved to its owning server via placement.
    pub async fn flush_region(&self, region: &RegionId) -> FlushSummary {
        let server_id = match self.placement.server_of(region) {
            Ok(s) => s,
            Err(e) => return FlushSummary::failed(FlushTarget::Region(region.clone()), e),
        };
        let Some(server) = self.registry.server(&server_id) else {
            return FlushSummary::failed(
                FlushTarget::Region(region.clone()),
                FlushError::NotFound(format!("server {}", server_id)),
            );
        };
        FlushSummary::single(server.flush_one_region(region).await)
    }

    /// Flushes every region owned by one server.
    pub async fn flush_region_server(&self, server_id: &ServerId) -> FlushSummary {
        let Some(server) = self.registry.server(server_id) else {
            return FlushSummary::failed(
                FlushTarget::Server(server_id.clone()),
                FlushError::NotFound(format!("server {}", server_id)),
            );
        };
        server.flush_all_regions().await
    }

    /// Flushes every region of a table, across servers, concurrently.
    pub async fn flush_table(&self, table: &TableName) -> FlushSummary {
        let snapshot = match self.placement.regions_of(table) {
            Ok(s) if !s.is_empty() => s,
            Ok(_) => {
                return FlushSummary::failed(
                    FlushTarget::Table(table.clone()),
                    FlushError::NotFound(format!("table {} has no regions", table)),
                )
            }
            Err(e) => return FlushSummary::failed(FlushTarget::Table(table.clone()), e),
        };

        tracing::debug!(
            table = %table,
            regions = snapshot.assignments.len(),
            placement_version = snapshot.version,
            "dispatching table flush"
        );

        let mut handles = Vec::with_capacity(snapshot.assignments.len());
        for (server_id, region_id) in snapshot.assignments {
            match self.registry.server(&server_id) {
                Some(server) => {
                    handles.push(tokio::spawn(async move {
                        server.flush_one_region(&region_id).await
                    }));
                }
                None => {
                    // Known to placement but not live here; report, keep going.
                    handles.push(tokio::spawn(async move {
                        FlushReport {
                            target: FlushTarget::Region(region_id),
                            outcome: Err(FlushError::NotFound(format!("server {}", server_id))),
                        }
                    }));
                }
            }
        }

        let reports = join_all(handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(report) => report,
                Err(e) => FlushReport {
                    target: FlushTarget::Table(table.clone()),
                    outcome: Err(FlushError::Io(format!("flush task failed: {}", e))),
                },
            })
            .collect();

        FlushSummary { reports }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_versions_bump_on_assign() {
        let placement = StaticPlacement::new();
        let table = TableName::from("t");
        assert_eq!(placement.version(), 0);

        placement
            .assign(&table, &ServerId::from("s1"), &RegionId::from("r1"))
            .unwrap();
        placement
            .assign(&table, &ServerId::from("s2"), &RegionId::from("r2"))
            .unwrap();
        assert_eq!(placement.version(), 2);

        let snapshot = placement.regions_of(&table).unwrap();
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.assignments.len(), 2);
    }

    #[test]
    fn reassign_replaces_previous_owner() {
        let placement = StaticPlacement::new();
        let table = TableName::from("t");
        placement
            .assign(&table, &ServerId::from("s1"), &RegionId::from("r1"))
            .unwrap();
        placement
            .assign(&table, &ServerId::from("s2"), &RegionId::from("r1"))
            .unwrap();

        let snapshot = placement.regions_of(&table).unwrap();
        assert_eq!(
            snapshot.assignments,
            vec![(ServerId::from("s2"), RegionId::from("r1"))]
        );
        assert_eq!(snapshot.version, 2);
        assert_eq!(
            placement.server_of(&RegionId::from("r1")).unwrap(),
            ServerId::from("s2")
        );
    }

    #[test]
    fn placement_lookup_failures_are_not_found() {
        let placement = StaticPlacement::new();
        let err = placement.regions_of(&TableName::from("missing")).unwrap_err();
        assert!(matches!(err, FlushError::NotFound(_)));

        let err = placement.server_of(&RegionId::from("missing")).unwrap_err();
        assert!(matches!(err, FlushError::NotFound(_)));
    }

    #[test]
    fn regions_on_server_filters_by_owner() {
        let placement = StaticPlacement::new();
        let table = TableName::from("t");
        placement
            .assign(&table, &ServerId::from("s1"), &RegionId::from("r1"))
            .unwrap();
        placement
            .assign(&table, &ServerId::from("s2"), &RegionId::from("r2"))
            .unwrap();

        let regions = placement.regions_on_server(&ServerId::from("s1")).unwrap();
        assert_eq!(regions, vec![RegionId::from("r1")]);
    }
}
