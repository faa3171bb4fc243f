//! End-to-end tests for flush coordination.
//!
//! A small in-process cluster: one table split into three regions spread over
//! three region servers, written with 20 versions of one row per region, then
//! flushed at each granularity. After every successful flush the affected
//! memstores must report size zero.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use rangekv::admin::{Admin, AsyncAdmin};
use rangekv::api::{create_router, AppState};
use rangekv::cluster::{ClusterFlushDispatcher, ServerRegistry, StaticPlacement};
use rangekv::contracts::{FlushOutcome, RegionId, ServerId, TableName};
use rangekv::metrics::MetricsRegistry;
use rangekv::region::{KeyRange, Region};
use rangekv::server::{CoordinatorConfig, RegionServer};
use rangekv::storage::{FsSegmentWriter, NoopWal};

const SPLITS: [&str; 2] = ["3", "7"];
const ROWS: [&str; 3] = ["1", "4", "8"];
const VERSIONS: u64 = 20;

struct TestCluster {
    registry: Arc<ServerRegistry<FsSegmentWriter, NoopWal>>,
    dispatcher: Arc<ClusterFlushDispatcher<FsSegmentWriter, NoopWal, StaticPlacement>>,
    admin: AsyncAdmin<FsSegmentWriter, NoopWal, StaticPlacement>,
    writer: Arc<FsSegmentWriter>,
    metrics: Arc<MetricsRegistry>,
    table: TableName,
    server_ids: Vec<ServerId>,
    _dir: TempDir,
}

/// One table split at ["3", "7"], one region per server.
fn create_cluster(num_servers: usize) -> TestCluster {
    let dir = TempDir::new().unwrap();
    let writer = Arc::new(FsSegmentWriter::new(dir.path()));
    let wal = Arc::new(NoopWal);
    let metrics = Arc::new(MetricsRegistry::new());
    let table = TableName::from("flush-test");

    let registry = Arc::new(ServerRegistry::new());
    let placement = Arc::new(StaticPlacement::new());

    let server_ids: Vec<ServerId> = (0..num_servers)
        .map(|i| ServerId(format!("rs-{}", i)))
        .collect();
    let servers: Vec<Arc<RegionServer<FsSegmentWriter, NoopWal>>> = server_ids
        .iter()
        .map(|id| {
            let server = Arc::new(RegionServer::new(
                id.clone(),
                CoordinatorConfig::default(),
                Arc::clone(&metrics.flush),
            ));
            registry.register(Arc::clone(&server));
            server
        })
        .collect();

    let mut bounds: Vec<&[u8]> = vec![b""];
    bounds.extend(SPLITS.iter().map(|s| s.as_bytes()));
    bounds.push(b"");

    for (i, pair) in bounds.windows(2).enumerate() {
        let region_id = RegionId(format!("region-{}", i));
        let region = Arc::new(Region::new(
            region_id.clone(),
            table.clone(),
            KeyRange::new(pair[0].to_vec(), pair[1].to_vec()),
            Arc::clone(&writer),
            Arc::clone(&wal),
        ));
        let server = &servers[i % servers.len()];
        server.assign_region(region);
        placement.assign(&table, server.id(), &region_id).unwrap();
    }

    let dispatcher = Arc::new(ClusterFlushDispatcher::new(
        Arc::clone(&registry),
        placement,
    ));
    let admin = AsyncAdmin::new(Arc::clone(&dispatcher));

    TestCluster {
        registry,
        dispatcher,
        admin,
        writer,
        metrics,
        table,
        server_ids,
        _dir: dir,
    }
}

fn table_regions(cluster: &TestCluster) -> Vec<Arc<Region<FsSegmentWriter, NoopWal>>> {
    let mut regions: Vec<_> = cluster
        .registry
        .servers()
        .into_iter()
        .flat_map(|s| s.regions())
        .filter(|r| r.table() == &cluster.table)
        .collect();
    regions.sort_by(|a, b| a.id().cmp(b.id()));
    regions
}

/// Writes 20 versions of one row per region, as the admin tests expect.
fn seed_rows(cluster: &TestCluster) {
    for region in table_regions(cluster) {
        for row in ROWS {
            if !region.range().contains(row.as_bytes()) {
                continue;
            }
            for version in 0..VERSIONS {
                region
                    .put(
                        row.as_bytes().to_vec(),
                        format!("v{:02}", version).into_bytes(),
                        version,
                        version.to_be_bytes().to_vec(),
                    )
                    .unwrap();
            }
        }
    }
    assert!(table_regions(cluster)
        .iter()
        .all(|r| r.memstore_size() > 0));
}

// =============================================================================
// Table flush
// =============================================================================

#[tokio::test]
async fn flush_table_empties_every_memstore() {
    let cluster = create_cluster(3);
    seed_rows(&cluster);

    let summary = cluster.admin.flush(&cluster.table).await;
    assert!(summary.is_success());
    assert_eq!(summary.reports.len(), 3);
    assert_eq!(summary.regions_flushed(), 3);

    assert!(table_regions(&cluster)
        .iter()
        .all(|r| r.memstore_size() == 0));
}

#[test]
fn blocking_flush_table_empties_every_memstore() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cluster = create_cluster(3);
    seed_rows(&cluster);

    let admin = Admin::new(
        AsyncAdmin::new(Arc::clone(&cluster.dispatcher)),
        rt.handle().clone(),
    );
    let summary = admin.flush(&cluster.table).unwrap();
    assert_eq!(summary.regions_flushed(), 3);

    assert!(table_regions(&cluster)
        .iter()
        .all(|r| r.memstore_size() == 0));
}

#[tokio::test]
async fn flush_table_persists_all_seeded_cells() {
    let cluster = create_cluster(3);
    seed_rows(&cluster);
    let expected: usize = table_regions(&cluster)
        .iter()
        .map(|r| r.memstore_cell_count().unwrap())
        .sum();

    assert!(cluster.admin.flush(&cluster.table).await.is_success());

    let mut persisted = 0;
    for region in table_regions(&cluster) {
        let segments = cluster
            .writer
            .list_segments(&cluster.table, region.id())
            .unwrap();
        assert_eq!(segments.len(), 1);
        persisted += segments[0].cell_count;

        let file = cluster.writer.read_segment(&segments[0]).unwrap();
        assert_eq!(file.region, *region.id());
        assert!(file.cells.iter().all(|c| region.range().contains(&c.row)));
    }
    assert_eq!(persisted, expected);
}

// =============================================================================
// Region flush
// =============================================================================

#[tokio::test]
async fn flush_region_empties_that_memstore_only() {
    let cluster = create_cluster(3);
    seed_rows(&cluster);

    let regions = table_regions(&cluster);
    let summary = cluster.admin.flush_region(regions[0].id()).await;
    assert!(summary.is_success());
    assert_eq!(summary.regions_flushed(), 1);

    assert_eq!(regions[0].memstore_size(), 0);
    assert!(regions[1].memstore_size() > 0);
    assert!(regions[2].memstore_size() > 0);
}

#[tokio::test]
async fn flush_every_region_one_by_one() {
    let cluster = create_cluster(3);
    seed_rows(&cluster);

    for region in table_regions(&cluster) {
        let summary = cluster.admin.flush_region(region.id()).await;
        assert!(summary.is_success());
        assert_eq!(region.memstore_size(), 0);
    }
}

#[test]
fn blocking_flush_region() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cluster = create_cluster(3);
    seed_rows(&cluster);

    let admin = Admin::new(
        AsyncAdmin::new(Arc::clone(&cluster.dispatcher)),
        rt.handle().clone(),
    );
    for region in table_regions(&cluster) {
        admin.flush_region(region.id()).unwrap();
        assert_eq!(region.memstore_size(), 0);
    }
}

#[tokio::test]
async fn flush_of_empty_region_is_skipped() {
    let cluster = create_cluster(3);
    seed_rows(&cluster);
    let regions = table_regions(&cluster);

    let first = cluster.admin.flush_region(regions[0].id()).await;
    assert!(matches!(
        first.reports[0].outcome,
        Ok(FlushOutcome::Flushed { .. })
    ));

    // Nothing new written: idempotent no-op, state unchanged.
    let second = cluster.admin.flush_region(regions[0].id()).await;
    assert!(matches!(second.reports[0].outcome, Ok(FlushOutcome::Skipped)));
    let segments = cluster
        .writer
        .list_segments(&cluster.table, regions[0].id())
        .unwrap();
    assert_eq!(segments.len(), 1);
}

// =============================================================================
// Server flush
// =============================================================================

#[tokio::test]
async fn flush_region_server_empties_all_its_regions() {
    let cluster = create_cluster(3);
    seed_rows(&cluster);

    for server_id in &cluster.server_ids {
        let summary = cluster.admin.flush_region_server(server_id).await;
        assert!(summary.is_success());

        let server = cluster.registry.server(server_id).unwrap();
        assert!(server.regions().iter().all(|r| r.memstore_size() == 0));
    }
}

#[test]
fn blocking_flush_region_server() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cluster = create_cluster(3);
    seed_rows(&cluster);

    let admin = Admin::new(
        AsyncAdmin::new(Arc::clone(&cluster.dispatcher)),
        rt.handle().clone(),
    );
    for server_id in &cluster.server_ids {
        admin.flush_region_server(server_id).unwrap();
        let server = cluster.registry.server(server_id).unwrap();
        assert!(server.regions().iter().all(|r| r.memstore_size() == 0));
    }
}

// =============================================================================
// HTTP API
// =============================================================================

fn api_state(
    cluster: &TestCluster,
) -> Arc<AppState<FsSegmentWriter, NoopWal, StaticPlacement>> {
    Arc::new(AppState::new(
        cluster.admin.clone(),
        Arc::clone(&cluster.registry),
        Arc::clone(&cluster.metrics),
    ))
}

#[tokio::test]
async fn http_health_check() {
    let cluster = create_cluster(1);
    let router = create_router(api_state(&cluster));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn http_flush_table_reports_per_region_outcomes() {
    let cluster = create_cluster(3);
    seed_rows(&cluster);
    let router = create_router(api_state(&cluster));

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/tables/{}/flush", cluster.table))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["regions_flushed"], 3);
    assert_eq!(json["reports"].as_array().unwrap().len(), 3);

    assert!(table_regions(&cluster)
        .iter()
        .all(|r| r.memstore_size() == 0));
}

#[tokio::test]
async fn http_flush_unknown_table_is_not_found() {
    let cluster = create_cluster(1);
    let router = create_router(api_state(&cluster));

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tables/no-such-table/flush")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_write_then_flush_region() {
    let cluster = create_cluster(1);
    let router = create_router(api_state(&cluster));

    let write = Request::builder()
        .method("POST")
        .uri(format!("/tables/{}/rows", cluster.table))
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "row": "5",
                "column": "c1",
                "timestamp": 1,
                "value": "hello"
            })
            .to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(write).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let region = json["region"].as_str().unwrap().to_string();

    let flush = Request::builder()
        .method("POST")
        .uri(format!("/regions/{}/flush", region))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(flush).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let region = table_regions(&cluster)
        .into_iter()
        .find(|r| r.id().as_str() == region)
        .unwrap();
    assert_eq!(region.memstore_size(), 0);
}

#[tokio::test]
async fn http_metrics_expose_flush_counters() {
    let cluster = create_cluster(1);
    seed_rows(&cluster);
    assert!(cluster.admin.flush(&cluster.table).await.is_success());

    let router = create_router(api_state(&cluster));
    let response = router
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("rangekv_flush_total"));
    assert!(text.contains("rangekv_flush_duration_us_count"));
}
