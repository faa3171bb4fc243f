use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use rangekv::admin::AsyncAdmin;
use rangekv::api::{start_server, AppState, ServerConfig};
use rangekv::cluster::{ClusterFlushDispatcher, ServerRegistry, StaticPlacement};
use rangekv::contracts::{RegionId, ServerId, TableName};
use rangekv::metrics::MetricsRegistry;
use rangekv::region::{KeyRange, Region};
use rangekv::server::{CoordinatorConfig, RegionServer};
use rangekv::storage::{FsSegmentWriter, NoopWal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rangekv=info".parse()?))
        .init();

    tracing::info!("rangekv starting...");

    let data_dir = std::env::var("RANGEKV_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let writer = Arc::new(FsSegmentWriter::new(&data_dir));
    let wal = Arc::new(NoopWal);
    tracing::info!("Segment store rooted at {}", data_dir);

    let metrics = Arc::new(MetricsRegistry::new());
    let server_id = ServerId::from(
        std::env::var("RANGEKV_SERVER_ID")
            .unwrap_or_else(|_| "rs-1".into())
            .as_str(),
    );
    let server = Arc::new(RegionServer::new(
        server_id.clone(),
        CoordinatorConfig::from_env(),
        Arc::clone(&metrics.flush),
    ));

    let registry = Arc::new(ServerRegistry::new());
    registry.register(Arc::clone(&server));

    let placement = Arc::new(StaticPlacement::new());

    // Bootstrap one table, split into regions at the configured keys.
    let table = TableName::from(
        std::env::var("RANGEKV_BOOTSTRAP_TABLE")
            .unwrap_or_else(|_| "default".into())
            .as_str(),
    );
    let splits: Vec<String> = std::env::var("RANGEKV_BOOTSTRAP_SPLITS")
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut bounds: Vec<Vec<u8>> = vec![Vec::new()];
    bounds.extend(splits.iter().map(|s| s.clone().into_bytes()));
    bounds.push(Vec::new());

    for (i, pair) in bounds.windows(2).enumerate() {
        let region_id = RegionId(format!("{}-{:04}", table, i));
        let region = Arc::new(Region::new(
            region_id.clone(),
            table.clone(),
            KeyRange::new(pair[0].clone(), pair[1].clone()),
            Arc::clone(&writer),
            Arc::clone(&wal),
        ));
        server.assign_region(region);
        placement.assign(&table, &server_id, &region_id)?;
    }
    tracing::info!(
        table = %table,
        regions = server.region_count(),
        "bootstrapped table"
    );

    let dispatcher = Arc::new(ClusterFlushDispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&placement),
    ));
    let admin = AsyncAdmin::new(dispatcher);

    let state = Arc::new(AppState::new(admin, registry, metrics));

    let config = ServerConfig::from_env();
    start_server(config, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await?;

    Ok(())
}
