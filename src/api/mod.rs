mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::contracts::{PlacementService, SegmentWriter, WriteAheadLog};

pub use handlers::{AppState, WriteCellRequest, WriteCellResponse};

/// Creates the API router.
pub fn create_router<W, L, P>(state: Arc<AppState<W, L, P>>) -> Router
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService + 'static,
{
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats::<W, L, P>))
        .route("/metrics", get(handlers::get_metrics::<W, L, P>))
        .route("/tables/:table/rows", post(handlers::write_cell::<W, L, P>))
        .route("/tables/:table/flush", post(handlers::flush_table::<W, L, P>))
        .route(
            "/regions/:region/flush",
            post(handlers::flush_region::<W, L, P>),
        )
        .route(
            "/servers/:server/flush",
            post(handlers::flush_server::<W, L, P>),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Reads `RANGEKV_HOST` and `RANGEKV_PORT`.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("RANGEKV_HOST").unwrap_or(default.host),
            port: std::env::var("RANGEKV_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(default.port),
        }
    }
}

/// Starts the HTTP server.
pub async fn start_server<W, L, P, F>(
    config: ServerConfig,
    state: Arc<AppState<W, L, P>>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
