use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::admin::AsyncAdmin;
use crate::cluster::ServerRegistry;
use crate::contracts::{
    FlushError, FlushOutcome, FlushSummary, PlacementService, RegionId, SegmentWriter, ServerId,
    TableName, WriteAheadLog,
};
use crate::metrics::MetricsRegistry;
use crate::region::Region;

/// Application state shared across handlers.
pub struct AppState<W, L, P> {
    pub admin: AsyncAdmin<W, L, P>,
    pub registry: Arc<ServerRegistry<W, L>>,
    pub metrics: Arc<MetricsRegistry>,
}

impl<W, L, P> AppState<W, L, P>
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService,
{
    pub fn new(
        admin: AsyncAdmin<W, L, P>,
        registry: Arc<ServerRegistry<W, L>>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            admin,
            registry,
            metrics,
        }
    }

    /// Finds the region of `table` whose key range contains `row`.
    fn locate(&self, table: &TableName, row: &[u8]) -> Option<Arc<Region<W, L>>> {
        self.registry
            .servers()
            .into_iter()
            .flat_map(|server| server.regions())
            .find(|region| region.table() == table && region.range().contains(row))
    }
}

// =============================================================================
// Flush responses
// =============================================================================

#[derive(Debug, Serialize)]
pub struct FlushReportEntry {
    pub target: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct FlushResponse {
    pub success: bool,
    pub regions_flushed: usize,
    pub reports: Vec<FlushReportEntry>,
}

fn flush_status(err: &FlushError) -> StatusCode {
    match err {
        FlushError::NotFound(_) => StatusCode::NOT_FOUND,
        FlushError::StaleTarget { .. } => StatusCode::CONFLICT,
        FlushError::PersistFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        FlushError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        FlushError::AlreadyInProgress { .. } => StatusCode::CONFLICT,
        FlushError::Io(_) | FlushError::LockPoisoned(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn flush_response(summary: FlushSummary) -> impl IntoResponse {
    let status = match summary.first_failure() {
        None => StatusCode::OK,
        Some(err) => flush_status(err),
    };

    let response = FlushResponse {
        success: summary.is_success(),
        regions_flushed: summary.regions_flushed(),
        reports: summary
            .reports
            .into_iter()
            .map(|report| match report.outcome {
                Ok(FlushOutcome::Flushed { segments, bytes }) => FlushReportEntry {
                    target: report.target.to_string(),
                    status: "flushed",
                    segments: Some(segments),
                    bytes: Some(bytes),
                    error: None,
                    retryable: None,
                },
                Ok(FlushOutcome::Skipped) => FlushReportEntry {
                    target: report.target.to_string(),
                    status: "skipped",
                    segments: None,
                    bytes: None,
                    error: None,
                    retryable: None,
                },
                Err(err) => FlushReportEntry {
                    target: report.target.to_string(),
                    status: "failed",
                    segments: None,
                    bytes: None,
                    retryable: Some(err.is_retryable()),
                    error: Some(err.to_string()),
                },
            })
            .collect(),
    };

    (status, Json(response))
}

// =============================================================================
// Flush handlers
// =============================================================================

pub async fn flush_table<W, L, P>(
    State(state): State<Arc<AppState<W, L, P>>>,
    Path(table): Path<String>,
) -> impl IntoResponse
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService,
{
    flush_response(state.admin.flush(&TableName::from(table)).await)
}

pub async fn flush_region<W, L, P>(
    State(state): State<Arc<AppState<W, L, P>>>,
    Path(region): Path<String>,
) -> impl IntoResponse
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService,
{
    flush_response(state.admin.flush_region(&RegionId::from(region)).await)
}

pub async fn flush_server<W, L, P>(
    State(state): State<Arc<AppState<W, L, P>>>,
    Path(server): Path<String>,
) -> impl IntoResponse
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService,
{
    flush_response(
        state
            .admin
            .flush_region_server(&ServerId::from(server))
            .await,
    )
}

// =============================================================================
// Write handler
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct WriteCellRequest {
    pub row: String,
    pub column: String,
    #[serde(default)]
    pub timestamp: Option<u64>,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct WriteCellResponse {
    pub region: String,
    pub seq: u64,
}

pub async fn write_cell<W, L, P>(
    State(state): State<Arc<AppState<W, L, P>>>,
    Path(table): Path<String>,
    Json(request): Json<WriteCellRequest>,
) -> axum::response::Response
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService,
{
    let table = TableName::from(table);
    let Some(region) = state.locate(&table, request.row.as_bytes()) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no region for table {}", table) })),
        )
            .into_response();
    };

    let timestamp = request.timestamp.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    });

    match region.put(
        request.row.into_bytes(),
        request.column.into_bytes(),
        timestamp,
        request.value.into_bytes(),
    ) {
        Ok(seq) => (
            StatusCode::OK,
            Json(WriteCellResponse {
                region: region.id().to_string(),
                seq,
            }),
        )
            .into_response(),
        Err(e) => (
            flush_status(&e),
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

// =============================================================================
// Health, stats, metrics
// =============================================================================

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
pub struct RegionStats {
    pub region: String,
    pub table: String,
    pub memstore_bytes: u64,
    pub segments: usize,
}

#[derive(Debug, Serialize)]
pub struct ServerStats {
    pub server: String,
    pub regions: Vec<RegionStats>,
}

pub async fn get_stats<W, L, P>(
    State(state): State<Arc<AppState<W, L, P>>>,
) -> impl IntoResponse
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService,
{
    let servers: Vec<ServerStats> = state
        .registry
        .servers()
        .into_iter()
        .map(|server| ServerStats {
            server: server.id().to_string(),
            regions: server
                .regions()
                .into_iter()
                .map(|region| RegionStats {
                    region: region.id().to_string(),
                    table: region.table().to_string(),
                    memstore_bytes: region.memstore_size(),
                    segments: region.segments().map(|s| s.len()).unwrap_or(0),
                })
                .collect(),
        })
        .collect();

    Json(serde_json::json!({ "servers": servers }))
}

pub async fn get_metrics<W, L, P>(
    State(state): State<Arc<AppState<W, L, P>>>,
) -> impl IntoResponse
where
    W: SegmentWriter + Send + Sync + 'static,
    L: WriteAheadLog + Send + Sync + 'static,
    P: PlacementService,
{
    state.metrics.format_prometheus()
}
