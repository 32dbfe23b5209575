// Grain Ledger - Web Server
// REST API over one farm session with Axum

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use grain_ledger::{
    bin_status, BinStatus, Delivery, DeliveryOutcome, DeliveryRequest, FarmSession, FarmSummary,
    LedgerError, Settings, Unload, UnloadOutcome, UnloadRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Shared application state
#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<FarmSession>>,
}

impl AppState {
    fn lock(&self) -> Result<MutexGuard<'_, FarmSession>, ApiError> {
        self.session
            .lock()
            .map_err(|_| ApiError::internal("farm session lock poisoned"))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Errors
// ============================================================================

struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "Internal",
            message: message.to_string(),
        }
    }
}

fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::BinNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::DuplicateBin(_)
        | LedgerError::VarietyMismatch { .. }
        | LedgerError::BinNotEmpty { .. } => StatusCode::CONFLICT,
        LedgerError::InvalidBinName
        | LedgerError::InvalidCapacity { .. }
        | LedgerError::InvalidQuantity(_)
        | LedgerError::MissingVariety(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::Persistence(_) | LedgerError::Backup(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!(kind = err.kind(), "{}", err);
        } else {
            tracing::warn!(kind = err.kind(), "{}", err);
        }
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
            kind: Some(self.kind),
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

/// Bin row with a link to itself
#[derive(Serialize)]
struct BinResponse {
    #[serde(flatten)]
    status: BinStatus,
    href: String,
}

impl From<BinStatus> for BinResponse {
    fn from(status: BinStatus) -> Self {
        let href = format!("/api/bins/{}", urlencoding::encode(&status.bin));
        Self { status, href }
    }
}

#[derive(Deserialize)]
struct NewBin {
    name: String,
    #[serde(default)]
    capacity: f64,
    #[serde(default)]
    variety: String,
}

#[derive(Deserialize)]
struct BinUpdate {
    capacity: Option<f64>,
    variety: Option<String>,
}

#[derive(Deserialize)]
struct NewDelivery {
    bin: String,
    #[serde(default)]
    variety: String,
    bushels: f64,
    #[serde(default)]
    truck: String,
    #[serde(default)]
    notes: String,
}

#[derive(Deserialize)]
struct NewUnload {
    bin: String,
    bushels: f64,
    #[serde(default)]
    destination: String,
    #[serde(default)]
    notes: String,
}

/// `?bin=&limit=` on the record listings
#[derive(Deserialize)]
struct RecordFilter {
    bin: Option<String>,
    limit: Option<usize>,
}

impl RecordFilter {
    fn keeps(&self, bin: &str) -> bool {
        self.bin.as_deref().map(|b| b == bin).unwrap_or(true)
    }

    fn limit(&self) -> usize {
        self.limit.unwrap_or(usize::MAX)
    }
}

#[derive(Serialize)]
struct Count {
    count: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> ApiResult<String> {
    let session = state.lock()?;
    Ok(Json(ApiResponse::ok(session.store_description())))
}

/// GET /api/bins - Current bin status
async fn list_bins(State(state): State<AppState>) -> ApiResult<Vec<BinResponse>> {
    let session = state.lock()?;
    let bins = bin_status(session.registry())
        .into_iter()
        .map(BinResponse::from)
        .collect();
    Ok(Json(ApiResponse::ok(bins)))
}

/// GET /api/bins/:name
async fn get_bin(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<BinResponse> {
    let session = state.lock()?;
    let bin = session
        .registry()
        .get(&name)
        .ok_or(LedgerError::BinNotFound(name))?;
    Ok(Json(ApiResponse::ok(BinStatus::from(bin).into())))
}

/// POST /api/bins
async fn create_bin(
    State(state): State<AppState>,
    Json(body): Json<NewBin>,
) -> Result<(StatusCode, Json<ApiResponse<BinResponse>>), ApiError> {
    let mut session = state.lock()?;
    let bin = session.add_bin(&body.name, body.capacity, &body.variety)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(BinStatus::from(&bin).into())),
    ))
}

/// PUT /api/bins/:name
async fn update_bin(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<BinUpdate>,
) -> ApiResult<BinResponse> {
    let mut session = state.lock()?;
    let bin = session.update_bin(&name, body.capacity, body.variety.as_deref())?;
    Ok(Json(ApiResponse::ok(BinStatus::from(&bin).into())))
}

/// DELETE /api/bins/:name
async fn delete_bin(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<BinResponse> {
    let mut session = state.lock()?;
    let bin = session.remove_bin(&name)?;
    Ok(Json(ApiResponse::ok(BinStatus::from(&bin).into())))
}

/// POST /api/bins/:name/clear-variety
async fn clear_variety(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<BinResponse> {
    let mut session = state.lock()?;
    let bin = session.clear_variety(&name)?;
    Ok(Json(ApiResponse::ok(BinStatus::from(&bin).into())))
}

/// POST /api/reset-fill - Zero every bin
async fn reset_fill(State(state): State<AppState>) -> ApiResult<Count> {
    let mut session = state.lock()?;
    let count = session.reset_all_fill()?;
    Ok(Json(ApiResponse::ok(Count { count })))
}

/// GET /api/dashboard - Farm totals and grain by variety
async fn dashboard(State(state): State<AppState>) -> ApiResult<FarmSummary> {
    let session = state.lock()?;
    Ok(Json(ApiResponse::ok(FarmSummary::from_registry(session.registry()))))
}

/// GET /api/deliveries - Newest first
async fn list_deliveries(
    State(state): State<AppState>,
    Query(filter): Query<RecordFilter>,
) -> ApiResult<Vec<Delivery>> {
    let session = state.lock()?;
    let deliveries = session
        .log()
        .deliveries_newest_first()
        .into_iter()
        .filter(|d| filter.keeps(&d.bin))
        .take(filter.limit())
        .cloned()
        .collect();
    Ok(Json(ApiResponse::ok(deliveries)))
}

/// POST /api/deliveries
async fn create_delivery(
    State(state): State<AppState>,
    Json(body): Json<NewDelivery>,
) -> Result<(StatusCode, Json<ApiResponse<DeliveryOutcome>>), ApiError> {
    let request = DeliveryRequest::new(&body.bin, &body.variety, body.bushels)
        .truck(&body.truck)
        .notes(&body.notes);
    let mut session = state.lock()?;
    let outcome = session.record_delivery(&request)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(outcome))))
}

/// DELETE /api/deliveries - Clear the delivery log
async fn clear_deliveries(State(state): State<AppState>) -> ApiResult<Count> {
    let mut session = state.lock()?;
    let count = session.clear_deliveries()?;
    Ok(Json(ApiResponse::ok(Count { count })))
}

/// GET /api/unloads - Newest first
async fn list_unloads(
    State(state): State<AppState>,
    Query(filter): Query<RecordFilter>,
) -> ApiResult<Vec<Unload>> {
    let session = state.lock()?;
    let unloads = session
        .log()
        .unloads_newest_first()
        .into_iter()
        .filter(|u| filter.keeps(&u.bin))
        .take(filter.limit())
        .cloned()
        .collect();
    Ok(Json(ApiResponse::ok(unloads)))
}

/// POST /api/unloads
async fn create_unload(
    State(state): State<AppState>,
    Json(body): Json<NewUnload>,
) -> Result<(StatusCode, Json<ApiResponse<UnloadOutcome>>), ApiError> {
    let request = UnloadRequest::new(&body.bin, body.bushels, &body.destination).notes(&body.notes);
    let mut session = state.lock()?;
    let outcome = session.record_unload(&request)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(outcome))))
}

/// DELETE /api/unloads - Clear the unload log
async fn clear_unloads(State(state): State<AppState>) -> ApiResult<Count> {
    let mut session = state.lock()?;
    let count = session.clear_unloads()?;
    Ok(Json(ApiResponse::ok(Count { count })))
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/bins", get(list_bins).post(create_bin))
        .route("/bins/:name", get(get_bin).put(update_bin).delete(delete_bin))
        .route("/bins/:name/clear-variety", post(clear_variety))
        .route("/reset-fill", post(reset_fill))
        .route("/dashboard", get(dashboard))
        .route(
            "/deliveries",
            get(list_deliveries).post(create_delivery).delete(clear_deliveries),
        )
        .route(
            "/unloads",
            get(list_unloads).post(create_unload).delete(clear_unloads),
        )
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl+C: {}", e);
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    println!("🌾 Grain Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = std::env::var_os("GRAIN_LEDGER_CONFIG").map(std::path::PathBuf::from);
    let settings = Settings::new(config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.log_filter())),
        )
        .init();

    let session = FarmSession::open(
        settings.open_store()?,
        settings.backup_manager(),
        settings.backup.policy,
        settings.farm.seed_bins,
    )?;
    println!("✓ Farm opened: {}", session.store_description());

    let state = AppState {
        session: Arc::new(Mutex::new(session)),
    };
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;

    println!("\n🚀 Server running on http://{}", settings.server.bind);
    println!("   API: http://{}/api/bins", settings.server.bind);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and its clone of the state) is gone once serve returns
    match Arc::try_unwrap(state.session) {
        Ok(mutex) => match mutex.into_inner() {
            Ok(session) => session.close()?,
            Err(_) => tracing::warn!("farm session lock poisoned; skipping session-end snapshot"),
        },
        Err(_) => tracing::warn!("farm session still shared; skipping session-end snapshot"),
    }

    println!("✓ Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use grain_ledger::{BackupPolicy, SqliteStore};
    use tower::ServiceExt;

    fn app_with_bins(names: &[&str]) -> Router {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut session = FarmSession::open(Box::new(store), None, BackupPolicy::Never, 0).unwrap();
        for name in names {
            session.add_bin(name, 1000.0, "").unwrap();
        }
        router(AppState {
            session: Arc::new(Mutex::new(session)),
        })
    }

    async fn send(app: Router, method: &str, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_any_bin_name_is_addressable() {
        let app = app_with_bins(&["reset-fill", "North 1"]);

        assert_eq!(send(app.clone(), "GET", "/api/bins/reset-fill").await, StatusCode::OK);
        assert_eq!(send(app.clone(), "GET", "/api/bins/North%201").await, StatusCode::OK);
        assert_eq!(send(app.clone(), "DELETE", "/api/bins/reset-fill").await, StatusCode::OK);
        assert_eq!(
            send(app.clone(), "GET", "/api/bins/reset-fill").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(send(app, "POST", "/api/reset-fill").await, StatusCode::OK);
    }
}
