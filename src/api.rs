//! REST API for the manifest service.
//!
//! Provides HTTP endpoints to allocate an order table directly and to trigger a run
//! against the configured store. Uses Axum as the web framework and supports CORS.

use std::sync::{Arc, OnceLock};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::allocator::{BoxState, LineProgress, LineStatus, OrderSummary, Shortage};
use crate::builder::OrderSnapshot;
use crate::config::ApiConfig;
use crate::model::{Cell, PlacementRow, RawRow};
use crate::orchestrator::{RunConfig, RunError, RunReport, run, run_with_progress};
use crate::store::JsonFileStore;
use crate::task::{RunFailure, RunStatus, spawn_run};

/// Shared state of all handlers.
#[derive(Clone)]
pub struct ApiState {
    run_config: RunConfig,
    store: Arc<JsonFileStore>,
}

impl ApiState {
    pub fn new(run_config: RunConfig, store: JsonFileStore) -> Self {
        Self {
            run_config,
            store: Arc::new(store),
        }
    }

    fn run_config_for(&self, has_header: Option<bool>) -> RunConfig {
        let mut config = self.run_config.clone();
        if let Some(has_header) = has_header {
            config.has_header = has_header;
        }
        config
    }
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>box-manifest API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Request structure for the allocation endpoints.
///
/// `rows` is the raw order table; `has_header` overrides the configured header handling.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "rows": [
            ["Code", "Order", "Product", "Name", "Category", "Quantity", "Ratio"],
            ["A-17", "1001", "P-100", "Honey jar 250g", "Food", "125", "50"],
            ["A-17", "1001", "BOX", "Box", "CUSTOM SET", "3", ""],
            ["A-17", "1001", "F-1", "Paper wool", "Riempimento", "2", ""]
        ],
        "has_header": true
    })
)]
pub struct AllocateRequest {
    #[schema(value_type = Vec<Vec<Cell>>)]
    pub rows: Vec<RawRow>,
    #[serde(default)]
    pub has_header: Option<bool>,
}

/// Response with the complete manifest.
///
/// # Fields
/// * `manifest` - Placement rows of all orders in discovery order
/// * `orders` - Box occupation and line progress per order
/// * `is_complete` - Whether every line of every order was placed
#[derive(Serialize, ToSchema)]
pub struct AllocateResponse {
    pub manifest: Vec<PlacementRow>,
    pub orders: Vec<OrderSummary>,
    pub is_complete: bool,
}

impl AllocateResponse {
    pub fn from_report(report: RunReport) -> Self {
        let is_complete = report.is_complete();
        let RunReport { manifest, orders } = report;
        Self {
            manifest,
            orders,
            is_complete,
        }
    }
}

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn run_error_response(err: &RunError) -> Response {
    match err {
        RunError::Malformed(err) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Invalid order table",
            err.to_string(),
        ),
        RunError::Allocation(err) => error_response(
            StatusCode::CONFLICT,
            "Allocation failed",
            err.to_string(),
        ),
    }
}

fn parse_allocate_request(
    state: &ApiState,
    payload: Result<Json<AllocateRequest>, JsonRejection>,
) -> Result<(OrderSnapshot, RunConfig), Response> {
    let Json(payload) = payload.map_err(json_deserialize_error)?;
    let config = state.run_config_for(payload.has_header);
    let snapshot = OrderSnapshot::from_table(&payload.rows, &config.tags, config.has_header)
        .map_err(|err| run_error_response(&RunError::Malformed(err)))?;
    Ok((snapshot, config))
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_allocate, handle_allocate_stream, handle_run, handle_health),
    components(
        schemas(
            AllocateRequest,
            AllocateResponse,
            PlacementRow,
            OrderSummary,
            BoxState,
            LineProgress,
            LineStatus,
            Shortage,
            Cell,
            RunStatus,
            HealthResponse,
            ErrorResponse
        )
    ),
    tags((name = "manifest", description = "Endpoints for box manifest generation"))
)]
struct ApiDoc;

/// Builds the router with all endpoints.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/allocate", post(handle_allocate))
        .route("/allocate_stream", post(handle_allocate_stream))
        .route("/run", post(handle_run))
        .route("/health", get(handle_health))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the API server and blocks until it terminates.
pub async fn start_api_server(config: ApiConfig, state: ApiState) -> std::io::Result<()> {
    let app = build_router(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let display_host = config.display_host().to_string();
    info!(
        "🚀 Server running on http://{}:{}",
        display_host,
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("📦 API Endpoints: POST /allocate, POST /allocate_stream, POST /run, GET /health");
    info!("📑 Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /allocate.
///
/// Allocates every order of the submitted table and returns the manifest.
#[utoipa::path(
    post,
    path = "/allocate",
    request_body = AllocateRequest,
    responses(
        (status = 200, description = "Manifest computed", body = AllocateResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Malformed order table",
            body = ErrorResponse
        ),
        (
            status = CONFLICT,
            description = "Order cannot be allocated under the configured policy",
            body = ErrorResponse
        )
    ),
    tag = "manifest"
)]
async fn handle_allocate(
    State(state): State<ApiState>,
    payload: Result<Json<AllocateRequest>, JsonRejection>,
) -> Response {
    let (snapshot, config) = match parse_allocate_request(&state, payload) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    info!("📥 New allocation request: {} rows", snapshot.len());
    match run(&snapshot, &config) {
        Ok(report) => {
            info!(
                "📦 Result: {} manifest rows, {} shortages",
                report.manifest.len(),
                report.shortages().count()
            );
            (StatusCode::OK, Json(AllocateResponse::from_report(report))).into_response()
        }
        Err(err) => {
            warn!("Allocation rejected: {err}");
            run_error_response(&err)
        }
    }
}

/// Handler for POST /allocate_stream (SSE).
///
/// Streams allocation events as Server-Sent Events while the manifest is computed.
#[utoipa::path(
    post,
    path = "/allocate_stream",
    request_body = AllocateRequest,
    responses(
        (
            status = 200,
            description = "Streams allocation events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Malformed order table",
            body = ErrorResponse
        )
    ),
    tag = "manifest"
)]
async fn handle_allocate_stream(
    State(state): State<ApiState>,
    payload: Result<Json<AllocateRequest>, JsonRejection>,
) -> Response {
    let (snapshot, config) = match parse_allocate_request(&state, payload) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let outcome = run_with_progress(&snapshot, &config, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // A closed receiver means the client went away; later events are dropped.
                let _ = tx.blocking_send(json);
            }
        });
        if let Err(err) = outcome {
            let failure = json!({ "type": "RunFailed", "details": err.to_string() });
            let _ = tx.blocking_send(failure.to_string());
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /run.
///
/// Reads the order table from the configured store, computes the manifest and
/// writes it back. Responds with the final run status.
#[utoipa::path(
    post,
    path = "/run",
    responses(
        (status = 200, description = "Manifest written", body = RunStatus),
        (status = UNPROCESSABLE_ENTITY, description = "Order table is malformed", body = RunStatus),
        (status = CONFLICT, description = "Allocation failed", body = RunStatus),
        (status = BAD_GATEWAY, description = "Store could not be read or written", body = RunStatus),
        (status = INTERNAL_SERVER_ERROR, description = "Run aborted", body = RunStatus)
    ),
    tag = "manifest"
)]
async fn handle_run(State(state): State<ApiState>) -> Response {
    let handle = spawn_run(state.store.clone(), state.run_config.clone());
    let status_rx = handle.subscribe();

    let code = match handle.wait().await {
        Ok(_) => StatusCode::OK,
        Err(RunFailure::Malformed(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        Err(RunFailure::Allocation(_)) => StatusCode::CONFLICT,
        Err(RunFailure::Source(_) | RunFailure::Sink(_)) => StatusCode::BAD_GATEWAY,
        Err(RunFailure::Aborted(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let status = status_rx.borrow().clone();
    (code, Json(status)).into_response()
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "manifest"
)]
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
