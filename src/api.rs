//! HTTP control API: status and runtime gamma adjustment.
//!
//! The UDP receive loop runs on its own blocking thread; these handlers run
//! on the tokio runtime and only touch the server through its thread-safe
//! control surface (`status`, `gammas`, `set_gamma`).

use crate::PanelConfig;
use crate::error::ConfigError;
use crate::gamma::{self, Channel, GammaReport};
use crate::server::{LifecycleState, PixelServer, ServerStatus, StatsSnapshot};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<PixelServer>,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(get_status, get_gamma, post_gamma),
    components(schemas(
        ServerStatus,
        LifecycleState,
        StatsSnapshot,
        PanelConfig,
        GammaReport,
        GammaRequest,
    )),
    tags(
        (name = "gamma", description = "Gamma correction endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "LED Grid Pixel Server API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for inspecting and tuning the pixel-streaming daemon"
    )
)]
pub struct ApiDoc;

// ── Request types ────────────────────────────────────────────────────

/// New exponents. Omitted channels keep their current value.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct GammaRequest {
    #[schema(example = 2.8)]
    red: Option<f64>,
    #[schema(example = 2.8)]
    green: Option<f64>,
    #[schema(example = 2.8)]
    blue: Option<f64>,
}

impl GammaRequest {
    fn updates(&self) -> impl Iterator<Item = (Channel, f64)> {
        [
            (Channel::Red, self.red),
            (Channel::Green, self.green),
            (Channel::Blue, self.blue),
        ]
        .into_iter()
        .filter_map(|(channel, value)| value.map(|v| (channel, v)))
    }
}

type ApiError = (StatusCode, Json<Value>);

fn bad_request(err: ConfigError) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": err.to_string() })),
    )
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(
                    utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
                        .validator_url("none"),
                ),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/gamma", get(get_gamma).post(post_gamma))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status — lifecycle state, gamma and frame counters
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current server status", body = ServerStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<ServerStatus> {
    Json(state.server.status())
}

/// GET /api/v1/gamma — exponents currently in effect
#[utoipa::path(
    get,
    path = "/api/v1/gamma",
    tag = "gamma",
    responses(
        (status = 200, description = "Current gamma exponents", body = GammaReport)
    )
)]
async fn get_gamma(State(state): State<AppState>) -> Json<GammaReport> {
    Json(state.server.gammas())
}

/// POST /api/v1/gamma — change one or more exponents
///
/// Every value is validated before any channel is touched, so a request
/// either applies completely or not at all.
#[utoipa::path(
    post,
    path = "/api/v1/gamma",
    tag = "gamma",
    request_body = GammaRequest,
    responses(
        (status = 200, description = "Gamma updated", body = GammaReport),
        (status = 400, description = "Invalid gamma value")
    )
)]
async fn post_gamma(
    State(state): State<AppState>,
    Json(req): Json<GammaRequest>,
) -> Result<Json<GammaReport>, ApiError> {
    for (_, value) in req.updates() {
        gamma::validate_exponent(value).map_err(bad_request)?;
    }
    for (channel, value) in req.updates() {
        state.server.set_gamma(channel, value).map_err(bad_request)?;
    }
    Ok(Json(state.server.gammas()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PixelServerConfig;
    use pretty_assertions::assert_eq;

    fn app_state() -> AppState {
        let mut config = PixelServerConfig {
            port: 0,
            ..PixelServerConfig::default()
        };
        config.bus.simulate = true;
        AppState {
            server: Arc::new(PixelServer::new(config).unwrap()),
        }
    }

    #[tokio::test]
    async fn get_gamma_reports_defaults() {
        let Json(report) = get_gamma(State(app_state())).await;
        assert_eq!(
            report,
            GammaReport {
                red: 3.0,
                green: 3.0,
                blue: 3.0
            }
        );
    }

    #[tokio::test]
    async fn post_gamma_updates_given_channels() {
        let state = app_state();
        let req = GammaRequest {
            green: Some(2.2),
            ..GammaRequest::default()
        };
        let Json(report) = post_gamma(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(report.green, 2.2);
        assert_eq!(report.red, 3.0);
        assert_eq!(state.server.gamma(Channel::Green), 2.2);
    }

    #[tokio::test]
    async fn post_gamma_rejects_whole_request_on_invalid_value() {
        let state = app_state();
        let req = GammaRequest {
            red: Some(1.5),
            blue: Some(-1.0),
            ..GammaRequest::default()
        };
        let (status, Json(body)) = post_gamma(State(state.clone()), Json(req))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid gamma value -1"));
        assert_eq!(state.server.gamma(Channel::Red), 3.0);
    }

    #[tokio::test]
    async fn status_serializes_snake_case_state() {
        let Json(status) = get_status(State(app_state())).await;
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "created");
        assert_eq!(value["panel"]["rows"], 10);
        assert_eq!(value["stats"]["frames"], 0);
    }

    #[test]
    fn openapi_lists_all_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["/api/v1/gamma", "/api/v1/status"]);
    }
}
