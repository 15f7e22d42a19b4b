use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridiron_core::domain::recommendation::RecommendationSet;
use gridiron_core::domain::request::RecommendationRequest;
use gridiron_core::policy::AdvisorConfig;
use gridiron_core::{Advisor, CoreError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = gridiron_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let advisor = match build_advisor(&settings) {
        Ok(advisor) => advisor,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "advisor configuration rejected; refusing to start");
            return Err(e);
        }
    };

    let state = AppState {
        advisor: Arc::new(advisor),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/recommendations", post(post_recommendations))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port = settings.port.unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_advisor(settings: &gridiron_core::config::Settings) -> anyhow::Result<Advisor> {
    let path = settings.require_advisor_config_path()?;
    let config = AdvisorConfig::load(path).context("load advisor config")?;
    let providers = gridiron_core::ingest::build_http_providers(&config)?;
    Ok(Advisor::from_config(config, providers)?)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    advisor: Arc<Advisor>,
}

async fn post_recommendations(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> Result<Json<RecommendationSet>, ApiError> {
    let set = state.advisor.advise(&request).await?;
    Ok(Json(set))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    detail: serde_json::Value,
}

struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::AmbiguousEntity { .. }
        | CoreError::AliasConflict { .. }
        | CoreError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::InsufficientData { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Enough context for the caller to act: which entity, which fields, which providers.
fn detail_for(err: &CoreError) -> serde_json::Value {
    match err {
        CoreError::AmbiguousEntity {
            provider,
            raw_id,
            raw_name,
            candidates,
        } => json!({
            "provider": provider,
            "raw_id": raw_id,
            "raw_name": raw_name,
            "candidates": candidates,
        }),
        CoreError::AliasConflict {
            provider,
            raw_id,
            existing,
            requested,
        } => json!({
            "provider": provider,
            "raw_id": raw_id,
            "existing": existing,
            "requested": requested,
        }),
        CoreError::InsufficientData {
            entities,
            fields,
            providers_tried,
        } => json!({
            "entities": entities,
            "fields": fields,
            "providers_tried": providers_tried,
        }),
        CoreError::InvalidRequest(_) | CoreError::Configuration(_) => serde_json::Value::Null,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::warn!(error = %self.0, kind = self.0.kind(), "recommendation request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind(),
            detail: detail_for(&self.0),
        };
        (status, Json(body)).into_response()
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &gridiron_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
