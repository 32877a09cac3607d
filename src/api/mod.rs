//! JSON HTTP API over a shared session.

mod handlers;

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{OpsgraphError, Result};
use crate::session::SharedSession;

#[derive(Clone)]
pub struct AppState {
    pub session: SharedSession,
}

/// Library error rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub OpsgraphError);

impl From<OpsgraphError> for ApiError {
    fn from(err: OpsgraphError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            OpsgraphError::Config(_) | OpsgraphError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            OpsgraphError::NotFound(_) | OpsgraphError::InvalidDeepLink(_) => StatusCode::NOT_FOUND,
            OpsgraphError::ActionExecution { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_router(session: SharedSession, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/entities/:entity_type/:entity_id/related", get(handlers::related))
        .route("/entities/:entity_type/:entity_id/impact", get(handlers::impact))
        .route("/entities/:entity_type/:entity_id/dependencies", get(handlers::dependencies))
        .route("/entities/:entity_type/:entity_id/actions", get(handlers::list_actions))
        .route(
            "/entities/:entity_type/:entity_id/actions/:action_type",
            post(handlers::execute_action),
        )
        .route("/paths", get(handlers::find_path))
        .route("/graph/:entity_type/:entity_id", get(handlers::build_graph))
        .route("/graph/nodes/:node_id/expand", post(handlers::expand_node))
        .route("/graph/nodes/:node_id/collapse", post(handlers::collapse_node))
        .route("/graph/highlight", post(handlers::highlight_path))
        .route("/navigation", get(handlers::navigation_state))
        .route("/navigation/navigate", post(handlers::navigate))
        .route("/navigation/back", post(handlers::go_back))
        .route("/navigation/forward", post(handlers::go_forward))
        .route("/links", post(handlers::generate_link))
        .route("/links/resolve", get(handlers::resolve_link))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
        .with_state(AppState { session })
}

/// Bind `127.0.0.1:<port>` and serve until the process exits.
pub async fn serve(session: SharedSession, port: u16, allowed_origins: &[String]) -> Result<()> {
    let app = create_router(session, allowed_origins);
    let addr = format!("127.0.0.1:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        OpsgraphError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to bind to {}: {}", addr, e),
        ))
    })?;
    log::info!("opsgraph API listening on http://{}", addr);

    axum::serve(listener, app).await.map_err(|e| {
        OpsgraphError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("HTTP server error: {}", e),
        ))
    })?;
    Ok(())
}
