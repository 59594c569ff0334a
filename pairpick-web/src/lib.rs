//! pairpick-web library - pairwise preference annotation service
//!
//! Serves a form showing a prompt and two candidate outputs, collects the
//! worker's preference, appends finished sessions to a JSON Lines log, and
//! syncs that log to a remote dataset repository in the background.

use axum::Router;
use tower_http::trace::TraceLayer;

pub mod annotator;
pub mod api;
pub mod context;
pub mod corpus;
pub mod counts;
pub mod finalizer;
pub mod judgment_log;
pub mod sampler;
pub mod session;
pub mod sync;

pub use crate::api::{ApiError, ApiResult};
pub use crate::context::AppContext;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Session coordinator (sampler + finalizer)
    pub annotator: annotator::Annotator,
}

impl AppState {
    pub fn new(annotator: annotator::Annotator) -> Self {
        Self { annotator }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ui_routes())
        .merge(api::health_routes())
        .merge(api::session_routes())
        .route("/api/buildinfo", axum::routing::get(api::get_build_info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
