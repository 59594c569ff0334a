//! HTTP API handlers for pairpick-web

pub mod buildinfo;
pub mod error;
pub mod health;
pub mod session;
pub mod ui;

pub use buildinfo::{get_build_info, BuildInfo};
pub use error::{ApiError, ApiResult};
pub use health::health_routes;
pub use session::session_routes;
pub use ui::ui_routes;
