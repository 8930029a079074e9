//! # market-server
//!
//! axum HTTP API for the agent marketplace. Identity arrives in headers from
//! an authenticating proxy; payments go through Stripe when configured.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod sweeper;

pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use extract::{AdminUser, CurrentUser};
pub use routes::build_router;
pub use state::AppState;
