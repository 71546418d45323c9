pub mod app;
pub mod app_state;
pub mod config;
pub mod drink_handlers;
pub mod drinks;
pub mod metrics;

pub use common_http_errors::{ApiError, ApiResult};
