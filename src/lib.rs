pub mod app;
pub mod auth;
pub mod cron_check;
pub mod db;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod state;
pub mod utils;

pub use app::create_app;
pub use auth::CredentialResolver;
pub use db::Database;
pub use state::AppState;
pub use utils::{ApiError, ApiResult, Config};
