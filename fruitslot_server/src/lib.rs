pub mod config;
pub mod db;
pub mod routes;

pub use crate::config::{init_tracing, ServerConfig};
pub use crate::db::{GameParams, SqliteStore};
pub use crate::routes::{router, AppState, HttpError, InFlight};
