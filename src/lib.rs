pub mod assist;
pub mod collection;
pub mod config;
pub mod csv;
pub mod errors;
pub mod models;
pub mod record;
pub mod screener;
pub mod shelf;
pub mod store;
pub mod structured;
pub mod theme;
pub mod view;

pub use crate::collection::CollectionController;
pub use crate::config::ShelfConfig;
pub use crate::errors::{AppError, AppResult};
pub use crate::record::Record;
pub use crate::shelf::Shelf;
pub use crate::store::{Loaded, PersistentStore};
pub use crate::view::{derive_view, SortDirection, ViewQuery};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the global subscriber writing to `<log_dir>/shelf.log`, rolled
/// daily. `RUST_LOG` takes precedence over `level`.
pub fn init_tracing(log_dir: &Path, level: &str, json: bool) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "shelf.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(non_blocking);

    if json {
        builder.json().try_init().map_err(|error| error.to_string())
    } else {
        builder.try_init().map_err(|error| error.to_string())
    }
}

pub fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}
