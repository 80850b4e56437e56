use std::sync::Mutex;

use slog::Drain;
use slog::{o, Fuse, Logger};
use slog_async::Async;
use slog_json::Json;

/// Builds the root logger: JSON lines on stderr, written from a background
/// thread.
pub fn initialize_logger() -> Logger {
    let drain = Mutex::new(Json::default(std::io::stderr())).map(Fuse);
    let drain = Async::new(drain).build().fuse();

    Logger::root(
        drain,
        o!("version" => env!("CARGO_PKG_VERSION"), "revision" => option_env!("TRAINING_REVISION").unwrap_or("")),
    )
}

/// A logger that drops every record.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
