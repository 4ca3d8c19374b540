//! Tracing setup for the CLI.
//!
//! Console output is filtered by `SHIPWRIGHT_LOG` (falling back to
//! `RUST_LOG`, then `info`). A non-blocking daily-rotated file under the
//! home `logs/` directory captures everything at the same filter.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SHIPWRIGHT_LOG";

const LOG_FILE_PREFIX: &str = "shipwright.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. The returned guard must stay alive for
/// the life of the process or buffered file output is lost.
pub fn init(log_dir: &Path) -> Option<WorkerGuard> {
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let result = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init();

    // A second init (e.g. from tests) keeps the existing subscriber.
    if result.is_err() {
        return None;
    }
    Some(guard)
}
