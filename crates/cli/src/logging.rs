//! Logging setup
//!
//! stdout belongs to the inventory document, so every log line goes to stderr.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log format selector (`json` or anything else for pretty output)
pub const LOG_FORMAT_ENV: &str = "LATITUDE_INVENTORY_LOG_FORMAT";

const DEFAULT_DIRECTIVE: &str = "latitude_inventory=warn";

/// Initialize the global subscriber
///
/// # Environment Variables
///
/// - `RUST_LOG`: filter directives (default: `latitude_inventory=warn`)
/// - `LATITUDE_INVENTORY_LOG_FORMAT`: `json` for JSON lines
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let log_format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "pretty".to_string());

    match log_format.as_str() {
        "json" => {
            // Machine-readable: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            // Interactive: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}
