//! Logging utilities for the runtime configuration components.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize tracing with sensible defaults.
///
/// Uses the RUST_LOG environment variable to control log levels.
/// Default level is INFO.
pub fn init() {
    init_with("info", false);
}

/// Initialize tracing with JSON formatting (useful for structured logging).
pub fn init_json() {
    init_with("info", true);
}

/// Initialize tracing with a configured default level and output format.
///
/// RUST_LOG still wins over `level` when set.
pub fn init_with(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Whether a configured format string asks for JSON output.
pub fn wants_json(format: Option<&str>) -> bool {
    matches!(format.map(str::to_ascii_lowercase).as_deref(), Some("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wants_json() {
        assert!(wants_json(Some("json")));
        assert!(wants_json(Some("JSON")));
        assert!(!wants_json(Some("text")));
        assert!(!wants_json(None));
    }
}
