//! Structured logging init, filter controlled by `DOMINO_LOG` (default
//! `info`), an `EnvFilter`-driven setup without any OTLP export path.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_env("DOMINO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}
