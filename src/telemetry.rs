//! Structured logging/subscriber initialization.
//!
//! Mirrors the teacher's tracing setup pattern (an `EnvFilter` driven by a
//! configured level string, plus a switchable JSON/compact `fmt` layer) but
//! drops the teacher's OTLP/Jaeger/Zipkin exporter stack — this deployment has
//! no collector to ship spans to, so only the subscriber half survives.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;

/// Install the global `tracing` subscriber per the configured level and format.
///
/// Safe to call once at startup; a second call is a logic error elsewhere in the
/// program, not something this function guards against (matching the teacher's
/// own `env_logger::init()` call site, which the same constraint applies to).
pub fn init(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt().with_env_filter(filter).with_target(true);

    if config.debug.log_format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
