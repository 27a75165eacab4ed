//! Tracing setup (§10). Deliberately lighter than a full OTLP exporter: a
//! single `tracing-subscriber` registry with an env-driven filter and a
//! choice of human-readable or JSON formatting, matching what ships without
//! the `OTEL_EXPORTER_OTLP_ENDPOINT` collector wiring.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

pub fn init(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vela_controller=info,vela_reconciler=info,warn"));

    let registry = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);

    if log_format == "json" {
        registry.json().init();
    } else {
        registry.init();
    }
}
