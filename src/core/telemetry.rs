use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

const FALLBACK_LEVEL: &str = "info";

/// `RUST_LOG` wins; otherwise the configured `EXAM_LOG_LEVEL`.
pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.telemetry().log_level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(fmt::format::FmtSpan::CLOSE);

    let result = if settings.telemetry().json {
        builder.json().with_current_span(true).with_span_list(false).try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|err| anyhow::anyhow!(err.to_string()))
}
