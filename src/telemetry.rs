use crate::config::AppConfig;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

const DEFAULT_FILTER: &str = "info,tower_http=warn";

fn env_filter(config: &AppConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| config.log_filter.as_deref().and_then(|f| EnvFilter::try_new(f).ok()))
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber once; later calls are no-ops.
pub fn init_tracing(config: &AppConfig) {
    let _ = TRACING_INIT.get_or_init(|| {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(env_filter(config))
            .with_timer(UtcTime::rfc_3339())
            .with_target(true);
        let result = if config.log_json {
            tracing::subscriber::set_global_default(
                builder
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .finish(),
            )
        } else {
            tracing::subscriber::set_global_default(builder.finish())
        };
        if result.is_err() {
            eprintln!("tracing subscriber already installed; keeping the existing one");
        }
    });
}
