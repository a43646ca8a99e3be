//! # Observability
//!
//! - `metrics`: Prometheus metrics collection
//! - [`init_tracing`]: log subscriber setup

pub mod metrics;

pub use metrics::*;

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `log_level` applies to this crate and
/// `warn` to everything else.
pub fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,gitops_registration={log_level},gitops_registration_service={log_level},tower_http={log_level}"
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Text => builder.try_init(),
    };
    if let Err(e) = result {
        eprintln!("Tracing subscriber already installed: {e}");
    }
}
