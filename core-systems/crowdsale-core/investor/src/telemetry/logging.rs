//! Logging bootstrap.
//!
//! - Text or JSON output, RFC3339 (UTC) timestamps.
//! - EnvFilter: explicit directive, else `RUST_LOG`, else `info`.
//! - `log` records (emitted by the ethers transport) are bridged into `tracing`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::Telemetry;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info,crowdsale_launchpad=debug".
    pub env_filter: Option<String>,
    pub json: bool,
    /// Print target, file and line.
    pub with_targets_and_lines: bool,
    /// ANSI colours; text output only.
    pub ansi: bool,
}

/// Held for the life of the process.
pub struct LoggingGuard {
    _private: (),
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { env_filter: None, json: false, with_targets_and_lines: true, ansi: true }
    }
}

impl From<&Telemetry> for LoggingConfig {
    fn from(t: &Telemetry) -> Self {
        Self { env_filter: t.log_filter.clone(), json: t.json, ansi: !t.json, ..Self::default() }
    }
}

/// Resolves the filter: explicit directive first, then `RUST_LOG`, then `info`.
/// A directive that does not parse falls back to `info`.
pub fn build_filter(directive: Option<&str>) -> EnvFilter {
    match directive {
        Some(s) => EnvFilter::try_new(s).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Installs the `log` bridge and the global subscriber. Call once at process
/// start. The subscriber is built without tracing-subscriber's own `log`
/// integration, so the bridge is installed here exactly once.
pub fn init(cfg: LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let _ = tracing_log::LogTracer::init();

    let filter = build_filter(cfg.env_filter.as_deref());

    let fmt_layer = {
        let base = fmt::layer()
            .with_target(cfg.with_targets_and_lines)
            .with_file(cfg.with_targets_and_lines)
            .with_line_number(cfg.with_targets_and_lines)
            .with_timer(fmt::time::UtcTime::rfc_3339());

        if cfg.json {
            base.json()
                .with_ansi(false)
                .with_current_span(true)
                .with_span_list(true)
                .flatten_event(true)
                .boxed()
        } else {
            base.with_ansi(cfg.ansi).boxed()
        }
    };

    Registry::default().with(filter).with(fmt_layer).try_init()?;

    Ok(LoggingGuard { _private: () })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_follows_telemetry_section() {
        let t = Telemetry { log_filter: Some("debug".into()), json: true };
        let cfg = LoggingConfig::from(&t);
        assert_eq!(cfg.env_filter.as_deref(), Some("debug"));
        assert!(cfg.json);
        assert!(!cfg.ansi);
    }

    #[test]
    fn bad_directive_falls_back() {
        assert_eq!(build_filter(Some("crowdsale=loudest")).to_string(), "info");
        assert_eq!(build_filter(Some("warn")).to_string(), "warn");
    }

    #[test]
    fn init_text() {
        let _guard = init(LoggingConfig { env_filter: Some("debug".into()), ansi: false, ..LoggingConfig::default() })
            .expect("init");
        tracing::info!(target: "crowdsale_investor::test", "hello from test");
        // `log` records reach the subscriber through the bridge installed above
        assert!(tracing_log::log::max_level() >= tracing_log::log::LevelFilter::Info);
        tracing_log::log::info!("hello through log");
    }
}
