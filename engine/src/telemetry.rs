//! Logging setup
//!
//! Installs one `tracing-subscriber` registry per process. Logs go to stderr
//! so stdout stays free for answers and `--json` output. Fields of the
//! enclosing request span (`request_id`, `channel`) appear on every event.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How log events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human output for terminals.
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl LogFormat {
    /// `AVA_LOG_FORMAT` (`json` or `pretty`) when set, otherwise pretty in
    /// debug builds and JSON in release builds.
    pub fn from_env() -> Self {
        Self::parse(std::env::var("AVA_LOG_FORMAT").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => Self::Json,
            Some("pretty") | Some("text") => Self::Pretty,
            _ if cfg!(debug_assertions) => Self::Pretty,
            _ => Self::Json,
        }
    }
}

/// Filter used when `RUST_LOG` is unset: our crates at `level`, everything
/// else (reqwest, hyper, rustls) at warn.
fn default_directives(level: &str) -> String {
    format!("warn,ava_engine={level},ava={level},sdk={level}")
}

/// Installs the global subscriber.
///
/// Priority: `RUST_LOG` > `level`. Only the first call in a process takes
/// effect.
pub fn init(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Subscriber already installed, keeping it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_format_wins() {
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Pretty);
    }

    #[test]
    fn test_unknown_format_follows_build_profile() {
        let expected = if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        };
        assert_eq!(LogFormat::parse(None), expected);
        assert_eq!(LogFormat::parse(Some("xml")), expected);
    }

    #[test]
    fn test_default_directives_quiet_dependencies() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("ava_engine=debug"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
