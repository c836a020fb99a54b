//! Subscriber setup for binaries embedding the state layer
//!
//! Library code only emits `tracing` events. The app shell installs one
//! subscriber at startup, either from the `[logging]` table of
//! `config.toml` or from the environment.
//!
//! ```toml
//! [logging]
//! format = "json"
//! level = "libjackpot=debug,info"
//! ```
//!
//! `JACKPOT_LOG_FORMAT` and `JACKPOT_LOG_LEVEL` override the file, and
//! `RUST_LOG` overrides both levels.
//!
//! # Examples
//!
//! ```no_run
//! use libjackpot::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Pretty, "debug".to_string(), false).init();
//!
//! // Or, without a config file
//! libjackpot::logging::init_default();
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain lines without colors
    #[default]
    Text,
    /// One JSON object per line, for log shipping from test devices
    Json,
    /// Colored multi-line output for development
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(name)
    }
}

/// The `[logging]` table of `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `"info"` or `"libjackpot=trace,warn"`
    #[serde(default = "default_level")]
    pub level: String,
    /// Forces `debug` regardless of `level`
    #[serde(default)]
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_level(),
            verbose: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Apply `JACKPOT_LOG_FORMAT` and `JACKPOT_LOG_LEVEL` on top of this
    /// configuration
    ///
    /// An unparseable format is reported on stderr and the configured
    /// format is kept.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var("JACKPOT_LOG_FORMAT") {
            match raw.parse() {
                Ok(format) => self.format = format,
                Err(e) => eprintln!("jackpot: {}", e),
            }
        }
        if let Ok(level) = std::env::var("JACKPOT_LOG_LEVEL") {
            self.level = level;
        }
        self
    }

    fn filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        let directive = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Install the global subscriber
    ///
    /// Returns `false` if a subscriber was already installed, in which case
    /// the existing one stays in place.
    pub fn init(&self) -> bool {
        let filter = self.filter();

        let installed = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true)
                .flatten_event(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_line_number(true)
                .with_file(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init(),
        };

        match installed {
            Ok(()) => {
                tracing::debug!(format = %self.format, level = %self.level, "Logging initialized");
                true
            }
            Err(_) => false,
        }
    }
}

/// Text output at `info`, adjusted by `JACKPOT_LOG_FORMAT` and
/// `JACKPOT_LOG_LEVEL`
pub fn init_default() -> bool {
    LoggingConfig::default().with_env_overrides().init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);

        let result = "verbose".parse::<LogFormat>();
        assert!(result.unwrap_err().contains("Invalid log format: 'verbose'"));
    }

    #[test]
    fn test_logging_table_defaults() {
        let config: LoggingConfig = toml::from_str("").unwrap();
        assert_eq!(config, LoggingConfig::default());

        let config: LoggingConfig = toml::from_str("format = \"json\"\nverbose = true").unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
        assert!(config.verbose);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("JACKPOT_LOG_FORMAT", "pretty");
        std::env::set_var("JACKPOT_LOG_LEVEL", "trace");

        let config = LoggingConfig::default().with_env_overrides();

        std::env::remove_var("JACKPOT_LOG_FORMAT");
        std::env::remove_var("JACKPOT_LOG_LEVEL");

        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.level, "trace");
    }

    #[test]
    #[serial]
    fn test_bad_env_format_keeps_configured_one() {
        std::env::set_var("JACKPOT_LOG_FORMAT", "xml");

        let config = LoggingConfig::new(LogFormat::Json, "warn".to_string(), false)
            .with_env_overrides();

        std::env::remove_var("JACKPOT_LOG_FORMAT");

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn test_second_init_is_rejected() {
        let config = LoggingConfig::new(LogFormat::Text, "warn".to_string(), false);
        config.init();
        assert!(!config.init());
    }
}
