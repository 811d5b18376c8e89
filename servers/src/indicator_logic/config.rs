use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use lib_indicator::ingestors::front_wss::{DEFAULT_SOCKET_URL, FrontStreamConfig};
use lib_indicator::retrieve::plural_api::DEFAULT_API_URL;

const DEFAULT_CONFIG_FILE: &str = "server_indicator.conf";
/// Floor for the reconnect base delay so a dead socket never spins.
const MIN_RECONNECT_BASE_DELAY_MS: u64 = 100;

#[derive(Parser, Deserialize, Debug, Clone, Default)]
#[command(about = "Live front indicator tracker", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[arg(long, env = "SIMPLY_READ_TOKEN", hide_env_values = true, help = "Read token for the Simply Plural API and socket.")]
    pub token: Option<String>,

    #[arg(long, env = "INDICATOR_FIELD_NAME", help = "Name of the custom field holding each member's indicator symbol.")]
    pub field_name: Option<String>,

    #[arg(long, env = "INDICATOR_API_URL", help = "REST base URL (keep the trailing slash).")]
    pub api_url: Option<String>,

    #[arg(long, env = "INDICATOR_SOCKET_URL", help = "WebSocket URL for front change events.")]
    pub socket_url: Option<String>,

    #[arg(long, env = "INDICATOR_KEEPALIVE_SECONDS", help = "Seconds between keep-alive pings.")]
    pub keepalive_seconds: Option<u64>,

    #[arg(long, env = "INDICATOR_CONNECT_TIMEOUT_SECONDS", help = "Seconds allowed for the socket connect and handshake.")]
    pub connect_timeout_seconds: Option<u64>,

    #[arg(long, env = "INDICATOR_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds for socket reconnect attempts.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[arg(long, env = "INDICATOR_RECONNECT_MAX_DELAY_MS", help = "Maximum delay in milliseconds for socket reconnect attempts.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[arg(long, env = "INDICATOR_MAX_RECONNECT_ATTEMPTS", help = "Consecutive failed socket sessions before giving up (unbounded if unset).")]
    pub max_reconnect_attempts: Option<u32>,

    #[arg(long, env = "INDICATOR_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[arg(long, env = "INDICATOR_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[arg(long, env = "INDICATOR_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub token: String,
    pub field_name: String,
    pub api_url: String,
    pub stream: FrontStreamConfig,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl Config {
    fn defaults() -> Config {
        Config {
            api_url: Some(DEFAULT_API_URL.to_string()),
            socket_url: Some(DEFAULT_SOCKET_URL.to_string()),
            keepalive_seconds: Some(10),
            connect_timeout_seconds: Some(10),
            reconnect_base_delay_ms: Some(1000),
            reconnect_max_delay_ms: Some(60000),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            token: other.token.or(self.token),
            field_name: other.field_name.or(self.field_name),
            api_url: other.api_url.or(self.api_url),
            socket_url: other.socket_url.or(self.socket_url),
            keepalive_seconds: other.keepalive_seconds.or(self.keepalive_seconds),
            connect_timeout_seconds: other.connect_timeout_seconds.or(self.connect_timeout_seconds),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            max_reconnect_attempts: other.max_reconnect_attempts.or(self.max_reconnect_attempts),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    fn resolve(self) -> Result<Settings> {
        let token = self
            .token
            .filter(|t| !t.is_empty())
            .context("missing read token (set SIMPLY_READ_TOKEN or --token)")?;
        let field_name = self
            .field_name
            .filter(|f| !f.is_empty())
            .context("missing indicator field name (set INDICATOR_FIELD_NAME or --field-name)")?;

        let mut stream = FrontStreamConfig::new(token.clone());
        if let Some(url) = self.socket_url {
            stream.socket_url = url;
        }
        if let Some(secs) = self.keepalive_seconds {
            stream.keepalive_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = self.connect_timeout_seconds {
            stream.connect_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = self.reconnect_base_delay_ms {
            stream.reconnect_base_delay = Duration::from_millis(ms.max(MIN_RECONNECT_BASE_DELAY_MS));
        }
        if let Some(ms) = self.reconnect_max_delay_ms {
            stream.reconnect_max_delay = Duration::from_millis(ms).max(stream.reconnect_base_delay);
        }
        stream.max_reconnect_attempts = self.max_reconnect_attempts;

        Ok(Settings {
            token,
            field_name,
            api_url: self.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            stream,
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// Defaults, then the JSON config file, then environment variables and CLI arguments.
pub fn load_config() -> Result<Settings> {
    load_config_from(Config::parse())
}

pub fn load_config_from(cli: Config) -> Result<Settings> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();

    if config_file_path.exists() {
        let config_str = fs::read_to_string(&config_file_path)
            .with_context(|| format!("failed to read config file {}", config_file_path.display()))?;
        let file_config: Config = serde_json::from_str(&config_str)
            .with_context(|| format!("failed to parse config file {}", config_file_path.display()))?;
        current_config = current_config.merge(file_config);
    }

    current_config.merge(cli).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli_with_token() -> Config {
        Config {
            token: Some("tok".to_string()),
            config_path: Some(PathBuf::from("/nonexistent/server_indicator.conf")),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_everything_but_credentials() {
        let mut cli = cli_with_token();
        cli.field_name = Some("Sign-off".to_string());

        let settings = load_config_from(cli).unwrap();
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.stream.socket_url, DEFAULT_SOCKET_URL);
        assert_eq!(settings.stream.keepalive_interval, Duration::from_secs(10));
        assert_eq!(settings.stream.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.stream.token, "tok");
        assert_eq!(settings.stream.max_reconnect_attempts, None);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn missing_field_name_is_an_error() {
        let err = load_config_from(cli_with_token()).unwrap_err();
        assert!(err.to_string().contains("INDICATOR_FIELD_NAME"));
    }

    #[test]
    fn file_overrides_defaults_and_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"fieldName":"Sign-off","keepaliveSeconds":5,"logLevel":"debug","maxReconnectAttempts":7}}"#
        )
        .unwrap();

        let mut cli = cli_with_token();
        cli.config_path = Some(file.path().to_path_buf());
        cli.log_level = Some("warn".to_string());

        let settings = load_config_from(cli).unwrap();
        assert_eq!(settings.field_name, "Sign-off");
        assert_eq!(settings.stream.keepalive_interval, Duration::from_secs(5));
        assert_eq!(settings.stream.max_reconnect_attempts, Some(7));
        assert_eq!(settings.log_level, "warn");
    }

    #[test]
    fn zero_delays_and_intervals_are_clamped() {
        let mut cli = cli_with_token();
        cli.field_name = Some("Sign-off".to_string());
        cli.reconnect_base_delay_ms = Some(0);
        cli.reconnect_max_delay_ms = Some(0);
        cli.keepalive_seconds = Some(0);

        let settings = load_config_from(cli).unwrap();
        assert_eq!(settings.stream.reconnect_base_delay, Duration::from_millis(100));
        assert_eq!(settings.stream.reconnect_max_delay, Duration::from_millis(100));
        assert_eq!(settings.stream.keepalive_interval, Duration::from_secs(1));
        assert_eq!(settings.stream.backoff(1), Duration::from_millis(100));
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let mut cli = cli_with_token();
        cli.config_path = Some(file.path().to_path_buf());
        assert!(load_config_from(cli).is_err());
    }

    #[test]
    fn cli_flags_parse() {
        let cli = Config::try_parse_from([
            "server_indicator",
            "--token",
            "abc",
            "--field-name",
            "Sign-off",
            "--max-reconnect-attempts",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.token.as_deref(), Some("abc"));
        assert_eq!(cli.field_name.as_deref(), Some("Sign-off"));
        assert_eq!(cli.max_reconnect_attempts, Some(3));
    }
}
