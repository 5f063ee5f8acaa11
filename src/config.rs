//! Configuration loader and validator for the air-quality bot.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub channel: Channel,
    #[serde(default)]
    pub tls: Option<Tls>,
    pub feeds: Feeds,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub log_dir: String,
    pub port: u16,
    #[serde(default)]
    pub enable_admin: bool,
}

/// Messaging channel credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    /// Informational; only logged at startup.
    #[serde(default)]
    pub id: String,
    pub secret: String,
    pub token: String,
}

/// PEM files for serving HTTPS directly. Without this section the server
/// speaks plain HTTP and is expected to sit behind a terminating proxy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tls {
    #[serde(default)]
    pub ca: Option<String>,
    pub cert: String,
    pub key: String,
}

/// Upstream open-data feeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feeds {
    pub air_url: String,
    pub weather_url: String,
    pub cwb_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl App {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Append-only log written by the feed updater.
    pub fn update_log_path(&self) -> PathBuf {
        Path::new(&self.log_dir).join("update.log")
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` and `app.log_dir`).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        for dir in [&self.app.data_dir, &self.app.log_dir] {
            if dir.trim().is_empty() {
                continue;
            }
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/airbot.db", self.app.data_dir))
    }

    /// `PORT` in the environment wins over `app.port`.
    pub fn listen_port(&self) -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(self.app.port)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.log_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.log_dir must be non-empty"));
    }
    if cfg.app.port == 0 {
        return Err(ConfigError::Invalid("app.port must be > 0"));
    }

    if cfg.channel.secret.trim().is_empty() {
        return Err(ConfigError::Invalid("channel.secret must be non-empty"));
    }
    if cfg.channel.token.trim().is_empty() {
        return Err(ConfigError::Invalid("channel.token must be non-empty"));
    }

    if let Some(tls) = &cfg.tls {
        if tls.cert.trim().is_empty() {
            return Err(ConfigError::Invalid("tls.cert must be non-empty"));
        }
        if tls.key.trim().is_empty() {
            return Err(ConfigError::Invalid("tls.key must be non-empty"));
        }
    }

    if cfg.feeds.air_url.trim().is_empty() {
        return Err(ConfigError::Invalid("feeds.air_url must be non-empty"));
    }
    if cfg.feeds.weather_url.trim().is_empty() {
        return Err(ConfigError::Invalid("feeds.weather_url must be non-empty"));
    }
    if cfg.feeds.timeout_secs == 0 {
        return Err(ConfigError::Invalid("feeds.timeout_secs must be > 0"));
    }

    Ok(())
}

/// Reference configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  log_dir: "./logs"
  port: 5567
  enable_admin: false

channel:
  id: "YOUR_CHANNEL_ID"
  secret: "YOUR_CHANNEL_SECRET"
  token: "YOUR_CHANNEL_TOKEN"

tls:
  ca: "/etc/ssl/airbot/ca.pem"
  cert: "/etc/ssl/airbot/cert.pem"
  key: "/etc/ssl/airbot/key.pem"

feeds:
  air_url: "https://data.epa.gov.tw/api/v2/aqx_p_432?format=json&limit=1000"
  weather_url: "https://opendata.cwb.gov.tw/api/v1/rest/datastore/O-A0001-001"
  cwb_token: "YOUR_CWB_TOKEN"
  timeout_secs: 30
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.port, 5567);
        assert!(cfg.tls.is_some());
    }

    #[test]
    fn tls_section_is_optional() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.tls = None;
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        validate(&parsed).unwrap();
        assert!(parsed.tls.is_none());
    }

    #[test]
    fn invalid_channel_secret() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.channel.secret = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("channel.secret")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_feeds_and_ports() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.feeds.air_url = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("air_url")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.port = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.feeds.timeout_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        if let Some(tls) = cfg.tls.as_mut() {
            tls.key = "".into();
        }
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_and_log_dirs() {
        let td = tempdir().unwrap();
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = td.path().join("data").to_string_lossy().to_string();
        cfg.app.log_dir = td.path().join("logs").to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(td.path().join("data").exists());
        assert!(td.path().join("logs").exists());
        assert!(cfg.app.update_log_path().ends_with("logs/update.log"));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.channel.id, "YOUR_CHANNEL_ID");
        assert_eq!(cfg.feeds.timeout_secs, 30);
    }

    #[test]
    fn channel_id_is_optional() {
        let yaml = example().replace("  id: \"YOUR_CHANNEL_ID\"\n", "");
        let cfg: Config = serde_yaml::from_str(&yaml).unwrap();
        validate(&cfg).unwrap();
        assert!(cfg.channel.id.is_empty());
    }
}
