//! Configuration loading from mcp-client.toml.

use std::path::Path;
use std::time::Duration;

use runtime::{CompletionSettings, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use serde::Deserialize;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "mcp-client.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub backend: BackendConfig,
    pub server: ServerSection,
    pub logging: LoggingConfig,
}

/// Completion service settings.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub model: String,
    pub max_tokens: u32,

    /// Anthropic API key. Takes precedence over `ANTHROPIC_API_KEY`.
    pub api_key: Option<String>,

    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key: None,
            timeout_secs: runtime::COMPLETION_TIMEOUT.as_secs(),
        }
    }
}

/// Tool provider process settings.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub handshake_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: mcp::HANDSHAKE_TIMEOUT.as_secs(),
            request_timeout_secs: mcp::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level used when no `-v`/`-q` flag is given.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given, else [`DEFAULT_CONFIG_FILE`] in `dir` if it
    /// exists, else defaults.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let fallback = dir.join(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            Self::load(fallback)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.model.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.model must not be empty".into()));
        }
        if self.backend.max_tokens == 0 {
            return Err(ConfigError::Invalid("backend.max_tokens must be positive".into()));
        }
        let timeouts = [
            ("backend.timeout_secs", self.backend.timeout_secs),
            ("server.handshake_timeout_secs", self.server.handshake_timeout_secs),
            ("server.request_timeout_secs", self.server.request_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be positive")));
        }
        Ok(())
    }

    /// Resolve the API key: the config value wins, then `env_key` (the value
    /// of `ANTHROPIC_API_KEY` as read by the caller).
    pub fn api_key(&self, env_key: Option<String>) -> Result<String, ConfigError> {
        self.backend
            .api_key
            .clone()
            .or(env_key)
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn completion_settings(&self) -> CompletionSettings {
        CompletionSettings {
            model: self.backend.model.clone(),
            max_tokens: self.backend.max_tokens,
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.server.handshake_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("API key not configured: set ANTHROPIC_API_KEY or backend.api_key")]
    MissingApiKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.backend.model, DEFAULT_MODEL);
        assert_eq!(config.backend.max_tokens, 1000);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn parses_all_sections() {
        let config = Config::parse(
            r#"
            [backend]
            model = "claude-3-5-haiku-20241022"
            max_tokens = 512
            timeout_secs = 30

            [server]
            handshake_timeout_secs = 5
            request_timeout_secs = 120

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.completion_settings(),
            CompletionSettings {
                model: "claude-3-5-haiku-20241022".into(),
                max_tokens: 512,
            }
        );
        assert_eq!(config.backend_timeout(), Duration::from_secs(30));
        assert_eq!(config.handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            Config::parse("[backend]\nmodle = \"x\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::parse("[backend]\nmax_tokens = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[server]\nrequest_timeout_secs = 0"),
            Err(ConfigError::Invalid(ref m)) if m.contains("request_timeout_secs")
        ));
    }

    #[test]
    fn api_key_prefers_config_then_environment() {
        let from_file = Config::parse("[backend]\napi_key = \"sk-file\"").unwrap();
        assert_eq!(from_file.api_key(Some("sk-env".into())).unwrap(), "sk-file");

        let config = Config::default();
        assert_eq!(config.api_key(Some("sk-env".into())).unwrap(), "sk-env");
        assert!(matches!(config.api_key(None), Err(ConfigError::MissingApiKey)));
        assert!(matches!(
            config.api_key(Some("  ".into())),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn discover_prefers_explicit_then_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            Config::discover(None, dir.path()).unwrap().backend.max_tokens,
            DEFAULT_MAX_TOKENS
        );

        let mut local = std::fs::File::create(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        writeln!(local, "[backend]\nmax_tokens = 200").unwrap();
        assert_eq!(
            Config::discover(None, dir.path()).unwrap().backend.max_tokens,
            200
        );

        let mut explicit = tempfile::NamedTempFile::new().unwrap();
        writeln!(explicit, "[backend]\nmax_tokens = 300").unwrap();
        assert_eq!(
            Config::discover(Some(explicit.path()), dir.path())
                .unwrap()
                .backend
                .max_tokens,
            300
        );

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::discover(Some(&missing), dir.path()),
            Err(ConfigError::Io(_))
        ));
    }
}
