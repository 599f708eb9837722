//! Runtime configuration for the hearth binary.
//!
//! Settings come from three layers, lowest priority first: built-in
//! defaults, an optional TOML file (`HEARTH_CONFIG` path, else
//! `config/default.toml`), and `HEARTH_*` environment variable overrides.
//! `.env` files work too because `main` runs dotenvy before loading.

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use url::Url;

/// Environment variable naming the TOML file to load. When set, the file
/// must exist; the default path is optional.
const CONFIG_PATH_VAR: &str = "HEARTH_CONFIG";

/// Default TOML location.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ---------------------------------------------------------------------------
// Settings types
// ---------------------------------------------------------------------------

/// Classification service configuration (`[classifier]` section).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub base_url: String,

    /// Bearer token. Deliberately has no default: it must come from the
    /// file, the environment, or a `.env` file.
    pub api_key: String,

    /// Model identifier.
    pub model: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.siliconflow.cn/v1".to_string(),
            api_key: String::new(),
            model: "deepseek-ai/DeepSeek-V3.2-Exp".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Top-level settings for the assistant.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Capability server endpoint (JSON-RPC over HTTP).
    pub capability_url: String,

    /// Budget for one workflow node run, in seconds.
    pub turn_timeout_secs: u64,

    /// City used when a weather question names none.
    pub default_city: String,

    /// Classification service configuration.
    pub classifier: ClassifierSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            capability_url: "http://127.0.0.1:8001/mcp".to_string(),
            turn_timeout_secs: 20,
            default_city: "东莞".to_string(),
            classifier: ClassifierSettings::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Settings {
    /// Load, override, and validate the settings.
    pub fn load() -> Result<Self> {
        let (path, required) = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => (path, true),
            Err(_) => (DEFAULT_CONFIG_PATH.to_string(), false),
        };

        let mut settings = Self::from_file(Path::new(&path), required)?;
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    fn from_file(path: &Path, required: bool) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) if !required => return Ok(Self::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file {}", path.display()));
            }
        };

        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = env::var("HEARTH_CAPABILITY_URL") {
            self.capability_url = v;
        }
        if let Ok(v) = env::var("HEARTH_TURN_TIMEOUT_SECS") {
            self.turn_timeout_secs = v
                .parse()
                .context("HEARTH_TURN_TIMEOUT_SECS must be an integer")?;
        }
        if let Ok(v) = env::var("HEARTH_DEFAULT_CITY") {
            self.default_city = v;
        }
        if let Ok(v) = env::var("HEARTH_CLASSIFIER_BASE_URL") {
            self.classifier.base_url = v;
        }
        if let Ok(v) = env::var("HEARTH_CLASSIFIER_API_KEY") {
            self.classifier.api_key = v;
        }
        if let Ok(v) = env::var("HEARTH_CLASSIFIER_MODEL") {
            self.classifier.model = v;
        }
        if let Ok(v) = env::var("HEARTH_CLASSIFIER_TIMEOUT_SECS") {
            self.classifier.timeout_secs = v
                .parse()
                .context("HEARTH_CLASSIFIER_TIMEOUT_SECS must be an integer")?;
        }
        Ok(())
    }

    /// Reject configurations the assistant cannot start with.
    fn validate(&self) -> Result<()> {
        Url::parse(&self.capability_url).with_context(|| {
            format!("capability_url `{}` is not a valid URL", self.capability_url)
        })?;

        if self.classifier.api_key.trim().is_empty() {
            bail!(
                "classifier api key is not set \
                 (HEARTH_CLASSIFIER_API_KEY or [classifier] api_key)"
            );
        }
        if self.classifier.base_url.trim().is_empty() {
            bail!("classifier base_url must not be empty");
        }
        if self.classifier.model.trim().is_empty() {
            bail!("classifier model must not be empty");
        }
        if self.turn_timeout_secs == 0 {
            bail!("turn_timeout_secs must be positive");
        }
        if self.classifier.timeout_secs == 0 {
            bail!("classifier timeout_secs must be positive");
        }
        if self.default_city.trim().is_empty() {
            bail!("default_city must not be empty");
        }
        Ok(())
    }

    /// Parsed capability endpoint.
    pub fn capability_endpoint(&self) -> Result<Url> {
        Url::parse(&self.capability_url).context("capability_url is not a valid URL")
    }

    /// Per-turn node budget.
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    /// Classification request timeout.
    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier.timeout_secs)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_settings() -> Settings {
        let mut settings = Settings::default();
        settings.classifier.api_key = "sk-test".to_string();
        settings
    }

    #[test]
    fn missing_optional_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");

        let settings = Settings::from_file(&path, false).unwrap();

        assert_eq!(settings.default_city, "东莞");
        assert_eq!(settings.turn_timeout_secs, 20);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");

        assert!(Settings::from_file(&path, true).is_err());
    }

    #[test]
    fn parses_full_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hearth.toml");
        std::fs::write(
            &path,
            r#"
capability_url = "http://10.0.0.5:9000/mcp"
turn_timeout_secs = 8
default_city = "广州"

[classifier]
base_url = "https://llm.internal/v1"
api_key = "sk-test"
model = "qwen-plus"
timeout_secs = 5
"#,
        )
        .unwrap();

        let settings = Settings::from_file(&path, true).unwrap();

        assert_eq!(settings.capability_url, "http://10.0.0.5:9000/mcp");
        assert_eq!(settings.turn_timeout_secs, 8);
        assert_eq!(settings.default_city, "广州");
        assert_eq!(settings.classifier.model, "qwen-plus");
        assert_eq!(settings.classifier_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_toml_keeps_defaults_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hearth.toml");
        std::fs::write(&path, "default_city = \"深圳\"\n").unwrap();

        let settings = Settings::from_file(&path, true).unwrap();

        assert_eq!(settings.default_city, "深圳");
        assert_eq!(settings.capability_url, "http://127.0.0.1:8001/mcp");
    }

    #[test]
    fn validate_rejects_missing_api_key() {
        let settings = Settings::default();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("api key"));
    }

    #[test]
    fn validate_rejects_bad_capability_url() {
        let mut settings = valid_settings();
        settings.capability_url = "not a url".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let mut settings = valid_settings();
        settings.turn_timeout_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = valid_settings();
        settings.classifier.timeout_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_accepts_complete_settings() {
        assert!(valid_settings().validate().is_ok());
    }
}
