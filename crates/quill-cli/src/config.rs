use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use quill_client::DEFAULT_BASE_URL;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Agent server base URL
    pub server_url: String,

    /// Session to attach to; a new one is created when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Wrap width used when the terminal size is unknown
    pub default_width: usize,

    /// Spinner / retry countdown refresh interval in milliseconds
    pub tick_ms: u64,

    /// Start with every part visible
    pub detailed: bool,

    /// JSON-lines event log (supports $VAR, ${VAR}, ~)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_log: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_BASE_URL.to_string(),
            session_id: None,
            default_width: 80,
            tick_ms: 100,
            detailed: false,
            event_log: None,
        }
    }
}

/// Expand environment variables in a path string
/// Supports: $VAR, ${VAR}, ~
pub fn expand_path(path: &str) -> PathBuf {
    let mut result = path.to_string();

    if result.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            result = format!("{}{}", home.display(), &result[1..]);
        }
    } else if result == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    let Ok(re) = regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?") else {
        return PathBuf::from(result);
    };
    let expanded = re.replace_all(&result, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    });

    PathBuf::from(expanded.to_string())
}

impl Config {
    /// Defaults, then `~/.config/quill/config.toml` when present, then
    /// `QUILL_*` environment variables.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("QUILL_"))
            .extract()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        if config.default_width == 0 {
            anyhow::bail!("default_width must be at least 1");
        }
        if config.tick_ms == 0 {
            anyhow::bail!("tick_ms must be at least 1");
        }
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("quill").join("config.toml"))
    }

    pub fn event_log_path(&self) -> Option<PathBuf> {
        self.event_log.as_deref().map(expand_path)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server_url, "http://127.0.0.1:4096");
        assert_eq!(config.default_width, 80);
        assert_eq!(config.tick_ms, 100);
        assert!(!config.detailed);
        assert!(config.session_id.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            server_url = "http://10.0.0.2:5000"
            session_id = "ses_abc"
            detailed = true
            "#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.server_url, "http://10.0.0.2:5000");
        assert_eq!(config.session_id.as_deref(), Some("ses_abc"));
        assert!(config.detailed);
        assert_eq!(config.default_width, 80);
    }

    #[test]
    fn test_zero_width_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_width = 0").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_to_toml_round_trips_through_loader() {
        let config = Config {
            event_log: Some("/tmp/events.jsonl".into()),
            ..Config::default()
        };
        let text = config.to_toml().unwrap();
        assert!(text.contains("server_url"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{text}").unwrap();
        assert_eq!(Config::load_from(file.path()).unwrap(), config);
    }

    #[test]
    fn test_expand_path() {
        std::env::set_var("QUILL_TEST_DIR", "/var/tmp");
        assert_eq!(
            expand_path("$QUILL_TEST_DIR/events.jsonl"),
            PathBuf::from("/var/tmp/events.jsonl")
        );
        assert_eq!(
            expand_path("${QUILL_TEST_DIR}/x"),
            PathBuf::from("/var/tmp/x")
        );
        assert_eq!(expand_path("$QUILL_UNSET_VAR_42"), PathBuf::from("$QUILL_UNSET_VAR_42"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/log"), home.join("log"));
        }
    }
}
