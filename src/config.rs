use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub speech: SpeechConfig,
    pub audio: AudioConfig,
}

/// Interview backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
}

/// Question read-aloud configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub language: String,
    pub rate: u32,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: defaults::DEFAULT_SERVER_URL.to_string(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            rate: defaults::SPEECH_RATE,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { device: None }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e.context(format!("failed to load config from {}", path.display())))
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VIVAPREP_SERVER_URL → server.url
    /// - VIVAPREP_LANGUAGE → speech.language
    /// - VIVAPREP_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("VIVAPREP_SERVER_URL")
            && !url.is_empty()
        {
            self.server.url = url;
        }

        if let Ok(language) = std::env::var("VIVAPREP_LANGUAGE")
            && !language.is_empty()
        {
            self.speech.language = language;
        }

        if let Ok(device) = std::env::var("VIVAPREP_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/vivaprep/config.toml on Linux
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not determine the config directory"))?;
        Ok(base.join("vivaprep").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_vivaprep_env() {
        remove_env("VIVAPREP_SERVER_URL");
        remove_env("VIVAPREP_LANGUAGE");
        remove_env("VIVAPREP_AUDIO_DEVICE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.server.url, "http://127.0.0.1:5000");

        assert!(config.speech.enabled);
        assert_eq!(config.speech.language, "en");
        assert_eq!(config.speech.rate, 160);

        assert_eq!(config.audio.device, None);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [server]
            url = "https://interview.example.com"

            [speech]
            enabled = false
            language = "de"
            rate = 180

            [audio]
            device = "hw:0,0"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.server.url, "https://interview.example.com");
        assert!(!config.speech.enabled);
        assert_eq!(config.speech.language, "de");
        assert_eq!(config.speech.rate, 180);
        assert_eq!(config.audio.device, Some("hw:0,0".to_string()));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [server]
            url = "http://10.0.0.2:5000"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        // Only the server URL should be overridden
        assert_eq!(config.server.url, "http://10.0.0.2:5000");

        // Everything else should be defaults
        assert!(config.speech.enabled);
        assert_eq!(config.speech.language, "en");
        assert_eq!(config.speech.rate, 160);
        assert_eq!(config.audio.device, None);
    }

    #[test]
    fn test_env_override_server_url() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vivaprep_env();

        set_env("VIVAPREP_SERVER_URL", "http://192.168.1.5:5000");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.server.url, "http://192.168.1.5:5000");
        assert_eq!(config.speech.language, "en"); // Not overridden

        clear_vivaprep_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vivaprep_env();

        set_env("VIVAPREP_SERVER_URL", "http://host:5000");
        set_env("VIVAPREP_LANGUAGE", "fr");
        set_env("VIVAPREP_AUDIO_DEVICE", "pulse");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.server.url, "http://host:5000");
        assert_eq!(config.speech.language, "fr");
        assert_eq!(config.audio.device, Some("pulse".to_string()));

        clear_vivaprep_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vivaprep_env();

        set_env("VIVAPREP_LANGUAGE", "");
        let config = Config::default().with_env_overrides();

        // Empty string should not override default
        assert_eq!(config.speech.language, "en");

        clear_vivaprep_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [server
            url = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());

        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_vivaprep_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let invalid_toml = r#"
            [server
            url = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        // Invalid TOML must not silently fall back to defaults
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }
}
