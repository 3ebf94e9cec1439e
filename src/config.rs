use crate::defaults;
use crate::error::{LivecapError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Which physical inputs feed the caption pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Microphone only.
    Mic,
    /// System-output loopback only.
    #[default]
    System,
    /// Microphone and loopback summed sample-wise.
    Mixed,
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceMode::Mic => write!(f, "mic"),
            SourceMode::System => write!(f, "system"),
            SourceMode::Mixed => write!(f, "mixed"),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub translation: TranslationConfig,
    pub display: DisplayConfig,
}

/// Audio capture and segmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub mode: SourceMode,
    pub mic_device: Option<String>,
    pub system_device: Option<String>,
    pub sample_rate: u32,
    pub silence_threshold: f32,
    pub debounce_ms: u32,
    pub pre_roll_ms: u32,
    pub post_roll_ms: u32,
    pub max_segment_ms: u32,
    pub stall_timeout_ms: u64,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub model: String,
    pub language: String,
    pub concurrency: usize,
    pub max_retries: u32,
}

/// Translation service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    pub enabled: bool,
    pub target_language: String,
    pub api_key: Option<String>,
    pub context_sentences: usize,
    pub concurrency: usize,
    pub max_retries: u32,
    pub timeout_ms: u64,
}

/// Caption display configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub word_buffer: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::default(),
            mic_device: None,
            system_device: None,
            sample_rate: defaults::SAMPLE_RATE,
            silence_threshold: defaults::SILENCE_THRESHOLD,
            debounce_ms: defaults::DEBOUNCE_MS,
            pre_roll_ms: defaults::PRE_ROLL_MS,
            post_roll_ms: defaults::POST_ROLL_MS,
            max_segment_ms: defaults::MAX_SEGMENT_MS,
            stall_timeout_ms: defaults::SOURCE_STALL_MS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            concurrency: defaults::STAGE_CONCURRENCY,
            max_retries: defaults::MAX_RETRIES,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_language: defaults::DEFAULT_TARGET_LANGUAGE.to_string(),
            api_key: None,
            context_sentences: defaults::CONTEXT_SENTENCES,
            concurrency: defaults::STAGE_CONCURRENCY,
            max_retries: defaults::MAX_RETRIES,
            timeout_ms: defaults::TRANSLATION_TIMEOUT_MS,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            word_buffer: defaults::WORD_BUFFER,
        }
    }
}

/// Subset of the configuration that may change while the pipeline runs.
///
/// Stages hold a [`HotConfigHandle`] and read it at frame or segment
/// boundaries, never mid-decision. Writers replace whole fields; the snapshot
/// a stage reads is always internally consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct HotConfig {
    pub mode: SourceMode,
    pub silence_threshold: f32,
    pub debounce_ms: u32,
    pub language: String,
    pub translation_enabled: bool,
}

/// Shared handle to the hot-reloadable configuration subset.
pub type HotConfigHandle = Arc<RwLock<HotConfig>>;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LivecapError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                LivecapError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, falling back to defaults only when the
    /// file does not exist. Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(LivecapError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LIVECAP_MODEL → stt.model
    /// - LIVECAP_LANGUAGE → stt.language
    /// - LIVECAP_MIC_DEVICE → audio.mic_device
    /// - LIVECAP_SYSTEM_DEVICE → audio.system_device
    /// - LIVECAP_DEEPL_KEY → translation.api_key
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("LIVECAP_MODEL")
            && !model.is_empty()
        {
            self.stt.model = model;
        }

        if let Ok(language) = std::env::var("LIVECAP_LANGUAGE")
            && !language.is_empty()
        {
            self.stt.language = language;
        }

        if let Ok(device) = std::env::var("LIVECAP_MIC_DEVICE")
            && !device.is_empty()
        {
            self.audio.mic_device = Some(device);
        }

        if let Ok(device) = std::env::var("LIVECAP_SYSTEM_DEVICE")
            && !device.is_empty()
        {
            self.audio.system_device = Some(device);
        }

        if let Ok(key) = std::env::var("LIVECAP_DEEPL_KEY")
            && !key.is_empty()
        {
            self.translation.api_key = Some(key);
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.audio.silence_threshold < 0.0 {
            return Err(LivecapError::ConfigInvalidValue {
                key: "audio.silence_threshold".to_string(),
                message: "must be non-negative".to_string(),
            });
        }
        if self.display.word_buffer == 0 {
            return Err(LivecapError::ConfigInvalidValue {
                key: "display.word_buffer".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.audio.max_segment_ms == 0 {
            return Err(LivecapError::ConfigInvalidValue {
                key: "audio.max_segment_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.stt.concurrency == 0 || self.translation.concurrency == 0 {
            return Err(LivecapError::ConfigInvalidValue {
                key: "concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Build the shared hot-reloadable snapshot from this configuration.
    pub fn hot_handle(&self) -> HotConfigHandle {
        Arc::new(RwLock::new(HotConfig {
            mode: self.audio.mode,
            silence_threshold: self.audio.silence_threshold,
            debounce_ms: self.audio.debounce_ms,
            language: self.stt.language.clone(),
            translation_enabled: self.translation.enabled,
        }))
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/livecap/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> std::path::PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("livecap")
            .join("config.toml")
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

    fn clear_livecap_env() {
        remove_env("LIVECAP_MODEL");
        remove_env("LIVECAP_LANGUAGE");
        remove_env("LIVECAP_MIC_DEVICE");
        remove_env("LIVECAP_SYSTEM_DEVICE");
        remove_env("LIVECAP_DEEPL_KEY");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.mode, SourceMode::System);
        assert_eq!(config.audio.mic_device, None);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.silence_threshold, 0.02);
        assert_eq!(config.audio.debounce_ms, 700);
        assert_eq!(config.audio.max_segment_ms, 10_000);

        assert_eq!(config.stt.model, "base");
        assert_eq!(config.stt.language, "auto");
        assert_eq!(config.stt.concurrency, 1);

        assert!(!config.translation.enabled);
        assert_eq!(config.translation.target_language, "EN");
        assert_eq!(config.translation.context_sentences, 3);

        assert_eq!(config.display.word_buffer, 40);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [audio]
            mode = "mixed"
            mic_device = "pipewire"
            system_device = "monitor"
            silence_threshold = 0.003
            debounce_ms = 500

            [stt]
            model = "small"
            language = "ja"

            [translation]
            enabled = true
            target_language = "ZH"
            api_key = "test-key"

            [display]
            word_buffer = 60
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.mode, SourceMode::Mixed);
        assert_eq!(config.audio.mic_device, Some("pipewire".to_string()));
        assert_eq!(config.audio.system_device, Some("monitor".to_string()));
        assert_eq!(config.audio.silence_threshold, 0.003);
        assert_eq!(config.audio.debounce_ms, 500);
        // Unspecified fields keep defaults
        assert_eq!(config.audio.max_segment_ms, 10_000);

        assert_eq!(config.stt.model, "small");
        assert_eq!(config.stt.language, "ja");

        assert!(config.translation.enabled);
        assert_eq!(config.translation.target_language, "ZH");
        assert_eq!(config.translation.api_key, Some("test-key".to_string()));

        assert_eq!(config.display.word_buffer, 60);
    }

    #[test]
    fn test_load_missing_file_is_config_not_found() {
        let result = Config::load(Path::new("/nonexistent/livecap.toml"));
        assert!(matches!(
            result,
            Err(LivecapError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/livecap.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_invalid_toml_is_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"this is not [valid toml").unwrap();

        let result = Config::load_or_default(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_negative_threshold() {
        let config = Config {
            audio: AudioConfig {
                silence_threshold: -0.1,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LivecapError::ConfigInvalidValue { ref key, .. }) if key == "audio.silence_threshold"
        ));
    }

    #[test]
    fn test_validate_accepts_zero_threshold() {
        // Threshold zero means "everything is speech" — degraded but legal.
        let config = Config {
            audio: AudioConfig {
                silence_threshold: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_word_buffer() {
        let config = Config {
            display: DisplayConfig { word_buffer: 0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_livecap_env();

        set_env("LIVECAP_MODEL", "large-v3");
        set_env("LIVECAP_LANGUAGE", "de");
        set_env("LIVECAP_MIC_DEVICE", "usb-mic");
        set_env("LIVECAP_DEEPL_KEY", "secret");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.stt.model, "large-v3");
        assert_eq!(config.stt.language, "de");
        assert_eq!(config.audio.mic_device, Some("usb-mic".to_string()));
        assert_eq!(config.translation.api_key, Some("secret".to_string()));

        clear_livecap_env();
    }

    #[test]
    fn test_env_overrides_ignore_empty() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_livecap_env();

        set_env("LIVECAP_MODEL", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.stt.model, "base");

        clear_livecap_env();
    }

    #[test]
    fn test_hot_handle_snapshots_config() {
        let config = Config {
            translation: TranslationConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let hot = config.hot_handle();
        let snapshot = hot.read().unwrap();
        assert_eq!(snapshot.mode, SourceMode::System);
        assert_eq!(snapshot.silence_threshold, 0.02);
        assert_eq!(snapshot.debounce_ms, 700);
        assert_eq!(snapshot.language, "auto");
        assert!(snapshot.translation_enabled);
    }

    #[test]
    fn test_hot_handle_is_shared() {
        let hot = Config::default().hot_handle();
        let clone = hot.clone();
        clone.write().unwrap().silence_threshold = 0.1;
        assert_eq!(hot.read().unwrap().silence_threshold, 0.1);
    }

    #[test]
    fn test_source_mode_display() {
        assert_eq!(SourceMode::Mic.to_string(), "mic");
        assert_eq!(SourceMode::System.to_string(), "system");
        assert_eq!(SourceMode::Mixed.to_string(), "mixed");
    }

    #[test]
    fn test_source_mode_round_trips_through_toml() {
        let config = Config {
            audio: AudioConfig {
                mode: SourceMode::Mixed,
                ..Default::default()
            },
            ..Default::default()
        };
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.audio.mode, SourceMode::Mixed);
    }
}
