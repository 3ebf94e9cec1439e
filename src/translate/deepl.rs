//! DeepL translation client.
//!
//! # Feature Gate
//!
//! The HTTP client requires the `deepl` feature; without it this module
//! still exports the config type so the rest of the crate compiles.

use crate::defaults;
use std::time::Duration;

#[cfg(feature = "deepl")]
use crate::error::{LivecapError, Result};
#[cfg(feature = "deepl")]
use crate::translate::Translator;

/// DeepL free-tier endpoint.
pub const DEEPL_ENDPOINT: &str = "https://api-free.deepl.com/v2/translate";

/// Configuration for the DeepL client.
#[derive(Debug, Clone)]
pub struct DeepLConfig {
    pub api_key: String,
    /// Per-request timeout; a hung service must never stall the pipeline
    /// longer than this.
    pub timeout: Duration,
}

impl Default for DeepLConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            timeout: Duration::from_millis(defaults::TRANSLATION_TIMEOUT_MS),
        }
    }
}

#[cfg(feature = "deepl")]
#[derive(serde::Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[cfg(feature = "deepl")]
#[derive(serde::Deserialize)]
struct DeepLTranslation {
    text: String,
}

/// Blocking DeepL client, shared across the translation worker pool.
#[cfg(feature = "deepl")]
pub struct DeepLTranslator {
    client: reqwest::blocking::Client,
    config: DeepLConfig,
}

#[cfg(feature = "deepl")]
impl DeepLTranslator {
    pub fn new(config: DeepLConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(LivecapError::TranslationUnconfigured {
                message: "DeepL API key missing; set translation.api_key or LIVECAP_DEEPL_KEY"
                    .to_string(),
            });
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LivecapError::Translation {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, config })
    }
}

#[cfg(feature = "deepl")]
impl Translator for DeepLTranslator {
    fn translate(&self, text: &str, context: &[String], target_lang: &str) -> Result<String> {
        let mut form = vec![
            ("text", text.to_string()),
            ("target_lang", target_lang.to_string()),
        ];
        if !context.is_empty() {
            form.push(("context", context.join(" ")));
        }

        let response = self
            .client
            .post(DEEPL_ENDPOINT)
            .header(
                "Authorization",
                format!("DeepL-Auth-Key {}", self.config.api_key),
            )
            .form(&form)
            .send()
            .map_err(|e| LivecapError::Translation {
                message: format!("DeepL request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(LivecapError::Translation {
                message: format!("DeepL returned HTTP {}", response.status()),
            });
        }

        let body: DeepLResponse = response.json().map_err(|e| LivecapError::Translation {
            message: format!("Invalid DeepL response: {}", e),
        })?;

        body.translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| LivecapError::Translation {
                message: "DeepL response contained no translations".to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "deepl"
    }
}

/// Placeholder without the `deepl` feature; constructing it always fails.
#[cfg(not(feature = "deepl"))]
#[derive(Debug)]
pub struct DeepLTranslator {
    _config: DeepLConfig,
}

#[cfg(not(feature = "deepl"))]
impl DeepLTranslator {
    pub fn new(_config: DeepLConfig) -> crate::error::Result<Self> {
        Err(crate::error::LivecapError::TranslationUnconfigured {
            message: "Translation requires the `deepl` feature".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deepl_config_default_timeout() {
        let config = DeepLConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(10_000));
        assert!(config.api_key.is_empty());
    }

    #[cfg(feature = "deepl")]
    #[test]
    fn test_deepl_translator_requires_key() {
        let result = DeepLTranslator::new(DeepLConfig::default());
        assert!(matches!(
            result,
            Err(LivecapError::TranslationUnconfigured { .. })
        ));
    }

    #[cfg(feature = "deepl")]
    #[test]
    fn test_deepl_response_parsing() {
        let body = r#"{"translations":[{"detected_source_language":"EN","text":"Hallo Welt"}]}"#;
        let parsed: DeepLResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.translations[0].text, "Hallo Welt");
    }
}
