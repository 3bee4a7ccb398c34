//! Configuration types
//!
//! Translator configuration: which model to fetch, how to sample, and which prompts to use.

use serde::{Deserialize, Serialize};

use crate::inference::engine::GenerationParams;
use crate::types::model::{default_model, ModelDefinition};

/// Placeholder in [`TranslatorConfig::user_template`] replaced by the target language
pub const TARGET_LANG_PLACEHOLDER: &str = "{TARGET_LANG}";
/// Placeholder in [`TranslatorConfig::user_template`] replaced by the text to translate
pub const SOURCE_TEXT_PLACEHOLDER: &str = "{SOURCE_TEXT}";

pub fn default_system_prompt() -> String {
    "You are a professional translator. Output only the translated text. \
Keep meaning, tone, numbers, names, emoji, and punctuation. Do not explain. \
If source and target language are the same, return the input unchanged."
        .to_string()
}

pub fn default_user_template() -> String {
    format!("Translate to {TARGET_LANG_PLACEHOLDER}:\n{SOURCE_TEXT_PLACEHOLDER}")
}

/// Translator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Remote URL of the GGUF file
    pub model_url: String,
    /// Local filename; derived from the URL when empty
    pub model_filename: String,
    /// Expected SHA-256. Empty or placeholder skips verification.
    pub model_sha256: String,
    /// Context window size in tokens
    pub context_length: u32,
    /// Temperature for text generation (0.0 - 2.0)
    pub temperature: f32,
    /// Top-p (nucleus sampling) parameter (0.0 - 1.0)
    pub top_p: f32,
    /// Top-k sampling parameter
    pub top_k: u32,
    /// Penalty applied to recently generated tokens
    pub repeat_penalty: f32,
    /// Maximum number of tokens to generate
    pub max_tokens: u32,
    /// Number of GPU layers to offload (0 = CPU only)
    pub gpu_layers: u32,
    pub system_prompt: String,
    /// User message template with `{TARGET_LANG}` and `{SOURCE_TEXT}` placeholders
    pub user_template: String,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self::from_definition(default_model())
    }
}

impl TranslatorConfig {
    /// Build a configuration pointing at a catalog model, with translation defaults
    pub fn from_definition(model: &ModelDefinition) -> Self {
        Self {
            model_url: model.url.to_string(),
            model_filename: model.filename.to_string(),
            model_sha256: model.sha256.to_string(),
            context_length: model.context_length,
            temperature: 0.2,
            top_p: 0.95,
            top_k: 64,
            repeat_penalty: 1.05,
            max_tokens: 256,
            gpu_layers: 99,
            system_prompt: default_system_prompt(),
            user_template: default_user_template(),
        }
    }

    /// Validate configuration values
    ///
    /// Clamps sampling parameters into range and keeps the token budget inside the context.
    pub fn validate(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.top_p = self.top_p.clamp(0.0, 1.0);

        if self.top_k == 0 {
            self.top_k = 64;
        }

        self.repeat_penalty = self.repeat_penalty.clamp(1.0, 2.0);
        self.context_length = self.context_length.max(64);
        self.max_tokens = self.max_tokens.clamp(1, self.context_length);

        if self.user_template.trim().is_empty() {
            self.user_template = default_user_template();
        }
    }

    /// Sampling parameters for the runtime
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repeat_penalty: self.repeat_penalty,
            max_tokens: self.max_tokens,
            ..GenerationParams::default()
        }
    }

    /// Render the user message for a translation request
    pub fn render_user_prompt(&self, text: &str, target_lang: &str) -> String {
        self.user_template
            .replace(TARGET_LANG_PLACEHOLDER, target_lang)
            .replace(SOURCE_TEXT_PLACEHOLDER, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::model::QWEN25_7B_INSTRUCT;

    #[test]
    fn test_default_config() {
        let config = TranslatorConfig::default();
        assert_eq!(config.context_length, 456);
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.top_p, 0.95);
        assert_eq!(config.top_k, 64);
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.model_filename, "Qwen3-8B-Q4_K_M.gguf");
    }

    #[test]
    fn test_from_definition() {
        let config = TranslatorConfig::from_definition(&QWEN25_7B_INSTRUCT);
        assert_eq!(config.model_url, QWEN25_7B_INSTRUCT.url);
        assert_eq!(config.model_filename, QWEN25_7B_INSTRUCT.filename);
    }

    #[test]
    fn test_config_validation() {
        let mut config = TranslatorConfig {
            temperature: 5.0,
            top_p: -1.0,
            top_k: 0,
            repeat_penalty: 0.5,
            context_length: 128,
            max_tokens: 4096,
            user_template: "  ".to_string(),
            ..TranslatorConfig::default()
        };
        config.validate();

        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.top_p, 0.0);
        assert_eq!(config.top_k, 64);
        assert_eq!(config.repeat_penalty, 1.0);
        assert_eq!(config.max_tokens, 128);
        assert_eq!(config.user_template, default_user_template());
    }

    #[test]
    fn test_render_user_prompt() {
        let config = TranslatorConfig::default();
        let prompt = config.render_user_prompt("Hey, can you meet at 3pm?", "Spanish");
        assert_eq!(prompt, "Translate to Spanish:\nHey, can you meet at 3pm?");
    }

    #[test]
    fn test_generation_params_follow_config() {
        let config = TranslatorConfig::default();
        let params = config.generation_params();
        assert_eq!(params.temperature, config.temperature);
        assert_eq!(params.top_k, config.top_k);
        assert_eq!(params.max_tokens, config.max_tokens);
    }

    #[test]
    fn test_config_serialization() {
        let config = TranslatorConfig::default();
        let json = serde_json::to_string(&config).expect("Failed to serialize");
        let deserialized: TranslatorConfig =
            serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(config, deserialized);

        // Missing fields fall back to defaults
        let partial: TranslatorConfig = serde_json::from_str(r#"{"max_tokens": 64}"#).unwrap();
        assert_eq!(partial.max_tokens, 64);
        assert_eq!(partial.top_k, 64);
    }
}
