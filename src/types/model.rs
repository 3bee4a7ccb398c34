//! Model types
//!
//! Model metadata and the catalog of GGUF models the translator knows how to fetch.

use serde::{Deserialize, Serialize};

/// Information about a loaded model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Display name of the model
    pub name: String,
    /// Path to the GGUF file
    pub path: String,
    /// Model size in bytes
    pub size_bytes: u64,
    /// Number of parameters (if known)
    pub parameters: Option<u64>,
    /// Context length the model was trained with
    pub trained_context: u32,
}

/// A downloadable model known to the translator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDefinition {
    pub id: &'static str,
    pub name: &'static str,
    /// Direct download URL (HuggingFace `resolve` link)
    pub url: &'static str,
    pub filename: &'static str,
    /// Expected SHA-256 of the file; empty skips verification
    pub sha256: &'static str,
    pub context_length: u32,
    pub description: &'static str,
}

pub const QWEN3_8B_INSTRUCT: ModelDefinition = ModelDefinition {
    id: "qwen-8b-instruct",
    name: "Qwen3 8B Instruct",
    url: "https://huggingface.co/Qwen/Qwen3-8B-GGUF/resolve/main/Qwen3-8B-Q4_K_M.gguf",
    filename: "Qwen3-8B-Q4_K_M.gguf",
    sha256: "",
    context_length: 456,
    description: "Powerful 8B model with thinking mode",
};

pub const QWEN25_7B_INSTRUCT: ModelDefinition = ModelDefinition {
    id: "qwen-7b-instruct",
    name: "Qwen 2.5 7B Instruct",
    url: "https://huggingface.co/bartowski/Qwen2.5-7B-Instruct-GGUF/resolve/main/Qwen2.5-7B-Instruct-Q4_K_M.gguf",
    filename: "Qwen2.5-7B-Instruct-Q4_K_M.gguf",
    sha256: "",
    context_length: 456,
    description: "Efficient 7B model",
};

/// All models in the catalog, default first
pub fn available_models() -> &'static [ModelDefinition] {
    &[QWEN3_8B_INSTRUCT, QWEN25_7B_INSTRUCT]
}

pub fn default_model() -> &'static ModelDefinition {
    &available_models()[0]
}

/// Look up a catalog entry by id
pub fn find_model(id: &str) -> Option<&'static ModelDefinition> {
    available_models().iter().find(|m| m.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::huggingface::HuggingFaceUrl;

    #[test]
    fn test_find_model() {
        assert_eq!(find_model("qwen-7b-instruct"), Some(&QWEN25_7B_INSTRUCT));
        assert!(find_model("llama-70b").is_none());
        assert_eq!(default_model().id, "qwen-8b-instruct");
    }

    #[test]
    fn test_catalog_urls_match_filenames() {
        for model in available_models() {
            let parsed = HuggingFaceUrl::parse(model.url).unwrap();
            assert_eq!(parsed.filename, model.filename, "{}", model.id);
            assert_eq!(parsed.download_url(), model.url);
        }
    }
}
