//! LLM inference engine
//!
//! This module handles all interaction with llama-cpp for model loading and inference.

pub mod engine;
pub mod prompt;
pub mod runner;
pub mod streaming;

use std::path::PathBuf;

pub use engine::{GenerationParams, LlamaManager};
pub use runner::{LlamaRunner, RunnerOptions};

/// Errors raised by the llama runner
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to initialize llama backend: {0}")]
    Backend(String),
    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Failed to create context: {0}")]
    Context(String),
    #[error("Tokenization failed: {0}")]
    Tokenize(String),
    #[error("Prompt has {tokens} tokens but the context only holds {context}")]
    PromptTooLong { tokens: usize, context: u32 },
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Model is not loaded")]
    ModelNotLoaded,
    #[error("Generation cancelled")]
    Cancelled,
}
