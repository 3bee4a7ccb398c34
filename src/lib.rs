//! Uniterra runtime
//!
//! On-device translation with local GGUF models: a llama.cpp runner, an async runtime
//! around it, and a manager that fetches, verifies and loads the model.

pub mod inference;
pub mod logging;
pub mod manager;
pub mod storage;
pub mod types;

pub use inference::{GenerationParams, InferenceError, LlamaManager, LlamaRunner, RunnerOptions};
pub use manager::{LlmRuntime, ModelError, ModelManager, OnToken};
pub use types::config::TranslatorConfig;
