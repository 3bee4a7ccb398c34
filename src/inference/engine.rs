//! Async inference engine
//!
//! Drives a [`LlamaRunner`] from async code. Loading and generation block for a long
//! time, so they run on tokio's blocking pool.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::inference::prompt::system_user_prompt;
use crate::inference::runner::{LlamaRunner, RunnerOptions};
use crate::inference::streaming::StreamToken;
use crate::manager::{LlmRuntime, ModelError, OnToken};

/// Sampling parameters for one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub max_tokens: u32,
    pub seed: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            max_tokens: 256,
            seed: 1234,
        }
    }
}

/// llama.cpp-backed [`LlmRuntime`]
pub struct LlamaManager {
    runner: Arc<Mutex<Option<LlamaRunner>>>,
    stop: Arc<AtomicBool>,
    options: RunnerOptions,
}

impl Default for LlamaManager {
    fn default() -> Self {
        Self::new(RunnerOptions::default())
    }
}

impl LlamaManager {
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            runner: Arc::new(Mutex::new(None)),
            stop: Arc::new(AtomicBool::new(false)),
            options,
        }
    }

    /// Release the loaded model, if any
    pub async fn unload_model(&self) {
        let mut slot = self.runner.lock().await;
        if let Some(mut runner) = slot.take() {
            runner.cleanup();
        }
    }

    /// Start a generation and receive its pieces over a channel.
    ///
    /// The channel ends with [`StreamToken::Done`] or [`StreamToken::Error`].
    pub fn generate_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: GenerationParams,
    ) -> mpsc::UnboundedReceiver<StreamToken> {
        let (tx, rx) = mpsc::unbounded_channel();
        let prompt = system_user_prompt(system_prompt, user_prompt);
        let slot = Arc::clone(&self.runner);
        // Drop stale cancels; a cancel from here on applies to this request
        self.stop.store(false, Ordering::Relaxed);

        tokio::task::spawn_blocking(move || {
            let mut slot = slot.blocking_lock();
            let Some(runner) = slot.as_mut() else {
                let _ = tx.send(StreamToken::Error(ModelError::ModelNotLoaded.to_string()));
                return;
            };
            let result = runner.generate_with(&prompt, &params, |piece| {
                let _ = tx.send(StreamToken::Token(piece.to_string()));
            });
            let _ = match result {
                Ok(_) => tx.send(StreamToken::Done),
                Err(e) => tx.send(StreamToken::Error(e.to_string())),
            };
        });

        rx
    }
}

#[async_trait]
impl LlmRuntime for LlamaManager {
    async fn load_model(&self, path: &Path, context: u32) -> Result<(), ModelError> {
        let slot = Arc::clone(&self.runner);
        let stop = Arc::clone(&self.stop);
        let options = self.options.clone();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut slot = slot.blocking_lock();
            // Free the previous model before mapping the next one
            if let Some(mut previous) = slot.take() {
                previous.cleanup();
            }
            let runner = LlamaRunner::with_options(&path, context, options)?.with_stop_handle(stop);
            *slot = Some(runner);
            Ok::<(), ModelError>(())
        })
        .await
        .map_err(|e| {
            tracing::error!("Model load task failed: {}", e);
            ModelError::RuntimeUnavailable
        })?
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
        on_token: Option<OnToken>,
    ) -> Result<String, ModelError> {
        let prompt = system_user_prompt(system_prompt, user_prompt);
        let params = params.clone();
        let slot = Arc::clone(&self.runner);
        // Drop stale cancels; a cancel from here on applies to this request
        self.stop.store(false, Ordering::Relaxed);

        tokio::task::spawn_blocking(move || {
            let mut slot = slot.blocking_lock();
            let runner = slot.as_mut().ok_or(ModelError::ModelNotLoaded)?;
            let output = runner.generate_with(&prompt, &params, |piece| {
                if let Some(on_token) = &on_token {
                    on_token(piece);
                }
            })?;
            Ok(output)
        })
        .await
        .map_err(|e| {
            tracing::error!("Generation task failed: {}", e);
            ModelError::RuntimeUnavailable
        })?
    }

    fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    async fn is_loaded(&self) -> bool {
        self.runner
            .lock()
            .await
            .as_ref()
            .map(LlamaRunner::is_loaded)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::InferenceError;

    #[tokio::test]
    async fn test_generate_before_load() {
        let manager = LlamaManager::default();
        let err = manager
            .generate("system", "user", &GenerationParams::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::ModelNotLoaded));
        assert!(!manager.is_loaded().await);
    }

    #[tokio::test]
    async fn test_load_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LlamaManager::default();
        let err = manager
            .load_model(&dir.path().join("missing.gguf"), 256)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::Inference(InferenceError::ModelNotFound(_))
        ));
        assert!(!manager.is_loaded().await);
    }

    #[tokio::test]
    async fn test_stream_without_model_reports_error() {
        let manager = LlamaManager::default();
        let mut rx = manager.generate_stream("system", "user", GenerationParams::default());
        match rx.recv().await {
            Some(StreamToken::Error(msg)) => assert_eq!(msg, "Model is not loaded."),
            other => panic!("unexpected stream event: {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unload_without_model() {
        let manager = LlamaManager::default();
        manager.unload_model().await;
        assert!(!manager.is_loaded().await);
    }

    #[tokio::test]
    async fn test_cancel_while_queued_survives() {
        let manager = Arc::new(LlamaManager::default());
        // Left over from an earlier request
        manager.cancel();

        // Hold the runner so the generation queues behind it
        let held = manager.runner.lock().await;
        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .generate("system", "user", &GenerationParams::default(), None)
                    .await
            })
        };
        while manager.stop.load(Ordering::Relaxed) {
            tokio::task::yield_now().await;
        }

        manager.cancel();
        drop(held);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ModelError::ModelNotLoaded));
        // The queued task did not wipe the cancel
        assert!(manager.stop.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_new_request_clears_stale_cancel() {
        let manager = LlamaManager::default();
        manager.cancel();
        let _ = manager
            .generate("system", "user", &GenerationParams::default(), None)
            .await;
        assert!(!manager.stop.load(Ordering::Relaxed));
    }

    #[test]
    fn test_cancel_sets_stop_flag() {
        let manager = LlamaManager::default();
        manager.cancel();
        assert!(manager.stop.load(Ordering::Relaxed));
    }
}
