//! Model manager
//!
//! Ties storage and inference together: makes sure the configured model file is on
//! disk, loads it once, and runs translations against it.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::inference::engine::{GenerationParams, LlamaManager};
use crate::inference::runner::RunnerOptions;
use crate::inference::InferenceError;
use crate::storage::file_store::FileStore;
use crate::storage::huggingface::HuggingFaceUrl;
use crate::storage::StorageError;
use crate::types::config::TranslatorConfig;

/// Callback receiving generated text pieces as they are produced
pub type OnToken = Arc<dyn Fn(&str) + Send + Sync>;

/// Builds the runtime used by a [`ModelManager`]
pub type RuntimeFactory = Arc<dyn Fn(&TranslatorConfig) -> Arc<dyn LlmRuntime> + Send + Sync>;

/// Errors surfaced by the manager and runtimes
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("ModelManager is not configured.")]
    NotConfigured,
    #[error("Model runtime is unavailable.")]
    RuntimeUnavailable,
    #[error("Model is not loaded.")]
    ModelNotLoaded,
    #[error("Downloaded model failed checksum verification.")]
    InvalidChecksum,
    #[error("Network error while downloading model: {0}")]
    NetworkFailure(String),
    #[error("File I/O error: {0}")]
    FileIo(String),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl From<StorageError> for ModelError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ChecksumMismatch { .. } => ModelError::InvalidChecksum,
            StorageError::Network(_)
            | StorageError::HttpStatus(_)
            | StorageError::Incomplete { .. } => ModelError::NetworkFailure(e.to_string()),
            other => ModelError::FileIo(other.to_string()),
        }
    }
}

/// A text-generation backend the manager can drive
#[async_trait]
pub trait LlmRuntime: Send + Sync {
    async fn load_model(&self, path: &Path, context: u32) -> Result<(), ModelError>;

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
        on_token: Option<OnToken>,
    ) -> Result<String, ModelError>;

    /// Abort the running generation, if any
    fn cancel(&self);

    async fn is_loaded(&self) -> bool;
}

fn llama_runtime(config: &TranslatorConfig) -> Arc<dyn LlmRuntime> {
    Arc::new(LlamaManager::new(RunnerOptions {
        gpu_layers: config.gpu_layers,
        ..RunnerOptions::default()
    }))
}

/// Prepares the model and runs translations
pub struct ModelManager {
    config: RwLock<Option<TranslatorConfig>>,
    runtime: StdRwLock<Option<Arc<dyn LlmRuntime>>>,
    factory: RuntimeFactory,
    store: FileStore,
    prepare_lock: Mutex<()>,
    loaded: AtomicBool,
    preparing: Arc<AtomicBool>,
    download_progress: Arc<StdMutex<Option<f64>>>,
}

/// Clears the preparing flag when preparation ends, however it ends
struct PreparingGuard(Arc<AtomicBool>);

impl Drop for PreparingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl ModelManager {
    /// Create a manager that stores models with `store` and runs them with llama.cpp
    pub fn new(store: FileStore) -> Self {
        Self {
            config: RwLock::new(None),
            runtime: StdRwLock::new(None),
            factory: Arc::new(llama_runtime),
            store,
            prepare_lock: Mutex::new(()),
            loaded: AtomicBool::new(false),
            preparing: Arc::new(AtomicBool::new(false)),
            download_progress: Arc::new(StdMutex::new(None)),
        }
    }

    /// Manager using the default models directory
    pub fn with_default_store() -> Result<Self, ModelError> {
        Ok(Self::new(FileStore::in_data_dir()?))
    }

    /// Swap the runtime implementation
    pub fn with_runtime_factory(mut self, factory: RuntimeFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Set the configuration. Must be called before preparing the model.
    pub async fn configure(&self, mut config: TranslatorConfig) {
        config.validate();
        *self.config.write().await = Some(config);
    }

    pub async fn config(&self) -> Option<TranslatorConfig> {
        self.config.read().await.clone()
    }

    /// Whether the model is loaded and translations can run
    pub fn is_ready(&self) -> bool {
        self.loaded.load(Ordering::Relaxed)
    }

    pub fn is_preparing(&self) -> bool {
        self.preparing.load(Ordering::Relaxed)
    }

    /// Fraction of the last download, `None` when nothing was downloaded
    pub fn download_progress(&self) -> Option<f64> {
        *self
            .download_progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn current_runtime(&self) -> Option<Arc<dyn LlmRuntime>> {
        self.runtime
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Ensure the model file exists (downloading and verifying it if needed) and load it.
    ///
    /// Does nothing if the model is already loaded.
    pub async fn prepare_model(
        &self,
        progress: impl Fn(f64) + Send + Sync + 'static,
    ) -> Result<(), ModelError> {
        let config = self.config().await.ok_or(ModelError::NotConfigured)?;
        if self.is_ready() {
            return Ok(());
        }

        let _serial = self.prepare_lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        self.preparing.store(true, Ordering::Relaxed);
        let _preparing = PreparingGuard(Arc::clone(&self.preparing));

        let filename = if config.model_filename.trim().is_empty() {
            HuggingFaceUrl::parse(&config.model_url)
                .map_err(StorageError::InvalidUrl)?
                .filename
        } else {
            config.model_filename.clone()
        };

        let shared_progress = Arc::clone(&self.download_progress);
        let local_path = self
            .store
            .ensure_file(
                &config.model_url,
                &filename,
                &config.model_sha256,
                true,
                move |fraction| {
                    *shared_progress.lock().unwrap_or_else(|e| e.into_inner()) = Some(fraction);
                    progress(fraction);
                },
            )
            .await?;

        let runtime = {
            let mut slot = self.runtime.write().unwrap_or_else(|e| e.into_inner());
            slot.get_or_insert_with(|| (self.factory)(&config)).clone()
        };

        runtime.load_model(&local_path, config.context_length).await?;
        self.loaded.store(true, Ordering::Relaxed);
        tracing::info!("Model ready: {:?}", local_path);
        Ok(())
    }

    /// Translate `text` into `target_lang`
    pub async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        on_token: Option<OnToken>,
    ) -> Result<String, ModelError> {
        let config = self.config().await.ok_or(ModelError::NotConfigured)?;
        let runtime = self
            .current_runtime()
            .filter(|_| self.is_ready())
            .ok_or(ModelError::ModelNotLoaded)?;

        let user_prompt = config.render_user_prompt(text, target_lang);
        tracing::debug!("Translating {} chars to {}", text.len(), target_lang);

        runtime
            .generate(
                &config.system_prompt,
                &user_prompt,
                &config.generation_params(),
                on_token,
            )
            .await
    }

    /// Prepare the model if needed, then translate
    pub async fn ensure_and_translate(
        &self,
        text: &str,
        target_lang: &str,
        on_token: Option<OnToken>,
    ) -> Result<String, ModelError> {
        if !self.is_ready() {
            self.prepare_model(|_| {}).await?;
        }
        self.translate(text, target_lang, on_token).await
    }

    /// Cancel the running generation, if the runtime supports it
    pub fn cancel(&self) {
        if let Some(runtime) = self.current_runtime() {
            runtime.cancel();
        }
    }
}
