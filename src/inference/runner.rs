//! Llama runner
//!
//! Owns a loaded GGUF model and produces text completions for single prompts.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::{send_logs_to_tracing, LogOptions};
use once_cell::sync::OnceCell;
use tracing::{debug, info, trace};

use crate::inference::engine::GenerationParams;
use crate::inference::streaming::Utf8Pieces;
use crate::inference::InferenceError;
use crate::types::model::ModelInfo;

/// Recent tokens considered by the repeat penalty
const PENALTY_LAST_N: i32 = 64;

static BACKEND: OnceCell<LlamaBackend> = OnceCell::new();

/// The llama backend may only be initialized once per process
fn backend() -> Result<&'static LlamaBackend, InferenceError> {
    BACKEND.get_or_try_init(|| {
        send_logs_to_tracing(LogOptions::default());
        let backend = LlamaBackend::init().map_err(|e| InferenceError::Backend(e.to_string()))?;
        info!("llama backend initialized");
        Ok(backend)
    })
}

/// Load-time options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Number of layers to offload to the GPU (0 = CPU only)
    pub gpu_layers: u32,
    /// Worker threads for decoding; `None` uses all available cores
    pub threads: Option<i32>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            gpu_layers: 99,
            threads: None,
        }
    }
}

/// A loaded model ready to generate text.
///
/// Each generation creates a fresh context, so no state carries over between prompts.
/// The model is released by [`LlamaRunner::cleanup`] or on drop.
pub struct LlamaRunner {
    model: Option<LlamaModel>,
    model_path: PathBuf,
    context_size: u32,
    options: RunnerOptions,
    stop: Arc<AtomicBool>,
}

impl LlamaRunner {
    /// Load a model with a given context window
    pub fn new(model_path: impl AsRef<Path>, context_size: u32) -> Result<Self, InferenceError> {
        Self::with_options(model_path, context_size, RunnerOptions::default())
    }

    pub fn with_options(
        model_path: impl AsRef<Path>,
        context_size: u32,
        options: RunnerOptions,
    ) -> Result<Self, InferenceError> {
        let model_path = model_path.as_ref().to_path_buf();
        if context_size == 0 {
            return Err(InferenceError::InvalidParameter(
                "context size must be greater than zero".to_string(),
            ));
        }
        if !model_path.is_file() {
            return Err(InferenceError::ModelNotFound(model_path));
        }

        let backend = backend()?;
        let started = Instant::now();
        info!("Loading model {:?} (n_ctx = {})", model_path, context_size);

        let model_params = LlamaModelParams::default().with_n_gpu_layers(options.gpu_layers);
        let model = LlamaModel::load_from_file(backend, &model_path, &model_params)
            .map_err(|e| InferenceError::Load(e.to_string()))?;

        info!(
            "Model loaded in {:.2}s ({} params, trained context {})",
            started.elapsed().as_secs_f32(),
            model.n_params(),
            model.n_ctx_train()
        );

        Ok(Self {
            model: Some(model),
            model_path,
            context_size,
            options,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share an existing stop flag instead of the runner's own
    pub fn with_stop_handle(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Flag that aborts the running generation when set.
    ///
    /// The flag is not cleared when a generation starts, so a stop raised while a
    /// request is still queued cancels it. Clear it before queueing to drop stale requests.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn context_size(&self) -> u32 {
        self.context_size
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        let model = self.model.as_ref()?;
        let name = self
            .model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(ModelInfo {
            name,
            path: self.model_path.to_string_lossy().into_owned(),
            size_bytes: model.size(),
            parameters: Some(model.n_params()),
            trained_context: model.n_ctx_train(),
        })
    }

    /// Generate a completion for `prompt`
    pub fn generate_response(
        &mut self,
        prompt: &str,
        temperature: f32,
        top_p: f32,
        max_tokens: u32,
    ) -> Result<String, InferenceError> {
        let params = GenerationParams {
            temperature,
            top_p,
            max_tokens,
            ..GenerationParams::default()
        };
        self.generate_with(prompt, &params, |_| {})
    }

    /// Generate a completion, handing each complete text piece to `on_piece`
    pub fn generate_with(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        mut on_piece: impl FnMut(&str),
    ) -> Result<String, InferenceError> {
        let model = self.model.as_ref().ok_or(InferenceError::ModelNotLoaded)?;
        if params.max_tokens == 0 {
            return Err(InferenceError::InvalidParameter(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        let backend = backend()?;
        let tokens = model
            .str_to_token(prompt, AddBos::Always)
            .map_err(|e| InferenceError::Tokenize(e.to_string()))?;
        if tokens.is_empty() {
            return Err(InferenceError::InvalidParameter(
                "prompt produced no tokens".to_string(),
            ));
        }
        let budget = generation_budget(tokens.len(), self.context_size, params.max_tokens)?;

        let mut ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.context_size))
            .with_n_batch(self.context_size);
        if let Some(threads) = self.options.threads {
            ctx_params = ctx_params
                .with_n_threads(threads)
                .with_n_threads_batch(threads);
        }
        let mut ctx = model
            .new_context(backend, ctx_params)
            .map_err(|e| InferenceError::Context(e.to_string()))?;

        debug!(
            "prompt tokens = {}, n_ctx = {}, budget = {}",
            tokens.len(),
            self.context_size,
            budget
        );

        let mut batch = LlamaBatch::new(self.context_size as usize, 1);
        let last_index = tokens.len() as i32 - 1;
        for (i, token) in (0_i32..).zip(tokens) {
            // Logits only for the last prompt token
            batch
                .add(token, i, &[0], i == last_index)
                .map_err(|e| InferenceError::Decode(e.to_string()))?;
        }
        ctx.decode(&mut batch)
            .map_err(|e| InferenceError::Decode(e.to_string()))?;

        let mut sampler = build_sampler(params);
        let mut pieces = Utf8Pieces::new();
        let mut output = String::new();
        let mut n_cur = batch.n_tokens();
        let mut generated = 0u32;
        let started = Instant::now();

        while generated < budget {
            // A stop request is consumed by the generation that observes it
            if self.stop.swap(false, Ordering::Relaxed) {
                info!("Generation stopped after {} tokens", generated);
                return Err(InferenceError::Cancelled);
            }

            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            if model.is_eog_token(token) {
                debug!("End of generation token detected");
                break;
            }

            let bytes = model
                .token_to_bytes(token, Special::Tokenize)
                .map_err(|e| InferenceError::Tokenize(e.to_string()))?;
            if let Some(text) = pieces.push(&bytes) {
                trace!("token: {:?}", text);
                on_piece(&text);
                output.push_str(&text);
            }

            generated += 1;
            if generated == budget {
                break;
            }

            batch.clear();
            batch
                .add(token, n_cur, &[0], true)
                .map_err(|e| InferenceError::Decode(e.to_string()))?;
            n_cur += 1;
            ctx.decode(&mut batch)
                .map_err(|e| InferenceError::Decode(e.to_string()))?;
        }

        if let Some(rest) = pieces.finish() {
            on_piece(&rest);
            output.push_str(&rest);
        }

        let elapsed = started.elapsed().as_secs_f32();
        info!(
            "Generated {} tokens in {:.2}s ({:.2} t/s)",
            generated,
            elapsed,
            if elapsed > 0.0 { generated as f32 / elapsed } else { 0.0 }
        );

        Ok(output)
    }

    /// Release the model. Safe to call more than once.
    pub fn cleanup(&mut self) {
        if self.model.take().is_some() {
            info!("Released model {:?}", self.model_path);
        }
    }
}

impl Drop for LlamaRunner {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Tokens that may be generated after a prompt of `prompt_tokens` in a window of `context_size`
pub fn generation_budget(
    prompt_tokens: usize,
    context_size: u32,
    max_tokens: u32,
) -> Result<u32, InferenceError> {
    let context = context_size as usize;
    if prompt_tokens >= context {
        return Err(InferenceError::PromptTooLong {
            tokens: prompt_tokens,
            context: context_size,
        });
    }
    let room = (context - prompt_tokens) as u32;
    Ok(max_tokens.min(room))
}

/// Sampler chain: repeat penalty, top-k, top-p, temperature, then a seeded draw.
/// A non-positive temperature selects greedily.
fn build_sampler(params: &GenerationParams) -> LlamaSampler {
    let penalties = LlamaSampler::penalties(PENALTY_LAST_N, params.repeat_penalty, 0.0, 0.0);

    if params.temperature <= 0.0 {
        return LlamaSampler::chain_simple([penalties, LlamaSampler::greedy()]);
    }

    LlamaSampler::chain_simple([
        penalties,
        LlamaSampler::top_k(params.top_k as i32),
        LlamaSampler::top_p(params.top_p, 1),
        LlamaSampler::temp(params.temperature),
        LlamaSampler::dist(params.seed),
    ])
}
