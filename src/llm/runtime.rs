use std::num::NonZeroU32;
use std::path::Path;
use std::pin::pin;
use std::sync::{Mutex, OnceLock};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, trace};

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaModel};
use llama_cpp_2::sampling::LlamaSampler;

use crate::config::LocalModelConfig;
use crate::llm::{ChatMessage, TEMPERATURE};

const SEED: u32 = 1234;

// ---------------------------------------------------------------------------
// Process-wide backend
// ---------------------------------------------------------------------------

static BACKEND: OnceLock<LlamaBackend> = OnceLock::new();
static BACKEND_INIT: Mutex<()> = Mutex::new(());

/// llama.cpp may only be initialised once per process.
fn backend() -> Result<&'static LlamaBackend> {
    if let Some(backend) = BACKEND.get() {
        return Ok(backend);
    }
    let _guard = BACKEND_INIT
        .lock()
        .map_err(|_| anyhow!("llama backend init lock poisoned"))?;
    if let Some(backend) = BACKEND.get() {
        return Ok(backend);
    }
    let backend = LlamaBackend::init().context("failed to init llama backend")?;
    Ok(BACKEND.get_or_init(|| backend))
}

fn build_sampler() -> LlamaSampler {
    LlamaSampler::chain_simple([
        LlamaSampler::penalties(64, 1.1, 0.0, 0.0),
        LlamaSampler::top_k(40),
        LlamaSampler::top_p(0.95, 1),
        LlamaSampler::min_p(0.05, 1),
        LlamaSampler::temp(TEMPERATURE as f32),
        LlamaSampler::dist(SEED),
    ])
}

// ---------------------------------------------------------------------------
// One-shot completion
// ---------------------------------------------------------------------------

/// Load the model at `model_path`, answer `prompt` as a single user turn and
/// drop the model again.
pub fn complete(model_path: &Path, config: &LocalModelConfig, prompt: &str) -> Result<String> {
    let backend = backend()?;

    info!("Loading model from: {}", model_path.display());
    info!(
        "  config: n_gpu_layers={}, n_ctx={}, max_tokens={}",
        config.n_gpu_layers, config.n_ctx, config.max_tokens
    );

    let model_params = pin!(LlamaModelParams::default().with_n_gpu_layers(config.n_gpu_layers));
    let model = LlamaModel::load_from_file(backend, model_path, &model_params)
        .context("failed to load model")?;

    let n_ctx = NonZeroU32::new(config.n_ctx).context("n_ctx must be > 0")?;
    let ctx_params = LlamaContextParams::default().with_n_ctx(Some(n_ctx));
    let mut ctx = model
        .new_context(backend, ctx_params)
        .context("failed to create inference context")?;

    let message = ChatMessage::user(prompt);
    debug!("  msg[0] {message}");
    let llama_msgs = vec![LlamaChatMessage::new(message.role, message.content)
        .context("failed to create chat message")?];

    let tmpl = model
        .chat_template(None)
        .context("model has no chat template")?;
    let rendered = model
        .apply_chat_template(&tmpl, &llama_msgs, true)
        .context("failed to apply chat template")?;

    trace!("=== RENDERED PROMPT ===\n{rendered}\n=== END PROMPT ===");

    let tokens = model
        .str_to_token(&rendered, AddBos::Always)
        .context("tokenization failed")?;

    info!("Prompt tokenized: {} tokens", tokens.len());
    let n_ctx = config.n_ctx as usize;
    if tokens.is_empty() || tokens.len() >= n_ctx {
        bail!(
            "prompt is {} tokens, context window is {n_ctx}",
            tokens.len()
        );
    }

    let mut batch = LlamaBatch::new(n_ctx, 1);
    let last_idx = (tokens.len() - 1) as i32;
    for (i, tok) in (0i32..).zip(tokens.iter()) {
        batch.add(*tok, i, &[0], i == last_idx)?;
    }
    ctx.decode(&mut batch).context("initial decode failed")?;

    let mut sampler = build_sampler();
    let mut output = String::new();
    let mut decoder = encoding_rs::UTF_8.new_decoder();
    let mut n_cur = batch.n_tokens();

    for _ in 0..config.max_tokens {
        if n_cur as usize >= n_ctx {
            debug!("Context window full, stopping generation");
            break;
        }

        let tok = sampler.sample(&ctx, batch.n_tokens() - 1);
        sampler.accept(tok);

        if model.is_eog_token(tok) {
            debug!("Hit EOG token, stopping generation");
            break;
        }

        let piece = model
            .token_to_piece(tok, &mut decoder, true, None)
            .context("token_to_piece failed")?;
        output.push_str(&piece);

        batch.clear();
        batch.add(tok, n_cur, &[0], true)?;
        ctx.decode(&mut batch).context("decode step failed")?;
        n_cur += 1;
    }

    info!("Local model produced {} chars", output.len());
    trace!("=== LLM RAW OUTPUT ===\n{output}\n=== END OUTPUT ===");

    Ok(output)
}
