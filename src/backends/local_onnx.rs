//! 本地 ONNX 推理适配器 — 对导出的微调模型执行贪心、长度受限的文本生成
//!
//! Local generator adapter. Wraps one exported model artifact (a directory
//! holding `tokenizer.json` and `model.onnx`) and runs greedy, length-bounded
//! generation through ONNX Runtime. The KV cache is not used: every step
//! reruns the full sequence, trading latency for memory determinism, which
//! matches how the artifact is exported.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use crate::error::{GatewayError, Result};
use crate::types::{message::ChatMessage, FinishReason, ProviderKind};

use super::{render_transcript, RawBackendResponse, TextBackend};

/// EOS candidates probed against the tokenizer vocabulary, most specific
/// first. Covers Qwen-style and Llama-style exports.
const EOS_CANDIDATES: [&str; 4] = ["<|im_end|>", "<|endoftext|>", "</s>", "<|end|>"];

/// Output of one local generation run: completion text with the prompt never
/// echoed back, plus exact token accounting.
#[derive(Debug, Clone)]
pub struct LocalGeneration {
    pub completion: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub finish_reason: FinishReason,
}

/// Loaded model state. Generation against one loaded model is serialized
/// through the mutex; the session itself is CPU-bound and not meaningfully
/// parallelizable.
struct LocalModel {
    session: Session,
    tokenizer: Tokenizer,
    eos_token_id: Option<u32>,
    wants_position_ids: bool,
}

/// Local fine-tuned ONNX backend.
pub struct LocalOnnxBackend {
    inner: Arc<Mutex<LocalModel>>,
    artifact_dir: PathBuf,
}

impl std::fmt::Debug for LocalOnnxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalOnnxBackend")
            .field("artifact_dir", &self.artifact_dir)
            .finish()
    }
}

impl LocalOnnxBackend {
    /// Load the tokenizer and ONNX session from the artifact directory.
    ///
    /// This is fatal at startup: if the artifact cannot be loaded, the
    /// process must not accept traffic with local generation configured.
    pub fn load(dir: &Path) -> Result<Self> {
        let tokenizer_path = dir.join("tokenizer.json");
        let model_path = dir.join("model.onnx");

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            GatewayError::Startup(format!(
                "failed to load tokenizer from '{}': {e}",
                tokenizer_path.display()
            ))
        })?;

        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(threads))
            .and_then(|b| b.commit_from_file(&model_path))
            .map_err(|e| {
                GatewayError::Startup(format!(
                    "failed to load ONNX model from '{}': {e}",
                    model_path.display()
                ))
            })?;

        let wants_position_ids = session.inputs.iter().any(|i| i.name == "position_ids");
        let eos_token_id = find_eos_token(&tokenizer);

        info!(
            artifact_dir = %dir.display(),
            eos_token_id,
            wants_position_ids,
            "local ONNX model loaded"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(LocalModel {
                session,
                tokenizer,
                eos_token_id,
                wants_position_ids,
            })),
            artifact_dir: dir.to_path_buf(),
        })
    }

    /// Run greedy generation for a flat prompt, bounded by `max_new_tokens`.
    ///
    /// The generation loop is CPU-bound and runs on the blocking pool; the
    /// mutex guarantees at most one in-flight generation per loaded model.
    pub async fn generate(&self, prompt: String, max_new_tokens: u32) -> Result<LocalGeneration> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || generate_blocking(&inner, &prompt, max_new_tokens))
            .await
            .map_err(|e| {
                GatewayError::backend(None, format!("local generation task panicked: {e}"))
            })?
    }
}

#[async_trait]
impl TextBackend for LocalOnnxBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalOnnx
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_new_tokens: u32,
    ) -> Result<RawBackendResponse> {
        let prompt = render_transcript(messages);
        let generation = self.generate(prompt, max_new_tokens).await?;
        Ok(RawBackendResponse::Local(generation))
    }
}

fn generate_blocking(
    inner: &Mutex<LocalModel>,
    prompt: &str,
    max_new_tokens: u32,
) -> Result<LocalGeneration> {
    let model = inner
        .lock()
        .map_err(|_| GatewayError::backend(None, "local model lock poisoned"))?;

    let encoding = model
        .tokenizer
        .encode(prompt, true)
        .map_err(|e| GatewayError::backend(None, format!("tokenization failed: {e}")))?;
    let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    let prompt_len = ids.len();
    if ids.is_empty() {
        return Err(GatewayError::client_request("prompt produced no tokens"));
    }

    for _ in 0..max_new_tokens {
        let next = forward_argmax(&model, &ids)?;
        if model.eos_token_id == Some(next) {
            break;
        }
        ids.push(next as i64);
    }

    let generated = generated_suffix(&ids, prompt_len);
    let completion = model
        .tokenizer
        .decode(&generated, true)
        .map_err(|e| GatewayError::backend(None, format!("decoding failed: {e}")))?
        .trim()
        .to_string();

    let completion_tokens = generated.len() as u64;
    Ok(LocalGeneration {
        completion,
        prompt_tokens: prompt_len as u64,
        completion_tokens,
        finish_reason: finish_reason_for(completion_tokens, max_new_tokens),
    })
}

/// Slice the full sequence at the prompt's token boundary. Only this suffix
/// is ever decoded, so the completion stays free of the echoed prompt even
/// when the model repeats the prompt token-for-token.
fn generated_suffix(sequence: &[i64], prompt_len: usize) -> Vec<u32> {
    sequence[prompt_len.min(sequence.len())..]
        .iter()
        .map(|&id| id as u32)
        .collect()
}

/// One full forward pass over the current sequence, returning the argmax of
/// the last position's logits.
fn forward_argmax(model: &LocalModel, ids: &[i64]) -> Result<u32> {
    let seq_len = ids.len();
    let input_ids = Tensor::from_array(([1, seq_len], ids.to_vec())).map_err(infer_err)?;
    let attention_mask =
        Tensor::from_array(([1, seq_len], vec![1i64; seq_len])).map_err(infer_err)?;

    let outputs = if model.wants_position_ids {
        let position_ids =
            Tensor::from_array(([1, seq_len], (0..seq_len as i64).collect::<Vec<_>>()))
                .map_err(infer_err)?;
        let inputs = ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
            "position_ids" => position_ids,
        ]
        .map_err(infer_err)?;
        model.session.run(inputs).map_err(infer_err)?
    } else {
        let inputs = ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
        ]
        .map_err(infer_err)?;
        model.session.run(inputs).map_err(infer_err)?
    };

    let (shape, logits) = outputs["logits"]
        .try_extract_raw_tensor::<f32>()
        .map_err(infer_err)?;
    let vocab_size = shape
        .last()
        .map(|&d| d as usize)
        .filter(|&v| v > 0)
        .ok_or_else(|| GatewayError::backend(None, "model returned empty logits"))?;

    // Logits come back as [1, seq, vocab]; only the final position matters.
    let rows = logits.len() / vocab_size;
    if rows == 0 {
        return Err(GatewayError::backend(None, "model returned empty logits"));
    }
    let last_row = &logits[(rows - 1) * vocab_size..rows * vocab_size];
    let mut best = 0usize;
    let mut best_score = f32::NEG_INFINITY;
    for (idx, &score) in last_row.iter().enumerate() {
        if score > best_score {
            best = idx;
            best_score = score;
        }
    }
    Ok(best as u32)
}

fn infer_err(e: ort::Error) -> GatewayError {
    GatewayError::backend(None, format!("local inference failed: {e}"))
}

/// The cap was hit exactly iff the generated length equals the request bound.
fn finish_reason_for(completion_tokens: u64, max_new_tokens: u32) -> FinishReason {
    if completion_tokens == u64::from(max_new_tokens) {
        FinishReason::Length
    } else {
        FinishReason::Stop
    }
}

fn find_eos_token(tokenizer: &Tokenizer) -> Option<u32> {
    EOS_CANDIDATES
        .iter()
        .find_map(|candidate| tokenizer.token_to_id(candidate))
}
