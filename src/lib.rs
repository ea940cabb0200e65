//! # ft-gateway
//!
//! 微调领域模型的推理网关 — 在一个 HTTP 契约后面统一三种异构文本生成后端。
//!
//! Inference gateway for a fine-tuned domain language model. One HTTP
//! contract fronts three heterogeneous text-generation backends: a locally
//! loaded fine-tuned ONNX model, a remote hosted fine-tuned endpoint, and an
//! OpenAI-style general chat API. The gateway normalizes their divergent
//! request/response shapes into a single canonical completion envelope,
//! tracks token usage, and reports a uniform error envelope.
//!
//! ## Control flow
//!
//! Inbound request → [`router::ProviderRouter`] selects a backend →
//! the backend ([`backends::TextBackend`]) is invoked → the raw result passes
//! through [`normalize::normalize`] → the canonical envelope is returned by
//! the HTTP surface ([`server`]).
//!
//! The gateway performs no training, fine-tuning, or evaluation; the model
//! artifact it serves is deposited by an upstream preparation pipeline as a
//! self-contained directory (`tokenizer.json` + `model.onnx`).
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Immutable configuration loaded once from the environment |
//! | [`types`] | Request shapes, canonical envelope, usage accounting |
//! | [`backends`] | Local ONNX adapter and remote backend clients |
//! | [`normalize`] | Raw backend response → canonical envelope |
//! | [`router`] | Per-request provider selection and availability checks |
//! | [`server`] | axum HTTP surface: routes, CORS, error envelope |

pub mod backends;
pub mod config;
pub mod error;
pub mod normalize;
pub mod router;
pub mod server;
pub mod types;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use types::{
    ChatMessage, ChatRole, CompletionEnvelope, FinishReason, ProviderKind, Usage,
};
