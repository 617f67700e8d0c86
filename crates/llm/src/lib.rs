//! medpanel LLM
//!
//! Model invocation for the diagnostic engine:
//! - `LlmProvider` - unified single-shot completion interface
//! - Gemini (`generateContent`) and OpenAI-compatible chat providers
//! - `ModelFallbackChain` - ordered multi-model fallback behind one provider
//! - `StructuredInvoker` - JSON-contract calls with per-call timeouts and
//!   usage observation
//!
//! Also includes the HTTP client factory.

pub mod fallback_chain;
pub mod gemini;
pub mod http_client;
pub mod openai;
pub mod provider;
pub mod structured;
pub mod types;

// Re-export main types
pub use fallback_chain::{FailureReason, ModelFallbackChain};
pub use gemini::GeminiProvider;
pub use http_client::build_http_client;
pub use openai::OpenAIProvider;
pub use provider::LlmProvider;
pub use structured::{
    estimate_tokens, parse_structured, CallObserver, CallRecord, StructuredInvoker,
    StructuredOutput, StructuredRequest,
};
pub use types::*;
