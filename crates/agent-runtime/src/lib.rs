//! # agent-runtime
//!
//! LLM provider implementations behind the `agent_core::LlmProvider`
//! strategy trait. Which backend serves a process is decided exactly once,
//! at startup, from configuration; everything downstream sees only the
//! trait.

#[cfg(feature = "ollama")]
pub mod ollama;
pub mod openai;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};
pub use openai::{OpenAiCompatConfig, OpenAiCompatProvider};

use std::sync::Arc;

use agent_core::{AgentError, LlmProvider, Result};

/// Build the process-wide provider from `AGENT_PROVIDER` and the
/// backend-specific environment variables.
///
/// Accepted kinds: `ollama` (default) and `openai` (any OpenAI-compatible
/// endpoint).
pub fn provider_from_env() -> Result<Arc<dyn LlmProvider>> {
    let kind = std::env::var("AGENT_PROVIDER").unwrap_or_else(|_| "ollama".into());
    match kind.as_str() {
        "openai" => Ok(Arc::new(OpenAiCompatProvider::from_env()?)),
        "ollama" => {
            #[cfg(feature = "ollama")]
            {
                Ok(Arc::new(OllamaProvider::from_env()))
            }
            #[cfg(not(feature = "ollama"))]
            {
                Err(AgentError::Config(
                    "ollama support not compiled in; rebuild with the `ollama` feature".into(),
                ))
            }
        }
        other => Err(AgentError::Config(format!(
            "unknown provider kind: {other}"
        ))),
    }
}
