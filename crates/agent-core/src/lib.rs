//! # agent-core
//!
//! Provider-agnostic LLM plumbing shared by the analyst crates.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Analyst core                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │ classify     │  │ streaming    │  │   LlmProvider    │   │
//! │  │ (one-shot)   │──│ analyze      │──│   (Strategy)     │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between Ollama, OpenAI-compatible
//! endpoints, or any other backend without changing resolution or delivery
//! logic. Provider selection happens once at startup, in `agent-runtime`.

pub mod error;
pub mod message;
pub mod provider;

pub use error::{AgentError, Result};
pub use message::{Message, Role};
pub use provider::{
    Completion, CompletionStream, GenerationOptions, LlmProvider, StreamChunk, TokenUsage,
};
