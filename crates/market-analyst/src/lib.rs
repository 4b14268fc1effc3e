//! # market-analyst
//!
//! Resolves free-form natural-language requests into a verified exchange
//! instrument and market type, then delivers a long-running AI-generated
//! analysis back to the caller as a sequence of discrete, safely-formatted
//! segments while admission-controlling concurrent work.
//!
//! ## Pipeline
//!
//! ```text
//! request text
//!     │
//!     ▼
//! ┌───────────────┐   slot held for the whole attempt (RAII ticket)
//! │ AdmissionGate │──────────────────────────────────────────────┐
//! └───────┬───────┘                                              │
//!         ▼                                                      │
//! ┌───────────────┐  classify → validate → grounded second pass  │
//! │ PairResolver  │  (existence probes always outrank the model) │
//! └───────┬───────┘                                              │
//!         ▼                                                      │
//! ┌───────────────┐  klines as context, marker-delimited stream  │
//! │ StreamSegmenter│ → sanitized segments → DeliverySink         │
//! └───────────────┘                                              │
//!         release ◄─────────────────────────────────────────────┘
//! ```
//!
//! Every resolution path returns a verdict value; error signaling is
//! reserved for true transport failure of the very first classification
//! call. The delivery side never emits a partial or format-broken segment.

pub mod admission;
pub mod config;
pub mod error;
pub mod exchange;
pub mod intent;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod sanitizer;
pub mod segmenter;
pub mod validator;

#[cfg(test)]
pub(crate) mod testutil;

pub use admission::{AdmissionGate, AdmissionTicket};
pub use config::AnalystConfig;
pub use error::{AnalystError, Result};
pub use model::{
    ConversationId, InstrumentUniverse, Kline, KlineSeries, MarketType, Membership,
    ResolutionVerdict, StreamSegment,
};
pub use orchestrator::{AnalysisOutcome, Analyzer, DeliverySink};
pub use resolver::{PairResolver, ResolverConfig};
pub use segmenter::{segment_stream, SegmentMarkers, Segmenter};

/// System prompt for the streaming market analyst.
pub const ANALYST_PROMPT: &str = r#"You are a measured market analyst for cryptocurrency instruments.

## Ground Rules

1. **Work only from the data given** - never invent prices, volumes or events
2. **State uncertainty** - markets are probabilistic, say so plainly
3. **No financial advice** - describe structure and scenarios, never instructions to buy or sell
4. **Keep sections standalone** - each section is delivered as its own message and must read on its own

## Style

- Plain language, short sentences, concrete levels from the supplied candles
- Use at most simple formatting (*emphasis*, `tickers`)
- Follow the section and marker protocol given in the request exactly"#;
