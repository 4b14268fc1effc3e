//! Domain Model
//!
//! Verdicts, instrument universes, stream segments and kline data shared by
//! the resolution and delivery pipeline.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which of the two trading venues an instrument is queried under.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    #[default]
    Spot,
    Derivatives,
}

impl MarketType {
    /// The opposite venue (used by the cross-market validation fallback).
    pub fn other(self) -> Self {
        match self {
            MarketType::Spot => MarketType::Derivatives,
            MarketType::Derivatives => MarketType::Spot,
        }
    }
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketType::Spot => write!(f, "spot"),
            MarketType::Derivatives => write!(f, "derivatives"),
        }
    }
}

/// Identifier of one conversation (chat, channel, socket session).
///
/// At most one analysis may be in flight per conversation at any time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Syntactic ticker check: 2..=15 uppercase ASCII letters.
///
/// Semantic validity (is it actually tradable?) is established only by the
/// existence validator.
pub fn is_valid_symbol(symbol: &str) -> bool {
    (2..=15).contains(&symbol.len()) && symbol.bytes().all(|b| b.is_ascii_uppercase())
}

/// Output of classification or full resolution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolutionVerdict {
    /// Whether the request asks for a market analysis at all.
    pub is_analysis_request: bool,

    /// Normalized uppercase ticker, or absent.
    ///
    /// Never present when `is_analysis_request` is false.
    pub symbol: Option<String>,

    /// Venue the instrument was (or is guessed to be) tradable on.
    pub market: MarketType,

    /// Classifier confidence in [0, 1].
    pub confidence: f32,

    /// Detail of a transport problem encountered while producing this
    /// verdict, if any. The verdict itself is still usable.
    pub transport_error: Option<String>,
}

impl ResolutionVerdict {
    /// Verdict for input that is not an analysis request.
    pub fn not_analysis(confidence: f32) -> Self {
        Self {
            is_analysis_request: false,
            symbol: None,
            market: MarketType::default(),
            confidence: confidence.clamp(0.0, 1.0),
            transport_error: None,
        }
    }

    /// Verdict for a recognized analysis request.
    pub fn analysis(symbol: Option<String>, market: MarketType, confidence: f32) -> Self {
        Self {
            is_analysis_request: true,
            symbol,
            market,
            confidence: confidence.clamp(0.0, 1.0),
            transport_error: None,
        }
    }

    /// Degraded verdict after an unrecoverable classification payload.
    pub fn degraded(detail: impl Into<String>) -> Self {
        Self {
            is_analysis_request: false,
            symbol: None,
            market: MarketType::default(),
            confidence: 0.0,
            transport_error: Some(detail.into()),
        }
    }

    /// Analysis intent confirmed but no instrument could be pinned down.
    pub fn unresolved(confidence: f32) -> Self {
        Self::analysis(None, MarketType::default(), confidence)
    }

    /// Replace the market type (validator corrections).
    pub fn with_market(mut self, market: MarketType) -> Self {
        self.market = market;
        self
    }

    /// Annotate with a transport problem without discarding the verdict.
    pub fn with_transport_error(mut self, detail: impl Into<String>) -> Self {
        self.transport_error = Some(detail.into());
        self
    }

    pub fn had_transport_error(&self) -> bool {
        self.transport_error.is_some()
    }
}

/// Where a symbol appears across the two instrument universes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Membership {
    SpotOnly,
    DerivativesOnly,
    Both,
    Neither,
}

/// Read-only view over the two instrument universes.
///
/// Fetched fresh per resolution attempt that needs it; never mutated after
/// construction. A side that failed to fetch is simply empty.
#[derive(Clone, Debug, Default)]
pub struct InstrumentUniverse {
    pub spot: HashSet<String>,
    pub derivatives: HashSet<String>,
}

impl InstrumentUniverse {
    pub fn new(spot: HashSet<String>, derivatives: HashSet<String>) -> Self {
        Self { spot, derivatives }
    }

    pub fn membership_of(&self, symbol: &str) -> Membership {
        match (self.spot.contains(symbol), self.derivatives.contains(symbol)) {
            (true, true) => Membership::Both,
            (true, false) => Membership::SpotOnly,
            (false, true) => Membership::DerivativesOnly,
            (false, false) => Membership::Neither,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spot.is_empty() && self.derivatives.is_empty()
    }
}

/// One logical unit of analysis text, ready for delivery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamSegment {
    /// Sanitized, formatting-balanced text.
    pub content: String,

    /// True only for the last segment of a given analysis.
    pub is_final: bool,

    /// Strictly increasing per analysis, starting at 0.
    pub sequence: u32,
}

/// A single candle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Candles for one granularity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KlineSeries {
    pub interval: String,
    pub klines: Vec<Kline>,
}

impl KlineSeries {
    /// Compact one-line digest used when embedding the series into a prompt.
    pub fn digest(&self) -> String {
        let (Some(first), Some(last)) = (self.klines.first(), self.klines.last()) else {
            return format!("{}: no data", self.interval);
        };
        let high = self.klines.iter().map(|k| k.high).max().unwrap_or(last.high);
        let low = self.klines.iter().map(|k| k.low).min().unwrap_or(last.low);
        format!(
            "{}: {} candles, open {} -> close {}, range [{} .. {}]",
            self.interval,
            self.klines.len(),
            first.open,
            last.close,
            low,
            high,
        )
    }
}
