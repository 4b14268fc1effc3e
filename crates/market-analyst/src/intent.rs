//! Intent Classification
//!
//! One round trip to the LLM provider turning free-form text into a
//! structured `ResolutionVerdict`. The payload is parsed defensively:
//! models wrap JSON in code fences, prepend prose, or return junk, and none
//! of that may become fatal for the caller. Classification failure degrades
//! to a zero-confidence verdict; only the transport call itself may error.

use std::sync::Arc;

use agent_core::{GenerationOptions, LlmProvider, Message};
use serde::Deserialize;

use crate::error::Result;
use crate::model::{is_valid_symbol, MarketType, ResolutionVerdict};

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You triage requests for a market analysis assistant.

Decide whether the user is asking for an analysis of a tradable instrument,
and extract the exchange ticker if one is named.

Respond with ONLY a JSON object, no prose, exactly this shape:
{"is_analysis_request": true, "symbol": "BTCUSDT", "market": "spot", "confidence": 0.9}

Rules:
- "symbol" is the full exchange ticker including the quote currency
  (e.g. "BTCUSDT"), uppercase. Use null when no instrument is identifiable.
- "market" is "spot" or "derivatives"; pick "spot" unless futures or
  perpetuals are clearly meant.
- "confidence" is your certainty in [0, 1]."#;

pub struct IntentClassifier {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl IntentClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            options: GenerationOptions::deterministic(model),
        }
    }

    /// First-pass classification on the raw text alone.
    pub async fn classify(&self, text: &str) -> Result<ResolutionVerdict> {
        self.classify_inner(text, None).await
    }

    /// Second-pass classification with real candidate symbols as grounding
    /// context, so the model can only choose from tradable instruments.
    pub async fn classify_grounded(
        &self,
        text: &str,
        candidates: &[String],
    ) -> Result<ResolutionVerdict> {
        self.classify_inner(text, Some(candidates)).await
    }

    async fn classify_inner(
        &self,
        text: &str,
        candidates: Option<&[String]>,
    ) -> Result<ResolutionVerdict> {
        if text.trim().is_empty() {
            // Nothing to classify; no external call.
            return Ok(ResolutionVerdict::not_analysis(1.0));
        }

        let mut system = CLASSIFY_SYSTEM_PROMPT.to_string();
        if let Some(candidates) = candidates {
            if candidates.is_empty() {
                tracing::warn!("grounded classification requested with no candidates");
            } else {
                system.push_str(
                    "\n\nThe symbol MUST be one of the following tradable instruments, or null if none matches:\n",
                );
                system.push_str(&candidates.join(", "));
            }
        }

        let messages = [Message::system(system), Message::user(text)];
        let completion = self.provider.complete(&messages, &self.options).await?;

        Ok(parse_verdict(&completion.content))
    }
}

/// Decode a classifier payload, degrading instead of failing.
fn parse_verdict(content: &str) -> ResolutionVerdict {
    let Some(span) = extract_json_object(content) else {
        tracing::warn!("classifier payload contains no JSON object");
        return ResolutionVerdict::degraded("no JSON object in classifier payload");
    };

    let raw: RawVerdict = match serde_json::from_str(span) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "classifier payload failed to decode");
            return ResolutionVerdict::degraded(format!("undecodable classifier payload: {e}"));
        }
    };

    let Some(is_analysis_request) = raw.is_analysis_request else {
        return ResolutionVerdict::degraded("classifier payload missing is_analysis_request");
    };

    let confidence = raw.confidence.unwrap_or(0.5);
    if !is_analysis_request {
        return ResolutionVerdict::not_analysis(confidence);
    }

    let symbol = raw
        .symbol
        .map(|s| s.trim().to_uppercase())
        .filter(|s| is_valid_symbol(s));
    let market = parse_market(raw.market.as_deref());

    ResolutionVerdict::analysis(symbol, market, confidence)
}

fn parse_market(raw: Option<&str>) -> MarketType {
    match raw.map(str::to_lowercase).as_deref() {
        Some("derivatives" | "futures" | "perp" | "perpetual") => MarketType::Derivatives,
        _ => MarketType::Spot,
    }
}

/// Locate the first balanced `{...}` span, tolerating fenced-code wrapping
/// and surrounding prose.
fn extract_json_object(content: &str) -> Option<&str> {
    // Strip an optional ``` fence so the brace scan sees only the body.
    let body = match content.find("```") {
        Some(start) => {
            let after = &content[start + 3..];
            let after = after.strip_prefix("json").unwrap_or(after);
            match after.find("```") {
                Some(end) => &after[..end],
                None => after,
            }
        }
        None => content,
    };

    let start = body.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in body[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    is_analysis_request: Option<bool>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}
