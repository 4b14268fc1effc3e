//! Pair Resolution
//!
//! The central state machine turning free text into a verified instrument:
//! first-pass classification, existence validation with cross-market
//! correction, and a grounded second pass over the real candidate list when
//! the first pass is ambiguous. Every path downstream of the first
//! classification call degrades to a verdict instead of failing; the caller
//! always gets an answer it can act on.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::Result;
use crate::intent::IntentClassifier;
use crate::model::{InstrumentUniverse, MarketType, ResolutionVerdict};
use crate::registry::InstrumentRegistry;
use crate::validator::ExistenceValidator;

/// Resolution tunables.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// Per-probe timeout for existence validation.
    pub probe_timeout: Duration,

    /// Quote currency whose pairs dominate the grounding list.
    pub dominant_quote: String,

    /// Cap on the grounded candidate list handed to the second pass.
    /// Truncation keeps the dominant-quote group intact before admitting
    /// any secondary symbols.
    pub grounding_limit: usize,

    /// Venue chosen when a symbol trades on both.
    pub ambiguous_market: MarketType,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            dominant_quote: "USDT".into(),
            grounding_limit: 2000,
            ambiguous_market: MarketType::Spot,
        }
    }
}

impl ResolverConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let probe_timeout = std::env::var("ANALYST_PROBE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.probe_timeout, Duration::from_secs);

        let dominant_quote =
            std::env::var("ANALYST_DOMINANT_QUOTE").unwrap_or(defaults.dominant_quote);

        let grounding_limit = std::env::var("ANALYST_GROUNDING_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.grounding_limit);

        let ambiguous_market = match std::env::var("ANALYST_AMBIGUOUS_MARKET").as_deref() {
            Ok("derivatives") => MarketType::Derivatives,
            _ => defaults.ambiguous_market,
        };

        Self {
            probe_timeout,
            dominant_quote,
            grounding_limit,
            ambiguous_market,
        }
    }
}

pub struct PairResolver {
    classifier: IntentClassifier,
    registry: InstrumentRegistry,
    validator: ExistenceValidator,
    config: ResolverConfig,
}

impl PairResolver {
    pub fn new(
        classifier: IntentClassifier,
        registry: InstrumentRegistry,
        validator: ExistenceValidator,
        config: ResolverConfig,
    ) -> Self {
        Self {
            classifier,
            registry,
            validator,
            config,
        }
    }

    /// Resolve free text into a final verdict.
    ///
    /// Total for every input: the only error that propagates is a transport
    /// failure of the very first classification call. Everything after that
    /// degrades into the verdict itself.
    pub async fn resolve(&self, text: &str) -> Result<ResolutionVerdict> {
        let first = self.classifier.classify(text).await?;
        if !first.is_analysis_request {
            return Ok(first);
        }

        if let Some(symbol) = first.symbol.clone() {
            let outcome = self.validator.validate(&symbol, first.market).await;
            if outcome.valid {
                return Ok(first.with_market(outcome.confirmed));
            }
            tracing::debug!(%symbol, "first-pass symbol failed validation, trying grounded pass");
        }

        Ok(self.second_pass(text, &first).await)
    }

    /// Grounded second pass: re-classify against the live candidate list.
    async fn second_pass(&self, text: &str, first: &ResolutionVerdict) -> ResolutionVerdict {
        let universe = self.registry.fetch_universe_lenient().await;
        let candidates = grounding_candidates(&universe, &self.config);
        if candidates.is_empty() {
            tracing::warn!("no grounding candidates available, asking the model cold");
        }

        let second = match self.classifier.classify_grounded(text, &candidates).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "grounded classification failed");
                return ResolutionVerdict::unresolved(first.confidence)
                    .with_transport_error(e.to_string());
            }
        };

        let Some(symbol) = second.symbol.clone() else {
            // Keep the analysis intent the first pass established.
            let mut verdict =
                ResolutionVerdict::unresolved(first.confidence.max(second.confidence));
            if let Some(detail) = second.transport_error {
                verdict = verdict.with_transport_error(detail);
            }
            return verdict;
        };

        let guess = self
            .registry
            .preferred_market(universe.membership_of(&symbol))
            .unwrap_or(second.market);

        let outcome = self.validator.validate(&symbol, guess).await;
        if outcome.valid {
            ResolutionVerdict::analysis(Some(symbol), outcome.confirmed, second.confidence)
        } else {
            tracing::debug!(%symbol, "second-pass symbol failed validation, unresolvable");
            ResolutionVerdict::unresolved(second.confidence)
        }
    }
}

/// Build the grounded candidate list: dominant-quote pairs first,
/// alphabetical within each group, size-capped with the dominant group kept
/// intact before the secondary group gets any room.
fn grounding_candidates(universe: &InstrumentUniverse, config: &ResolverConfig) -> Vec<String> {
    let mut dominant = BTreeSet::new();
    let mut secondary = BTreeSet::new();
    for symbol in universe.spot.iter().chain(universe.derivatives.iter()) {
        if symbol.ends_with(&config.dominant_quote) {
            dominant.insert(symbol.clone());
        } else {
            secondary.insert(symbol.clone());
        }
    }

    let mut candidates: Vec<String> = dominant
        .into_iter()
        .take(config.grounding_limit)
        .collect();
    let remaining = config.grounding_limit.saturating_sub(candidates.len());
    candidates.extend(secondary.into_iter().take(remaining));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::exchange::{MarketDataSource, MockMarketData};
    use crate::testutil::ScriptedProvider;

    fn resolver(
        provider: &Arc<ScriptedProvider>,
        source: &Arc<MockMarketData>,
        config: ResolverConfig,
    ) -> PairResolver {
        let data = Arc::clone(source) as Arc<dyn MarketDataSource>;
        PairResolver::new(
            IntentClassifier::new(Arc::clone(provider) as _, "test-model"),
            InstrumentRegistry::new(Arc::clone(&data), config.ambiguous_market),
            ExistenceValidator::new(data, config.probe_timeout),
            config,
        )
    }

    #[tokio::test]
    async fn test_empty_input_resolves_with_zero_external_calls() {
        let provider = Arc::new(ScriptedProvider::new());
        let source = Arc::new(MockMarketData::new());
        let resolver = resolver(&provider, &source, ResolverConfig::default());

        let verdict = resolver.resolve("").await.unwrap();
        assert!(!verdict.is_analysis_request);
        assert!(verdict.symbol.is_none());
        assert_eq!(verdict.confidence, 1.0);
        assert_eq!(provider.call_count(), 0);
        assert_eq!(source.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_valid_first_pass_skips_second_pass() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completion(
            r#"{"is_analysis_request": true, "symbol": "BTCUSDT", "market": "spot", "confidence": 0.95}"#,
        );
        let source = Arc::new(MockMarketData::new().with_spot(["BTCUSDT"]));
        let resolver = resolver(&provider, &source, ResolverConfig::default());

        let verdict = resolver.resolve("analyze bitcoin").await.unwrap();
        assert_eq!(verdict.symbol.as_deref(), Some("BTCUSDT"));
        assert_eq!(verdict.market, MarketType::Spot);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(source.catalog_call_count(), 0);
        assert_eq!(source.probes().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_market_guess_corrected_by_probe() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completion(
            r#"{"is_analysis_request": true, "symbol": "BTCUSDT", "market": "spot", "confidence": 0.9}"#,
        );
        let source = Arc::new(MockMarketData::new().with_derivatives(["BTCUSDT"]));
        let resolver = resolver(&provider, &source, ResolverConfig::default());

        let verdict = resolver.resolve("analyze btc perps").await.unwrap();
        assert_eq!(verdict.symbol.as_deref(), Some("BTCUSDT"));
        assert_eq!(verdict.market, MarketType::Derivatives);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_symbol_goes_straight_to_grounded_pass() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completion(r#"{"is_analysis_request": true, "symbol": null, "confidence": 0.7}"#);
        provider.push_completion(r#"{"is_analysis_request": true, "symbol": "NEARUSDT", "confidence": 0.85}"#);
        let source = Arc::new(
            MockMarketData::new()
                .with_spot(["BTCUSDT", "NEARUSDT"])
                .with_derivatives(["BTCUSDT"]),
        );
        let resolver = resolver(&provider, &source, ResolverConfig::default());

        let verdict = resolver.resolve("what about near?").await.unwrap();
        assert_eq!(verdict.symbol.as_deref(), Some("NEARUSDT"));
        assert_eq!(verdict.market, MarketType::Spot);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(source.catalog_call_count(), 2);

        // The grounded prompt carried the real candidates.
        let grounded_system = &provider.requests()[1][0].content;
        assert!(grounded_system.contains("NEARUSDT"));
    }

    #[tokio::test]
    async fn test_invalid_first_pass_symbol_recovered_by_second_pass() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completion(
            r#"{"is_analysis_request": true, "symbol": "BTCUSD", "market": "spot", "confidence": 0.6}"#,
        );
        provider.push_completion(
            r#"{"is_analysis_request": true, "symbol": "BTCUSDT", "market": "spot", "confidence": 0.9}"#,
        );
        let source = Arc::new(MockMarketData::new().with_spot(["BTCUSDT"]));
        let resolver = resolver(&provider, &source, ResolverConfig::default());

        let verdict = resolver.resolve("analyze btcusd").await.unwrap();
        assert_eq!(verdict.symbol.as_deref(), Some("BTCUSDT"));
        // BTCUSD probed on both venues, then the grounded symbol once.
        assert_eq!(source.probes().len(), 3);
    }

    #[tokio::test]
    async fn test_second_pass_failure_degrades_to_unresolved() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completion(r#"{"is_analysis_request": true, "symbol": null, "confidence": 0.8}"#);
        provider.push_error("upstream 503");
        let source = Arc::new(MockMarketData::new().with_spot(["BTCUSDT"]));
        let resolver = resolver(&provider, &source, ResolverConfig::default());

        let verdict = resolver.resolve("analyze something").await.unwrap();
        assert!(verdict.is_analysis_request);
        assert!(verdict.symbol.is_none());
        assert!(verdict.had_transport_error());
    }

    #[tokio::test]
    async fn test_second_pass_invalid_symbol_is_unresolvable() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completion(r#"{"is_analysis_request": true, "symbol": null, "confidence": 0.8}"#);
        provider.push_completion(r#"{"is_analysis_request": true, "symbol": "GHOSTUSDT", "confidence": 0.5}"#);
        let source = Arc::new(MockMarketData::new().with_spot(["BTCUSDT"]));
        let resolver = resolver(&provider, &source, ResolverConfig::default());

        let verdict = resolver.resolve("analyze ghost").await.unwrap();
        assert!(verdict.is_analysis_request);
        assert!(verdict.symbol.is_none());
        assert!(!verdict.had_transport_error());
    }

    #[tokio::test]
    async fn test_registry_outage_still_resolves_ungrounded() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completion(r#"{"is_analysis_request": true, "symbol": null, "confidence": 0.7}"#);
        provider.push_completion(r#"{"is_analysis_request": true, "symbol": "BTCUSDT", "confidence": 0.6}"#);
        let source = Arc::new(
            MockMarketData::new()
                .with_spot(["BTCUSDT"])
                .with_catalog_failure(MarketType::Spot)
                .with_catalog_failure(MarketType::Derivatives),
        );
        let resolver = resolver(&provider, &source, ResolverConfig::default());

        let verdict = resolver.resolve("analyze btc").await.unwrap();
        // No grounding available, but the cold second pass still resolved.
        assert_eq!(verdict.symbol.as_deref(), Some("BTCUSDT"));
    }

    #[tokio::test]
    async fn test_first_classification_transport_failure_propagates() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error("connection refused");
        let source = Arc::new(MockMarketData::new());
        let resolver = resolver(&provider, &source, ResolverConfig::default());

        assert!(resolver.resolve("analyze btc").await.is_err());
    }

    #[test]
    fn test_grounding_list_ordering_and_truncation() {
        let universe = InstrumentUniverse::new(
            ["ETHUSDT".to_string(), "ADABTC".to_string(), "BTCUSDT".to_string()].into(),
            ["SOLUSDT".to_string(), "XMRBTC".to_string()].into(),
        );

        let config = ResolverConfig::default();
        let all = grounding_candidates(&universe, &config);
        assert_eq!(all, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT", "ADABTC", "XMRBTC"]);

        // Truncation never evicts dominant-quote pairs for secondary ones.
        let capped = grounding_candidates(
            &universe,
            &ResolverConfig {
                grounding_limit: 4,
                ..ResolverConfig::default()
            },
        );
        assert_eq!(capped, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT", "ADABTC"]);
    }
}
