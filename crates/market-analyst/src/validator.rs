//! Existence Validator
//!
//! Classifying "is this spot or derivatives" from free text is inherently
//! fuzzy; a cheap existence probe is a reliable oracle. The probe result
//! always has the final word over a model-guessed market type.

use std::sync::Arc;
use std::time::Duration;

use crate::exchange::MarketDataSource;
use crate::model::MarketType;

/// Result of validating a candidate pair.
#[derive(Clone, Copy, Debug)]
pub struct ValidationOutcome {
    pub valid: bool,

    /// The venue the pair actually trades on. Meaningful only when `valid`.
    pub confirmed: MarketType,
}

pub struct ExistenceValidator {
    source: Arc<dyn MarketDataSource>,
    probe_timeout: Duration,
}

impl ExistenceValidator {
    pub fn new(source: Arc<dyn MarketDataSource>, probe_timeout: Duration) -> Self {
        Self {
            source,
            probe_timeout,
        }
    }

    /// Confirm `(symbol, guess)`, falling back to the other venue.
    ///
    /// A probe timeout or transport error counts as a failed probe for that
    /// venue, never as a fatal error for the call.
    pub async fn validate(&self, symbol: &str, guess: MarketType) -> ValidationOutcome {
        if self.probe(symbol, guess).await {
            return ValidationOutcome {
                valid: true,
                confirmed: guess,
            };
        }

        let other = guess.other();
        if self.probe(symbol, other).await {
            tracing::debug!(%symbol, guessed = %guess, confirmed = %other, "market type corrected by probe");
            return ValidationOutcome {
                valid: true,
                confirmed: other,
            };
        }

        ValidationOutcome {
            valid: false,
            confirmed: guess,
        }
    }

    async fn probe(&self, symbol: &str, market: MarketType) -> bool {
        match tokio::time::timeout(
            self.probe_timeout,
            self.source.probe_existence(symbol, market),
        )
        .await
        {
            Ok(Ok(exists)) => exists,
            Ok(Err(e)) => {
                tracing::debug!(%symbol, %market, error = %e, "existence probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(%symbol, %market, "existence probe timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockMarketData;

    fn validator(mock: MockMarketData) -> (Arc<MockMarketData>, ExistenceValidator) {
        let source = Arc::new(mock);
        let validator = ExistenceValidator::new(
            Arc::clone(&source) as Arc<dyn MarketDataSource>,
            Duration::from_secs(3),
        );
        (source, validator)
    }

    #[tokio::test]
    async fn test_correct_guess_needs_one_probe() {
        let (source, validator) = validator(MockMarketData::new().with_spot(["BTCUSDT"]));
        let outcome = validator.validate("BTCUSDT", MarketType::Spot).await;
        assert!(outcome.valid);
        assert_eq!(outcome.confirmed, MarketType::Spot);
        assert_eq!(source.probes().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_guess_corrected_transparently() {
        let (source, validator) = validator(MockMarketData::new().with_derivatives(["BTCUSDT"]));
        let outcome = validator.validate("BTCUSDT", MarketType::Spot).await;
        assert!(outcome.valid);
        assert_eq!(outcome.confirmed, MarketType::Derivatives);
        assert_eq!(source.probes().len(), 2);
    }

    #[tokio::test]
    async fn test_spot_priority_for_spot_only_symbol() {
        // Probe success on spot has the final word whatever was guessed.
        let (_, validator) = validator(MockMarketData::new().with_spot(["NEARUSDT"]));
        for guess in [MarketType::Spot, MarketType::Derivatives] {
            let outcome = validator.validate("NEARUSDT", guess).await;
            assert!(outcome.valid);
            assert_eq!(outcome.confirmed, MarketType::Spot);
        }
    }

    #[tokio::test]
    async fn test_both_probes_fail() {
        let (source, validator) = validator(MockMarketData::new());
        let outcome = validator.validate("FAKEUSDT", MarketType::Spot).await;
        assert!(!outcome.valid);
        assert_eq!(source.probes().len(), 2);
    }

    #[tokio::test]
    async fn test_probe_transport_error_triggers_fallback() {
        let (source, validator) = validator(
            MockMarketData::new()
                .with_spot(["BTCUSDT"])
                .with_derivatives(["BTCUSDT"])
                .with_probe_error("BTCUSDT", MarketType::Spot),
        );
        let outcome = validator.validate("BTCUSDT", MarketType::Spot).await;
        assert!(outcome.valid);
        assert_eq!(outcome.confirmed, MarketType::Derivatives);
        assert_eq!(source.probes().len(), 2);
    }
}
