//! Instrument Registry
//!
//! Read-only view over the two instrument universes. The two catalog calls
//! race concurrently and fail independently; callers choose between the
//! strict fetch (both sides required) and the lenient one (a failed side
//! degrades to an empty set).

use std::sync::Arc;

use crate::error::{AnalystError, Result};
use crate::exchange::MarketDataSource;
use crate::model::{InstrumentUniverse, MarketType, Membership};

pub struct InstrumentRegistry {
    source: Arc<dyn MarketDataSource>,

    /// Venue chosen when a symbol trades on both.
    ambiguous_market: MarketType,
}

impl InstrumentRegistry {
    pub fn new(source: Arc<dyn MarketDataSource>, ambiguous_market: MarketType) -> Self {
        Self {
            source,
            ambiguous_market,
        }
    }

    /// Fetch both universes; fails if either catalog call fails.
    pub async fn fetch_universe(&self) -> Result<InstrumentUniverse> {
        let (spot, derivatives) = tokio::join!(
            self.source.list_tradable_symbols(MarketType::Spot),
            self.source.list_tradable_symbols(MarketType::Derivatives),
        );
        match (spot, derivatives) {
            (Ok(spot), Ok(derivatives)) => Ok(InstrumentUniverse::new(spot, derivatives)),
            (Err(e), _) | (_, Err(e)) => {
                Err(AnalystError::RegistryUnavailable(e.to_string()))
            }
        }
    }

    /// Fetch both universes, tolerating partial failure: a side whose
    /// catalog call failed comes back empty ("no candidates on that side").
    pub async fn fetch_universe_lenient(&self) -> InstrumentUniverse {
        let (spot, derivatives) = tokio::join!(
            self.source.list_tradable_symbols(MarketType::Spot),
            self.source.list_tradable_symbols(MarketType::Derivatives),
        );
        let spot = spot.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "spot catalog unavailable, continuing without it");
            Default::default()
        });
        let derivatives = derivatives.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "derivatives catalog unavailable, continuing without it");
            Default::default()
        });
        InstrumentUniverse::new(spot, derivatives)
    }

    /// Map a membership to the venue a probe should try first.
    ///
    /// The `Both` tie-break is policy, not a fixed rule: it comes from
    /// configuration (spot by default).
    pub fn preferred_market(&self, membership: Membership) -> Option<MarketType> {
        match membership {
            Membership::SpotOnly => Some(MarketType::Spot),
            Membership::DerivativesOnly => Some(MarketType::Derivatives),
            Membership::Both => Some(self.ambiguous_market),
            Membership::Neither => None,
        }
    }
}
