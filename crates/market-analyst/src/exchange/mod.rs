//! Exchange Integration
//!
//! Abstractions and implementations for the market-data collaborators: the
//! catalog of tradable instruments, the minimal existence probe, and kline
//! retrieval.

mod binance;
mod mock;

pub use binance::{BinanceClient, BinanceConfig};
pub use mock::MockMarketData;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{KlineSeries, MarketType};

/// Market data source trait (Strategy pattern)
///
/// Implement this for each exchange backend.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// List every currently tradable symbol on one venue.
    ///
    /// Must be safe to call twice concurrently (the registry fans out one
    /// call per venue).
    async fn list_tradable_symbols(&self, market: MarketType) -> Result<HashSet<String>>;

    /// Minimal existence probe: does `(symbol, market)` trade at all?
    ///
    /// `Ok(false)` means the venue answered and the pair does not exist;
    /// `Err` means the venue could not be asked.
    async fn probe_existence(&self, symbol: &str, market: MarketType) -> Result<bool>;

    /// Fetch candle series for the given granularities.
    async fn fetch_series(
        &self,
        symbol: &str,
        market: MarketType,
        intervals: &[String],
        limit: u32,
    ) -> Result<Vec<KlineSeries>>;

    /// Check if the exchange is reachable.
    async fn health_check(&self) -> bool;

    /// Exchange name
    fn name(&self) -> &str;
}
