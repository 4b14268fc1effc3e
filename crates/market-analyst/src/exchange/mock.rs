//! Mock Market Data Source
//!
//! For testing and demos. Universes, probe outcomes and failures are
//! scripted up front; probe calls are recorded so tests can assert how the
//! resolver walked the validation path.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;

use super::MarketDataSource;
use crate::error::{AnalystError, Result};
use crate::model::{Kline, KlineSeries, MarketType};

/// Scripted market data source.
pub struct MockMarketData {
    spot: HashSet<String>,
    derivatives: HashSet<String>,
    catalog_failures: HashSet<MarketType>,
    probe_errors: HashSet<(String, MarketType)>,
    series_failures: HashSet<String>,
    probe_log: Mutex<Vec<(String, MarketType)>>,
    catalog_calls: Mutex<usize>,
}

impl Default for MockMarketData {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            spot: HashSet::new(),
            derivatives: HashSet::new(),
            catalog_failures: HashSet::new(),
            probe_errors: HashSet::new(),
            series_failures: HashSet::new(),
            probe_log: Mutex::new(Vec::new()),
            catalog_calls: Mutex::new(0),
        }
    }

    pub fn with_spot<I: IntoIterator<Item = S>, S: Into<String>>(mut self, symbols: I) -> Self {
        self.spot = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_derivatives<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        symbols: I,
    ) -> Self {
        self.derivatives = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Make the catalog call for one venue fail with a transport error.
    pub fn with_catalog_failure(mut self, market: MarketType) -> Self {
        self.catalog_failures.insert(market);
        self
    }

    /// Make the existence probe for one pair fail with a transport error
    /// (instead of answering yes/no).
    pub fn with_probe_error(mut self, symbol: impl Into<String>, market: MarketType) -> Self {
        self.probe_errors.insert((symbol.into(), market));
        self
    }

    /// Make every series fetch for one symbol fail with a transport error.
    pub fn with_series_failure(mut self, symbol: impl Into<String>) -> Self {
        self.series_failures.insert(symbol.into());
        self
    }

    fn universe(&self, market: MarketType) -> &HashSet<String> {
        match market {
            MarketType::Spot => &self.spot,
            MarketType::Derivatives => &self.derivatives,
        }
    }

    /// Probes issued so far, in order.
    pub fn probes(&self) -> Vec<(String, MarketType)> {
        self.probe_log.lock().unwrap().clone()
    }

    /// Catalog calls issued so far.
    pub fn catalog_call_count(&self) -> usize {
        *self.catalog_calls.lock().unwrap()
    }

    /// Total external calls issued so far.
    pub fn total_calls(&self) -> usize {
        self.catalog_call_count() + self.probe_log.lock().unwrap().len()
    }
}

#[async_trait]
impl MarketDataSource for MockMarketData {
    async fn list_tradable_symbols(&self, market: MarketType) -> Result<HashSet<String>> {
        *self.catalog_calls.lock().unwrap() += 1;
        if self.catalog_failures.contains(&market) {
            return Err(AnalystError::Exchange(format!(
                "scripted catalog failure for {market}"
            )));
        }
        Ok(self.universe(market).clone())
    }

    async fn probe_existence(&self, symbol: &str, market: MarketType) -> Result<bool> {
        self.probe_log
            .lock()
            .unwrap()
            .push((symbol.to_string(), market));
        if self.probe_errors.contains(&(symbol.to_string(), market)) {
            return Err(AnalystError::Exchange(format!(
                "scripted probe failure for {symbol} ({market})"
            )));
        }
        Ok(self.universe(market).contains(symbol))
    }

    async fn fetch_series(
        &self,
        symbol: &str,
        market: MarketType,
        intervals: &[String],
        limit: u32,
    ) -> Result<Vec<KlineSeries>> {
        if self.series_failures.contains(symbol) || !self.universe(market).contains(symbol) {
            return Err(AnalystError::Exchange(format!(
                "no data for {symbol} ({market})"
            )));
        }
        let count = limit.min(3) as usize;
        Ok(intervals
            .iter()
            .map(|interval| KlineSeries {
                interval: interval.clone(),
                klines: (0..count)
                    .map(|i| Kline {
                        open_time: Utc::now(),
                        open: dec!(100) + rust_decimal::Decimal::from(i),
                        high: dec!(110) + rust_decimal::Decimal::from(i),
                        low: dec!(95) + rust_decimal::Decimal::from(i),
                        close: dec!(105) + rust_decimal::Decimal::from(i),
                        volume: dec!(1000),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        true // Mock always healthy
    }

    fn name(&self) -> &str {
        "MockMarketData"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_answers_from_universe() {
        let mock = MockMarketData::new().with_spot(["BTCUSDT"]);
        assert!(mock
            .probe_existence("BTCUSDT", MarketType::Spot)
            .await
            .unwrap());
        assert!(!mock
            .probe_existence("BTCUSDT", MarketType::Derivatives)
            .await
            .unwrap());
        assert_eq!(mock.probes().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_probe_error() {
        let mock = MockMarketData::new()
            .with_spot(["BTCUSDT"])
            .with_probe_error("BTCUSDT", MarketType::Spot);
        assert!(mock
            .probe_existence("BTCUSDT", MarketType::Spot)
            .await
            .is_err());
    }
}
