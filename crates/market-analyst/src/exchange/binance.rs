//! Binance Market Data Client
//!
//! Spot endpoints live under `api.binance.com/api/v3`, USDT-margined
//! derivatives under `fapi.binance.com/fapi/v1`. The catalog is the
//! exchange-info listing filtered to TRADING status; the existence probe is
//! the cheapest possible kline request (one candle).

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::MarketDataSource;
use crate::error::{AnalystError, Result};
use crate::model::{Kline, KlineSeries, MarketType};

/// Binance connection configuration
#[derive(Clone, Debug)]
pub struct BinanceConfig {
    /// Spot API base URL
    pub spot_base: String,

    /// Derivatives (USDT-margined futures) API base URL
    pub derivatives_base: String,

    /// Timeout for catalog requests
    pub catalog_timeout: Duration,

    /// Timeout for kline requests
    pub kline_timeout: Duration,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            spot_base: "https://api.binance.com".into(),
            derivatives_base: "https://fapi.binance.com".into(),
            catalog_timeout: Duration::from_secs(10),
            kline_timeout: Duration::from_secs(5),
        }
    }
}

/// Binance implementation of `MarketDataSource`
pub struct BinanceClient {
    http: reqwest::Client,
    config: BinanceConfig,
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BinanceClient {
    pub fn new() -> Self {
        Self::from_config(BinanceConfig::default())
    }

    pub fn from_config(config: BinanceConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn base(&self, market: MarketType) -> &str {
        match market {
            MarketType::Spot => &self.config.spot_base,
            MarketType::Derivatives => &self.config.derivatives_base,
        }
    }

    fn kline_url(&self, market: MarketType) -> String {
        match market {
            MarketType::Spot => format!("{}/api/v3/klines", self.config.spot_base),
            MarketType::Derivatives => format!("{}/fapi/v1/klines", self.config.derivatives_base),
        }
    }

    fn exchange_info_url(&self, market: MarketType) -> String {
        match market {
            MarketType::Spot => format!("{}/api/v3/exchangeInfo", self.config.spot_base),
            MarketType::Derivatives => {
                format!("{}/fapi/v1/exchangeInfo", self.config.derivatives_base)
            }
        }
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        market: MarketType,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>> {
        let limit = limit.to_string();
        let response = self
            .http
            .get(self.kline_url(market))
            .query(&[
                ("symbol", symbol),
                ("interval", interval),
                ("limit", limit.as_str()),
            ])
            .timeout(self.config.kline_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AnalystError::Exchange(format!(
                "kline request for {symbol} ({market}, {interval}) returned {}",
                response.status()
            )));
        }

        let rows: Vec<Vec<serde_json::Value>> = response.json().await?;
        rows.iter().map(|row| parse_kline(row)).collect()
    }
}

/// One row of the kline payload: `[openTime, open, high, low, close,
/// volume, ...]` with prices as decimal strings.
fn parse_kline(row: &[serde_json::Value]) -> Result<Kline> {
    if row.len() < 6 {
        return Err(AnalystError::Exchange(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let open_time_ms = row[0]
        .as_i64()
        .ok_or_else(|| AnalystError::Exchange("kline open time is not an integer".into()))?;
    let open_time = Utc
        .timestamp_millis_opt(open_time_ms)
        .single()
        .ok_or_else(|| AnalystError::Exchange("kline open time out of range".into()))?;

    let decimal_at = |idx: usize, field: &str| -> Result<Decimal> {
        let raw = row[idx]
            .as_str()
            .ok_or_else(|| AnalystError::Exchange(format!("kline {field} is not a string")))?;
        Decimal::from_str(raw)
            .map_err(|e| AnalystError::Exchange(format!("kline {field} {raw:?}: {e}")))
    };

    Ok(Kline {
        open_time,
        open: decimal_at(1, "open")?,
        high: decimal_at(2, "high")?,
        low: decimal_at(3, "low")?,
        close: decimal_at(4, "close")?,
        volume: decimal_at(5, "volume")?,
    })
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    status: String,
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn list_tradable_symbols(&self, market: MarketType) -> Result<HashSet<String>> {
        let response = self
            .http
            .get(self.exchange_info_url(market))
            .timeout(self.config.catalog_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AnalystError::Exchange(format!(
                "exchange info for {market} returned {}",
                response.status()
            )));
        }

        let info: ExchangeInfo = response.json().await?;
        Ok(info
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING")
            .map(|s| s.symbol)
            .collect())
    }

    async fn probe_existence(&self, symbol: &str, market: MarketType) -> Result<bool> {
        let response = self
            .http
            .get(self.kline_url(market))
            .query(&[("symbol", symbol), ("interval", "1m"), ("limit", "1")])
            .timeout(self.config.kline_timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            // An empty candle array still means the pair is not live.
            let rows: Vec<serde_json::Value> = response.json().await?;
            return Ok(!rows.is_empty());
        }
        if status.is_client_error() {
            // Unknown symbol: the venue answered, the pair does not exist.
            return Ok(false);
        }
        Err(AnalystError::Exchange(format!(
            "existence probe for {symbol} ({market}) returned {status}"
        )))
    }

    async fn fetch_series(
        &self,
        symbol: &str,
        market: MarketType,
        intervals: &[String],
        limit: u32,
    ) -> Result<Vec<KlineSeries>> {
        let mut series = Vec::with_capacity(intervals.len());
        for interval in intervals {
            match self.fetch_klines(symbol, market, interval, limit).await {
                Ok(klines) => series.push(KlineSeries {
                    interval: interval.clone(),
                    klines,
                }),
                Err(e) => {
                    tracing::warn!(%symbol, %interval, error = %e, "skipping failed granularity");
                }
            }
        }
        if series.is_empty() {
            return Err(AnalystError::Exchange(format!(
                "no kline granularity could be fetched for {symbol} ({market})"
            )));
        }
        Ok(series)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/v3/ping", self.config.spot_base);
        match self.http.get(url).timeout(Duration::from_secs(3)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "Binance health check failed");
                false
            }
        }
    }

    fn name(&self) -> &str {
        "Binance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_kline_row() {
        let row = vec![
            json!(1700000000000_i64),
            json!("35000.10"),
            json!("35500.00"),
            json!("34800.00"),
            json!("35250.55"),
            json!("1234.5"),
            json!(1700003599999_i64),
        ];
        let kline = parse_kline(&row).unwrap();
        assert_eq!(kline.open.to_string(), "35000.10");
        assert_eq!(kline.close.to_string(), "35250.55");
        assert_eq!(kline.open_time.timestamp_millis(), 1700000000000);
    }

    #[test]
    fn test_parse_kline_rejects_short_row() {
        let row = vec![json!(1700000000000_i64), json!("1.0")];
        assert!(parse_kline(&row).is_err());
    }

    #[test]
    fn test_urls_split_by_market() {
        let client = BinanceClient::new();
        assert!(client.kline_url(MarketType::Spot).contains("/api/v3/"));
        assert!(client
            .kline_url(MarketType::Derivatives)
            .contains("/fapi/v1/"));
        assert!(client
            .exchange_info_url(MarketType::Derivatives)
            .starts_with("https://fapi.binance.com"));
    }
}
