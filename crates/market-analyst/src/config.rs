//! Analyst Configuration
//!
//! Every tunable of the pipeline lives here so operational policy is never
//! hard-coded in the components that apply it.

use crate::resolver::ResolverConfig;

/// Top-level configuration for the analysis pipeline.
#[derive(Clone, Debug)]
pub struct AnalystConfig {
    /// Global ceiling on concurrently running analyses.
    pub max_concurrent: usize,

    /// Model identifier passed to the LLM provider.
    pub model: String,

    /// Kline granularities embedded as analysis context.
    pub kline_intervals: Vec<String>,

    /// Candles fetched per granularity.
    pub kline_limit: u32,

    /// Resolution tunables (probe timeout, grounding caps, ambiguity policy).
    pub resolver: ResolverConfig,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            model: "llama3.2".into(),
            kline_intervals: vec!["1h".into(), "4h".into(), "1d".into()],
            kline_limit: 100,
            resolver: ResolverConfig::default(),
        }
    }
}

impl AnalystConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_concurrent = std::env::var("ANALYST_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_concurrent);

        let model = std::env::var("ANALYST_MODEL").unwrap_or(defaults.model);

        let kline_intervals = std::env::var("ANALYST_KLINE_INTERVALS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.kline_intervals);

        let kline_limit = std::env::var("ANALYST_KLINE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.kline_limit);

        Self {
            max_concurrent,
            model,
            kline_intervals,
            kline_limit,
            resolver: ResolverConfig::from_env(),
        }
    }
}
