//! Analysis Orchestration
//!
//! The request-level sequence tying admission, resolution, market data
//! retrieval and streaming delivery together. One call, one conversation,
//! one admission slot held for exactly the duration of the attempt.

use std::sync::Arc;

use agent_core::{GenerationOptions, LlmProvider, Message};
use async_trait::async_trait;
use futures::StreamExt;

use crate::admission::AdmissionGate;
use crate::config::AnalystConfig;
use crate::error::Result;
use crate::exchange::MarketDataSource;
use crate::intent::IntentClassifier;
use crate::model::{ConversationId, KlineSeries, MarketType, ResolutionVerdict, StreamSegment};
use crate::registry::InstrumentRegistry;
use crate::resolver::PairResolver;
use crate::segmenter::{segment_stream, SegmentMarkers};
use crate::validator::ExistenceValidator;
use crate::ANALYST_PROMPT;

/// Where finished segments go.
///
/// Fire-and-forget from the core's perspective: a sink that cannot deliver
/// logs the problem itself instead of surfacing it here.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, conversation: &ConversationId, segment: &StreamSegment);
}

/// The four user-visible outcomes of one analysis attempt.
#[derive(Clone, Debug)]
pub enum AnalysisOutcome {
    /// The request was not asking for an analysis.
    NotAnalysisRequest { verdict: ResolutionVerdict },

    /// Analysis intent confirmed, but no tradable instrument could be
    /// resolved after both passes.
    InstrumentNotFound,

    /// Admission denied: too much concurrent load or this conversation
    /// already has an analysis in flight.
    Busy,

    /// The analysis ran; `segments_delivered` may be zero when the stream
    /// or the market data failed, in which case the result was truncated
    /// rather than surfaced as an error.
    Delivered {
        symbol: String,
        market: MarketType,
        segments_delivered: usize,
    },
}

pub struct Analyzer {
    provider: Arc<dyn LlmProvider>,
    source: Arc<dyn MarketDataSource>,
    resolver: PairResolver,
    gate: Arc<AdmissionGate>,
    markers: SegmentMarkers,
    config: AnalystConfig,
}

impl Analyzer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        source: Arc<dyn MarketDataSource>,
        config: AnalystConfig,
    ) -> Self {
        let classifier = IntentClassifier::new(Arc::clone(&provider), config.model.clone());
        let registry =
            InstrumentRegistry::new(Arc::clone(&source), config.resolver.ambiguous_market);
        let validator =
            ExistenceValidator::new(Arc::clone(&source), config.resolver.probe_timeout);
        let resolver = PairResolver::new(classifier, registry, validator, config.resolver.clone());

        Self {
            provider,
            source,
            resolver,
            gate: Arc::new(AdmissionGate::new(config.max_concurrent)),
            markers: SegmentMarkers::default(),
            config,
        }
    }

    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    /// Run one full analysis attempt for a conversation.
    ///
    /// The admission slot is held by an RAII ticket for the whole
    /// resolve+fetch+stream+deliver sequence; any early return or error
    /// releases it.
    pub async fn handle(
        &self,
        conversation: &ConversationId,
        text: &str,
        sink: &dyn DeliverySink,
    ) -> Result<AnalysisOutcome> {
        let _ticket = match AdmissionGate::acquire(&self.gate, conversation.clone()) {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::info!(%conversation, error = %e, "admission denied");
                return Ok(AnalysisOutcome::Busy);
            }
        };

        let verdict = self.resolver.resolve(text).await?;
        if !verdict.is_analysis_request {
            return Ok(AnalysisOutcome::NotAnalysisRequest { verdict });
        }
        let Some(symbol) = verdict.symbol.clone() else {
            return Ok(AnalysisOutcome::InstrumentNotFound);
        };
        let market = verdict.market;
        tracing::info!(%conversation, %symbol, %market, "pair resolved, fetching market data");

        let series = match self
            .source
            .fetch_series(
                &symbol,
                market,
                &self.config.kline_intervals,
                self.config.kline_limit,
            )
            .await
        {
            Ok(series) => series,
            Err(e) => {
                tracing::error!(%symbol, error = %e, "market data unavailable, truncating analysis");
                return Ok(AnalysisOutcome::Delivered {
                    symbol,
                    market,
                    segments_delivered: 0,
                });
            }
        };

        let prompt = build_analysis_prompt(&symbol, market, &series, &self.markers);
        let messages = [Message::system(ANALYST_PROMPT), Message::user(prompt)];
        let options = GenerationOptions {
            model: self.config.model.clone(),
            ..GenerationOptions::default()
        };

        let upstream = match self.provider.complete_stream(&messages, &options).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(%symbol, error = %e, "could not open analysis stream");
                return Ok(AnalysisOutcome::Delivered {
                    symbol,
                    market,
                    segments_delivered: 0,
                });
            }
        };

        let segments = segment_stream(upstream, self.markers.clone());
        futures::pin_mut!(segments);

        let mut delivered = 0usize;
        while let Some(segment) = segments.next().await {
            sink.deliver(conversation, &segment).await;
            delivered += 1;
        }
        tracing::info!(%conversation, %symbol, delivered, "analysis finished");

        Ok(AnalysisOutcome::Delivered {
            symbol,
            market,
            segments_delivered: delivered,
        })
    }
}

/// Embed the fetched candle context and the marker protocol into the user
/// prompt for the streaming call.
fn build_analysis_prompt(
    symbol: &str,
    market: MarketType,
    series: &[KlineSeries],
    markers: &SegmentMarkers,
) -> String {
    let mut prompt = format!("Analyze the {market} instrument {symbol}.\n\nCandle data:\n");
    for s in series {
        prompt.push_str(&format!("- {}\n", s.digest()));
        let closes: Vec<String> = s
            .klines
            .iter()
            .rev()
            .take(12)
            .map(|k| k.close.to_string())
            .collect();
        if !closes.is_empty() {
            prompt.push_str(&format!("  recent closes, newest first: {}\n", closes.join(", ")));
        }
    }
    prompt.push_str(&format!(
        "\nWrite the analysis as short standalone sections: market structure, momentum, \
         key levels, outlook. End every section with the marker {soft} on its own. \
         After the last section, emit {hard} instead of {soft}.",
        soft = markers.soft,
        hard = markers.hard,
    ));
    prompt
}
