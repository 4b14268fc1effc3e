//! HTTP/WebSocket Handlers

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use market_analyst::{
    AnalysisOutcome, ConversationId, DeliverySink, MarketType, StreamSegment,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub provider_connected: bool,
    pub exchange: String,
    pub exchange_connected: bool,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub conversation_id: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<MarketType>,
    pub segments: Vec<StreamSegment>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============================================================================
// Delivery sinks
// ============================================================================

/// Collects segments for the non-streaming endpoint.
#[derive(Default)]
struct BufferSink {
    segments: Mutex<Vec<StreamSegment>>,
}

impl BufferSink {
    fn into_segments(self) -> Vec<StreamSegment> {
        self.segments.into_inner().unwrap()
    }
}

#[async_trait]
impl DeliverySink for BufferSink {
    async fn deliver(&self, _conversation: &ConversationId, segment: &StreamSegment) {
        self.segments.lock().unwrap().push(segment.clone());
    }
}

/// Pushes each segment over the WebSocket as its own JSON frame.
struct WsSink {
    sender: Arc<tokio::sync::Mutex<futures::stream::SplitSink<WebSocket, Message>>>,
}

#[async_trait]
impl DeliverySink for WsSink {
    async fn deliver(&self, conversation: &ConversationId, segment: &StreamSegment) {
        let frame = serde_json::json!({
            "type": "segment",
            "content": segment.content,
            "is_final": segment.is_final,
            "sequence": segment.sequence,
        });
        let mut sender = self.sender.lock().await;
        if let Err(e) = sender.send(Message::Text(frame.to_string().into())).await {
            // Delivery failures are this sink's problem, not the pipeline's.
            tracing::warn!(%conversation, error = %e, "failed to deliver segment");
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_connected = state.provider.health_check().await.unwrap_or(false);
    let exchange_connected = state.market_data.health_check().await;

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider.name().to_string(),
        provider_connected,
        exchange: state.market_data.name().to_string(),
        exchange_connected,
    })
}

/// Non-streaming analysis: run the full pipeline, return every segment at
/// once.
pub async fn analyze_handler(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let conversation_id = payload
        .conversation_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let conversation = ConversationId::new(conversation_id.clone());

    let sink = BufferSink::default();
    let outcome = state
        .analyzer
        .handle(&conversation, &payload.message, &sink)
        .await
        .map_err(|e| {
            tracing::error!(%conversation, error = %e, "analysis failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.user_message(),
                    code: "ANALYSIS_ERROR".into(),
                }),
            )
        })?;

    match outcome {
        AnalysisOutcome::Busy => Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "Too many analyses are running right now. Please retry in a moment.".into(),
                code: "BUSY".into(),
            }),
        )),
        AnalysisOutcome::NotAnalysisRequest { .. } => Ok(Json(AnalyzeResponse {
            conversation_id,
            outcome: "not_analysis",
            symbol: None,
            market: None,
            segments: Vec::new(),
        })),
        AnalysisOutcome::InstrumentNotFound => Ok(Json(AnalyzeResponse {
            conversation_id,
            outcome: "instrument_not_found",
            symbol: None,
            market: None,
            segments: Vec::new(),
        })),
        AnalysisOutcome::Delivered { symbol, market, .. } => Ok(Json(AnalyzeResponse {
            conversation_id,
            outcome: "delivered",
            symbol: Some(symbol),
            market: Some(market),
            segments: sink.into_segments(),
        })),
    }
}

/// WebSocket streaming analysis
pub async fn analyze_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

async fn handle_stream(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(tokio::sync::Mutex::new(sender));

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        // Parse request
        let request: AnalyzeRequest = match serde_json::from_str(&msg) {
            Ok(r) => r,
            Err(e) => {
                let error = serde_json::json!({"type": "error", "error": e.to_string()});
                let _ = sender
                    .lock()
                    .await
                    .send(Message::Text(error.to_string().into()))
                    .await;
                continue;
            }
        };

        let conversation_id = request
            .conversation_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let conversation = ConversationId::new(conversation_id.clone());
        let sink = WsSink {
            sender: Arc::clone(&sender),
        };

        let outcome = state
            .analyzer
            .handle(&conversation, &request.message, &sink)
            .await;

        let closing = match outcome {
            Ok(AnalysisOutcome::Delivered { symbol, market, segments_delivered }) => {
                serde_json::json!({
                    "type": "outcome",
                    "outcome": "delivered",
                    "conversation_id": conversation_id,
                    "symbol": symbol,
                    "market": market,
                    "segments_delivered": segments_delivered,
                })
            }
            Ok(AnalysisOutcome::NotAnalysisRequest { .. }) => serde_json::json!({
                "type": "outcome",
                "outcome": "not_analysis",
                "conversation_id": conversation_id,
            }),
            Ok(AnalysisOutcome::InstrumentNotFound) => serde_json::json!({
                "type": "outcome",
                "outcome": "instrument_not_found",
                "conversation_id": conversation_id,
            }),
            Ok(AnalysisOutcome::Busy) => serde_json::json!({
                "type": "outcome",
                "outcome": "busy",
                "conversation_id": conversation_id,
            }),
            Err(e) => {
                tracing::error!(%conversation, error = %e, "analysis failed");
                serde_json::json!({
                    "type": "error",
                    "error": e.user_message(),
                    "conversation_id": conversation_id,
                })
            }
        };

        if sender
            .lock()
            .await
            .send(Message::Text(closing.to_string().into()))
            .await
            .is_err()
        {
            break;
        }
    }
}
