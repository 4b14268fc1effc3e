//! Shared Application State

use std::sync::Arc;

use agent_core::LlmProvider;
use market_analyst::exchange::MarketDataSource;
use market_analyst::Analyzer;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn LlmProvider>,
    pub market_data: Arc<dyn MarketDataSource>,
    pub analyzer: Arc<Analyzer>,
}
