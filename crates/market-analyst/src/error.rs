//! Error Types for the Analyst Core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalystError>;

#[derive(Error, Debug)]
pub enum AnalystError {
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Admission denied: {0}")]
    AdmissionDenied(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Agent error: {0}")]
    Agent(#[from] agent_core::AgentError),
}

impl AnalystError {
    /// Convert to a message safe to show an end user. Transport detail stays
    /// in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AnalystError::AdmissionDenied(_) => {
                "Too many analyses are running right now. Please retry in a moment.".into()
            }
            AnalystError::Agent(e) => e.user_message(),
            AnalystError::Config(_) => "The service is misconfigured. Contact the operator.".into(),
            _ => "The market data service is temporarily unavailable. Please try again.".into(),
        }
    }
}
