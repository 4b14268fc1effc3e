//! Test Doubles
//!
//! Scripted LLM provider and collecting delivery sink used across the
//! resolver and orchestrator tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use agent_core::provider::{Completion, CompletionStream, StreamChunk};
use agent_core::{AgentError, GenerationOptions, LlmProvider, Message};
use async_trait::async_trait;

use crate::model::{ConversationId, StreamSegment};
use crate::orchestrator::DeliverySink;

/// LLM provider whose completions and stream are scripted up front.
pub struct ScriptedProvider {
    completions: Mutex<VecDeque<Result<String, String>>>,
    stream_tokens: Mutex<Vec<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            completions: Mutex::new(VecDeque::new()),
            stream_tokens: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful completion payload.
    pub fn push_completion(&self, content: impl Into<String>) {
        self.completions.lock().unwrap().push_back(Ok(content.into()));
    }

    /// Queue a transport error.
    pub fn push_error(&self, detail: impl Into<String>) {
        self.completions.lock().unwrap().push_back(Err(detail.into()));
    }

    /// Set the token script for `complete_stream`.
    pub fn set_stream(&self, tokens: impl IntoIterator<Item = impl Into<String>>) {
        *self.stream_tokens.lock().unwrap() = tokens.into_iter().map(Into::into).collect();
    }

    /// Prompts seen so far, one message list per round trip.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn health_check(&self) -> agent_core::Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> agent_core::Result<Completion> {
        self.requests.lock().unwrap().push(messages.to_vec());
        match self.completions.lock().unwrap().pop_front() {
            Some(Ok(content)) => Ok(Completion {
                content,
                model: options.model.clone(),
                usage: None,
            }),
            Some(Err(detail)) => Err(AgentError::Provider(detail)),
            None => Err(AgentError::Provider("completion script exhausted".into())),
        }
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> agent_core::Result<CompletionStream> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let tokens = self.stream_tokens.lock().unwrap().clone();
        if tokens.is_empty() {
            return Err(AgentError::Provider("no stream scripted".into()));
        }
        let last = tokens.len() - 1;
        let chunks: Vec<agent_core::Result<StreamChunk>> = tokens
            .into_iter()
            .enumerate()
            .map(|(i, delta)| {
                Ok(StreamChunk {
                    delta,
                    done: i == last,
                    usage: None,
                })
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn name(&self) -> &str {
        "Scripted"
    }
}

/// Delivery sink that records everything it receives.
#[derive(Default)]
pub struct CollectingSink {
    delivered: Mutex<Vec<(ConversationId, StreamSegment)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> Vec<StreamSegment> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, segment)| segment.clone())
            .collect()
    }
}

#[async_trait]
impl DeliverySink for CollectingSink {
    async fn deliver(&self, conversation: &ConversationId, segment: &StreamSegment) {
        self.delivered
            .lock()
            .unwrap()
            .push((conversation.clone(), segment.clone()));
    }
}
