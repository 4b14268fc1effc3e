//! OpenAI-Compatible LLM Provider
//!
//! Implementation of `LlmProvider` for any endpoint speaking the
//! chat-completions wire shape (OpenAI, vLLM, llama.cpp server, various
//! gateways). Streaming uses server-sent events: one `data: {...}` line per
//! delta, terminated by `data: [DONE]`.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::Message,
    provider::{
        Completion, CompletionStream, GenerationOptions, LlmProvider, StreamChunk, TokenUsage,
    },
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiCompatConfig {
    /// API base URL (without the `/v1/...` path)
    pub base_url: String,

    /// Bearer token, if the endpoint requires one
    pub api_key: Option<String>,

    /// Request timeout for non-streaming calls
    pub timeout: Duration,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            timeout: Duration::from_secs(120),
        }
    }
}

impl OpenAiCompatConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or(defaults.base_url)
            .trim_end_matches('/')
            .to_string();
        let api_key = std::env::var("OPENAI_API_KEY").ok();

        Ok(Self {
            base_url,
            api_key,
            timeout: defaults.timeout,
        })
    }
}

/// OpenAI-compatible LLM provider
pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatProvider {
    pub fn from_config(config: OpenAiCompatConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(OpenAiCompatConfig::from_env()?))
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url)
    }

    fn request_body(messages: &[Message], options: &GenerationOptions, stream: bool) -> ChatBody {
        ChatBody {
            model: options.model.clone(),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stop: options.stop_sequences.clone(),
            stream,
        }
    }

    fn post(&self, body: &ChatBody) -> reqwest::RequestBuilder {
        let mut request = self.http.post(self.chat_url()).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        request
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn health_check(&self) -> Result<bool> {
        let mut request = self.http.get(format!("{}/v1/models", self.config.base_url));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        match request.timeout(Duration::from_secs(5)).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("chat-completions health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let body = Self::request_body(messages, options, false);
        let response = self
            .post(&body)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Provider(format!(
                "chat completions returned {status}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AgentError::Parse("chat completion without content".into()))?;

        Ok(Completion {
            content,
            model: options.model.clone(),
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let body = Self::request_body(messages, options, true);
        let response = self
            .post(&body)
            .send()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Provider(format!(
                "chat completions stream returned {status}"
            )));
        }

        let bytes = response.bytes_stream().map(|r| r.map(|b| b.to_vec()));
        let state = SseState {
            bytes: bytes.boxed(),
            buffer: String::new(),
            done: false,
        };

        let mapped = futures::stream::unfold(state, |mut state| async move {
            loop {
                if state.done {
                    return None;
                }

                // Drain complete lines already buffered.
                if let Some(pos) = state.buffer.find('\n') {
                    let line: String = state.buffer.drain(..=pos).collect();
                    let line = line.trim();
                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let payload = payload.trim();
                    if payload == "[DONE]" {
                        state.done = true;
                        let chunk = StreamChunk {
                            delta: String::new(),
                            done: true,
                            usage: None,
                        };
                        return Some((Ok(chunk), state));
                    }
                    match serde_json::from_str::<StreamResponse>(payload) {
                        Ok(parsed) => {
                            let Some(choice) = parsed.choices.into_iter().next() else {
                                continue;
                            };
                            let finished = choice.finish_reason.is_some();
                            if finished {
                                state.done = true;
                            }
                            let chunk = StreamChunk {
                                delta: choice.delta.content.unwrap_or_default(),
                                done: finished,
                                usage: None,
                            };
                            return Some((Ok(chunk), state));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping undecodable SSE line");
                            continue;
                        }
                    }
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => state.buffer.push_str(&String::from_utf8_lossy(&chunk)),
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(AgentError::Provider(e.to_string())), state));
                    }
                    None => return None,
                }
            }
        });

        Ok(Box::pin(mapped))
    }

    fn name(&self) -> &str {
        "OpenAI-compatible"
    }
}

struct SseState {
    bytes: futures::stream::BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: String,
    done: bool,
}

#[derive(Debug, Serialize)]
struct ChatBody {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_base_url_default() {
        let config = OpenAiCompatConfig::default();
        assert_eq!(config.base_url, "https://api.openai.com");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let options = GenerationOptions::default();
        let body = OpenAiCompatProvider::request_body(&messages, &options, true);

        assert!(body.stream);
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].role, "user");
    }

    #[test]
    fn test_stream_line_decodes() {
        let payload = r#"{"choices":[{"delta":{"content":"hel"},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("hel"));
        assert!(parsed.choices[0].finish_reason.is_none());
    }
}
