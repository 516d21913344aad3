//! [`Proposer`] over an OpenAI-compatible `/chat/completions` endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fixloop_core::{PromptKind, ProposalRequest, Proposer, ProposerError};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.1;
const ERROR_BODY_CHARS: usize = 300;

/// Chat-completions client. Works against OpenAI and the many servers that
/// mimic its API (vLLM, Ollama, llama.cpp, Groq, ...).
#[derive(Clone)]
pub struct ChatCompletionsProposer {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl ChatCompletionsProposer {
    pub fn new(api_base: impl Into<String>, model: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fixloop/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn to_chat_request<'a>(&'a self, request: &'a ProposalRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(request.kind),
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        }
    }
}

#[async_trait]
impl Proposer for ChatCompletionsProposer {
    fn model(&self) -> &str {
        &self.model
    }

    async fn propose(&self, request: &ProposalRequest) -> Result<String, ProposerError> {
        let mut http = self.client.post(self.endpoint()).json(&self.to_chat_request(request));
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| ProposerError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(ERROR_BODY_CHARS).collect();
            return Err(ProposerError::Request(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProposerError::Request(format!("invalid response body: {e}")))?;
        tracing::debug!(
            kind = %request.kind,
            unit = %request.unit,
            prompt_tokens = parsed.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens = parsed.usage.as_ref().map(|u| u.completion_tokens),
            "proposer call finished"
        );
        first_content(parsed).ok_or(ProposerError::Empty)
    }
}

fn system_prompt(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::Analyze | PromptKind::AnalyzeFailure => {
            "You are a meticulous Python code auditor. You answer with JSON only."
        }
        PromptKind::Fix => "You are a careful Python engineer. You answer with the complete corrected file only.",
        PromptKind::GenerateTests => "You write small, correct pytest suites. You answer with Python code only.",
    }
}

fn first_content(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposer() -> ChatCompletionsProposer {
        ChatCompletionsProposer::new("http://localhost:8000/v1/", "local-model", Some(" ".to_string()), Duration::from_secs(5))
            .expect("client")
    }

    #[test]
    fn test_endpoint_and_blank_key() {
        let p = proposer();
        assert_eq!(p.endpoint(), "http://localhost:8000/v1/chat/completions");
        assert!(p.api_key.is_none());
        assert_eq!(p.model(), "local-model");
    }

    #[test]
    fn test_request_body_shape() {
        let p = proposer().with_temperature(0.0);
        let request = ProposalRequest::new(PromptKind::Fix, "calc.py", "fix this");
        let body = serde_json::to_value(p.to_chat_request(&request)).expect("serialize");
        assert_eq!(body["model"], "local-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "fix this");
    }

    #[test]
    fn test_first_content() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "[]"}}], "usage": {"prompt_tokens": 3, "completion_tokens": 1}}"#,
        )
        .expect("parse");
        assert_eq!(first_content(response), Some("[]".to_string()));

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).expect("parse");
        assert_eq!(first_content(empty), None);

        let null: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).expect("parse");
        assert_eq!(first_content(null), None);
    }
}
