//! ============================================================================
//! Chat Provider - Language Model Interface
//! ============================================================================
//! The orchestrator talks to any language model through the `ChatProvider`
//! trait. `XaiProvider` is the concrete implementation against the x.ai
//! chat-completions API.
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{ConversationTurn, OperatorError};

/// API endpoint for x.ai chat completions.
const XAI_API_URL: &str = "https://api.x.ai/v1/chat/completions";

/// Default chat model.
const CHAT_MODEL: &str = "grok-3-mini";

/// Turn-taking language model capability: full history in, one reply out.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(
        &self,
        messages: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<String, OperatorError>;

    /// Short identifier for logs and status displays.
    fn name(&self) -> &str;
}

/// Chat provider backed by the x.ai API.
pub struct XaiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl XaiProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, CHAT_MODEL.to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ChatProvider for XaiProvider {
    async fn chat(
        &self,
        messages: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<String, OperatorError> {
        let mut api_messages = Vec::with_capacity(messages.len() + 1);
        api_messages.push(ApiMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        });
        for turn in messages {
            api_messages.push(ApiMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            });
        }

        debug!("Calling x.ai with {} messages", api_messages.len());
        let request = ChatRequest {
            model: self.model.clone(),
            messages: api_messages,
            temperature: Some(0.3),
        };

        let response = self
            .client
            .post(XAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| OperatorError::Provider(format!("failed to call x.ai API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OperatorError::Provider(format!(
                "x.ai API error {}: {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| OperatorError::Provider(format!("failed to parse API response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OperatorError::Provider("no response from API".to_string()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ApiMessage,
}
