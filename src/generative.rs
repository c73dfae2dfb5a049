use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::api_connection::connection::{ApiConnectionError, Provider};
use crate::api_connection::endpoints::{ChatCompletionRequest, ChatMessage, ResponseFormat};

/// Parameters for a plain text completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub response_format: Option<ResponseFormat>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// The opaque generative capability. Implemented by [`Provider`] for real
/// calls; tests substitute canned outputs. Every call is bounded by the
/// provider's request timeout and the `max_tokens` carried in the request.
#[async_trait]
pub trait Generative: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ApiConnectionError>;

    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        max_tokens: u32,
    ) -> Result<String, ApiConnectionError>;
}

fn first_choice_content(
    response: crate::api_connection::endpoints::ChatCompletionResponse,
) -> Result<String, ApiConnectionError> {
    let content = response
        .choices
        .first()
        .map(|choice| choice.message.content.trim().to_string())
        .ok_or(ApiConnectionError::EmptyResponse)?;
    if content.is_empty() {
        return Err(ApiConnectionError::EmptyResponse);
    }
    Ok(content)
}

#[async_trait]
impl Generative for Provider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ApiConnectionError> {
        let mut messages = Vec::new();
        if let Some(system_prompt) = request.system_prompt {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.push(ChatMessage::user(request.user_prompt));

        let response = self
            .call_chat_completion(ChatCompletionRequest {
                model: self.model().to_string(),
                messages,
                response_format: request.response_format,
                temperature: Some(request.temperature),
                max_tokens: Some(request.max_tokens),
            })
            .await?;
        first_choice_content(response)
    }

    async fn complete_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        max_tokens: u32,
    ) -> Result<String, ApiConnectionError> {
        let data_uri = format!("data:image/jpeg;base64,{}", BASE64.encode(image));
        let response = self
            .call_chat_completion(ChatCompletionRequest {
                model: self.model().to_string(),
                messages: vec![ChatMessage::user_with_image(prompt, data_uri)],
                response_format: None,
                temperature: Some(0.0),
                max_tokens: Some(max_tokens),
            })
            .await?;
        first_choice_content(response)
    }
}

/// Strip an enclosing markdown code fence from model output. Models wrap
/// JSON in ```json ... ``` often enough that every parse site needs this.
pub fn strip_markdown_fences(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.starts_with("```json") && trimmed.ends_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else if trimmed.starts_with("```") && trimmed.ends_with("```") {
        trimmed
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        trimmed.to_string()
    }
}
