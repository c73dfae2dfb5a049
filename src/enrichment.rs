//! Best-effort trivia about the step a user is working on. Purely
//! decorative: every failure degrades to "no trivia" and the caller just
//! omits the line.

use std::sync::Arc;

use tracing::warn;

use crate::generative::{CompletionRequest, Generative};

const TRIVIA_MAX_TOKENS: u32 = 300;

#[derive(Clone)]
pub struct TriviaGenerator {
    generative: Arc<dyn Generative>,
}

impl TriviaGenerator {
    pub fn new(generative: Arc<dyn Generative>) -> Self {
        Self { generative }
    }

    pub async fn trivia_for_step(&self, step_text: &str) -> Option<String> {
        if step_text.trim().is_empty() {
            return None;
        }
        let prompt = format!(
            "以下の料理手順で、メインで使用する食材に関する面白い豆知識を1文で教えてください。\n\n\
             手順:\n{}",
            step_text
        );
        match self
            .generative
            .complete(CompletionRequest {
                system_prompt: None,
                user_prompt: prompt,
                response_format: None,
                temperature: 0.7,
                max_tokens: TRIVIA_MAX_TOKENS,
            })
            .await
        {
            Ok(trivia) if !trivia.trim().is_empty() => Some(trivia.trim().to_string()),
            Ok(_) => None,
            Err(err) => {
                warn!("trivia generation failed: {}", err);
                None
            }
        }
    }
}

/// Compose a step announcement with an optional trivia block.
pub fn step_message(step_no: u32, instruction: &str, trivia: Option<&str>) -> String {
    let mut message = format!("ステップ{}: {}", step_no, instruction);
    if let Some(trivia) = trivia {
        message.push_str(&format!("\n\n🧠 うんちく:\n{}", trivia));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;
    use async_trait::async_trait;

    struct CannedGenerative {
        reply: Option<String>,
    }

    #[async_trait]
    impl Generative for CannedGenerative {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<String, ApiConnectionError> {
            self.reply.clone().ok_or(ApiConnectionError::EmptyResponse)
        }

        async fn complete_with_image(
            &self,
            _prompt: &str,
            _image: &[u8],
            _max_tokens: u32,
        ) -> Result<String, ApiConnectionError> {
            Err(ApiConnectionError::EmptyResponse)
        }
    }

    #[tokio::test]
    async fn failure_degrades_to_none() {
        let generator = TriviaGenerator::new(Arc::new(CannedGenerative { reply: None }));
        assert!(generator.trivia_for_step("豆腐を切る").await.is_none());
    }

    #[tokio::test]
    async fn success_returns_trimmed_text() {
        let generator = TriviaGenerator::new(Arc::new(CannedGenerative {
            reply: Some(" 豆腐は奈良時代に伝来しました。 ".to_string()),
        }));
        assert_eq!(
            generator.trivia_for_step("豆腐を切る").await.as_deref(),
            Some("豆腐は奈良時代に伝来しました。")
        );
    }

    #[test]
    fn message_omits_trivia_block_when_absent() {
        assert_eq!(step_message(1, "豆腐を切る", None), "ステップ1: 豆腐を切る");
        let with_trivia = step_message(1, "豆腐を切る", Some("豆知識です"));
        assert!(with_trivia.contains("🧠 うんちく:"));
        assert!(with_trivia.contains("豆知識です"));
    }
}
