//! Photo-based step verification.
//!
//! The vision model is asked for a judgment constrained to the two literal
//! tokens 「はい」/「いいえ」; anything that is not an affirmative, including
//! a capability failure, counts as not verified so the calling flow always
//! has a definite outcome.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::generative::Generative;

const VERIFY_MAX_TOKENS: u32 = 50;

#[derive(Clone)]
pub struct StepVerifier {
    generative: Arc<dyn Generative>,
}

impl StepVerifier {
    pub fn new(generative: Arc<dyn Generative>) -> Self {
        Self { generative }
    }

    /// Judge whether the uploaded image matches the latest of the given
    /// instructions.
    pub async fn verify(&self, instructions_context: &str, image: &[u8]) -> bool {
        let prompt = format!(
            "以下の全体手順を参考に、最新の手順が画像と合っているか判定してください。\n\
             回答は「はい」または「いいえ」だけ。\n\n\
             全体手順:\n{}",
            instructions_context
        );

        match self
            .generative
            .complete_with_image(&prompt, image, VERIFY_MAX_TOKENS)
            .await
        {
            Ok(reply) => {
                let verdict = reply.trim().to_lowercase();
                debug!("step verification verdict: {}", verdict);
                verdict.contains("はい")
            }
            Err(err) => {
                warn!("step verification failed, treating as not verified: {}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;
    use crate::generative::CompletionRequest;
    use async_trait::async_trait;

    struct CannedVision {
        reply: Option<String>,
    }

    #[async_trait]
    impl Generative for CannedVision {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<String, ApiConnectionError> {
            Err(ApiConnectionError::EmptyResponse)
        }

        async fn complete_with_image(
            &self,
            _prompt: &str,
            _image: &[u8],
            _max_tokens: u32,
        ) -> Result<String, ApiConnectionError> {
            self.reply.clone().ok_or(ApiConnectionError::EmptyResponse)
        }
    }

    fn verifier(reply: Option<&str>) -> StepVerifier {
        StepVerifier::new(Arc::new(CannedVision {
            reply: reply.map(|s| s.to_string()),
        }))
    }

    #[tokio::test]
    async fn affirmative_token_verifies() {
        assert!(verifier(Some("はい")).verify("ステップ1: 切る", b"jpeg").await);
        assert!(verifier(Some(" はい。")).verify("ステップ1: 切る", b"jpeg").await);
    }

    #[tokio::test]
    async fn negative_token_does_not_verify() {
        assert!(!verifier(Some("いいえ")).verify("ステップ1: 切る", b"jpeg").await);
    }

    #[tokio::test]
    async fn capability_failure_degrades_to_negative() {
        assert!(!verifier(None).verify("ステップ1: 切る", b"jpeg").await);
    }
}
