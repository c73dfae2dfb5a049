//! Chat-channel command dispatch for the cooking session.
//!
//! Webhook parsing and signature verification stay with the transport; the
//! flow receives already-extracted (user, text) and (user, image) events
//! and replies through the [`Messenger`] contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::enrichment::{step_message, TriviaGenerator};
use crate::error::CoreError;
use crate::recipe_matcher::RecipeMatcher;
use crate::session_tracker::{Advance, SessionTracker};
use crate::step_verifier::StepVerifier;
use crate::store::UserStore;

/// Time budget used when a chat user starts a session from their inventory.
const CHAT_START_MAX_TIME: u32 = 60;

pub const CMD_REGISTER: &str = "食材を登録する";
pub const CMD_START: &str = "スタート";
pub const CMD_NEXT: &str = "次へ";

/// Outbound side of the chat channel.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn push_text(&self, user_id: &str, text: &str) -> Result<(), CoreError>;
}

/// LINE Messaging API push delivery.
pub struct LineMessenger {
    access_token: String,
}

impl LineMessenger {
    pub fn new(access_token: String) -> Self {
        Self { access_token }
    }
}

#[async_trait]
impl Messenger for LineMessenger {
    async fn push_text(&self, user_id: &str, text: &str) -> Result<(), CoreError> {
        let body = json!({
            "to": user_id,
            "messages": [{ "type": "text", "text": text }],
        });
        let response = reqwest::Client::new()
            .post("https://api.line.me/v2/bot/message/push")
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::CapabilityUnavailable(format!("chat push failed: {}", e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(CoreError::CapabilityUnavailable(format!(
                "chat push failed: {} {}",
                status, error_body
            )));
        }
        Ok(())
    }
}

/// Messenger for runs without a configured chat channel: replies go to the
/// log instead.
pub struct NullMessenger;

#[async_trait]
impl Messenger for NullMessenger {
    async fn push_text(&self, user_id: &str, text: &str) -> Result<(), CoreError> {
        info!("[chat -> {}] {}", user_id, text);
        Ok(())
    }
}

pub struct ChatFlow {
    matcher: RecipeMatcher,
    tracker: SessionTracker,
    verifier: StepVerifier,
    trivia: TriviaGenerator,
    messenger: Arc<dyn Messenger>,
    users: Arc<dyn UserStore>,
    frontend_url: String,
}

impl ChatFlow {
    pub fn new(
        matcher: RecipeMatcher,
        tracker: SessionTracker,
        verifier: StepVerifier,
        trivia: TriviaGenerator,
        messenger: Arc<dyn Messenger>,
        users: Arc<dyn UserStore>,
        frontend_url: String,
    ) -> Self {
        Self {
            matcher,
            tracker,
            verifier,
            trivia,
            messenger,
            users,
            frontend_url,
        }
    }

    pub async fn on_text(&self, user_id: &str, text: &str) -> Result<(), CoreError> {
        match text.trim() {
            CMD_REGISTER => {
                let link = format!("{}/register?user_id={}", self.frontend_url, user_id);
                self.messenger
                    .push_text(
                        user_id,
                        &format!("こちらから登録ページを開いてください👇\n{}", link),
                    )
                    .await
            }
            CMD_START => self.handle_start(user_id).await,
            CMD_NEXT => self.handle_next(user_id).await,
            _ => {
                self.messenger
                    .push_text(
                        user_id,
                        "「食材を登録する」「スタート」「次へ」のいずれかを送信してください。",
                    )
                    .await
            }
        }
    }

    async fn handle_start(&self, user_id: &str) -> Result<(), CoreError> {
        let inventory = self
            .users
            .find_session(user_id)
            .await?
            .map(|session| session.inventory)
            .unwrap_or_default();
        let names: Vec<String> = inventory.into_iter().map(|item| item.name).collect();

        let recipe = self
            .matcher
            .match_recipe(&names, &[], CHAT_START_MAX_TIME)
            .await?;
        let recipe = match recipe {
            Some(recipe) => recipe,
            None => {
                return self
                    .messenger
                    .push_text(user_id, "おすすめできるレシピが見つかりませんでした。")
                    .await;
            }
        };

        self.tracker.assign(user_id, &recipe).await?;
        match self.tracker.advance(user_id).await? {
            Advance::Step { step_no, instruction } => {
                let trivia = self.trivia.trivia_for_step(&instruction).await;
                self.messenger
                    .push_text(
                        user_id,
                        &step_message(step_no, &instruction, trivia.as_deref()),
                    )
                    .await
            }
            Advance::Complete => {
                // A zero-step recipe; nothing to walk through.
                self.messenger
                    .push_text(user_id, "全てのステップが完了しました！")
                    .await
            }
        }
    }

    async fn handle_next(&self, user_id: &str) -> Result<(), CoreError> {
        match self.tracker.advance(user_id).await {
            Ok(Advance::Step { step_no, instruction }) => {
                let trivia = self.trivia.trivia_for_step(&instruction).await;
                self.messenger
                    .push_text(
                        user_id,
                        &step_message(step_no, &instruction, trivia.as_deref()),
                    )
                    .await
            }
            Ok(Advance::Complete) => {
                self.messenger
                    .push_text(user_id, "全てのステップが完了しました！")
                    .await
            }
            Err(CoreError::NoActiveSession(_)) => {
                self.messenger
                    .push_text(user_id, "スタートから始めてください。")
                    .await
            }
            Err(err) => Err(err),
        }
    }

    /// Photo event: verify the latest step against the image and advance on
    /// an affirmative judgment.
    pub async fn on_image(&self, user_id: &str, image: &[u8]) -> Result<(), CoreError> {
        let session = self.users.find_session(user_id).await?;
        let completed = match session.as_ref().and_then(|s| s.current_recipe.as_ref()) {
            Some(_) => session.as_ref().map(|s| s.current_step).unwrap_or(0),
            None => {
                return self
                    .messenger
                    .push_text(user_id, "レシピ情報が見つかりません。")
                    .await;
            }
        };

        // The step being performed is the latest acknowledged one (or step
        // 1 right after assignment).
        let upto = completed.max(1);
        let instructions = self
            .tracker
            .current_step_instructions(user_id, upto)
            .await?;
        let context = instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| format!("ステップ{}: {}", index + 1, instruction))
            .collect::<Vec<_>>()
            .join("\n");

        if !self.verifier.verify(&context, image).await {
            return self
                .messenger
                .push_text(user_id, "😅 画像が手順と合っていないようです。")
                .await;
        }

        match self.tracker.advance(user_id).await? {
            Advance::Step { step_no, instruction } => {
                let trivia = self.trivia.trivia_for_step(&instruction).await;
                let message = format!(
                    "✅ OK！\n{}",
                    step_message(step_no, &instruction, trivia.as_deref())
                );
                self.messenger.push_text(user_id, &message).await
            }
            Advance::Complete => {
                self.messenger
                    .push_text(user_id, "🎉 料理が完成しました！")
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;
    use crate::generative::{CompletionRequest, Generative};
    use crate::ingredient_resolver::{IngredientDraft, IngredientResolver};
    use crate::recipe_matcher::tests_support::recipe;
    use crate::schemas::InventoryItem;
    use crate::store::memory::MemoryStore;
    use crate::store::RecipeStore as _;
    use std::sync::Mutex;

    /// Records pushed messages for assertions.
    struct CapturingMessenger {
        messages: Mutex<Vec<(String, String)>>,
    }

    impl CapturingMessenger {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> String {
            self.messages
                .lock()
                .unwrap()
                .last()
                .map(|(_, text)| text.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl Messenger for CapturingMessenger {
        async fn push_text(&self, user_id: &str, text: &str) -> Result<(), CoreError> {
            self.messages
                .lock()
                .unwrap()
                .push((user_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    /// Vision says はい, text generation fails (no trivia).
    struct AffirmativeVision;

    #[async_trait]
    impl Generative for AffirmativeVision {
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
            Ok("はい".to_string())
        }
    }

    async fn flow_with(
        store: Arc<MemoryStore>,
        messenger: Arc<CapturingMessenger>,
    ) -> ChatFlow {
        let generative: Arc<dyn Generative> = Arc::new(AffirmativeVision);
        ChatFlow::new(
            RecipeMatcher::new(store.clone(), store.clone()),
            SessionTracker::new(store.clone()),
            StepVerifier::new(generative.clone()),
            TriviaGenerator::new(generative),
            messenger,
            store,
            "https://example.com".to_string(),
        )
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let resolver = IngredientResolver::new(store.clone(), Arc::new(AffirmativeVision));
        for (name, synonym) in [("Tofu", "豆腐"), ("Miso", "味噌")] {
            resolver
                .create(IngredientDraft {
                    standard_name: name.to_string(),
                    synonyms: vec![synonym.to_string()],
                    category: Default::default(),
                    emoji: String::new(),
                    confidence: 1.0,
                })
                .await
                .unwrap();
        }
        store
            .insert_recipe(recipe("味噌汁", &[("tofu", 1.0), ("miso", 30.0)], 3, 15))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn unknown_command_gets_usage_hint() {
        let store = Arc::new(MemoryStore::new());
        let messenger = CapturingMessenger::new();
        let flow = flow_with(store, messenger.clone()).await;
        flow.on_text("U1", "こんにちは").await.unwrap();
        assert!(messenger.last().contains("いずれかを送信してください"));
    }

    #[tokio::test]
    async fn register_command_links_to_frontend() {
        let store = Arc::new(MemoryStore::new());
        let messenger = CapturingMessenger::new();
        let flow = flow_with(store, messenger.clone()).await;
        flow.on_text("U1", CMD_REGISTER).await.unwrap();
        assert!(messenger
            .last()
            .contains("https://example.com/register?user_id=U1"));
    }

    #[tokio::test]
    async fn start_assigns_and_announces_step_one() {
        let store = seeded_store().await;
        crate::store::UserStore::set_inventory(
            store.as_ref(),
            "U1",
            &[
                InventoryItem {
                    name: "豆腐".to_string(),
                    quantity: 1.0,
                    unit: "丁".to_string(),
                },
                InventoryItem {
                    name: "味噌".to_string(),
                    quantity: 100.0,
                    unit: "g".to_string(),
                },
            ],
        )
        .await
        .unwrap();

        let messenger = CapturingMessenger::new();
        let flow = flow_with(store.clone(), messenger.clone()).await;
        flow.on_text("U1", CMD_START).await.unwrap();
        assert!(messenger.last().starts_with("ステップ1:"));

        let session = crate::store::UserStore::find_session(store.as_ref(), "U1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.current_step, 1);
    }

    #[tokio::test]
    async fn start_with_empty_inventory_apologizes() {
        let store = seeded_store().await;
        let messenger = CapturingMessenger::new();
        let flow = flow_with(store, messenger.clone()).await;
        flow.on_text("U1", CMD_START).await.unwrap();
        assert!(messenger.last().contains("見つかりませんでした"));
    }

    #[tokio::test]
    async fn next_without_session_prompts_for_start() {
        let store = Arc::new(MemoryStore::new());
        let messenger = CapturingMessenger::new();
        let flow = flow_with(store, messenger.clone()).await;
        flow.on_text("U1", CMD_NEXT).await.unwrap();
        assert_eq!(messenger.last(), "スタートから始めてください。");
    }

    #[tokio::test]
    async fn next_walks_to_completion() {
        let store = seeded_store().await;
        let messenger = CapturingMessenger::new();
        let flow = flow_with(store.clone(), messenger.clone()).await;
        SessionTracker::new(store.clone())
            .assign("U1", &recipe("味噌汁", &[("tofu", 1.0)], 2, 15))
            .await
            .unwrap();

        flow.on_text("U1", CMD_NEXT).await.unwrap();
        assert!(messenger.last().starts_with("ステップ1:"));
        flow.on_text("U1", CMD_NEXT).await.unwrap();
        assert!(messenger.last().starts_with("ステップ2:"));
        flow.on_text("U1", CMD_NEXT).await.unwrap();
        assert_eq!(messenger.last(), "全てのステップが完了しました！");
    }

    #[tokio::test]
    async fn verified_image_advances_the_session() {
        let store = seeded_store().await;
        let messenger = CapturingMessenger::new();
        let flow = flow_with(store.clone(), messenger.clone()).await;
        let tracker = SessionTracker::new(store.clone());
        tracker
            .assign("U1", &recipe("味噌汁", &[("tofu", 1.0)], 2, 15))
            .await
            .unwrap();
        tracker.advance("U1").await.unwrap();

        flow.on_image("U1", b"jpeg-bytes").await.unwrap();
        assert!(messenger.last().starts_with("✅ OK！"));
        assert!(messenger.last().contains("ステップ2:"));

        flow.on_image("U1", b"jpeg-bytes").await.unwrap();
        assert_eq!(messenger.last(), "🎉 料理が完成しました！");
    }

    #[tokio::test]
    async fn image_without_session_reports_missing_recipe() {
        let store = Arc::new(MemoryStore::new());
        let messenger = CapturingMessenger::new();
        let flow = flow_with(store, messenger.clone()).await;
        flow.on_image("U1", b"jpeg-bytes").await.unwrap();
        assert_eq!(messenger.last(), "レシピ情報が見つかりません。");
    }
}
