//! Recommendation orchestration: resolve → match → (synthesize) → assign →
//! notify. This is the entry point the transport layer calls.

use std::sync::Arc;

use tracing::error;

use crate::chat_flow::Messenger;
use crate::enrichment::TriviaGenerator;
use crate::error::CoreError;
use crate::recipe_matcher::RecipeMatcher;
use crate::recipe_synthesizer::{RecipeSynthesizer, SYNTHESIZED_SCORE};
use crate::schemas::{RecipeDocument, RecommendationRequest, RecommendationResponse};
use crate::session_tracker::SessionTracker;

pub const CATALOG_SCORE: f64 = 1.0;

#[derive(Clone)]
pub struct Recommender {
    matcher: RecipeMatcher,
    synthesizer: Arc<RecipeSynthesizer>,
    tracker: SessionTracker,
    trivia: TriviaGenerator,
    messenger: Arc<dyn Messenger>,
}

impl Recommender {
    pub fn new(
        matcher: RecipeMatcher,
        synthesizer: Arc<RecipeSynthesizer>,
        tracker: SessionTracker,
        trivia: TriviaGenerator,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            matcher,
            synthesizer,
            tracker,
            trivia,
            messenger,
        }
    }

    /// Pick a recipe for the request. With synthesis enabled a catalog miss
    /// falls back to generation; otherwise it is a `NotFound`. When the
    /// request names a user, the recipe becomes their session and a chat
    /// notification goes out as a detached best-effort task.
    pub async fn recommend(
        &self,
        request: RecommendationRequest,
        synthesis_enabled: bool,
    ) -> Result<RecommendationResponse, CoreError> {
        let available_names: Vec<String> = request
            .available_ingredients
            .iter()
            .map(|item| item.name.clone())
            .collect();

        let matched = self
            .matcher
            .match_recipe(
                &available_names,
                &request.required_ingredients,
                request.max_cooking_time,
            )
            .await?;

        let (recipe, score, reason) = match matched {
            Some(recipe) => (
                recipe,
                CATALOG_SCORE,
                "おすすめのレシピを見つけました！".to_string(),
            ),
            None if synthesis_enabled => {
                let recipe = self
                    .synthesizer
                    .synthesize(
                        &available_names,
                        &request.required_ingredients,
                        request.max_cooking_time,
                    )
                    .await?;
                (
                    recipe,
                    SYNTHESIZED_SCORE,
                    "新しいレシピを考えました！".to_string(),
                )
            }
            None => {
                return Err(CoreError::NotFound(
                    "条件に合うレシピが見つかりませんでした".to_string(),
                ));
            }
        };

        if let Some(user_id) = &request.user_id {
            self.tracker.assign(user_id, &recipe).await?;
            self.notify_assignment(user_id.clone(), &recipe);
        }

        Ok(RecommendationResponse {
            name: recipe.name,
            ingredients: recipe.ingredients,
            steps: recipe.steps,
            missing_ingredients: vec![],
            recommend_score: score,
            recommend_reason: reason,
        })
    }

    /// Fire-and-forget chat push with step 1 and optional trivia. Failures
    /// are logged and never joined into the recommendation result.
    fn notify_assignment(&self, user_id: String, recipe: &RecipeDocument) {
        let first_instruction = match recipe.steps.first() {
            Some(step) => step.instruction.clone(),
            None => return,
        };
        let trivia = self.trivia.clone();
        let messenger = self.messenger.clone();
        tokio::spawn(async move {
            let trivia_line = trivia.trivia_for_step(&first_instruction).await;
            let mut message = format!(
                "おすすめレシピが決まりました！\nステップ1: {}",
                first_instruction
            );
            if let Some(trivia_line) = trivia_line {
                message.push_str(&format!("\n🧠 うんちく: {}", trivia_line));
            }
            if let Err(err) = messenger.push_text(&user_id, &message).await {
                error!("assignment notification failed: {}", err);
            }
        });
    }
}
