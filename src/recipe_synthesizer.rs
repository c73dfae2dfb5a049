//! Generative recipe synthesis, used when the catalog has no eligible
//! recipe. The generated document joins the catalog so later requests can
//! hit it without another generation.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info};

use crate::error::CoreError;
use crate::generative::{strip_markdown_fences, CompletionRequest, Generative};
use crate::ingredient_resolver::{derive_code, normalize};
use crate::schemas::{Provenance, RecipeDocument, RecipeIngredient, RecipeStep};
use crate::store::RecipeStore;

/// Recommendation score attached to synthesized recipes, below the 1.0 of a
/// catalog hit so consumers can tell provenance apart.
pub const SYNTHESIZED_SCORE: f64 = 0.9;

#[derive(Debug, Deserialize)]
struct GeneratedIngredient {
    name: String,
    #[serde(default)]
    quantity: f64,
    #[serde(default)]
    unit: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedStep {
    #[serde(default)]
    step_no: u32,
    instruction: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedRecipe {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    ingredients: Vec<GeneratedIngredient>,
    steps: Vec<GeneratedStep>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    cuisine: String,
    #[serde(default)]
    difficulty: String,
    cooking_time: u32,
    #[serde(default = "default_servings")]
    servings: u32,
}

fn default_servings() -> u32 {
    2
}

pub struct RecipeSynthesizer {
    recipes: Arc<dyn RecipeStore>,
    generative: Arc<dyn Generative>,
}

impl RecipeSynthesizer {
    pub fn new(recipes: Arc<dyn RecipeStore>, generative: Arc<dyn Generative>) -> Self {
        Self {
            recipes,
            generative,
        }
    }

    /// Generate a recipe for the given constraints, persist it with
    /// provenance `gpt`, and return it. Unparseable output is a
    /// `MalformedGeneration` error; there is no automatic retry.
    pub async fn synthesize(
        &self,
        available: &[String],
        required: &[String],
        max_time: u32,
    ) -> Result<RecipeDocument, CoreError> {
        let system_prompt = r#"あなたはプロの料理アシスタントです。
入力条件を参考に、以下のフォーマットでレシピをJSON形式で出力してください。
JSONオブジェクトのみを出力し、説明文やマークダウンの装飾は付けないでください。

【フォーマット】
{
  "name": "...",
  "description": "...",
  "ingredients": [{"name": "...", "quantity": 0, "unit": "..."}],
  "steps": [{"step_no": 1, "instruction": "..."}],
  "cuisine": "...",
  "tags": ["..."],
  "difficulty": "...",
  "cooking_time": 0,
  "servings": 0
}"#;

        let user_prompt = format!(
            "利用可能食材: {}\n必須食材: {}\n調理時間上限: {}分",
            available.join(", "),
            required.join(", "),
            max_time
        );

        let content = self
            .generative
            .complete(CompletionRequest {
                system_prompt: Some(system_prompt.to_string()),
                user_prompt,
                response_format: None,
                temperature: 0.7,
                max_tokens: 1000,
            })
            .await?;

        let stripped = strip_markdown_fences(&content);
        let generated: GeneratedRecipe = serde_json::from_str(&stripped).map_err(|err| {
            error!("unparseable generated recipe: {} raw: {}", err, stripped);
            CoreError::MalformedGeneration {
                detail: err.to_string(),
                raw: stripped.clone(),
            }
        })?;

        if generated.steps.is_empty() {
            error!("generated recipe has no steps: {}", stripped);
            return Err(CoreError::MalformedGeneration {
                detail: "generated recipe has no steps".to_string(),
                raw: stripped,
            });
        }
        if generated.ingredients.iter().any(|i| i.quantity < 0.0) {
            error!("generated recipe has negative quantity: {}", stripped);
            return Err(CoreError::MalformedGeneration {
                detail: "negative ingredient quantity".to_string(),
                raw: stripped,
            });
        }

        let recipe = RecipeDocument {
            id: None,
            name: generated.name,
            description: generated.description,
            image_url: generated.image_url,
            source_url: None,
            ingredients: generated
                .ingredients
                .into_iter()
                .map(|ingredient| {
                    // Same slug derivation the resolver uses; names the slug
                    // cannot express (e.g. Japanese) fall back to the
                    // normalized name so the reference stays queryable.
                    let code = derive_code(&ingredient.name);
                    RecipeIngredient {
                        ingredient_code: if code.is_empty() {
                            normalize(&ingredient.name)
                        } else {
                            code
                        },
                        quantity: ingredient.quantity,
                        unit: ingredient.unit,
                    }
                })
                .collect(),
            // Renumber so the contiguity invariant holds whatever the model
            // produced.
            steps: generated
                .steps
                .into_iter()
                .enumerate()
                .map(|(index, step)| RecipeStep {
                    step_no: index as u32 + 1,
                    instruction: step.instruction,
                })
                .collect(),
            tags: generated.tags,
            cuisine: generated.cuisine,
            difficulty: generated.difficulty,
            cooking_time: generated.cooking_time,
            servings: generated.servings,
            generated_by: Provenance::Gpt,
            created_at: None,
            updated_at: None,
        };
        recipe.validate()?;

        self.recipes.insert_recipe(recipe.clone()).await?;
        info!("synthesized recipe '{}' added to catalog", recipe.name);
        Ok(recipe)
    }
}
