//! Shared document shapes for the ingredient master, recipe catalog, and
//! per-user session state.

use bson::oid::ObjectId;
use bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Vegetable,
    Meat,
    Dairy,
    Seafood,
    Grain,
    #[default]
    Other,
}

impl Category {
    pub fn parse(value: &str) -> Category {
        match value.trim().to_lowercase().as_str() {
            "vegetable" => Category::Vegetable,
            "meat" => Category::Meat,
            "dairy" => Category::Dairy,
            "seafood" => Category::Seafood,
            "grain" => Category::Grain,
            _ => Category::Other,
        }
    }
}

/// Whether a record was manually curated or machine-generated.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    #[serde(rename = "manual")]
    Manual,
    #[serde(rename = "gpt")]
    Gpt,
    #[serde(rename = "gpt+user")]
    GptUser,
}

/// Canonical, deduplicated record a free-text ingredient name resolves to.
/// `internal_code` is a deterministic lowercase-letters-only slug of
/// `standard_name`; recipes and inventories reference identities by it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IngredientIdentity {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub standard_name: String,
    pub internal_code: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub emoji: String,
    pub confidence: f64,
    pub generated_by: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecipeIngredient {
    pub ingredient_code: String,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecipeStep {
    pub step_no: u32,
    pub instruction: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecipeDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub ingredients: Vec<RecipeIngredient>,
    pub steps: Vec<RecipeStep>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub cuisine: String,
    pub difficulty: String,
    /// Total cooking time in minutes.
    pub cooking_time: u32,
    pub servings: u32,
    pub generated_by: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl RecipeDocument {
    /// Step numbers must be contiguous starting at 1 and match list
    /// position; quantities must be non-negative.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (index, step) in self.steps.iter().enumerate() {
            if step.step_no != index as u32 + 1 {
                return Err(CoreError::InvalidInput(format!(
                    "step {} is numbered {}, expected {}",
                    index + 1,
                    step.step_no,
                    index + 1
                )));
            }
        }
        for ingredient in &self.ingredients {
            if ingredient.quantity < 0.0 {
                return Err(CoreError::InvalidInput(format!(
                    "negative quantity for ingredient {}",
                    ingredient.ingredient_code
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InventoryItem {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

/// One document per user. `current_recipe` is a denormalized snapshot:
/// later catalog changes never affect an in-progress session.
/// `current_step` counts completed/acknowledged steps, so
/// `current_step == steps.len()` signals completion.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserSession {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_recipe: Option<RecipeDocument>,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

/// Append-only audit record for resolution feedback. Never mutated.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedbackRecord {
    pub user_input: String,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<IngredientIdentity>,
    pub created_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecommendationRequest {
    pub available_ingredients: Vec<InventoryItem>,
    #[serde(default)]
    pub required_ingredients: Vec<String>,
    pub max_cooking_time: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecommendationResponse {
    pub name: String,
    pub ingredients: Vec<RecipeIngredient>,
    pub steps: Vec<RecipeStep>,
    pub missing_ingredients: Vec<String>,
    pub recommend_score: f64,
    pub recommend_reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe_with_steps(step_nos: &[u32]) -> RecipeDocument {
        RecipeDocument {
            id: None,
            name: "テスト".to_string(),
            description: None,
            image_url: None,
            source_url: None,
            ingredients: vec![RecipeIngredient {
                ingredient_code: "tofu".to_string(),
                quantity: 1.0,
                unit: "丁".to_string(),
            }],
            steps: step_nos
                .iter()
                .map(|&n| RecipeStep {
                    step_no: n,
                    instruction: format!("step {}", n),
                })
                .collect(),
            tags: vec![],
            cuisine: "和食".to_string(),
            difficulty: "easy".to_string(),
            cooking_time: 15,
            servings: 2,
            generated_by: Provenance::Manual,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn contiguous_steps_validate() {
        assert!(recipe_with_steps(&[1, 2, 3]).validate().is_ok());
    }

    #[test]
    fn gapped_steps_are_rejected() {
        assert!(recipe_with_steps(&[1, 3]).validate().is_err());
        assert!(recipe_with_steps(&[0, 1]).validate().is_err());
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let mut recipe = recipe_with_steps(&[1]);
        recipe.ingredients[0].quantity = -1.0;
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn provenance_serializes_to_wire_tags() {
        assert_eq!(
            serde_json::to_value(Provenance::GptUser).unwrap(),
            serde_json::json!("gpt+user")
        );
        assert_eq!(
            serde_json::to_value(Provenance::Manual).unwrap(),
            serde_json::json!("manual")
        );
    }
}
