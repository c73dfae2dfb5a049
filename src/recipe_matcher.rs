//! Recipe selection under subset/coverage and time constraints.

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::CoreError;
use crate::schemas::{InventoryItem, RecipeDocument};
use crate::store::{IngredientStore, RecipeStore};

/// Identity-subset eligibility rule:
/// (a) cooking time within budget,
/// (b) every required code among the recipe's ingredients,
/// (c) the recipe's ingredient codes a subset of the available set.
pub fn is_eligible(
    recipe: &RecipeDocument,
    available: &[String],
    required: &[String],
    max_time: u32,
) -> bool {
    if recipe.cooking_time > max_time {
        return false;
    }
    let recipe_codes: Vec<&str> = recipe
        .ingredients
        .iter()
        .map(|i| i.ingredient_code.as_str())
        .collect();
    if !required.iter().all(|code| recipe_codes.contains(&code.as_str())) {
        return false;
    }
    recipe_codes
        .iter()
        .all(|code| available.iter().any(|a| a == code))
}

#[derive(Clone)]
pub struct RecipeMatcher {
    ingredients: Arc<dyn IngredientStore>,
    recipes: Arc<dyn RecipeStore>,
}

impl RecipeMatcher {
    pub fn new(ingredients: Arc<dyn IngredientStore>, recipes: Arc<dyn RecipeStore>) -> Self {
        Self {
            ingredients,
            recipes,
        }
    }

    /// Select one recipe, uniformly at random among the eligible, or None.
    /// Free-text names are resolved to ingredient codes first; names that
    /// match no identity are dropped.
    pub async fn match_recipe(
        &self,
        available_names: &[String],
        required_names: &[String],
        max_time: u32,
    ) -> Result<Option<RecipeDocument>, CoreError> {
        let available = self.ingredients.codes_for_names(available_names).await?;
        if available.is_empty() {
            // Nothing on hand can only ever satisfy a zero-ingredient
            // recipe, so don't bother the store.
            debug!("no available ingredients resolved; skipping catalog sampling");
            return Ok(None);
        }
        let required = self.ingredients.codes_for_names(required_names).await?;
        self.recipes
            .sample_eligible(&available, &required, max_time)
            .await
    }

    /// Quantity-aware refinement: each recipe ingredient's quantity must be
    /// covered by the user's stock of that ingredient, and each required
    /// amount must not exceed what the recipe itself calls for.
    pub async fn match_recipe_with_quantities(
        &self,
        inventory: &[InventoryItem],
        required: &[InventoryItem],
        max_time: u32,
    ) -> Result<Option<RecipeDocument>, CoreError> {
        let mut stock: HashMap<String, f64> = HashMap::new();
        for item in inventory {
            if let Some(code) = self.ingredients.code_for_name(&item.name).await? {
                *stock.entry(code).or_insert(0.0) += item.quantity;
            }
        }
        if stock.is_empty() {
            return Ok(None);
        }

        let mut required_amounts: Vec<(String, f64)> = Vec::new();
        for item in required {
            if let Some(code) = self.ingredients.code_for_name(&item.name).await? {
                required_amounts.push((code, item.quantity));
            }
        }

        let candidates = self.recipes.find_within_time(max_time).await?;
        let eligible: Vec<RecipeDocument> = candidates
            .into_iter()
            .filter(|recipe| {
                let covered = recipe.ingredients.iter().all(|ingredient| {
                    stock
                        .get(&ingredient.ingredient_code)
                        .map(|held| ingredient.quantity <= *held)
                        .unwrap_or(false)
                });
                let demands_met = required_amounts.iter().all(|(code, amount)| {
                    recipe
                        .ingredients
                        .iter()
                        .find(|ingredient| &ingredient.ingredient_code == code)
                        .map(|ingredient| *amount <= ingredient.quantity)
                        .unwrap_or(false)
                });
                covered && demands_met
            })
            .collect();

        let mut rng = rand::thread_rng();
        Ok(eligible.choose(&mut rng).cloned())
    }
}
