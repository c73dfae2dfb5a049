//! In-memory store used by tests and offline runs.
//!
//! Same observable behavior as the MongoDB implementation: synonym adds are
//! set-idempotent, sampling is uniform among eligible recipes, and cursor
//! advancement is compare-and-set. The mutex is only ever held around
//! synchronous map operations, never across an await.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bson::DateTime;
use rand::seq::SliceRandom;

use crate::error::CoreError;
use crate::ingredient_resolver::normalize;
use crate::recipe_matcher::is_eligible;
use crate::schemas::{
    FeedbackRecord, IngredientIdentity, InventoryItem, RecipeDocument, UserSession,
};
use crate::store::{IngredientStore, RecipeStore, UserStore};

#[derive(Default)]
struct MemoryInner {
    ingredients: Vec<IngredientIdentity>,
    recipes: Vec<RecipeDocument>,
    users: HashMap<String, UserSession>,
    feedback: Vec<FeedbackRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of feedback records appended so far.
    pub fn feedback_count(&self) -> usize {
        self.inner.lock().unwrap().feedback.len()
    }

    pub fn feedback_records(&self) -> Vec<FeedbackRecord> {
        self.inner.lock().unwrap().feedback.clone()
    }

    pub fn recipe_count(&self) -> usize {
        self.inner.lock().unwrap().recipes.len()
    }
}

fn matches_identity(identity: &IngredientIdentity, normalized: &str) -> bool {
    normalize(&identity.standard_name) == normalized
        || identity.internal_code == normalized
        || identity.synonyms.iter().any(|s| s == normalized)
}

#[async_trait]
impl IngredientStore for MemoryStore {
    async fn find_exact(&self, normalized: &str) -> Result<Option<IngredientIdentity>, CoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .ingredients
            .iter()
            .find(|identity| matches_identity(identity, normalized))
            .cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<IngredientIdentity>, CoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .ingredients
            .iter()
            .find(|identity| identity.internal_code == code)
            .cloned())
    }

    async fn all_identities(&self) -> Result<Vec<IngredientIdentity>, CoreError> {
        Ok(self.inner.lock().unwrap().ingredients.clone())
    }

    async fn insert_identity(
        &self,
        mut identity: IngredientIdentity,
    ) -> Result<IngredientIdentity, CoreError> {
        let now = DateTime::now();
        identity.created_at = Some(now);
        identity.updated_at = Some(now);
        self.inner.lock().unwrap().ingredients.push(identity.clone());
        Ok(identity)
    }

    async fn add_synonym(&self, code: &str, synonym: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(identity) = inner
            .ingredients
            .iter_mut()
            .find(|identity| identity.internal_code == code)
        {
            if !identity.synonyms.iter().any(|s| s == synonym) {
                identity.synonyms.push(synonym.to_string());
            }
            identity.updated_at = Some(DateTime::now());
        }
        Ok(())
    }

    async fn code_for_name(&self, name: &str) -> Result<Option<String>, CoreError> {
        let normalized = normalize(name);
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .ingredients
            .iter()
            .find(|identity| matches_identity(identity, &normalized))
            .map(|identity| identity.internal_code.clone()))
    }

    async fn codes_for_names(&self, names: &[String]) -> Result<Vec<String>, CoreError> {
        let inner = self.inner.lock().unwrap();
        let mut codes = Vec::new();
        for name in names {
            let normalized = normalize(name);
            if let Some(identity) = inner
                .ingredients
                .iter()
                .find(|identity| matches_identity(identity, &normalized))
            {
                if !codes.contains(&identity.internal_code) {
                    codes.push(identity.internal_code.clone());
                }
            }
        }
        Ok(codes)
    }

    async fn append_feedback(&self, record: FeedbackRecord) -> Result<(), CoreError> {
        self.inner.lock().unwrap().feedback.push(record);
        Ok(())
    }
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn insert_recipe(&self, mut recipe: RecipeDocument) -> Result<(), CoreError> {
        let now = DateTime::now();
        recipe.created_at = Some(now);
        recipe.updated_at = Some(now);
        self.inner.lock().unwrap().recipes.push(recipe);
        Ok(())
    }

    async fn sample_eligible(
        &self,
        available: &[String],
        required: &[String],
        max_time: u32,
    ) -> Result<Option<RecipeDocument>, CoreError> {
        let inner = self.inner.lock().unwrap();
        let eligible: Vec<&RecipeDocument> = inner
            .recipes
            .iter()
            .filter(|recipe| is_eligible(recipe, available, required, max_time))
            .collect();
        let mut rng = rand::thread_rng();
        Ok(eligible.choose(&mut rng).map(|recipe| (*recipe).clone()))
    }

    async fn find_within_time(&self, max_time: u32) -> Result<Vec<RecipeDocument>, CoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .recipes
            .iter()
            .filter(|recipe| recipe.cooking_time <= max_time)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_session(&self, user_id: &str) -> Result<Option<UserSession>, CoreError> {
        Ok(self.inner.lock().unwrap().users.get(user_id).cloned())
    }

    async fn assign_recipe(
        &self,
        user_id: &str,
        recipe: &RecipeDocument,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserSession {
                user_id: user_id.to_string(),
                current_recipe: None,
                current_step: 0,
                inventory: Vec::new(),
                updated_at: None,
            });
        session.current_recipe = Some(recipe.clone());
        session.current_step = 0;
        session.updated_at = Some(DateTime::now());
        Ok(())
    }

    async fn advance_step(&self, user_id: &str, from_step: u32) -> Result<bool, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.get_mut(user_id) {
            Some(session)
                if session.current_recipe.is_some() && session.current_step == from_step =>
            {
                session.current_step = from_step + 1;
                session.updated_at = Some(DateTime::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_session(&self, user_id: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.users.get_mut(user_id) {
            session.current_recipe = None;
            session.current_step = 0;
            session.updated_at = Some(DateTime::now());
        }
        Ok(())
    }

    async fn set_inventory(
        &self,
        user_id: &str,
        items: &[InventoryItem],
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserSession {
                user_id: user_id.to_string(),
                current_recipe: None,
                current_step: 0,
                inventory: Vec::new(),
                updated_at: None,
            });
        session.inventory = items.to_vec();
        session.updated_at = Some(DateTime::now());
        Ok(())
    }
}
