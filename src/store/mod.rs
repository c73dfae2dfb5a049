//! Injected document-store seam.
//!
//! Components receive these traits at construction time instead of touching
//! a process-wide client, so tests can swap in [`memory::MemoryStore`].

pub mod memory;
pub mod mongo;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::schemas::{
    FeedbackRecord, IngredientIdentity, InventoryItem, RecipeDocument, UserSession,
};

#[async_trait]
pub trait IngredientStore: Send + Sync {
    /// Exact lookup of a normalized name against standard name, internal
    /// code, or any synonym.
    async fn find_exact(&self, normalized: &str) -> Result<Option<IngredientIdentity>, CoreError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<IngredientIdentity>, CoreError>;

    /// Full scan. The fuzzy stage builds its candidate set from this.
    async fn all_identities(&self) -> Result<Vec<IngredientIdentity>, CoreError>;

    async fn insert_identity(
        &self,
        identity: IngredientIdentity,
    ) -> Result<IngredientIdentity, CoreError>;

    /// Atomic set-insertion; a concurrent duplicate add must not create a
    /// second copy.
    async fn add_synonym(&self, code: &str, synonym: &str) -> Result<(), CoreError>;

    /// Resolve one free-text name to the owning identity's code.
    async fn code_for_name(&self, name: &str) -> Result<Option<String>, CoreError>;

    /// Resolve many names at once. Names that match nothing are dropped.
    async fn codes_for_names(&self, names: &[String]) -> Result<Vec<String>, CoreError>;

    /// Append-only feedback audit trail.
    async fn append_feedback(&self, record: FeedbackRecord) -> Result<(), CoreError>;
}

#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn insert_recipe(&self, recipe: RecipeDocument) -> Result<(), CoreError>;

    /// One uniformly random recipe satisfying: cooking time within budget,
    /// every required code among its ingredients, and its ingredient codes
    /// a subset of `available`.
    async fn sample_eligible(
        &self,
        available: &[String],
        required: &[String],
        max_time: u32,
    ) -> Result<Option<RecipeDocument>, CoreError>;

    /// All recipes within the time budget, for application-side filtering.
    async fn find_within_time(&self, max_time: u32) -> Result<Vec<RecipeDocument>, CoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_session(&self, user_id: &str) -> Result<Option<UserSession>, CoreError>;

    /// Full replace of the user's recipe snapshot, cursor back to zero.
    async fn assign_recipe(&self, user_id: &str, recipe: &RecipeDocument)
        -> Result<(), CoreError>;

    /// Conditional cursor advance: applies only where the stored cursor
    /// still equals `from_step`. Returns whether the write took effect, so
    /// two concurrent advances cannot both apply against the same base.
    async fn advance_step(&self, user_id: &str, from_step: u32) -> Result<bool, CoreError>;

    async fn reset_session(&self, user_id: &str) -> Result<(), CoreError>;

    async fn set_inventory(
        &self,
        user_id: &str,
        items: &[InventoryItem],
    ) -> Result<(), CoreError>;
}
