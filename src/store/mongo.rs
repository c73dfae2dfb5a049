//! MongoDB-backed store.
//!
//! Mutations the core needs atomically (synonym learning, cursor advance)
//! are expressed as single-document updates (`$addToSet`, conditional
//! `update_one`) so no application-level lock is ever held across an await.

use bson::{doc, Bson, DateTime, Document};
use futures_util::TryStreamExt;
use mongodb::{Client, Collection};
use tracing::info;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::ingredient_resolver::title_case;
use crate::schemas::{
    FeedbackRecord, IngredientIdentity, InventoryItem, RecipeDocument, UserSession,
};
use crate::store::{IngredientStore, RecipeStore, UserStore};

pub const INGREDIENT_COLLECTION: &str = "ingredient_master";
pub const RECIPE_COLLECTION: &str = "recipes";
pub const USER_COLLECTION: &str = "users";
pub const FEEDBACK_COLLECTION: &str = "ingredient_feedback";

#[derive(Clone)]
pub struct MongoStore {
    ingredients: Collection<IngredientIdentity>,
    recipes: Collection<RecipeDocument>,
    users: Collection<UserSession>,
    feedback: Collection<FeedbackRecord>,
}

impl MongoStore {
    /// Connect and verify the connection with a ping.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, CoreError> {
        info!("Connecting to MongoDB at {}", uri);

        // serverSelectionTimeoutMS keeps startup from hanging on an
        // unreachable server.
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| CoreError::Store(format!("Failed to connect to MongoDB: {}", e)))?;

        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| CoreError::Store(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            ingredients: db.collection(INGREDIENT_COLLECTION),
            recipes: db.collection(RECIPE_COLLECTION),
            users: db.collection(USER_COLLECTION),
            feedback: db.collection(FEEDBACK_COLLECTION),
        })
    }
}

/// Match clause for one normalized name against standard name, code, or
/// synonyms. Standard names are stored title-cased, so the title-cased form
/// is included alongside the normalized one.
fn name_clause(normalized: &str) -> Document {
    doc! {
        "$or": [
            { "standard_name": { "$in": [normalized, title_case(normalized).as_str()] } },
            { "internal_code": normalized },
            { "synonyms": normalized },
        ]
    }
}

#[async_trait]
impl IngredientStore for MongoStore {
    async fn find_exact(&self, normalized: &str) -> Result<Option<IngredientIdentity>, CoreError> {
        self.ingredients
            .find_one(name_clause(normalized))
            .await
            .map_err(|e| CoreError::Store(format!("ingredient lookup failed: {}", e)))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<IngredientIdentity>, CoreError> {
        self.ingredients
            .find_one(doc! { "internal_code": code })
            .await
            .map_err(|e| CoreError::Store(format!("ingredient lookup failed: {}", e)))
    }

    async fn all_identities(&self) -> Result<Vec<IngredientIdentity>, CoreError> {
        let cursor = self
            .ingredients
            .find(doc! {})
            .await
            .map_err(|e| CoreError::Store(format!("ingredient scan failed: {}", e)))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| CoreError::Store(format!("ingredient scan failed: {}", e)))
    }

    async fn insert_identity(
        &self,
        mut identity: IngredientIdentity,
    ) -> Result<IngredientIdentity, CoreError> {
        let now = DateTime::now();
        identity.created_at = Some(now);
        identity.updated_at = Some(now);
        self.ingredients
            .insert_one(&identity)
            .await
            .map_err(|e| CoreError::Store(format!("ingredient insert failed: {}", e)))?;
        Ok(identity)
    }

    async fn add_synonym(&self, code: &str, synonym: &str) -> Result<(), CoreError> {
        self.ingredients
            .update_one(
                doc! { "internal_code": code },
                doc! {
                    "$addToSet": { "synonyms": synonym },
                    "$set": { "updated_at": DateTime::now() },
                },
            )
            .await
            .map_err(|e| CoreError::Store(format!("synonym add failed: {}", e)))?;
        Ok(())
    }

    async fn code_for_name(&self, name: &str) -> Result<Option<String>, CoreError> {
        let normalized = crate::ingredient_resolver::normalize(name);
        Ok(self
            .find_exact(&normalized)
            .await?
            .map(|identity| identity.internal_code))
    }

    async fn codes_for_names(&self, names: &[String]) -> Result<Vec<String>, CoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let normalized: Vec<String> = names
            .iter()
            .map(|name| crate::ingredient_resolver::normalize(name))
            .collect();
        let clauses: Vec<Document> = normalized.iter().map(|n| name_clause(n)).collect();
        let cursor = self
            .ingredients
            .find(doc! { "$or": clauses })
            .await
            .map_err(|e| CoreError::Store(format!("ingredient lookup failed: {}", e)))?;
        let matches: Vec<IngredientIdentity> = cursor
            .try_collect()
            .await
            .map_err(|e| CoreError::Store(format!("ingredient lookup failed: {}", e)))?;

        let mut codes = Vec::new();
        for identity in matches {
            if !codes.contains(&identity.internal_code) {
                codes.push(identity.internal_code);
            }
        }
        Ok(codes)
    }

    async fn append_feedback(&self, record: FeedbackRecord) -> Result<(), CoreError> {
        self.feedback
            .insert_one(&record)
            .await
            .map_err(|e| CoreError::Store(format!("feedback append failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl RecipeStore for MongoStore {
    async fn insert_recipe(&self, mut recipe: RecipeDocument) -> Result<(), CoreError> {
        let now = DateTime::now();
        recipe.created_at = Some(now);
        recipe.updated_at = Some(now);
        self.recipes
            .insert_one(&recipe)
            .await
            .map_err(|e| CoreError::Store(format!("recipe insert failed: {}", e)))?;
        Ok(())
    }

    async fn sample_eligible(
        &self,
        available: &[String],
        required: &[String],
        max_time: u32,
    ) -> Result<Option<RecipeDocument>, CoreError> {
        let mut match_doc = doc! {
            "$expr": {
                "$setIsSubset": ["$ingredients.ingredient_code", available]
            },
            "cooking_time": { "$lte": max_time },
        };
        // An empty $all matches nothing, so the coverage clause only exists
        // when there are required ingredients.
        if !required.is_empty() {
            match_doc.insert(
                "ingredients.ingredient_code",
                doc! { "$all": required },
            );
        }

        let pipeline = vec![
            doc! { "$match": match_doc },
            doc! { "$sample": { "size": 1 } },
        ];

        let mut cursor = self
            .recipes
            .aggregate(pipeline)
            .await
            .map_err(|e| CoreError::Store(format!("recipe sampling failed: {}", e)))?;

        match cursor
            .try_next()
            .await
            .map_err(|e| CoreError::Store(format!("recipe sampling failed: {}", e)))?
        {
            Some(document) => {
                let recipe = bson::from_document::<RecipeDocument>(document)
                    .map_err(|e| CoreError::Store(format!("recipe decode failed: {}", e)))?;
                Ok(Some(recipe))
            }
            None => Ok(None),
        }
    }

    async fn find_within_time(&self, max_time: u32) -> Result<Vec<RecipeDocument>, CoreError> {
        let cursor = self
            .recipes
            .find(doc! { "cooking_time": { "$lte": max_time } })
            .await
            .map_err(|e| CoreError::Store(format!("recipe scan failed: {}", e)))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| CoreError::Store(format!("recipe scan failed: {}", e)))
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn find_session(&self, user_id: &str) -> Result<Option<UserSession>, CoreError> {
        self.users
            .find_one(doc! { "_id": user_id })
            .await
            .map_err(|e| CoreError::Store(format!("user lookup failed: {}", e)))
    }

    async fn assign_recipe(
        &self,
        user_id: &str,
        recipe: &RecipeDocument,
    ) -> Result<(), CoreError> {
        let snapshot = bson::to_bson(recipe)
            .map_err(|e| CoreError::Store(format!("recipe encode failed: {}", e)))?;
        self.users
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$set": {
                        "current_recipe": snapshot,
                        "current_step": 0,
                        "updated_at": DateTime::now(),
                    }
                },
            )
            .upsert(true)
            .await
            .map_err(|e| CoreError::Store(format!("session assign failed: {}", e)))?;
        Ok(())
    }

    async fn advance_step(&self, user_id: &str, from_step: u32) -> Result<bool, CoreError> {
        // Conditional write: only applies while the stored cursor still
        // equals the base the caller read.
        let result = self
            .users
            .update_one(
                doc! {
                    "_id": user_id,
                    "current_step": from_step,
                    "current_recipe": { "$exists": true },
                },
                doc! {
                    "$set": {
                        "current_step": from_step + 1,
                        "updated_at": DateTime::now(),
                    }
                },
            )
            .await
            .map_err(|e| CoreError::Store(format!("session advance failed: {}", e)))?;
        Ok(result.modified_count == 1)
    }

    async fn reset_session(&self, user_id: &str) -> Result<(), CoreError> {
        self.users
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$unset": { "current_recipe": Bson::String(String::new()), "current_step": Bson::String(String::new()) },
                    "$set": { "updated_at": DateTime::now() },
                },
            )
            .await
            .map_err(|e| CoreError::Store(format!("session reset failed: {}", e)))?;
        Ok(())
    }

    async fn set_inventory(
        &self,
        user_id: &str,
        items: &[InventoryItem],
    ) -> Result<(), CoreError> {
        let encoded = bson::to_bson(&items)
            .map_err(|e| CoreError::Store(format!("inventory encode failed: {}", e)))?;
        self.users
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$set": { "inventory": encoded, "updated_at": DateTime::now() }
                },
            )
            .upsert(true)
            .await
            .map_err(|e| CoreError::Store(format!("inventory update failed: {}", e)))?;
        Ok(())
    }
}
