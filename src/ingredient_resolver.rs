//! Free-text ingredient resolution: exact match, fuzzy match, generative
//! fallback, in that strict order, plus the feedback loop that lets the
//! ingredient master learn new synonyms.

use std::collections::HashMap;
use std::sync::Arc;

use bson::DateTime;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::api_connection::endpoints::{
    JsonSchema, JsonSchemaDefinition, JsonSchemaProperty, ResponseFormat,
};
use crate::error::CoreError;
use crate::generative::{strip_markdown_fences, CompletionRequest, Generative};
use crate::schemas::{Category, FeedbackRecord, IngredientIdentity, Provenance};
use crate::store::IngredientStore;

/// Minimum similarity (0-100) for the fuzzy stage to claim a match.
pub const FUZZY_THRESHOLD: f64 = 85.0;

/// Canonical text normalization: NFKC, trim, lowercase. Idempotent.
pub fn normalize(input: &str) -> String {
    input.nfkc().collect::<String>().trim().to_lowercase()
}

/// First character uppercased, the rest lowercased.
pub fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Machine-usable slug: the canonical name with everything that is not a
/// lowercase ASCII letter stripped out.
pub fn derive_code(standard_name: &str) -> String {
    standard_name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .collect()
}

fn contains_non_latin(name: &str) -> bool {
    name.chars()
        .any(|c| c.is_alphabetic() && !c.is_ascii_alphabetic())
}

/// Character-level similarity ratio on a 0-100 scale.
pub fn similarity(a: &str, b: &str) -> f64 {
    TextDiff::from_chars(a, b).ratio() as f64 * 100.0
}

/// Normalize and dedupe a synonym list, dropping empties and the canonical
/// name's own normalized form.
pub fn normalize_synonyms(synonyms: &[String], standard_name: &str) -> Vec<String> {
    let canonical = normalize(standard_name);
    let mut out: Vec<String> = Vec::new();
    for synonym in synonyms {
        let normalized = normalize(synonym);
        if normalized.is_empty() || normalized == canonical {
            continue;
        }
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

/// Manual registration payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientDraft {
    pub standard_name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub emoji: String,
    pub confidence: f64,
}

/// Outcome of a resolution attempt, in decreasing order of confidence.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Hit {
        ingredient: IngredientIdentity,
    },
    Fuzzy {
        ingredient: IngredientIdentity,
        score: f64,
        matched: String,
    },
    HitGpt {
        ingredient: IngredientIdentity,
    },
    Suggest {
        candidate: IngredientIdentity,
    },
    NotFound,
}

/// Shape the generative normalization is asked to produce.
#[derive(Debug, Deserialize)]
struct GeneratedIngredient {
    #[serde(default)]
    standard_name: String,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    emoji: String,
    #[serde(default)]
    confidence: f64,
}

fn ingredient_json_schema() -> JsonSchemaDefinition {
    let mut properties = HashMap::new();
    properties.insert(
        "standard_name".to_string(),
        JsonSchemaProperty {
            property_type: "string".to_string(),
            description: Some(
                "Canonical English name of the ingredient, e.g. 'Onion'.".to_string(),
            ),
            r#enum: None,
            items: None,
        },
    );
    properties.insert(
        "synonyms".to_string(),
        JsonSchemaProperty {
            property_type: "array".to_string(),
            description: Some(
                "Alternative names in any language, including the user's input.".to_string(),
            ),
            r#enum: None,
            items: Some(Box::new(JsonSchema {
                schema_type: "string".to_string(),
                properties: None,
                required: None,
                additional_properties: None,
            })),
        },
    );
    properties.insert(
        "category".to_string(),
        JsonSchemaProperty {
            property_type: "string".to_string(),
            description: None,
            r#enum: Some(
                ["vegetable", "meat", "dairy", "seafood", "grain", "other"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            items: None,
        },
    );
    properties.insert(
        "emoji".to_string(),
        JsonSchemaProperty {
            property_type: "string".to_string(),
            description: Some("A single emoji glyph for the ingredient.".to_string()),
            r#enum: None,
            items: None,
        },
    );
    properties.insert(
        "confidence".to_string(),
        JsonSchemaProperty {
            property_type: "number".to_string(),
            description: Some("How certain the normalization is, 0 to 1.".to_string()),
            r#enum: None,
            items: None,
        },
    );

    JsonSchemaDefinition {
        name: "ingredient_normalization_schema".to_string(),
        strict: Some(true),
        schema: JsonSchema {
            schema_type: "object".to_string(),
            properties: Some(properties),
            required: Some(vec![
                "standard_name".to_string(),
                "synonyms".to_string(),
                "category".to_string(),
                "emoji".to_string(),
                "confidence".to_string(),
            ]),
            additional_properties: Some(false),
        },
    }
}

pub struct IngredientResolver {
    store: Arc<dyn IngredientStore>,
    generative: Arc<dyn Generative>,
}

impl IngredientResolver {
    pub fn new(store: Arc<dyn IngredientStore>, generative: Arc<dyn Generative>) -> Self {
        Self { store, generative }
    }

    /// Resolve free text to an ingredient identity. Exact match outranks
    /// fuzzy, which outranks the generative fallback; the first stage that
    /// succeeds wins. Generative failures degrade to `NotFound`.
    pub async fn resolve(&self, raw_text: &str) -> Result<Resolution, CoreError> {
        let normalized = normalize(raw_text);
        if normalized.is_empty() {
            return Ok(Resolution::NotFound);
        }

        if let Some(identity) = self.store.find_exact(&normalized).await? {
            return Ok(Resolution::Hit { ingredient: identity });
        }

        if let Some((identity, score, matched)) = self.best_fuzzy_match(&normalized).await? {
            if score >= FUZZY_THRESHOLD {
                return Ok(Resolution::Fuzzy {
                    ingredient: identity,
                    score,
                    matched,
                });
            }
            debug!(
                "best fuzzy candidate '{}' scored {:.1}, below threshold",
                matched, score
            );
        }

        let candidate = match self.gpt_normalize(raw_text).await {
            Ok(candidate) => candidate,
            Err(err) => {
                warn!("generative ingredient normalization failed: {}", err);
                return Ok(Resolution::NotFound);
            }
        };

        if let Some(existing) = self.store.find_by_code(&candidate.internal_code).await? {
            let mut ingredient = existing;
            if !ingredient.synonyms.iter().any(|s| s == &normalized) {
                self.store
                    .add_synonym(&ingredient.internal_code, &normalized)
                    .await?;
                ingredient.synonyms.push(normalized);
            }
            return Ok(Resolution::HitGpt { ingredient });
        }

        // Not persisted here; that only happens through accepted feedback.
        Ok(Resolution::Suggest { candidate })
    }

    /// Best-scoring candidate over every normalized (standard name, code,
    /// synonym) string across all identities. First best wins ties.
    async fn best_fuzzy_match(
        &self,
        normalized: &str,
    ) -> Result<Option<(IngredientIdentity, f64, String)>, CoreError> {
        let identities = self.store.all_identities().await?;
        let mut best: Option<(IngredientIdentity, f64, String)> = None;

        for identity in identities {
            let mut candidates = vec![normalize(&identity.standard_name)];
            candidates.push(identity.internal_code.clone());
            for synonym in &identity.synonyms {
                candidates.push(normalize(synonym));
            }
            for candidate in candidates {
                let score = similarity(normalized, &candidate);
                let improves = match &best {
                    Some((_, best_score, _)) => score > *best_score,
                    None => true,
                };
                if improves {
                    best = Some((identity.clone(), score, candidate));
                }
            }
        }
        Ok(best)
    }

    /// Ask the generative capability for a structured normalization and
    /// post-process it into a well-formed (unpersisted) identity.
    async fn gpt_normalize(&self, raw_text: &str) -> Result<IngredientIdentity, CoreError> {
        let system_prompt = "You are an ingredient normalization assistant. \
Given a free-text ingredient name in any language, produce its canonical English name, \
alternative names, category, a single emoji, and your confidence. \
Respond ONLY with a JSON object matching the provided schema. \
Do not include explanatory text or markdown fences.";

        let content = self
            .generative
            .complete(CompletionRequest {
                system_prompt: Some(system_prompt.to_string()),
                user_prompt: format!("Ingredient: \"{}\"", raw_text),
                response_format: Some(ResponseFormat {
                    format_type: "json_schema".to_string(),
                    json_schema: Some(ingredient_json_schema()),
                }),
                temperature: 0.0,
                max_tokens: 300,
            })
            .await?;

        let stripped = strip_markdown_fences(&content);
        let generated: GeneratedIngredient = serde_json::from_str(&stripped).map_err(|err| {
            warn!("unparseable ingredient normalization: {} raw: {}", err, stripped);
            CoreError::MalformedGeneration {
                detail: err.to_string(),
                raw: stripped.clone(),
            }
        })?;

        let mut standard_name = generated.standard_name.trim().to_string();
        if standard_name.is_empty() || contains_non_latin(&standard_name) {
            standard_name = "Unknown".to_string();
        }
        let standard_name = title_case(&standard_name);
        let internal_code = derive_code(&standard_name);
        let synonyms = normalize_synonyms(&generated.synonyms, &standard_name);

        Ok(IngredientIdentity {
            id: None,
            standard_name,
            internal_code,
            synonyms,
            category: Category::parse(&generated.category),
            emoji: generated.emoji,
            confidence: generated.confidence.clamp(0.0, 1.0),
            generated_by: Provenance::Gpt,
            created_at: None,
            updated_at: None,
        })
    }

    /// Record resolution feedback. The record is always appended, whatever
    /// the outcome. On acceptance the correction (caller-supplied or a
    /// fresh generative resolution) is inserted when its code is new; an
    /// existing code leaves the catalog untouched.
    pub async fn submit_feedback(
        &self,
        user_input: &str,
        accepted: bool,
        correction: Option<IngredientIdentity>,
    ) -> Result<Option<IngredientIdentity>, CoreError> {
        let record = FeedbackRecord {
            user_input: user_input.to_string(),
            accepted,
            correction: correction.clone(),
            created_at: DateTime::now(),
        };
        self.store.append_feedback(record).await?;

        if !accepted {
            return Ok(None);
        }

        let mut effective = match correction {
            Some(mut supplied) => {
                supplied.internal_code = derive_code(&supplied.standard_name);
                supplied.synonyms = normalize_synonyms(&supplied.synonyms, &supplied.standard_name);
                supplied
            }
            None => match self.gpt_normalize(user_input).await {
                Ok(candidate) => candidate,
                Err(err) => {
                    warn!("feedback correction generation failed: {}", err);
                    return Ok(None);
                }
            },
        };

        if self
            .store
            .find_by_code(&effective.internal_code)
            .await?
            .is_some()
        {
            info!(
                "identity '{}' already registered; feedback logged only",
                effective.internal_code
            );
            return Ok(None);
        }

        effective.generated_by = Provenance::GptUser;
        let stored = self.store.insert_identity(effective).await?;
        Ok(Some(stored))
    }

    /// Manual registration: normalize synonyms and code, insert
    /// unconditionally.
    pub async fn create(&self, draft: IngredientDraft) -> Result<IngredientIdentity, CoreError> {
        let internal_code = derive_code(&draft.standard_name);
        let synonyms = normalize_synonyms(&draft.synonyms, &draft.standard_name);
        let identity = IngredientIdentity {
            id: None,
            standard_name: draft.standard_name,
            internal_code,
            synonyms,
            category: draft.category,
            emoji: draft.emoji,
            confidence: draft.confidence.clamp(0.0, 1.0),
            generated_by: Provenance::Manual,
            created_at: None,
            updated_at: None,
        };
        self.store.insert_identity(identity).await
    }
}
