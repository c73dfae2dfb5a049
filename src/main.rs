use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::fs;
use tracing_subscriber::EnvFilter;

use recipe_guide::api_connection::connection::Provider;
use recipe_guide::chat_flow::{ChatFlow, LineMessenger, Messenger, NullMessenger, CMD_NEXT, CMD_START};
use recipe_guide::cli::{parse_args, Command};
use recipe_guide::config::Settings;
use recipe_guide::enrichment::TriviaGenerator;
use recipe_guide::generative::Generative;
use recipe_guide::ingredient_resolver::{IngredientDraft, IngredientResolver};
use recipe_guide::inventory::{parse_inventory_spec, InventoryService};
use recipe_guide::recipe_matcher::RecipeMatcher;
use recipe_guide::recipe_synthesizer::RecipeSynthesizer;
use recipe_guide::recommender::Recommender;
use recipe_guide::schemas::{Category, RecommendationRequest};
use recipe_guide::session_tracker::SessionTracker;
use recipe_guide::step_verifier::StepVerifier;
use recipe_guide::store::memory::MemoryStore;
use recipe_guide::store::mongo::MongoStore;
use recipe_guide::store::{IngredientStore, RecipeStore, UserStore};

const API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli_args = parse_args();
    let settings = Settings::from_env();

    let (ingredients, recipes, users): (
        Arc<dyn IngredientStore>,
        Arc<dyn RecipeStore>,
        Arc<dyn UserStore>,
    ) = if cli_args.offline {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), store.clone(), store)
    } else {
        let store = Arc::new(
            MongoStore::connect(&settings.mongo_uri, &settings.mongo_db_name)
                .await
                .with_context(|| {
                    format!("Failed to connect to MongoDB at {}", settings.mongo_uri)
                })?,
        );
        (store.clone(), store.clone(), store)
    };

    let generative: Arc<dyn Generative> = Arc::new(Provider::openrouter(
        API_KEY_ENV_VAR,
        &settings.openrouter_model,
    ));
    let messenger: Arc<dyn Messenger> = match &settings.line_channel_access_token {
        Some(token) => Arc::new(LineMessenger::new(token.clone())),
        None => Arc::new(NullMessenger),
    };

    let resolver = IngredientResolver::new(ingredients.clone(), generative.clone());
    let matcher = RecipeMatcher::new(ingredients.clone(), recipes.clone());
    let synthesizer = Arc::new(RecipeSynthesizer::new(recipes.clone(), generative.clone()));
    let tracker = SessionTracker::new(users.clone());
    let trivia = TriviaGenerator::new(generative.clone());
    let verifier = StepVerifier::new(generative.clone());
    let inventory = InventoryService::new(users.clone());
    let recommender = Recommender::new(
        matcher.clone(),
        synthesizer,
        tracker.clone(),
        trivia.clone(),
        messenger.clone(),
    );
    let chat = ChatFlow::new(
        matcher,
        tracker.clone(),
        verifier,
        trivia,
        messenger,
        users.clone(),
        settings.frontend_url.clone(),
    );

    match cli_args.command {
        Command::Resolve { text } => {
            let resolution = resolver.resolve(&text).await?;
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
        Command::AddIngredient {
            standard_name,
            synonyms,
            category,
            emoji,
            confidence,
        } => {
            let stored = resolver
                .create(IngredientDraft {
                    standard_name,
                    synonyms,
                    category: Category::parse(&category),
                    emoji,
                    confidence,
                })
                .await?;
            println!(
                "Registered '{}' with code '{}'",
                stored.standard_name, stored.internal_code
            );
        }
        Command::Feedback { text, accept } => {
            match resolver.submit_feedback(&text, accept, None).await? {
                Some(identity) => println!(
                    "Learned '{}' with code '{}'",
                    identity.standard_name, identity.internal_code
                ),
                None => println!("Feedback recorded."),
            }
        }
        Command::Recommend {
            available,
            required,
            max_time,
            user,
            synthesize,
        } => {
            let items = available
                .iter()
                .map(|spec| parse_inventory_spec(spec))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let response = recommender
                .recommend(
                    RecommendationRequest {
                        available_ingredients: items,
                        required_ingredients: required,
                        max_cooking_time: max_time,
                        user_id: user,
                    },
                    synthesize,
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Start { user } => chat.on_text(&user, CMD_START).await?,
        Command::Next { user } => chat.on_text(&user, CMD_NEXT).await?,
        Command::Reset { user } => {
            tracker.reset(&user).await?;
            println!("Session cleared for {}", user);
        }
        Command::VerifyImage { user, image } => {
            let bytes = fs::read(&image)
                .await
                .with_context(|| format!("Failed to read image file '{}'", image))?;
            chat.on_image(&user, &bytes).await?;
        }
        Command::Inventory { user } => {
            let (items, updated_at) = inventory.get(&user).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
            if let Some(updated_at) = updated_at {
                println!("updated_at: {}", updated_at);
            }
        }
        Command::PatchInventory { user, add, remove } => {
            let updates = add
                .iter()
                .map(|spec| parse_inventory_spec(spec))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let items = inventory.patch(&user, &updates, &remove).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    Ok(())
}
