use std::env;

use dotenv::dotenv;

/// Environment-backed settings, constructed once and passed to the
/// components that need them.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mongo_uri: String,
    pub mongo_db_name: String,
    pub openrouter_model: String,
    pub line_channel_access_token: Option<String>,
    pub frontend_url: String,
}

impl Settings {
    pub fn from_env() -> Self {
        dotenv().ok();
        Settings {
            mongo_uri: env::var("MONGO_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            mongo_db_name: env::var("MONGO_DB_NAME")
                .unwrap_or_else(|_| "recipe_guide".to_string()),
            openrouter_model: env::var("OPENROUTER_MODEL")
                .unwrap_or_else(|_| "openai/gpt-4o".to_string()),
            line_channel_access_token: env::var("LINE_CHANNEL_ACCESS_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "https://example.com".to_string()),
        }
    }
}
