use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use the in-memory store instead of MongoDB
    #[arg(long)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a free-text ingredient name to its canonical identity
    Resolve {
        text: String,
    },
    /// Register an ingredient identity manually
    AddIngredient {
        standard_name: String,
        #[arg(long, value_delimiter = ',')]
        synonyms: Vec<String>,
        #[arg(long, default_value = "other")]
        category: String,
        #[arg(long, default_value = "")]
        emoji: String,
        #[arg(long, default_value_t = 1.0)]
        confidence: f64,
    },
    /// Record feedback on a resolution (accepted feedback may grow the catalog)
    Feedback {
        text: String,
        #[arg(long)]
        accept: bool,
    },
    /// Recommend a recipe for the given constraints
    Recommend {
        /// Available ingredients as name:quantity:unit entries
        #[arg(long, value_delimiter = ',')]
        available: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        required: Vec<String>,
        #[arg(long, default_value_t = 60)]
        max_time: u32,
        #[arg(long)]
        user: Option<String>,
        /// Fall back to generative synthesis on a catalog miss
        #[arg(long)]
        synthesize: bool,
    },
    /// Start a cooking session from the user's stored inventory
    Start {
        user: String,
    },
    /// Advance the user's session to the next step
    Next {
        user: String,
    },
    /// Clear the user's session
    Reset {
        user: String,
    },
    /// Verify a step photo and advance on success
    VerifyImage {
        user: String,
        image: String,
    },
    /// Show the user's inventory
    Inventory {
        user: String,
    },
    /// Patch the user's inventory (name:quantity:unit entries)
    PatchInventory {
        user: String,
        #[arg(long, value_delimiter = ',')]
        add: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        remove: Vec<String>,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
