//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand};

// ============================================================================
// CLI argument types
// ============================================================================

/// Top-level arguments of the `mediphant` binary.
#[derive(Parser, Debug)]
#[command(name = "mediphant", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "MEDIPHANT_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Commands of the `mediphant` binary.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chunk, embed, and upsert the FAQ corpus.
    Index {
        /// Corpus file (overrides `corpus.path`).
        #[arg(long)]
        corpus: Option<String>,

        /// Index name (overrides `vector_store.index_name`).
        #[arg(long)]
        index: Option<String>,

        /// Batches embedded and upserted at once (overrides `indexer.concurrency`).
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Answer a question from the indexed corpus.
    Ask {
        /// The question. Multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Paragraphs to retrieve (overrides `query.top_k`).
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the `{answer, matches}` JSON body.
        #[arg(long)]
        json: bool,

        /// Retrieve and print the prompt without calling the generative model.
        #[arg(long)]
        dry_run: bool,
    },

    /// Configuration operations.
    Config(ConfigCommand),

    /// Print version information.
    Version,
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Get a configuration value by dotted key.
    Get {
        /// Dotted key (e.g., "query.top_k").
        key: String,
    },

    /// Set a configuration value by dotted key.
    Set {
        /// Dotted key (e.g., "vector_store.backend").
        key: String,

        /// Value to set.
        value: String,
    },

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },

    /// Export configuration as environment variables.
    Export {
        /// Format as Docker --env flags.
        #[arg(long)]
        docker_env: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================
