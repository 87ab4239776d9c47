//! The `mediphant` application: logging setup and command dispatch.

use std::sync::Arc;

use mediphant_core::Result;
use tracing_subscriber::EnvFilter;

use crate::cli::{CliArgs, Command};
use crate::config::MediphantConfig;
use crate::config_handlers;
use crate::handlers::{self, AskOptions, IndexOptions};

// ============================================================================
// MediphantApp
// ============================================================================

/// Loaded configuration plus the binary's identity.
pub struct MediphantApp {
    name: String,
    config: Arc<MediphantConfig>,
    version: String,
}

impl MediphantApp {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let config = MediphantConfig::load(args.config.as_deref())?;
        Ok(Self::new(config))
    }

    /// Create an application around `config`.
    pub fn new(config: MediphantConfig) -> Self {
        Self {
            name: "mediphant".to_string(),
            config: Arc::new(config),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// The loaded configuration.
    pub fn config(&self) -> &MediphantConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` if set, otherwise defaults based on verbosity flags.
    /// Records from the `log` facade are forwarded to the same subscriber.
    pub fn init_logging(&self, verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // Ignore error if a subscriber is already set (e.g. in tests).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Run the CLI with the given arguments.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);

        match args.command {
            Some(Command::Index {
                corpus,
                index,
                concurrency,
            }) => {
                let options = IndexOptions {
                    corpus,
                    index,
                    concurrency,
                };
                handlers::handle_index(&self.config, options).await
            }
            Some(Command::Ask {
                question,
                top_k,
                json,
                dry_run,
            }) => {
                let options = AskOptions {
                    question: question.join(" "),
                    top_k,
                    json,
                    dry_run,
                };
                handlers::handle_ask(&self.config, options).await
            }
            Some(Command::Config(config_cmd)) => {
                config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
            }
            Some(Command::Version) => {
                println!("{} {}", self.name, self.version);
                Ok(())
            }
            None => {
                println!("{} {}: use --help for usage", self.name, self.version);
                Ok(())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
