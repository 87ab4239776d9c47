//! `mediphant`: index a medication FAQ corpus and answer questions from it.

use std::process::ExitCode;

use clap::Parser;
use mediphant_cli::{CliArgs, MediphantApp};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let app = match MediphantApp::from_args(&args) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match app.run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
