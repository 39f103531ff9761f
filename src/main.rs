// ABOUTME: Entry point for the easydep deployment agent.
// ABOUTME: Loads the environment, wires the components and polls until interrupted.

mod cli;

use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use easydep::config::Settings;
use easydep::error::{Error, Result};
use easydep::feed::ReleaseFeed;
use easydep::github::GitHubAccess;
use easydep::layout::PathLayout;
use easydep::stages::{deploy_chain, rollback_chain};
use easydep::supervisor::ReleaseSupervisor;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    // Load the environment from an optional .env file
    match &cli.env_file {
        Some(path) => {
            if let Err(err) = dotenvy::from_path(path) {
                eprintln!("Error: unable to load env file {}: {err}", path.display());
                std::process::exit(1);
            }
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    if let Err(e) = run().await {
        handle_error(e);
    }
}

/// Handle startup errors with helpful hints.
fn handle_error(e: Error) -> ! {
    match &e {
        Error::MissingEnvVar(name) => {
            eprintln!("Error: {e}");
            eprintln!("       Tip: Set {name} in the environment or a .env file");
            std::process::exit(2);
        }
        Error::InvalidConfig(_) => {
            eprintln!("Error: {e}");
            std::process::exit(3);
        }
        _ => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<()> {
    let settings = Settings::from_env()?;

    let layout = Arc::new(PathLayout::new(
        settings.base_directory.clone(),
        &settings.link_name,
    )?);
    layout.create_if_missing()?;

    let github = GitHubAccess::connect(&settings)?;

    let supervisor = Arc::new(ReleaseSupervisor::new(
        Arc::clone(&layout),
        deploy_chain(&settings, Arc::clone(&layout), github.clone()),
        rollback_chain(Arc::clone(&layout), settings.additional_symlinks.clone()),
    ));

    let feed = ReleaseFeed::new(github, supervisor, settings.poll_interval);
    tracing::info!(
        "easydep agent watching {}/{}, polling every {:?}",
        settings.repo_owner,
        settings.repo_name,
        settings.poll_interval
    );

    tokio::select! {
        _ = feed.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
        }
    }

    Ok(())
}
