// ABOUTME: Thin wrapper around the git CLI for clone, fetch and checkout operations.
// ABOUTME: Commands run non-interactively with captured output for error reporting.

use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("unable to run git {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("git {command} failed with {status}: {stderr}")]
    Command {
        command: &'static str,
        status: String,
        stderr: String,
    },
}

/// Clones `url` into `dest` without checking out a working tree. The clone
/// only seeds the cache; working trees are materialized per release.
pub async fn clone_no_checkout(url: &str, dest: &Path) -> Result<(), GitError> {
    run(
        "clone",
        None,
        &["clone", "--no-checkout", url, &dest.to_string_lossy()],
    )
    .await
}

/// Points the `origin` remote of the repository at a fresh fetch URL.
/// Required before every fetch because embedded access tokens rotate.
pub async fn set_remote_url(repo: &Path, url: &str) -> Result<(), GitError> {
    run("remote set-url", Some(repo), &["remote", "set-url", "origin", url]).await
}

/// Fetches from `origin`, updating tags and pruning refs deleted upstream.
pub async fn fetch_tags_prune(repo: &Path) -> Result<(), GitError> {
    run(
        "fetch",
        Some(repo),
        &["fetch", "--force", "--tags", "--prune", "origin"],
    )
    .await
}

/// Hard-resets the working tree to the given revision.
pub async fn reset_hard(repo: &Path, revision: &str) -> Result<(), GitError> {
    run("reset", Some(repo), &["reset", "--hard", revision]).await
}

async fn run(command: &'static str, cwd: Option<&Path>, args: &[&str]) -> Result<(), GitError> {
    let mut invocation = Command::new("git");
    invocation
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        invocation.current_dir(cwd);
    }

    let output = invocation
        .output()
        .await
        .map_err(|source| GitError::Spawn { command, source })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(GitError::Command {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
