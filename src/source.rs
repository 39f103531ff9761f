// ABOUTME: Interfaces to the external release feed and repository credential minting.
// ABOUTME: Implemented by the GitHub module, stubbed out in tests.

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use crate::release::Release;

/// The release feed or credential backend could not be reached.
///
/// Callers treat this as transient: the poll loop logs it and retries on
/// the next tick.
#[derive(Debug, Error)]
#[error("release source unavailable: {0}")]
pub struct SourceError(pub String);

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Feed of published releases, newest first.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// The latest published release, or `None` if no release exists yet.
    async fn latest_release(&self) -> Result<Option<Release>, SourceError>;
}

/// Mints short-lived credentials for authenticated repository fetches.
#[async_trait]
pub trait RepoFetcher: Send + Sync {
    /// A fresh access token usable in a fetch URL. Tokens rotate, so every
    /// deployment mints its own.
    async fn access_token(&self) -> Result<SecretString, SourceError>;
}
