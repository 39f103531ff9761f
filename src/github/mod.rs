// ABOUTME: GitHub App backed implementations of the release source and repo fetcher.
// ABOUTME: Authenticates as an app installation and resolves releases of the configured repository.

mod pem;

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::EncodingKey;
use octocrab::models::{AppId, InstallationId};
use octocrab::Octocrab;
use secrecy::{ExposeSecret, SecretString};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::release::Release;
use crate::source::{ReleaseSource, RepoFetcher, SourceError};

/// GitHub client scoped to the configured source repository.
///
/// Exposes only what the deployment core consumes: the latest release and
/// short-lived installation tokens for git fetches.
pub struct GitHubAccess {
    client: Octocrab,
    owner: String,
    repo_name: String,
}

impl GitHubAccess {
    /// Builds the app-authenticated client from the agent settings.
    pub fn connect(settings: &Settings) -> Result<Arc<Self>> {
        let pem = pem::resolve_private_key(settings.github_private_key.expose_secret())?;
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|err| Error::InvalidConfig(format!("unable to load app private key: {err}")))?;

        let client = Octocrab::builder()
            .app(AppId::from(settings.github_app_id), key)
            .build()
            .map_err(|err| {
                Error::InvalidConfig(format!("unable to construct github client: {err}"))
            })?;

        Ok(Arc::new(Self {
            client,
            owner: settings.repo_owner.clone(),
            repo_name: settings.repo_name.clone(),
        }))
    }

    async fn installation_id(&self) -> std::result::Result<InstallationId, SourceError> {
        let installation = self
            .client
            .apps()
            .get_repository_installation(&self.owner, &self.repo_name)
            .await
            .map_err(|err| {
                SourceError::new(format!(
                    "unable to resolve app installation for {}/{}: {err}",
                    self.owner, self.repo_name
                ))
            })?;
        Ok(installation.id)
    }
}

#[async_trait]
impl ReleaseSource for GitHubAccess {
    async fn latest_release(&self) -> std::result::Result<Option<Release>, SourceError> {
        let installation_id = self.installation_id().await?;
        let scoped = self.client.installation(installation_id);

        match scoped
            .repos(&self.owner, &self.repo_name)
            .releases()
            .get_latest()
            .await
        {
            Ok(release) => Ok(Some(Release {
                id: release.id.0,
                tag_name: release.tag_name,
                owner: self.owner.clone(),
                repo_name: self.repo_name.clone(),
                body: release.body,
            })),
            // a repository without any release yet is not an error
            Err(octocrab::Error::GitHub { source, .. })
                if source.status_code.as_u16() == 404 =>
            {
                Ok(None)
            }
            Err(err) => Err(SourceError::new(format!(
                "unable to fetch latest release: {err}"
            ))),
        }
    }
}

#[async_trait]
impl RepoFetcher for GitHubAccess {
    async fn access_token(&self) -> std::result::Result<SecretString, SourceError> {
        let installation_id = self.installation_id().await?;
        let (_, token) = self
            .client
            .installation_and_token(installation_id)
            .await
            .map_err(|err| SourceError::new(format!("unable to mint installation token: {err}")))?;
        Ok(token)
    }
}
