// ABOUTME: Environment-variable configuration for the deployment agent.
// ABOUTME: Reads the EASYDEP_* variables, applies defaults and validates floors.

mod tokens;

pub use tokens::{parse_token_map, split_values};

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use secrecy::SecretString;

use crate::error::{Error, Result};

pub const ENV_GITHUB_APP_ID: &str = "EASYDEP_GITHUB_APP_ID";
pub const ENV_GITHUB_APP_PRIVATE_KEY: &str = "EASYDEP_GITHUB_APP_PRIVATE_KEY";
pub const ENV_GITHUB_REPO_ORG: &str = "EASYDEP_GITHUB_REPO_ORG";
pub const ENV_GITHUB_REPO_NAME: &str = "EASYDEP_GITHUB_REPO_NAME";
pub const ENV_DEPLOY_BASE_DIRECTORY: &str = "EASYDEP_DEPLOY_BASE_DIRECTORY";
pub const ENV_DEPLOY_LINK_DIRECTORY: &str = "EASYDEP_DEPLOY_LINK_DIRECTORY";
pub const ENV_DEPLOY_LABELS: &str = "EASYDEP_DEPLOY_LABELS";
pub const ENV_DEPLOY_ADDITIONAL_SYMLINKS: &str = "EASYDEP_DEPLOY_ADDITIONAL_SYMLINKS";
pub const ENV_RELEASE_PULL_DELAY_MILLIS: &str = "EASYDEP_RELEASE_PULL_DELAY_MILLIS";
pub const ENV_DEPLOY_DISCARDER_MAX: &str = "EASYDEP_DEPLOY_DISCARDER_MAX";
pub const ENV_RELEASE_BODY_PARSE_PATTERN: &str = "EASYDEP_RELEASE_BODY_PARSE_PATTERN";

const DEFAULT_LINK_NAME: &str = "current";
const DEFAULT_PULL_DELAY_MILLIS: u64 = 10_000;
const MIN_PULL_DELAY_MILLIS: u64 = 100;
const DEFAULT_DISCARDER_MAX: i64 = 10;
const MIN_DISCARDER_MAX: i64 = 2;
const DEFAULT_BODY_PATTERN: &str = "(.*)";

/// Fully parsed agent configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// GitHub App identity used for token minting.
    pub github_app_id: u64,
    /// Raw private key material: a PEM string or a path to one.
    pub github_private_key: SecretString,
    /// Owner of the source repository.
    pub repo_owner: String,
    /// Name of the source repository.
    pub repo_name: String,
    /// Absolute root below which all releases are materialized.
    pub base_directory: PathBuf,
    /// Name of the current-release symlink inside the root.
    pub link_name: String,
    /// Labels this server advertises for tag acceptance.
    pub labels: HashMap<String, String>,
    /// Additional symlinks created inside every release directory.
    pub additional_symlinks: Vec<(String, PathBuf)>,
    /// Delay between release feed polls, floor-clamped.
    pub poll_interval: Duration,
    /// How many releases to keep on disk, `None` disables retention.
    pub max_stored_releases: Option<usize>,
    /// Pattern extracting the structured part of a release body.
    pub body_pattern: Regex,
}

impl Settings {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let github_app_id = required(&lookup, ENV_GITHUB_APP_ID)?
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("{ENV_GITHUB_APP_ID} must be numeric")))?;
        let github_private_key = SecretString::new(required(&lookup, ENV_GITHUB_APP_PRIVATE_KEY)?);
        let repo_owner = required(&lookup, ENV_GITHUB_REPO_ORG)?;
        let repo_name = required(&lookup, ENV_GITHUB_REPO_NAME)?;

        let base_directory = PathBuf::from(required(&lookup, ENV_DEPLOY_BASE_DIRECTORY)?);
        if !base_directory.is_absolute() {
            return Err(Error::InvalidConfig(format!(
                "{ENV_DEPLOY_BASE_DIRECTORY} must be an absolute path"
            )));
        }

        let link_name =
            lookup(ENV_DEPLOY_LINK_DIRECTORY).unwrap_or_else(|| DEFAULT_LINK_NAME.to_string());

        let labels = parse_token_map(&lookup(ENV_DEPLOY_LABELS).unwrap_or_default());
        let additional_symlinks =
            parse_symlinks(&lookup(ENV_DEPLOY_ADDITIONAL_SYMLINKS).unwrap_or_default())?;

        let poll_interval = parse_poll_interval(lookup(ENV_RELEASE_PULL_DELAY_MILLIS))?;
        let max_stored_releases = parse_discarder_max(lookup(ENV_DEPLOY_DISCARDER_MAX))?;
        let body_pattern = parse_body_pattern(lookup(ENV_RELEASE_BODY_PARSE_PATTERN))?;

        Ok(Self {
            github_app_id,
            github_private_key,
            repo_owner,
            repo_name,
            base_directory,
            link_name,
            labels,
            additional_symlinks,
            poll_interval,
            max_stored_releases,
            body_pattern,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::MissingEnvVar(key.to_string())),
    }
}

fn parse_symlinks(raw: &str) -> Result<Vec<(String, PathBuf)>> {
    parse_token_map(raw)
        .into_iter()
        .map(|(name, target)| {
            let target = std::path::absolute(PathBuf::from(target)).map_err(|err| {
                Error::InvalidConfig(format!("unable to resolve symlink target for {name}: {err}"))
            })?;
            Ok((name, target))
        })
        .collect()
}

fn parse_poll_interval(raw: Option<String>) -> Result<Duration> {
    let millis = match raw {
        Some(value) => value.parse::<u64>().map_err(|_| {
            Error::InvalidConfig(format!("{ENV_RELEASE_PULL_DELAY_MILLIS} must be numeric"))
        })?,
        None => DEFAULT_PULL_DELAY_MILLIS,
    };
    Ok(Duration::from_millis(millis.max(MIN_PULL_DELAY_MILLIS)))
}

fn parse_discarder_max(raw: Option<String>) -> Result<Option<usize>> {
    let configured = match raw {
        Some(value) => value.parse::<i64>().map_err(|_| {
            Error::InvalidConfig(format!("{ENV_DEPLOY_DISCARDER_MAX} must be numeric"))
        })?,
        None => DEFAULT_DISCARDER_MAX,
    };
    if configured <= 0 {
        return Ok(None);
    }
    Ok(Some(configured.max(MIN_DISCARDER_MAX) as usize))
}

fn parse_body_pattern(raw: Option<String>) -> Result<Regex> {
    let source = raw.unwrap_or_else(|| DEFAULT_BODY_PATTERN.to_string());
    let pattern = RegexBuilder::new(&source)
        .dot_matches_new_line(true)
        .build()
        .map_err(|err| {
            Error::InvalidConfig(format!("{ENV_RELEASE_BODY_PARSE_PATTERN} is invalid: {err}"))
        })?;
    if pattern.captures_len() < 2 {
        return Err(Error::InvalidConfig(format!(
            "{ENV_RELEASE_BODY_PARSE_PATTERN} must contain one capture group"
        )));
    }
    Ok(pattern)
}
