// ABOUTME: First deploy stage: matches release-body labels against the server's own labels.
// ABOUTME: A policy mismatch cancels the chain instead of failing it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::config::split_values;
use crate::pipeline::{ChainValue, ExecutionContext, Stage, StageError, StageFlow};

/// Structured configuration embedded in a release body.
#[derive(Debug, Default, Deserialize)]
struct ReleaseBodyConfig {
    #[serde(default)]
    labels: HashMap<String, String>,
}

/// Checks whether this server should deploy the release at all.
///
/// The release body (extracted through the configured pattern) may carry a
/// `labels` table mapping label names to a `;;`-delimited set of permissible
/// values. A `?` suffix marks a label as optional. Releases whose labels do
/// not match the server's configuration are cancelled, not failed.
pub struct TagAcceptance {
    local_labels: HashMap<String, String>,
    body_pattern: Regex,
}

impl TagAcceptance {
    pub fn new(local_labels: HashMap<String, String>, body_pattern: Regex) -> Self {
        Self {
            local_labels,
            body_pattern,
        }
    }
}

#[async_trait]
impl Stage for TagAcceptance {
    fn name(&self) -> &str {
        "Tag Check"
    }

    async fn execute(
        &self,
        ctx: &Arc<ExecutionContext>,
        input: ChainValue,
    ) -> Result<StageFlow, StageError> {
        let release = input.release();
        let body = match &release.body {
            Some(body) if !body.trim().is_empty() => body,
            _ => return Ok(StageFlow::Next(input)),
        };

        let Some(captured) = self
            .body_pattern
            .captures(body)
            .and_then(|captures| captures.get(1))
        else {
            tracing::warn!(
                "body of release {} does not match the configured pattern, not deploying",
                release.id
            );
            ctx.cancel();
            return Ok(StageFlow::Next(input));
        };

        let parsed: ReleaseBodyConfig = match toml::from_str(captured.as_str()) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(
                    "unable to parse body of release {}, not deploying: {err}",
                    release.id
                );
                ctx.cancel();
                return Ok(StageFlow::Next(input));
            }
        };

        if let Some(label) = find_label_rejection(&self.local_labels, &parsed.labels) {
            tracing::info!(
                "release {} is not intended for this server (label {label} does not match)",
                release.id
            );
            ctx.cancel();
        }

        Ok(StageFlow::Next(input))
    }
}

/// Returns the name of the first release label this server fails, if any.
///
/// A label is failed when it is required but locally unset, or when the
/// local value is outside the release's permitted value set. Labels with an
/// empty value set never reject.
fn find_label_rejection(
    local: &HashMap<String, String>,
    release_labels: &HashMap<String, String>,
) -> Option<String> {
    for (raw_name, raw_values) in release_labels {
        let (name, optional) = match raw_name.strip_suffix('?') {
            Some(stripped) => (stripped, true),
            None => (raw_name.as_str(), false),
        };

        let permitted = split_values(raw_values);
        if permitted.is_empty() {
            continue;
        }

        match local.get(name) {
            Some(value) if permitted.iter().any(|allowed| allowed == value) => {}
            Some(_) => return Some(name.to_string()),
            None if optional => {}
            None => return Some(name.to_string()),
        }
    }
    None
}
