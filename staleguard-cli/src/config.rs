use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use staleguard_core::DismissalPolicy;

/// Run configuration, resolved from action inputs and the workflow
/// environment.
pub struct Config {
    pub token: String,
    pub repo_owner: String,
    pub repo_name: String,
    /// Directory holding the checked-out repository (and its CODEOWNERS).
    pub work_dir: PathBuf,
    pub ignore_files: Vec<String>,
    pub no_owner_action: DismissalPolicy,
    pub force_push_action: DismissalPolicy,
    pub pr_number: u64,
    pub base_branch: String,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    pull_request: Option<PullRequestEvent>,
}

#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    number: u64,
    base: BranchRef,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

impl Config {
    pub fn from_env(
        token: String,
        ignore_files: Option<String>,
        no_owner_action: DismissalPolicy,
        force_push_action: DismissalPolicy,
    ) -> Result<Self> {
        let repository = env::var("GITHUB_REPOSITORY")
            .context("GITHUB_REPOSITORY environment variable is required")?;
        let (repo_owner, repo_name) = split_repository(&repository)?;

        let event_path = env::var("GITHUB_EVENT_PATH")
            .context("GITHUB_EVENT_PATH environment variable is required")?;
        let payload = fs::read_to_string(&event_path)
            .with_context(|| format!("Failed to read event payload at {}", event_path))?;
        let event = parse_pull_request_event(&payload)?;

        let work_dir = env::var("GITHUB_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        Ok(Config {
            token,
            repo_owner,
            repo_name,
            work_dir,
            ignore_files: parse_multiline_input(ignore_files.as_deref()),
            no_owner_action,
            force_push_action,
            pr_number: event.number,
            base_branch: event.base.ref_name,
        })
    }
}

fn split_repository(repository: &str) -> Result<(String, String)> {
    let (owner, name) = repository.split_once('/').ok_or_else(|| {
        anyhow!(
            "GITHUB_REPOSITORY must look like 'owner/repo', got '{}'",
            repository
        )
    })?;
    Ok((owner.to_string(), name.to_string()))
}

fn parse_pull_request_event(payload: &str) -> Result<PullRequestEvent> {
    let payload: EventPayload =
        serde_json::from_str(payload).context("Failed to parse event payload")?;
    payload.pull_request.ok_or_else(|| {
        anyhow!("No pull_request payload found. The action must be triggered by a pull_request event.")
    })
}

/// Multiline action inputs carry one entry per line; entries are trimmed and
/// empty lines dropped.
fn parse_multiline_input(value: Option<&str>) -> Vec<String> {
    value
        .map(|value| {
            value
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
