use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use futures_util::future::try_join_all;
use tracing::{info, warn};

use crate::github::{PullRequestApi, TeamLookup};
use crate::group::GroupedReviews;

/// Per-invocation memo of team memberships, keyed by bare `org/team` handle.
/// Populated once, before any review is evaluated against it; read-only
/// afterwards.
#[derive(Debug, Default)]
pub struct TeamMemberships {
    members: HashMap<String, Vec<String>>,
}

impl TeamMemberships {
    pub fn new(members: HashMap<String, Vec<String>>) -> Self {
        Self { members }
    }

    pub fn is_member(&self, team_handle: &str, login: &str) -> bool {
        self.members
            .get(team_handle)
            .map(|members| members.iter().any(|member| member == login))
            .unwrap_or(false)
    }
}

/// Unique bare `org/team` handles owning files in any group.
pub fn collect_team_handles(grouped: &GroupedReviews) -> BTreeSet<String> {
    grouped
        .grouped_reviews_by_commit
        .values()
        .flat_map(|group| group.file_changes.iter())
        .flat_map(|change| change.owners.iter())
        .filter(|owner| owner.contains('/'))
        .map(|owner| owner.trim_start_matches('@').to_string())
        .collect()
}

/// Fetch the member list of every owning team, once per distinct team even
/// when the same team owns files in several groups.
pub async fn resolve_team_memberships(
    api: &dyn PullRequestApi,
    grouped: &GroupedReviews,
) -> Result<TeamMemberships> {
    let handles = collect_team_handles(grouped);
    if handles.is_empty() {
        return Ok(TeamMemberships::default());
    }
    info!(
        "Resolving members of {} owning team(s): {}",
        handles.len(),
        handles.iter().cloned().collect::<Vec<_>>().join(", ")
    );

    let fetched = try_join_all(handles.into_iter().map(|handle| async move {
        let members = match handle.split_once('/') {
            Some((org, team_slug)) => match api.team_members(org, team_slug).await? {
                TeamLookup::Found(members) => members,
                TeamLookup::NotFound => {
                    warn!(
                        "Team {} could not be found; reviews by its members will be kept",
                        handle
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        Ok::<_, anyhow::Error>((handle, members))
    }))
    .await?;

    Ok(TeamMemberships::new(fetched.into_iter().collect()))
}
