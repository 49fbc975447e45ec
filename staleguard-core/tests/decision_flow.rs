//! End-to-end decision scenarios over in-memory collaborators: group the
//! reviews, resolve memberships, decide, and apply the policy knobs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use staleguard_core::{
    calculate_reviews_to_dismiss, dismiss_reviews, group_reviews_by_commit,
    resolve_team_memberships, reviews_for_dismissal, CommitPresence, DecisionOutcome,
    DismissalPolicy, OwnershipLookup, PullRequestApi, Review, SourceControl, TeamLookup,
};

struct FakeGit {
    missing_commits: HashSet<String>,
    changed: HashMap<String, Vec<String>>,
    diffs: HashMap<(String, String), String>,
}

impl FakeGit {
    fn new() -> Self {
        Self {
            missing_commits: HashSet::new(),
            changed: HashMap::new(),
            diffs: HashMap::new(),
        }
    }
}

#[async_trait]
impl SourceControl for FakeGit {
    async fn commit_presence(&self, commit: &str) -> Result<CommitPresence> {
        if self.missing_commits.contains(commit) {
            Ok(CommitPresence::Missing)
        } else {
            Ok(CommitPresence::Present)
        }
    }

    async fn changed_files(&self, range: &str) -> Result<Vec<String>> {
        self.changed
            .get(range)
            .cloned()
            .ok_or_else(|| anyhow!("unexpected range {}", range))
    }

    async fn file_diff(&self, range: &str, path: &str) -> Result<String> {
        Ok(self
            .diffs
            .get(&(range.to_string(), path.to_string()))
            .cloned()
            .unwrap_or_else(|| format!("+{}:{}\n", range, path)))
    }
}

struct FakeOwnership(HashMap<String, Vec<String>>);

impl OwnershipLookup for FakeOwnership {
    fn owners_of(&self, path: &str) -> Vec<String> {
        self.0.get(path).cloned().unwrap_or_default()
    }
}

struct FakeApi {
    teams: HashMap<String, TeamLookup>,
    dismissals: AtomicUsize,
}

#[async_trait]
impl PullRequestApi for FakeApi {
    async fn team_members(&self, org: &str, team_slug: &str) -> Result<TeamLookup> {
        self.teams
            .get(&format!("{}/{}", org, team_slug))
            .cloned()
            .ok_or_else(|| anyhow!("unexpected team {}/{}", org, team_slug))
    }

    async fn dismiss_review(&self, _pr_number: u64, _review_id: u64, _message: &str) -> Result<()> {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn review(id: u64, author: &str, commit: &str) -> Review {
    Review {
        id,
        author: Some(author.to_string()),
        commit: Some(commit.to_string()),
    }
}

fn ownership(entries: &[(&str, &[&str])]) -> FakeOwnership {
    FakeOwnership(
        entries
            .iter()
            .map(|(path, owners)| {
                (
                    path.to_string(),
                    owners.iter().map(|o| o.to_string()).collect(),
                )
            })
            .collect(),
    )
}

#[tokio::test]
async fn team_member_approval_is_dismissed_and_outsider_kept() {
    // Head abc123, reviewed def456, base main. The PR changes src/a.ts,
    // owned by @org/backend whose only member is alice.
    let mut git = FakeGit::new();
    git.changed.insert(
        "def456..abc123".to_string(),
        vec!["src/a.ts".to_string()],
    );
    git.changed.insert(
        "origin/main...abc123".to_string(),
        vec!["src/a.ts".to_string()],
    );
    let ownership = ownership(&[("src/a.ts", &["@org/backend"])]);
    let api = FakeApi {
        teams: HashMap::from([(
            "org/backend".to_string(),
            TeamLookup::Found(vec!["alice".to_string()]),
        )]),
        dismissals: AtomicUsize::new(0),
    };
    let approved = vec![review(1, "alice", "def456"), review(2, "bob", "def456")];

    let grouped = group_reviews_by_commit(&git, &ownership, approved.clone(), "abc123", "main", &[])
        .await
        .unwrap();
    let memberships = resolve_team_memberships(&api, &grouped).await.unwrap();
    let outcome = calculate_reviews_to_dismiss(&grouped, &memberships);
    let to_dismiss = reviews_for_dismissal(
        &outcome,
        &approved,
        DismissalPolicy::DismissAll,
        DismissalPolicy::DismissAll,
    );

    assert_eq!(to_dismiss.len(), 1);
    assert_eq!(to_dismiss[0].author.as_deref(), Some("alice"));

    let dismissed = dismiss_reviews(&api, 7, &to_dismiss, "stale").await;
    assert_eq!(dismissed, 1);
    assert_eq!(api.dismissals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unowned_file_dismisses_all_or_none_by_policy() {
    let mut git = FakeGit::new();
    git.changed.insert(
        "def456..abc123".to_string(),
        vec!["README.md".to_string()],
    );
    git.changed.insert(
        "origin/main...abc123".to_string(),
        vec!["README.md".to_string()],
    );
    let ownership = ownership(&[]);
    let api = FakeApi {
        teams: HashMap::new(),
        dismissals: AtomicUsize::new(0),
    };
    let approved = vec![review(1, "alice", "def456"), review(2, "bob", "def456")];

    let grouped = group_reviews_by_commit(&git, &ownership, approved.clone(), "abc123", "main", &[])
        .await
        .unwrap();
    let memberships = resolve_team_memberships(&api, &grouped).await.unwrap();
    let outcome = calculate_reviews_to_dismiss(&grouped, &memberships);

    assert_eq!(
        outcome,
        DecisionOutcome::NoOwnerFiles {
            files_without_owner: vec!["README.md".to_string()]
        }
    );

    let all = reviews_for_dismissal(
        &outcome,
        &approved,
        DismissalPolicy::DismissAll,
        DismissalPolicy::DismissAll,
    );
    assert_eq!(all.len(), 2);

    let none = reviews_for_dismissal(
        &outcome,
        &approved,
        DismissalPolicy::DismissNone,
        DismissalPolicy::DismissAll,
    );
    assert!(none.is_empty());
}

#[tokio::test]
async fn force_pushed_review_is_never_ownership_checked() {
    let mut git = FakeGit::new();
    git.missing_commits.insert("gone00".to_string());
    let ownership = ownership(&[]);
    let api = FakeApi {
        teams: HashMap::new(),
        dismissals: AtomicUsize::new(0),
    };
    let approved = vec![review(1, "alice", "gone00")];

    let grouped = group_reviews_by_commit(&git, &ownership, approved.clone(), "abc123", "main", &[])
        .await
        .unwrap();
    let memberships = resolve_team_memberships(&api, &grouped).await.unwrap();
    let outcome = calculate_reviews_to_dismiss(&grouped, &memberships);

    match &outcome {
        DecisionOutcome::ForcePushed {
            reviews_without_history,
            reviews_to_dismiss,
        } => {
            assert_eq!(reviews_without_history.len(), 1);
            assert!(reviews_to_dismiss.is_empty());
        }
        other => panic!("expected ForcePushed, got {:?}", other),
    }

    // With dismiss-none nothing goes out at all.
    let kept = reviews_for_dismissal(
        &outcome,
        &approved,
        DismissalPolicy::DismissAll,
        DismissalPolicy::DismissNone,
    );
    assert!(kept.is_empty());
    let dismissed = dismiss_reviews(&api, 7, &kept, "stale").await;
    assert_eq!(dismissed, 0);
    assert_eq!(api.dismissals.load(Ordering::SeqCst), 0);
}
