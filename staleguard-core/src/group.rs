use std::collections::HashMap;

use anyhow::{Context, Result};
use futures_util::future::try_join_all;
use glob::Pattern;
use tracing::{debug, warn};

use crate::diff::head_diff_since_review;
use crate::git::{CommitPresence, SourceControl};
use crate::owners::{FileChange, OwnershipLookup};
use crate::review::Review;

/// Reviews sharing a `reviewed..head` commit pair, with the files whose
/// content changed across that pair.
#[derive(Debug, Clone)]
pub struct CommitGroup {
    pub file_changes: Vec<FileChange>,
    pub reviews: Vec<Review>,
}

/// Output of the grouping pass. Every input review lands either in exactly
/// one commit group or in `reviews_without_history`, never both.
#[derive(Debug, Default)]
pub struct GroupedReviews {
    /// Keyed by the `reviewed..head` range the group's diff was computed for.
    pub grouped_reviews_by_commit: HashMap<String, CommitGroup>,
    /// Reviews whose reviewed commit is no longer reachable (force push, or
    /// outside the checkout depth).
    pub reviews_without_history: Vec<Review>,
}

/// Partition reviews by reviewed commit and resolve each group's changed
/// files, once per distinct commit pair.
pub async fn group_reviews_by_commit(
    git: &dyn SourceControl,
    ownership: &dyn OwnershipLookup,
    reviews: Vec<Review>,
    head_commit: &str,
    base_branch: &str,
    ignore_files: &[String],
) -> Result<GroupedReviews> {
    let ignore_patterns = ignore_files
        .iter()
        .map(|pattern| {
            Pattern::new(pattern)
                .with_context(|| format!("Invalid ignore-files pattern '{}'", pattern))
        })
        .collect::<Result<Vec<_>>>()?;

    // One existence check per distinct reviewed commit.
    let mut distinct_commits: Vec<&str> = reviews
        .iter()
        .filter_map(|review| review.commit.as_deref())
        .collect();
    distinct_commits.sort_unstable();
    distinct_commits.dedup();

    let presence: HashMap<String, CommitPresence> =
        try_join_all(distinct_commits.into_iter().map(|commit| async move {
            Ok::<_, anyhow::Error>((commit.to_string(), git.commit_presence(commit).await?))
        }))
        .await?
        .into_iter()
        .collect();

    let mut reviews_without_history = Vec::new();
    let mut pending: HashMap<String, Vec<Review>> = HashMap::new();

    for review in reviews {
        let reviewed_commit = match review.commit.as_deref() {
            Some(commit) => commit,
            None => {
                reviews_without_history.push(review);
                continue;
            }
        };
        match presence.get(reviewed_commit) {
            Some(CommitPresence::Present) => {
                pending
                    .entry(reviewed_commit.to_string())
                    .or_default()
                    .push(review);
            }
            _ => {
                warn!(
                    "Commit '{}' doesn't exist in the history. It may have been overwritten \
                     by a force push or be outside of the checkout depth. Approval by {} \
                     will be removed.",
                    reviewed_commit,
                    review.author_or_unknown()
                );
                reviews_without_history.push(review);
            }
        }
    }

    // The diff for a commit pair is computed exactly once, however many
    // reviews share it.
    let resolved = try_join_all(pending.into_iter().map(
        |(reviewed_commit, group_reviews)| async move {
            let files =
                head_diff_since_review(git, &reviewed_commit, head_commit, base_branch).await?;
            Ok::<_, anyhow::Error>((reviewed_commit, group_reviews, files))
        },
    ))
    .await?;

    let mut grouped_reviews_by_commit = HashMap::new();
    for (reviewed_commit, group_reviews, files) in resolved {
        let basehead = format!("{}..{}", reviewed_commit, head_commit);
        debug!("Changes in {}:\n{}", basehead, files.join("\n"));

        let file_changes = files
            .into_iter()
            .filter(|file| !ignore_patterns.iter().any(|pattern| pattern.matches(file)))
            .map(|filename| FileChange {
                owners: ownership.owners_of(&filename),
                filename,
            })
            .collect();

        grouped_reviews_by_commit.insert(
            basehead,
            CommitGroup {
                file_changes,
                reviews: group_reviews,
            },
        );
    }

    Ok(GroupedReviews {
        grouped_reviews_by_commit,
        reviews_without_history,
    })
}
