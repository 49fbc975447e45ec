use std::collections::HashSet;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::debug;

use crate::group::GroupedReviews;
use crate::review::Review;
use crate::teams::TeamMemberships;

/// What to do with the affected reviews when a special case triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissalPolicy {
    DismissAll,
    DismissNone,
}

impl FromStr for DismissalPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dismiss-all" => Ok(Self::DismissAll),
            "dismiss-none" => Ok(Self::DismissNone),
            other => Err(anyhow!(
                "Unknown dismissal policy '{}' (expected 'dismiss-all' or 'dismiss-none')",
                other
            )),
        }
    }
}

/// The single verdict of one engine invocation. Exactly one variant applies,
/// in the order they are declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Some changed file has no CODEOWNERS entry, so staleness cannot be
    /// attributed to any reviewer.
    NoOwnerFiles { files_without_owner: Vec<String> },
    /// Some reviewed commits vanished from history. `reviews_to_dismiss`
    /// holds the ordinary ownership-based dismissals from the surviving
    /// groups; the without-history set is subject to its own policy knob.
    ForcePushed {
        reviews_without_history: Vec<Review>,
        reviews_to_dismiss: Vec<Review>,
    },
    OwnershipBased { reviews_to_dismiss: Vec<Review> },
    NoneToDismiss,
}

/// Pure decision pass over grouped reviews and pre-resolved team memberships.
/// Performs no I/O and no side effects.
pub fn calculate_reviews_to_dismiss(
    grouped: &GroupedReviews,
    memberships: &TeamMemberships,
) -> DecisionOutcome {
    let mut seen_files = HashSet::new();
    let files_without_owner: Vec<String> = grouped
        .grouped_reviews_by_commit
        .values()
        .flat_map(|group| group.file_changes.iter())
        .filter(|change| change.owners.is_empty())
        .map(|change| change.filename.clone())
        .filter(|filename| seen_files.insert(filename.clone()))
        .collect();

    // An unowned file poisons the whole invocation: no review can be safely
    // kept when a change cannot be attributed.
    if !files_without_owner.is_empty() {
        return DecisionOutcome::NoOwnerFiles { files_without_owner };
    }

    let mut dismissed_ids = HashSet::new();
    let mut reviews_to_dismiss = Vec::new();

    for (basehead, group) in &grouped.grouped_reviews_by_commit {
        let mut owners: Vec<&String> = Vec::new();
        for change in &group.file_changes {
            for owner in &change.owners {
                if !owners.contains(&owner) {
                    owners.push(owner);
                }
            }
        }
        let team_owners: Vec<&str> = owners
            .iter()
            .filter(|owner| owner.contains('/'))
            .map(|owner| owner.trim_start_matches('@'))
            .collect();

        for review in &group.reviews {
            debug!(
                "Check if {} review in {} should be dismissed",
                review.author_or_unknown(),
                basehead
            );

            let dismiss = match &review.author {
                // An authorless review cannot be attributed either; drop it.
                None => true,
                Some(login) => {
                    let direct = format!("@{}", login);
                    owners.iter().any(|owner| **owner == direct)
                        || team_owners
                            .iter()
                            .any(|team| memberships.is_member(team, login))
                }
            };

            if dismiss && dismissed_ids.insert(review.id) {
                debug!(
                    "{} owns changed files and their review will be dismissed",
                    review.author_or_unknown()
                );
                reviews_to_dismiss.push(review.clone());
            }
        }
    }

    // Groups are evaluated in map order; sort so the verdict is independent
    // of it.
    reviews_to_dismiss.sort_by_key(|review| review.id);

    if !grouped.reviews_without_history.is_empty() {
        return DecisionOutcome::ForcePushed {
            reviews_without_history: grouped.reviews_without_history.clone(),
            reviews_to_dismiss,
        };
    }
    if reviews_to_dismiss.is_empty() {
        return DecisionOutcome::NoneToDismiss;
    }
    DecisionOutcome::OwnershipBased { reviews_to_dismiss }
}

/// Apply the externally supplied policy knobs to an outcome, yielding the
/// final set of reviews to dismiss.
pub fn reviews_for_dismissal(
    outcome: &DecisionOutcome,
    all_approved: &[Review],
    no_owner_action: DismissalPolicy,
    force_push_action: DismissalPolicy,
) -> Vec<Review> {
    match outcome {
        DecisionOutcome::NoOwnerFiles { .. } => match no_owner_action {
            DismissalPolicy::DismissAll => all_approved.to_vec(),
            DismissalPolicy::DismissNone => Vec::new(),
        },
        DecisionOutcome::ForcePushed {
            reviews_without_history,
            reviews_to_dismiss,
        } => {
            let mut reviews = match force_push_action {
                DismissalPolicy::DismissAll => reviews_without_history.clone(),
                DismissalPolicy::DismissNone => Vec::new(),
            };
            reviews.extend(reviews_to_dismiss.iter().cloned());
            reviews.sort_by_key(|review| review.id);
            reviews.dedup_by_key(|review| review.id);
            reviews
        }
        DecisionOutcome::OwnershipBased { reviews_to_dismiss } => reviews_to_dismiss.clone(),
        DecisionOutcome::NoneToDismiss => Vec::new(),
    }
}
