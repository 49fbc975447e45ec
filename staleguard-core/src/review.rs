use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::github::ReviewResponse;

/// A pull request review as the decision engine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub id: u64,
    /// Author login. `None` for ghost or bot authors whose account is gone.
    pub author: Option<String>,
    /// Commit the review was submitted against. `None` if GitHub no longer
    /// reports one for this review.
    pub commit: Option<String>,
}

impl Review {
    pub fn author_or_unknown(&self) -> &str {
        self.author.as_deref().unwrap_or("unknownLogin")
    }
}

/// Reduce a PR's full review history to the approvals that are still standing.
///
/// Keeps the latest opinionated review (approval or change request) per
/// author, then keeps only approvals that carry a reviewed commit and were
/// submitted before the head commit landed. Approvals submitted after the
/// head commit already saw the current code and are not stale.
pub fn latest_approved_reviews(
    reviews: Vec<ReviewResponse>,
    head_committed_at: DateTime<Utc>,
) -> Vec<Review> {
    let mut latest: Vec<ReviewResponse> = Vec::new();
    let mut index_by_author: HashMap<Option<String>, usize> = HashMap::new();

    // Reviews arrive oldest first, so the last opinionated review per author
    // wins. Comment-only reviews never displace an approval.
    for review in reviews {
        if review.state != "APPROVED" && review.state != "CHANGES_REQUESTED" {
            continue;
        }
        let author = review.user.as_ref().map(|user| user.login.clone());
        match index_by_author.get(&author) {
            Some(&existing) => latest[existing] = review,
            None => {
                index_by_author.insert(author, latest.len());
                latest.push(review);
            }
        }
    }

    latest
        .into_iter()
        .filter(|review| review.state == "APPROVED")
        .filter(|review| review.commit_id.is_some())
        .filter(|review| match review.submitted_at {
            Some(submitted_at) => submitted_at < head_committed_at,
            None => false,
        })
        .map(|review| Review {
            id: review.id,
            author: review.user.map(|user| user.login),
            commit: review.commit_id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::ReviewUser;
    use chrono::TimeZone;

    fn review(
        id: u64,
        login: Option<&str>,
        state: &str,
        commit: Option<&str>,
        submitted_at: Option<DateTime<Utc>>,
    ) -> ReviewResponse {
        ReviewResponse {
            id,
            user: login.map(|login| ReviewUser {
                login: login.to_string(),
            }),
            state: state.to_string(),
            commit_id: commit.map(|c| c.to_string()),
            submitted_at,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_latest_review_per_author_wins() {
        let reviews = vec![
            review(1, Some("alice"), "APPROVED", Some("aaa111"), Some(at(9))),
            review(2, Some("alice"), "CHANGES_REQUESTED", Some("bbb222"), Some(at(10))),
            review(3, Some("bob"), "APPROVED", Some("bbb222"), Some(at(10))),
        ];

        let approved = latest_approved_reviews(reviews, at(12));

        // Alice's later change request supersedes her approval.
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, 3);
        assert_eq!(approved[0].author.as_deref(), Some("bob"));
    }

    #[test]
    fn test_comment_only_review_does_not_displace_approval() {
        let reviews = vec![
            review(1, Some("alice"), "APPROVED", Some("aaa111"), Some(at(9))),
            review(2, Some("alice"), "COMMENTED", Some("bbb222"), Some(at(10))),
        ];

        let approved = latest_approved_reviews(reviews, at(12));

        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, 1);
    }

    #[test]
    fn test_approval_after_head_commit_is_not_stale() {
        let reviews = vec![
            review(1, Some("alice"), "APPROVED", Some("aaa111"), Some(at(13))),
        ];

        assert!(latest_approved_reviews(reviews, at(12)).is_empty());
    }

    #[test]
    fn test_approval_without_commit_is_skipped() {
        let reviews = vec![review(1, Some("alice"), "APPROVED", None, Some(at(9)))];

        assert!(latest_approved_reviews(reviews, at(12)).is_empty());
    }

    #[test]
    fn test_ghost_authors_collapse_to_latest() {
        let reviews = vec![
            review(1, None, "APPROVED", Some("aaa111"), Some(at(8))),
            review(2, None, "APPROVED", Some("bbb222"), Some(at(9))),
        ];

        let approved = latest_approved_reviews(reviews, at(12));

        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, 2);
        assert_eq!(approved[0].author, None);
        assert_eq!(approved[0].author_or_unknown(), "unknownLogin");
    }
}
