use futures_util::future::join_all;
use tracing::{error, info};

use crate::github::PullRequestApi;
use crate::review::Review;

pub const OWNERSHIP_MESSAGE: &str = "Stale reviews were dismissed based on ownership";

pub const FAILURE_MESSAGE: &str =
    "Some error occurred in the `staleguard` action, all reviews are dismissed.";

/// Dismissal message when changed files have no CODEOWNERS entry.
/// Underscores are escaped so GitHub does not render paths in italics.
pub fn no_owner_message(files_without_owner: &[String]) -> String {
    let paths = files_without_owner
        .iter()
        .map(|path| format!("- `{}`", path.replace('_', "&#95;")))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<details>\n\
         <summary>Because some files don't have an owner, all reviews are dismissed.</summary>\n\
         <p>\n\n\
         If you know who should own the following files, consider adding the owner to the \
         `.github/CODEOWNERS` file.\n\n\
         {}\n\n\
         </p>\n\
         </details>",
        paths
    )
}

/// Dismissal message when reviewed commits were lost to a force push.
pub fn force_push_message(reviews_without_history: &[Review]) -> String {
    let reviewers = reviews_without_history
        .iter()
        .map(|review| format!("- `{}`", review.author_or_unknown()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<details>\n\
         <summary>The following reviews were removed because the related commit was \
         overwritten by a force push.</summary>\n\
         <p>\n\n\
         {}\n\n\
         </p>\n\
         </details>",
        reviewers
    )
}

/// Submit one dismissal per review. Submissions are independent: a failure is
/// logged and does not stop the rest. Returns the number that went through.
pub async fn dismiss_reviews(
    api: &dyn PullRequestApi,
    pr_number: u64,
    reviews: &[Review],
    message: &str,
) -> usize {
    let results = join_all(reviews.iter().map(|review| async move {
        match api.dismiss_review(pr_number, review.id, message).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to dismiss review from {}: {:#}",
                    review.author_or_unknown(),
                    e
                );
                false
            }
        }
    }))
    .await;

    let dismissed = results.into_iter().filter(|ok| *ok).count();
    info!("Dismissed {} of {} reviews", dismissed, reviews.len());
    dismissed
}
