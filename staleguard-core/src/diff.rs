use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::Result;
use futures_util::future::try_join_all;
use regex::Regex;
use tracing::debug;

use crate::git::SourceControl;

// Rename notation in git diff summaries, e.g.
// `.github/workflows/{dismiss-reviews.yml => pull-request.yml}`.
static RENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(.*) => (.*)\}").expect("rename pattern is valid"));

/// Files whose reviewed content meaningfully differs from the head content,
/// relative to the PR's base branch.
///
/// Candidates are the intersection of "touched since the review" and "part of
/// the PR's overall change"; upstream changes that merely landed on the base
/// branch are not the reviewer's problem. A rename always counts as a change.
/// A file whose added/removed lines against the base branch are identical at
/// both commits is not reported, even though its blob differs (rebase noise).
pub async fn head_diff_since_review(
    git: &dyn SourceControl,
    reviewed_commit: &str,
    head_commit: &str,
    base_branch: &str,
) -> Result<Vec<String>> {
    // Everything touched between the reviewed commit and head, merge commits
    // included.
    let since_review = git
        .changed_files(&format!("{}..{}", reviewed_commit, head_commit))
        .await?;
    // What the PR as a whole changes.
    let pr_files: HashSet<String> = git
        .changed_files(&format!("origin/{}...{}", base_branch, head_commit))
        .await?
        .into_iter()
        .collect();

    let candidates: Vec<String> = since_review
        .into_iter()
        .filter(|file| pr_files.contains(file))
        .collect();

    let mut changed: Vec<String> = Vec::new();
    let mut undecided: Vec<String> = Vec::new();

    for file in candidates {
        if let Some((old_path, new_path)) = rename_paths(&file) {
            debug!("Filename change: {} => {}", old_path, new_path);
            // Both ends of a rename need a fresh look.
            changed.push(old_path);
            changed.push(new_path);
        } else {
            undecided.push(file);
        }
    }

    let comparisons = undecided.iter().map(|file| async move {
        let reviewed_range = format!("origin/{}...{}", base_branch, reviewed_commit);
        let head_range = format!("origin/{}...{}", base_branch, head_commit);
        let reviewed_diff = git.file_diff(&reviewed_range, file);
        let head_diff = git.file_diff(&head_range, file);
        let (reviewed_diff, head_diff) = futures_util::try_join!(reviewed_diff, head_diff)?;

        Ok::<_, anyhow::Error>((
            file.clone(),
            changed_lines(&reviewed_diff) != changed_lines(&head_diff),
        ))
    });

    for (file, differs) in try_join_all(comparisons).await? {
        if differs {
            changed.push(file);
        }
    }

    let mut seen = HashSet::new();
    changed.retain(|file| seen.insert(file.clone()));
    Ok(changed)
}

/// Split a rename entry into its normalized old and new paths. Handles both
/// the prefixed `dir/{old => new}/file` form and the whole-path
/// `old/file => new/file` form.
fn rename_paths(file: &str) -> Option<(String, String)> {
    if RENAME.is_match(file) {
        let old_path = normalize(&RENAME.replace(file, "${1}"));
        let new_path = normalize(&RENAME.replace(file, "${2}"));
        return Some((old_path, new_path));
    }
    file.split_once(" => ")
        .map(|(old_path, new_path)| (normalize(old_path), normalize(new_path)))
}

/// The content delta of a diff: just its added and removed lines.
fn changed_lines(diff: &str) -> String {
    diff.lines()
        .filter(|line| line.starts_with('+') || line.starts_with('-'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse the empty segments rename expansion leaves behind
/// (`src/{ => new}/a.rs` expands to `src//a.rs`).
fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}
