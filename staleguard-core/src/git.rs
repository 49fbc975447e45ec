use std::path::PathBuf;
use std::process::Output;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Whether a commit object is reachable in the local checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPresence {
    Present,
    /// The commit was rewritten by a force push or lies outside the clone
    /// depth. Not an error.
    Missing,
}

/// Source-control queries the decision engine depends on.
///
/// Implementations must report a missing commit as [`CommitPresence::Missing`]
/// rather than an error; every other query failure propagates to the caller.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn commit_presence(&self, commit: &str) -> Result<CommitPresence>;

    /// Changed paths for a `rev..rev` or `rev...rev` range, in git's
    /// rename-aware summary notation (`path/{old => new}`).
    async fn changed_files(&self, range: &str) -> Result<Vec<String>>;

    /// Textual diff of a single file across a range.
    async fn file_diff(&self, range: &str, path: &str) -> Result<String>;
}

/// `git` CLI against a checked-out workspace.
pub struct CliGit {
    work_dir: PathBuf,
}

impl CliGit {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!("Running git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(&self.work_dir)
            .output()
            .await
            .with_context(|| format!("Failed to execute git {}", args.join(" ")))
    }

    fn require_success(output: &Output, args: &[&str]) -> Result<()> {
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            ));
        }
        Ok(())
    }
}

/// Extract the path field from `git diff --numstat` output. Renames keep
/// git's `{old => new}` notation in the path.
pub fn parse_numstat_paths(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.splitn(3, '\t').nth(2))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl SourceControl for CliGit {
    async fn commit_presence(&self, commit: &str) -> Result<CommitPresence> {
        let revspec = format!("{}^{{commit}}", commit);
        let args = ["cat-file", "-e", revspec.as_str()];
        let output = self.run(&args).await?;

        // cat-file -e exits nonzero for any unresolvable object; that is the
        // force-push signal, not a failure.
        if output.status.success() {
            Ok(CommitPresence::Present)
        } else {
            Ok(CommitPresence::Missing)
        }
    }

    async fn changed_files(&self, range: &str) -> Result<Vec<String>> {
        let args = ["diff", "--no-ext-diff", "--numstat", range];
        let output = self.run(&args).await?;
        Self::require_success(&output, &args)?;

        let stdout = String::from_utf8(output.stdout)
            .context("Failed to parse git diff --numstat output as UTF-8")?;
        Ok(parse_numstat_paths(&stdout))
    }

    async fn file_diff(&self, range: &str, path: &str) -> Result<String> {
        let args = ["diff", "--no-ext-diff", "--no-color", range, "--", path];
        let output = self.run(&args).await?;
        Self::require_success(&output, &args)?;

        String::from_utf8(output.stdout).context("Failed to parse git diff output as UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numstat_paths_plain() {
        let stdout = "3\t1\tsrc/lib.rs\n10\t0\tREADME.md\n";
        assert_eq!(
            parse_numstat_paths(stdout),
            vec!["src/lib.rs".to_string(), "README.md".to_string()]
        );
    }

    #[test]
    fn test_parse_numstat_paths_keeps_rename_notation() {
        let stdout = "0\t0\tsrc/{old.rs => new.rs}\n";
        assert_eq!(
            parse_numstat_paths(stdout),
            vec!["src/{old.rs => new.rs}".to_string()]
        );
    }

    #[test]
    fn test_parse_numstat_paths_binary_files() {
        // Binary files report "-" counts but still carry a path.
        let stdout = "-\t-\tassets/logo.png\n";
        assert_eq!(parse_numstat_paths(stdout), vec!["assets/logo.png".to_string()]);
    }

    #[test]
    fn test_parse_numstat_paths_empty() {
        assert!(parse_numstat_paths("").is_empty());
    }
}
