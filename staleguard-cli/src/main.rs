use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn, Level};

use staleguard_core::{
    calculate_reviews_to_dismiss, dismiss_reviews, force_push_message, group_reviews_by_commit,
    latest_approved_reviews, no_owner_message, resolve_team_memberships, reviews_for_dismissal,
    short_sha, CliGit, CodeownersLookup, DecisionOutcome, DismissalPolicy, GitHubClient, Review,
    FAILURE_MESSAGE, OWNERSHIP_MESSAGE,
};

mod config;
use config::Config;

/// Dismiss stale pull request approvals based on code ownership
#[derive(Parser, Debug)]
#[command(name = "staleguard")]
#[command(about = "Dismiss stale pull request approvals based on code ownership", long_about = None)]
struct Cli {
    /// GitHub token used for API calls
    #[arg(long, env = "INPUT_TOKEN", hide_env_values = true)]
    token: String,

    /// Newline-separated glob patterns for files whose changes never
    /// invalidate a review
    #[arg(long = "ignore-files", env = "INPUT_IGNORE-FILES")]
    ignore_files: Option<String>,

    /// What to do with approvals when a changed file has no owner
    #[arg(
        long = "no-owner-action",
        env = "INPUT_NO-OWNER-ACTION",
        default_value = "dismiss-all"
    )]
    no_owner_action: DismissalPolicy,

    /// What to do with approvals whose reviewed commit was force-pushed away
    #[arg(
        long = "force-push-action",
        env = "INPUT_FORCE-PUSH-ACTION",
        default_value = "dismiss-all"
    )]
    force_push_action: DismissalPolicy,
}

fn logins(reviews: &[Review]) -> String {
    reviews
        .iter()
        .map(|review| review.author_or_unknown())
        .collect::<Vec<_>>()
        .join(",")
}

async fn run(
    config: &Config,
    github: &GitHubClient,
    approved: &[Review],
    head_commit: &str,
) -> Result<()> {
    let git = CliGit::new(&config.work_dir);
    let ownership = CodeownersLookup::from_repo_root(&config.work_dir)?;

    let grouped = group_reviews_by_commit(
        &git,
        &ownership,
        approved.to_vec(),
        head_commit,
        &config.base_branch,
        &config.ignore_files,
    )
    .await?;
    let memberships = resolve_team_memberships(github, &grouped).await?;

    let outcome = calculate_reviews_to_dismiss(&grouped, &memberships);
    let to_dismiss = reviews_for_dismissal(
        &outcome,
        approved,
        config.no_owner_action,
        config.force_push_action,
    );

    let message = match &outcome {
        DecisionOutcome::NoOwnerFiles { files_without_owner } => {
            warn!("Files without owner:\n{}", files_without_owner.join("\n"));
            no_owner_message(files_without_owner)
        }
        DecisionOutcome::ForcePushed {
            reviews_without_history,
            ..
        } => {
            warn!(
                "Approvals lost to a force push: {}",
                logins(reviews_without_history)
            );
            force_push_message(reviews_without_history)
        }
        DecisionOutcome::OwnershipBased { .. } => OWNERSHIP_MESSAGE.to_string(),
        DecisionOutcome::NoneToDismiss => {
            info!("No reviews to dismiss!");
            return Ok(());
        }
    };

    if to_dismiss.is_empty() {
        info!("No reviews to dismiss!");
        return Ok(());
    }

    info!("Reviews to dismiss: {}", logins(&to_dismiss));
    dismiss_reviews(github, config.pr_number, &to_dismiss, &message).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let config = Config::from_env(
        cli.token,
        cli.ignore_files,
        cli.no_owner_action,
        cli.force_push_action,
    )?;

    info!(
        "Checking stale approvals for PR #{} in {}/{}",
        config.pr_number, config.repo_owner, config.repo_name
    );

    let github = GitHubClient::new(
        config.token.clone(),
        config.repo_owner.clone(),
        config.repo_name.clone(),
    )?;

    let pr = github.get_pull_request(config.pr_number).await?;
    let head_commit = pr.head.sha;
    let head_committed_at = github.get_commit_date(&head_commit).await?;
    info!(
        "Head commit is {} (committed {})",
        short_sha(&head_commit),
        head_committed_at
    );

    let reviews = github.list_reviews(config.pr_number).await?;
    let approved = latest_approved_reviews(reviews, head_committed_at);

    if approved.is_empty() {
        info!("No reviews to dismiss!");
        return Ok(());
    }
    info!("Current approvals: {}", logins(&approved));

    if let Err(e) = run(&config, &github, &approved, &head_commit).await {
        // A stale approval must never survive a crash silently; drop them
        // all, then surface the error.
        error!("{:#}", e);
        let dismissed =
            dismiss_reviews(&github, config.pr_number, &approved, FAILURE_MESSAGE).await;
        error!(
            "Dismissed {} of {} approvals as a precaution",
            dismissed,
            approved.len()
        );
        return Err(e);
    }

    Ok(())
}
