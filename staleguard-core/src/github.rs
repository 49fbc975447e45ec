use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Result of a team-membership lookup. A 404 means the team does not exist
/// (or the token cannot see it) and is not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamLookup {
    Found(Vec<String>),
    NotFound,
}

/// The remote API surface the decision phase and the submission phase need.
#[async_trait]
pub trait PullRequestApi: Send + Sync {
    async fn team_members(&self, org: &str, team_slug: &str) -> Result<TeamLookup>;

    async fn dismiss_review(&self, pr_number: u64, review_id: u64, message: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    repo_owner: String,
    repo_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewResponse {
    pub id: u64,
    pub user: Option<ReviewUser>,
    pub state: String,
    pub commit_id: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestResponse {
    pub number: u64,
    pub head: PullRequestRefResponse,
    pub base: PullRequestRefResponse,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestRefResponse {
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    committer: Option<CommitSignature>,
}

#[derive(Debug, Deserialize)]
struct CommitSignature {
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TeamMemberResponse {
    login: String,
}

#[derive(Debug, Serialize)]
struct DismissRequest<'a> {
    message: &'a str,
}

impl GitHubClient {
    pub fn new(token: String, repo_owner: String, repo_name: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("staleguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            token,
            repo_owner,
            repo_name,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    pub async fn get_pull_request(&self, pr_number: u64) -> Result<PullRequestResponse> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/pulls/{}",
            self.repo_owner, self.repo_name, pr_number
        );

        info!(
            "Fetching PR #{} from {}/{}",
            pr_number, self.repo_owner, self.repo_name
        );

        let response = self
            .get(&url)
            .send()
            .await
            .context("Failed to send get pull request request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!("GitHub API error fetching PR: {} - {}", status, error_text);
            return Err(anyhow!(
                "GitHub API error fetching PR: {} - {}",
                status,
                error_text
            ));
        }

        let pr_response: PullRequestResponse = response
            .json()
            .await
            .context("Failed to parse pull request response")?;

        info!(
            "Successfully fetched PR #{} (head: {}, base: {})",
            pr_response.number, pr_response.head.sha, pr_response.base.ref_name
        );

        Ok(pr_response)
    }

    /// Committer date of a commit; used to separate approvals that predate
    /// the head commit from ones that already saw it.
    pub async fn get_commit_date(&self, sha: &str) -> Result<DateTime<Utc>> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/commits/{}",
            self.repo_owner, self.repo_name, sha
        );

        let response = self
            .get(&url)
            .send()
            .await
            .context("Failed to send get commit request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!(
                "GitHub API error fetching commit: {} - {}",
                status, error_text
            );
            return Err(anyhow!(
                "GitHub API error fetching commit: {} - {}",
                status,
                error_text
            ));
        }

        let commit_response: CommitResponse = response
            .json()
            .await
            .context("Failed to parse commit response")?;

        commit_response
            .commit
            .committer
            .map(|committer| committer.date)
            .with_context(|| format!("Commit {} has no committer date", sha))
    }

    pub async fn list_reviews(&self, pr_number: u64) -> Result<Vec<ReviewResponse>> {
        let mut all_reviews = Vec::new();
        let mut page = 1;
        let per_page = 100;

        info!(
            "Fetching reviews for PR #{} in {}/{}",
            pr_number, self.repo_owner, self.repo_name
        );

        loop {
            let url = format!(
                "https://api.github.com/repos/{}/{}/pulls/{}/reviews?page={}&per_page={}",
                self.repo_owner, self.repo_name, pr_number, page, per_page
            );

            let response = self
                .get(&url)
                .send()
                .await
                .context("Failed to send reviews request")?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .context("Failed to read error response body")?;
                error!(
                    "GitHub API error fetching reviews: {} - {}",
                    status, error_text
                );
                return Err(anyhow!(
                    "GitHub API error fetching reviews: {} - {}",
                    status,
                    error_text
                ));
            }

            let reviews: Vec<ReviewResponse> = response
                .json()
                .await
                .context("Failed to parse reviews response")?;
            let reviews_count = reviews.len();
            all_reviews.extend(reviews);

            // A short page is the last page.
            if reviews_count < per_page {
                break;
            }
            page += 1;
        }

        info!(
            "Found {} total reviews on PR #{}",
            all_reviews.len(),
            pr_number
        );
        Ok(all_reviews)
    }
}

#[async_trait]
impl PullRequestApi for GitHubClient {
    async fn team_members(&self, org: &str, team_slug: &str) -> Result<TeamLookup> {
        let mut all_members = Vec::new();
        let mut page = 1;
        let per_page = 100;

        info!("Fetching members of team {}/{}", org, team_slug);

        loop {
            let url = format!(
                "https://api.github.com/orgs/{}/teams/{}/members?page={}&per_page={}",
                org, team_slug, page, per_page
            );

            let response = self
                .get(&url)
                .send()
                .await
                .context("Failed to send team members request")?;

            if response.status() == StatusCode::NOT_FOUND {
                warn!(
                    "Team {}/{} was not found (or the token lacks organization read access)",
                    org, team_slug
                );
                return Ok(TeamLookup::NotFound);
            }

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .context("Failed to read error response body")?;
                error!(
                    "GitHub API error fetching team members: {} - {}",
                    status, error_text
                );
                return Err(anyhow!(
                    "GitHub API error fetching team members: {} - {}",
                    status,
                    error_text
                ));
            }

            let members: Vec<TeamMemberResponse> = response
                .json()
                .await
                .context("Failed to parse team members response")?;
            let members_count = members.len();
            all_members.extend(members.into_iter().map(|member| member.login));

            if members_count < per_page {
                break;
            }
            page += 1;
        }

        info!(
            "Team {}/{} has {} members",
            org,
            team_slug,
            all_members.len()
        );
        Ok(TeamLookup::Found(all_members))
    }

    async fn dismiss_review(&self, pr_number: u64, review_id: u64, message: &str) -> Result<()> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/pulls/{}/reviews/{}/dismissals",
            self.repo_owner, self.repo_name, pr_number, review_id
        );

        info!("Dismissing review {} on PR #{}", review_id, pr_number);

        let request_body = DismissRequest { message };
        let response = self
            .client
            .put(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .body(serde_json::to_string(&request_body)?)
            .header("Content-Type", "application/json")
            .send()
            .await
            .context("Failed to send dismiss review request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!(
                "GitHub API error dismissing review: {} - {}",
                status, error_text
            );
            return Err(anyhow!(
                "GitHub API error dismissing review: {} - {}",
                status,
                error_text
            ));
        }

        info!("Successfully dismissed review {}", review_id);
        Ok(())
    }
}
