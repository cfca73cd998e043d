use crate::config::GitHubConfig;
use crate::http::{decode_json, HttpSender};
use crate::provider::{ApiError, ApiResult, GitHosting};
use crate::types::{BranchRef, CreateRefRequest, GitRef};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, RequestBuilder};
use tracing::{debug, info};

pub struct GitHubClient {
    http: HttpSender,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig, token: impl Into<String>) -> ApiResult<Self> {
        config
            .validate()
            .map_err(|message| ApiError::InvalidConfig { message })?;

        let token = token.into();
        if token.trim().is_empty() {
            return Err(ApiError::InvalidConfig {
                message: "GitHub token is required to manage branches".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_str(&config.api_version).map_err(|e| ApiError::InvalidConfig {
                message: format!("invalid API version header: {}", e),
            })?,
        );

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http: HttpSender::new(client, config.retry.clone()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    fn repo_url(&self, owner: &str, repo: &str, path: &str) -> String {
        format!("{}/repos/{}/{}{}", self.base_url, owner, repo, path)
    }
}

#[async_trait]
impl GitHosting for GitHubClient {
    async fn get_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> ApiResult<Option<BranchRef>> {
        debug!(owner, repo, branch, "Looking up branch");
        let url = self.repo_url(owner, repo, &format!("/git/ref/heads/{}", branch));
        match self
            .http
            .send(Method::GET, &url, |r| self.authorize(r))
            .await
        {
            Ok(response) => {
                let git_ref: GitRef = decode_json(response).await?;
                Ok(Some(git_ref.into()))
            }
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> ApiResult<BranchRef> {
        info!(owner, repo, branch, sha, "Creating branch");
        let url = self.repo_url(owner, repo, "/git/refs");
        let body = CreateRefRequest {
            ref_name: format!("refs/heads/{}", branch),
            sha: sha.to_string(),
        };
        let response = self
            .http
            .send(Method::POST, &url, |r| self.authorize(r).json(&body))
            .await?;
        let git_ref: GitRef = decode_json(response).await?;
        Ok(git_ref.into())
    }

    fn host_name(&self) -> &'static str {
        "github"
    }
}
