//! Command line surface of both binaries. Flags keep the upper-case names the
//! pipelines already pass (`--WORKSPACE_NAME`, `--COPY_LAKEHOUSE True`, ...).

use crate::connections::parse_connection_pairs;
use crate::error::{BranchOutError, BranchOutResult};
use crate::logging::LogFormat;
use crate::post_activity::{NotebookRef, PostActivityConfig};
use crate::provision::ProvisionConfig;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser};
use platform::config::{AUTHORITY_URL, FABRIC_API_URL, GITHUB_API_URL, POWERBI_API_URL};
use platform::{
    Credential, CredentialInputs, FabricClient, FabricConfig, GitHubConfig, IdentityConfig,
    PollPolicy, RetryPolicy, TokenResolver,
};
use std::time::Duration;

/// How to obtain the Fabric bearer token: pass one directly, or a tenant and
/// client id with either a user/password pair or a client secret. Every value
/// can also come from a `FABRIC_`-prefixed environment variable.
#[derive(Args, Debug, Clone, Default)]
pub struct AuthArgs {
    #[arg(long = "FABRIC_TOKEN", env = "FABRIC_TOKEN", hide_env_values = true)]
    pub fabric_token: Option<String>,

    #[arg(long = "TENANT_ID", env = "FABRIC_TENANT_ID")]
    pub tenant_id: Option<String>,

    #[arg(long = "CLIENT_ID", env = "FABRIC_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long = "CLIENT_SECRET", env = "FABRIC_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    #[arg(long = "USER_NAME", env = "FABRIC_USER_NAME")]
    pub user_name: Option<String>,

    #[arg(long = "PASSWORD", env = "FABRIC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl AuthArgs {
    pub fn credential(&self) -> BranchOutResult<Credential> {
        let inputs = CredentialInputs {
            token: self.fabric_token.as_deref(),
            tenant_id: self.tenant_id.as_deref(),
            client_id: self.client_id.as_deref(),
            username: self.user_name.as_deref(),
            password: self.password.as_deref(),
            client_secret: self.client_secret.as_deref(),
        };
        Credential::from_inputs(&inputs).map_err(BranchOutError::Authentication)
    }
}

/// Endpoints, timeouts, polling and logging shared by both binaries.
#[derive(Args, Debug, Clone)]
pub struct ApiArgs {
    #[arg(long = "FABRIC_API_URL", default_value = FABRIC_API_URL)]
    pub fabric_api_url: String,

    #[arg(long = "POWERBI_API_URL", default_value = POWERBI_API_URL)]
    pub powerbi_api_url: String,

    #[arg(long = "AUTHORITY_URL", default_value = AUTHORITY_URL)]
    pub authority_url: String,

    /// Per-request timeout.
    #[arg(long = "HTTP_TIMEOUT_SECS", default_value_t = 60)]
    pub http_timeout_secs: u64,

    #[arg(long = "POLL_INTERVAL_SECS", default_value_t = 15)]
    pub poll_interval_secs: u64,

    #[arg(long = "POLL_MAX_ATTEMPTS", default_value_t = 120)]
    pub poll_max_attempts: u32,

    /// Wall-clock bound for a single long running operation.
    #[arg(long = "POLL_TIMEOUT_SECS", default_value_t = 1800)]
    pub poll_timeout_secs: u64,

    /// Retries of throttled, timed out or 5xx requests.
    #[arg(long = "MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    #[arg(long = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl ApiArgs {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..Default::default()
        }
    }

    pub fn poll_policy(&self) -> BranchOutResult<PollPolicy> {
        let policy = PollPolicy::default()
            .with_interval(Duration::from_secs(self.poll_interval_secs))
            .with_max_attempts(self.poll_max_attempts)
            .with_timeout(Duration::from_secs(self.poll_timeout_secs));
        policy.validate().map_err(BranchOutError::config)?;
        Ok(policy)
    }

    pub fn fabric_config(&self) -> FabricConfig {
        FabricConfig::default()
            .with_base_url(&self.fabric_api_url)
            .with_powerbi_base_url(&self.powerbi_api_url)
            .with_timeout(Duration::from_secs(self.http_timeout_secs))
            .with_retry(self.retry_policy())
    }

    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig::default()
            .with_authority_url(&self.authority_url)
            .with_timeout(Duration::from_secs(self.http_timeout_secs))
            .with_retry(self.retry_policy())
    }

    /// Resolves the bearer token and builds the Fabric client with it.
    pub async fn connect_fabric(&self, auth: &AuthArgs) -> BranchOutResult<FabricClient> {
        let resolver = TokenResolver::new(auth.credential()?, self.identity_config())?;
        let token = resolver
            .token()
            .await
            .map_err(BranchOutError::Authentication)?;
        Ok(FabricClient::new(self.fabric_config(), token)?)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "branch-out")]
#[command(about = "Create a feature branch and a Fabric workspace synced to it")]
pub struct BranchOutArgs {
    #[arg(long = "WORKSPACE_NAME")]
    pub workspace_name: String,

    /// UPN or email of the developer to add as workspace admin.
    #[arg(long = "DEVELOPER")]
    pub developer: String,

    #[arg(long = "CAPACITY_ID")]
    pub capacity_id: String,

    #[arg(long = "GH_OWNER")]
    pub gh_owner: String,

    #[arg(long = "GH_REPO_NAME")]
    pub gh_repo_name: String,

    #[arg(long = "GH_MAIN_BRANCH")]
    pub gh_main_branch: String,

    /// Folder of the repository holding the workspace items.
    #[arg(long = "GH_GIT_FOLDER")]
    pub gh_git_folder: String,

    /// Generated from the workspace name and current time when omitted.
    #[arg(long = "GH_NEW_BRANCH")]
    pub gh_new_branch: Option<String>,

    #[arg(long = "GH_API_URL", default_value = GITHUB_API_URL)]
    pub gh_api_url: String,

    #[arg(long = "GH_PAT_TOKEN", env = "GH_PAT_TOKEN", hide_env_values = true)]
    pub gh_pat_token: String,

    /// Reuse a workspace that already has this name instead of failing.
    #[arg(
        long = "REUSE_EXISTING_WORKSPACE",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value = "false",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub reuse_existing_workspace: bool,

    #[command(flatten)]
    pub auth: AuthArgs,

    #[command(flatten)]
    pub api: ApiArgs,
}

impl BranchOutArgs {
    pub fn provision_config(&self) -> ProvisionConfig {
        ProvisionConfig {
            workspace_name: self.workspace_name.clone(),
            developer: self.developer.clone(),
            capacity_id: self.capacity_id.clone(),
            owner: self.gh_owner.clone(),
            repository: self.gh_repo_name.clone(),
            main_branch: self.gh_main_branch.clone(),
            new_branch: self.gh_new_branch.clone(),
            git_folder: self.gh_git_folder.clone(),
            github_token: self.gh_pat_token.clone(),
            reuse_existing_workspace: self.reuse_existing_workspace,
        }
    }

    pub fn github_config(&self) -> GitHubConfig {
        GitHubConfig::default()
            .with_base_url(&self.gh_api_url)
            .with_timeout(Duration::from_secs(self.api.http_timeout_secs))
            .with_retry(self.api.retry_policy())
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "post-activity")]
#[command(about = "Copy data, create shortcuts and rewire connections in a feature workspace")]
pub struct PostActivityArgs {
    /// Name or id of the workspace the feature branched from.
    #[arg(long = "SOURCE_WORKSPACE")]
    pub source_workspace: String,

    /// Name or id of the feature workspace.
    #[arg(long = "TARGET_WORKSPACE")]
    pub target_workspace: String,

    #[arg(long = "NOTEBOOK_WORKSPACE_ID")]
    pub notebook_workspace_id: Option<String>,

    #[arg(long = "NOTEBOOK_ID")]
    pub notebook_id: Option<String>,

    #[arg(
        long = "COPY_LAKEHOUSE",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value = "false",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub copy_lakehouse: bool,

    #[arg(
        long = "COPY_WAREHOUSE",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value = "false",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub copy_warehouse: bool,

    #[arg(
        long = "CREATE_SHORTCUTS",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value = "false",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub create_shortcuts: bool,

    /// `(from,to)` connection pairs; `()` or empty to skip rewiring.
    #[arg(long = "CONNECTIONS_FROM_TO", default_value = "")]
    pub connections_from_to: String,

    /// Stop at the first failed task instead of running the rest.
    #[arg(
        long = "FAIL_FAST",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value = "false",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub fail_fast: bool,

    #[command(flatten)]
    pub auth: AuthArgs,

    #[command(flatten)]
    pub api: ApiArgs,
}

impl PostActivityArgs {
    pub fn post_activity_config(&self) -> BranchOutResult<PostActivityConfig> {
        let notebook = match (&self.notebook_workspace_id, &self.notebook_id) {
            (Some(workspace_id), Some(notebook_id)) => Some(NotebookRef {
                workspace_id: workspace_id.clone(),
                notebook_id: notebook_id.clone(),
            }),
            (None, None) => None,
            _ => {
                return Err(BranchOutError::config(
                    "NOTEBOOK_WORKSPACE_ID and NOTEBOOK_ID must be given together",
                ))
            }
        };

        Ok(PostActivityConfig {
            source_workspace: self.source_workspace.clone(),
            target_workspace: self.target_workspace.clone(),
            notebook,
            copy_lakehouse: self.copy_lakehouse,
            copy_warehouse: self.copy_warehouse,
            create_shortcuts: self.create_shortcuts,
            connections: parse_connection_pairs(&self.connections_from_to)?,
            fail_fast: self.fail_fast,
        })
    }
}
