//! Branch and workspace provisioning.
//!
//! The sequence is fixed: the feature branch exists before anything is
//! connected to it, and the workspace is created (and sits on the requested
//! capacity) before the developer is added or git is connected. Each step
//! that the platform runs asynchronously is awaited through the poller before
//! the next one starts.

use crate::clock::Clock;
use crate::error::{BranchOutError, BranchOutResult};
use crate::naming::resolve_branch_name;
use platform::{
    ApiError, BranchRef, Connection, CreateConnectionRequest, CreateWorkspaceRequest,
    GitConnectRequest, GitHosting, LroPoller, RequiredAction, UpdateFromGitRequest,
    WorkspacePlatform, WorkspaceRecord,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Everything one branch-out run needs.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    pub workspace_name: String,
    /// UPN or email of the developer who becomes workspace admin.
    pub developer: String,
    pub capacity_id: String,
    pub owner: String,
    pub repository: String,
    pub main_branch: String,
    /// Generated when absent.
    pub new_branch: Option<String>,
    pub git_folder: String,
    #[serde(skip_serializing, default)]
    pub github_token: String,
    #[serde(default)]
    pub reuse_existing_workspace: bool,
}

impl fmt::Debug for ProvisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionConfig")
            .field("workspace_name", &self.workspace_name)
            .field("developer", &self.developer)
            .field("capacity_id", &self.capacity_id)
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("main_branch", &self.main_branch)
            .field("new_branch", &self.new_branch)
            .field("git_folder", &self.git_folder)
            .field("github_token", &"<redacted>")
            .field("reuse_existing_workspace", &self.reuse_existing_workspace)
            .finish()
    }
}

impl ProvisionConfig {
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("WORKSPACE_NAME", &self.workspace_name),
            ("DEVELOPER", &self.developer),
            ("CAPACITY_ID", &self.capacity_id),
            ("GH_OWNER", &self.owner),
            ("GH_REPO_NAME", &self.repository),
            ("GH_MAIN_BRANCH", &self.main_branch),
            ("GH_PAT_TOKEN", &self.github_token),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{} must not be empty", name));
            }
        }
        Ok(())
    }

    /// Display name of the platform connection holding the PAT.
    pub fn connection_name(&self) -> String {
        format!("GitHub PAT - {}/{}", self.owner, self.repository)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionOutcome {
    pub branch: BranchRef,
    pub branch_created: bool,
    pub workspace: WorkspaceRecord,
    pub workspace_created: bool,
    pub connection_id: String,
    /// Whether an update from git was needed and ran.
    pub synced_from_git: bool,
}

/// Maps the folder flag to the platform's `directoryName`: the repository
/// root is the empty string and trailing slashes are dropped.
pub fn git_directory(folder: &str) -> String {
    let folder = folder.trim();
    if folder == "/" || folder == "\\" {
        return String::new();
    }
    folder.trim_end_matches('/').to_string()
}

pub struct Provisioner<'a> {
    platform: &'a dyn WorkspacePlatform,
    git: &'a dyn GitHosting,
    poller: LroPoller,
    clock: Clock,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        platform: &'a dyn WorkspacePlatform,
        git: &'a dyn GitHosting,
        poller: LroPoller,
    ) -> Self {
        Self {
            platform,
            git,
            poller,
            clock: Clock::new(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn run(&self, config: &ProvisionConfig) -> BranchOutResult<ProvisionOutcome> {
        config.validate().map_err(BranchOutError::config)?;

        let branch_name =
            resolve_branch_name(config.new_branch.as_deref(), &config.workspace_name, &self.clock);
        info!(
            workspace = %config.workspace_name,
            branch = %branch_name,
            host = self.git.host_name(),
            "Starting branch-out"
        );

        let (branch, branch_created) = self.ensure_branch(config, &branch_name).await?;
        let (workspace, workspace_created) = self.ensure_workspace(config).await?;
        self.add_admin(config, &workspace).await?;
        let (connection_id, synced_from_git) =
            self.connect_git(config, &workspace, &branch.name).await?;

        info!(
            workspace_id = %workspace.id,
            branch = %branch.name,
            "Feature workspace is connected to its branch"
        );

        Ok(ProvisionOutcome {
            branch,
            branch_created,
            workspace,
            workspace_created,
            connection_id,
            synced_from_git,
        })
    }

    async fn ensure_branch(
        &self,
        config: &ProvisionConfig,
        branch_name: &str,
    ) -> BranchOutResult<(BranchRef, bool)> {
        let wrap = |source: ApiError| BranchOutError::BranchCreation {
            branch: branch_name.to_string(),
            source,
        };

        if let Some(existing) = self
            .git
            .get_branch(&config.owner, &config.repository, branch_name)
            .await
            .map_err(wrap)?
        {
            info!(branch = %existing.name, sha = %existing.sha, "Branch already exists, skipping creation");
            return Ok((existing, false));
        }

        let base = self
            .git
            .get_branch(&config.owner, &config.repository, &config.main_branch)
            .await
            .map_err(wrap)?
            .ok_or_else(|| {
                wrap(ApiError::NotFound {
                    resource: format!(
                        "branch '{}' in {}/{}",
                        config.main_branch, config.owner, config.repository
                    ),
                })
            })?;
        debug!(main = %config.main_branch, sha = %base.sha, "Resolved base branch");

        let created = self
            .git
            .create_branch(&config.owner, &config.repository, branch_name, &base.sha)
            .await
            .map_err(wrap)?;
        info!(branch = %created.name, from = %config.main_branch, "Created branch");
        Ok((created, true))
    }

    async fn ensure_workspace(
        &self,
        config: &ProvisionConfig,
    ) -> BranchOutResult<(WorkspaceRecord, bool)> {
        let wrap = |source: ApiError| BranchOutError::WorkspaceCreation {
            workspace: config.workspace_name.clone(),
            source,
        };

        let existing = self
            .platform
            .list_workspaces()
            .await
            .map_err(wrap)?
            .into_iter()
            .find(|ws| ws.display_name == config.workspace_name);

        let (workspace, created) = match existing {
            Some(ws) if config.reuse_existing_workspace => {
                info!(workspace_id = %ws.id, "Reusing existing workspace");
                (ws, false)
            }
            Some(ws) => {
                return Err(wrap(ApiError::AlreadyExists {
                    resource: format!("workspace '{}' ({})", ws.display_name, ws.id),
                }))
            }
            None => {
                let request = CreateWorkspaceRequest::new(&config.workspace_name)
                    .with_capacity(&config.capacity_id);
                let accepted = self
                    .platform
                    .create_workspace(&request)
                    .await
                    .map_err(wrap)?;
                let ws: WorkspaceRecord = self
                    .poller
                    .settle(self.platform, accepted)
                    .await
                    .map_err(wrap)?;
                info!(workspace_id = %ws.id, name = %ws.display_name, "Created workspace");
                (ws, true)
            }
        };

        let on_capacity = workspace
            .capacity_id
            .as_deref()
            .is_some_and(|id| id.eq_ignore_ascii_case(&config.capacity_id));
        if on_capacity {
            return Ok((workspace, created));
        }

        info!(
            workspace_id = %workspace.id,
            capacity_id = %config.capacity_id,
            "Assigning workspace to capacity"
        );
        let accepted = self
            .platform
            .assign_to_capacity(&workspace.id, &config.capacity_id)
            .await
            .map_err(wrap)?;
        self.poller
            .complete(self.platform, accepted)
            .await
            .map_err(wrap)?;

        Ok((
            WorkspaceRecord {
                capacity_id: Some(config.capacity_id.clone()),
                ..workspace
            },
            created,
        ))
    }

    async fn add_admin(
        &self,
        config: &ProvisionConfig,
        workspace: &WorkspaceRecord,
    ) -> BranchOutResult<()> {
        self.platform
            .add_workspace_admin(&workspace.id, &config.developer)
            .await
            .map_err(|source| BranchOutError::RoleAssignment {
                principal: config.developer.clone(),
                workspace_id: workspace.id.clone(),
                source,
            })?;
        info!(workspace_id = %workspace.id, principal = %config.developer, "Added workspace admin");
        Ok(())
    }

    async fn connect_git(
        &self,
        config: &ProvisionConfig,
        workspace: &WorkspaceRecord,
        branch: &str,
    ) -> BranchOutResult<(String, bool)> {
        let wrap = |source: ApiError| BranchOutError::GitConnection {
            workspace_id: workspace.id.clone(),
            branch: branch.to_string(),
            source,
        };

        let connection = self.github_connection(config).await.map_err(wrap)?;

        let request = GitConnectRequest::github(
            &config.owner,
            &config.repository,
            branch,
            git_directory(&config.git_folder),
            &connection.id,
        );
        match self.platform.git_connect(&workspace.id, &request).await {
            Ok(()) => info!(workspace_id = %workspace.id, branch, "Connected workspace to git"),
            Err(err) if config.reuse_existing_workspace && err.is_conflict() => {
                warn!(workspace_id = %workspace.id, "Workspace is already connected to git")
            }
            Err(err) => return Err(wrap(err)),
        }

        let accepted = self
            .platform
            .git_initialize(&workspace.id)
            .await
            .map_err(wrap)?;
        let initialized = self
            .poller
            .settle(self.platform, accepted)
            .await
            .map_err(wrap)?;
        debug!(
            workspace_id = %workspace.id,
            required_action = ?initialized.required_action,
            "Initialized git connection"
        );

        if initialized.required_action != Some(RequiredAction::UpdateFromGit) {
            return Ok((connection.id, false));
        }

        let remote_commit_hash = initialized.remote_commit_hash.ok_or_else(|| {
            wrap(ApiError::UnexpectedResponse {
                message: "initializeConnection asked for an update but sent no remoteCommitHash"
                    .to_string(),
            })
        })?;
        info!(workspace_id = %workspace.id, commit = %remote_commit_hash, "Updating workspace from git");
        let update = UpdateFromGitRequest::prefer_remote(initialized.workspace_head, remote_commit_hash);
        let accepted = self
            .platform
            .git_update_from_git(&workspace.id, &update)
            .await
            .map_err(wrap)?;
        self.poller
            .complete(self.platform, accepted)
            .await
            .map_err(wrap)?;
        info!(workspace_id = %workspace.id, branch, "Workspace is synchronized with its branch");

        Ok((connection.id, true))
    }

    async fn github_connection(&self, config: &ProvisionConfig) -> Result<Connection, ApiError> {
        let name = config.connection_name();
        let existing = self
            .platform
            .list_connections()
            .await?
            .into_iter()
            .find(|c| c.display_name.as_deref() == Some(name.as_str()));
        if let Some(connection) = existing {
            debug!(connection_id = %connection.id, %name, "Using existing git connection");
            return Ok(connection);
        }

        let request = CreateConnectionRequest::github_pat(&name, &config.github_token);
        let connection = self.platform.create_connection(&request).await?;
        info!(connection_id = %connection.id, %name, "Created git connection");
        Ok(connection)
    }
}
