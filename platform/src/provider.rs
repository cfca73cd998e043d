use crate::types::{
    Accepted, BranchRef, Connection, CreateConnectionRequest, CreateShortcutRequest,
    CreateWorkspaceRequest, GitConnectRequest, InitializeConnectionResponse, Item,
    ItemDefinitionResponse, ItemType, LakehouseTable, OperationHandle, OperationState,
    OperationStatus, RunJobRequest, Shortcut, UpdateFromGitRequest, WorkspaceRecord,
};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Already exists: {resource}")]
    AlreadyExists { resource: String },

    #[error("Long running operation ended as {status:?}: {detail}")]
    OperationFailed {
        status: OperationStatus,
        detail: String,
    },

    #[error("Long running operation still pending after {attempts} polls ({elapsed:?})")]
    OperationTimeout { attempts: u32, elapsed: Duration },

    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Timeouts, connection failures, throttling and 5xx answers. Everything
    /// else is surfaced to the caller without another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(err) if err.is_timeout() || err.is_connect() => true,
            _ => matches!(self.status(), Some(429) | Some(500..=599)),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::AlreadyExists { .. }) || self.status() == Some(409)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. }) || self.status() == Some(404)
    }
}

/// Anything that can report the state of a long running operation.
#[async_trait]
pub trait OperationSource: Send + Sync {
    async fn operation_state(&self, handle: &OperationHandle) -> ApiResult<OperationState>;

    /// Payload produced by a succeeded operation. Job instances have none.
    async fn operation_result(&self, handle: &OperationHandle) -> ApiResult<serde_json::Value>;
}

/// The workspace platform: Fabric core APIs plus the Power BI admin API used
/// for role assignment.
#[async_trait]
pub trait WorkspacePlatform: OperationSource {
    async fn list_workspaces(&self) -> ApiResult<Vec<WorkspaceRecord>>;

    async fn create_workspace(
        &self,
        request: &CreateWorkspaceRequest,
    ) -> ApiResult<Accepted<WorkspaceRecord>>;

    async fn assign_to_capacity(
        &self,
        workspace_id: &str,
        capacity_id: &str,
    ) -> ApiResult<Accepted<()>>;

    async fn add_workspace_admin(&self, workspace_id: &str, principal: &str) -> ApiResult<()>;

    async fn list_connections(&self) -> ApiResult<Vec<Connection>>;

    async fn create_connection(&self, request: &CreateConnectionRequest) -> ApiResult<Connection>;

    async fn git_connect(&self, workspace_id: &str, request: &GitConnectRequest) -> ApiResult<()>;

    async fn git_initialize(
        &self,
        workspace_id: &str,
    ) -> ApiResult<Accepted<InitializeConnectionResponse>>;

    async fn git_update_from_git(
        &self,
        workspace_id: &str,
        request: &UpdateFromGitRequest,
    ) -> ApiResult<Accepted<()>>;

    async fn list_items(
        &self,
        workspace_id: &str,
        item_type: Option<ItemType>,
    ) -> ApiResult<Vec<Item>>;

    async fn list_lakehouse_tables(
        &self,
        workspace_id: &str,
        lakehouse_id: &str,
    ) -> ApiResult<Vec<LakehouseTable>>;

    async fn run_notebook(
        &self,
        workspace_id: &str,
        notebook_id: &str,
        request: &RunJobRequest,
    ) -> ApiResult<OperationHandle>;

    async fn create_shortcut(
        &self,
        workspace_id: &str,
        item_id: &str,
        request: &CreateShortcutRequest,
    ) -> ApiResult<Shortcut>;

    async fn get_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
    ) -> ApiResult<Accepted<ItemDefinitionResponse>>;

    async fn update_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
        definition: &ItemDefinitionResponse,
    ) -> ApiResult<Accepted<()>>;
}

/// The git host holding the feature branches.
#[async_trait]
pub trait GitHosting: Send + Sync {
    /// Returns `None` when the branch does not exist.
    async fn get_branch(&self, owner: &str, repo: &str, branch: &str)
        -> ApiResult<Option<BranchRef>>;

    async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> ApiResult<BranchRef>;

    fn host_name(&self) -> &'static str;
}
