use crate::connections::ParseError;
use platform::ApiError;
use thiserror::Error;

/// Failures of a branch-out or post-activity run. Step variants keep the
/// underlying API error as their source so the logged chain names both the
/// step and the transport cause.
#[derive(Error, Debug)]
pub enum BranchOutError {
    #[error("Authentication failed")]
    Authentication(#[source] ApiError),

    #[error("Could not create branch '{branch}'")]
    BranchCreation {
        branch: String,
        #[source]
        source: ApiError,
    },

    #[error("Could not create workspace '{workspace}'")]
    WorkspaceCreation {
        workspace: String,
        #[source]
        source: ApiError,
    },

    #[error("Could not add '{principal}' as admin of workspace {workspace_id}")]
    RoleAssignment {
        principal: String,
        workspace_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Could not connect workspace {workspace_id} to branch '{branch}'")]
    GitConnection {
        workspace_id: String,
        branch: String,
        #[source]
        source: ApiError,
    },

    #[error("Long running operation failed: {detail}")]
    OperationFailed { detail: String },

    #[error("Long running operation did not finish after {attempts} polls")]
    OperationTimeout { attempts: u32 },

    #[error("Could not copy {copy_type} data into workspace {target_workspace_id}")]
    DataCopy {
        copy_type: String,
        target_workspace_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Could not create shortcuts for lakehouse '{lakehouse}'")]
    ShortcutCreation {
        lakehouse: String,
        #[source]
        source: ApiError,
    },

    #[error("Could not list lakehouses of workspace {workspace_id} to create shortcuts")]
    ShortcutDiscovery {
        workspace_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Could not list {listing} to rewire connections")]
    RewireDiscovery {
        listing: String,
        #[source]
        source: ApiError,
    },

    #[error("Could not rewire connections of pipeline '{pipeline}'")]
    ConnectionRewire {
        pipeline: String,
        #[source]
        source: ApiError,
    },

    #[error("Network error")]
    Network(#[source] ApiError),

    #[error("Invalid connection mapping")]
    Parse(#[from] ParseError),

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Workspace '{name}' not found")]
    WorkspaceNotFound { name: String },

    #[error("Connection '{name}' not found")]
    ConnectionNotFound { name: String },

    #[error("{} post-activity task(s) failed: {}", failed.len(), failed.join(", "))]
    PostActivity { failed: Vec<String> },
}

pub type BranchOutResult<T> = Result<T, BranchOutError>;

impl From<ApiError> for BranchOutError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Authentication { .. } => BranchOutError::Authentication(err),
            ApiError::OperationFailed { detail, .. } => BranchOutError::OperationFailed { detail },
            ApiError::OperationTimeout { attempts, .. } => {
                BranchOutError::OperationTimeout { attempts }
            }
            ApiError::InvalidConfig { message } => BranchOutError::Config { message },
            other => BranchOutError::Network(other),
        }
    }
}

impl BranchOutError {
    pub fn config(message: impl Into<String>) -> Self {
        BranchOutError::Config {
            message: message.into(),
        }
    }

    /// Short name of the step that failed, for structured logs.
    pub fn step(&self) -> &'static str {
        match self {
            BranchOutError::Authentication(_) => "authentication",
            BranchOutError::BranchCreation { .. } => "branch-creation",
            BranchOutError::WorkspaceCreation { .. } => "workspace-creation",
            BranchOutError::RoleAssignment { .. } => "role-assignment",
            BranchOutError::GitConnection { .. } => "git-connection",
            BranchOutError::OperationFailed { .. } | BranchOutError::OperationTimeout { .. } => {
                "long-running-operation"
            }
            BranchOutError::DataCopy { .. } => "data-copy",
            BranchOutError::ShortcutCreation { .. } | BranchOutError::ShortcutDiscovery { .. } => {
                "shortcut-creation"
            }
            BranchOutError::ConnectionRewire { .. } | BranchOutError::RewireDiscovery { .. } => {
                "connection-rewire"
            }
            BranchOutError::Network(_) => "network",
            BranchOutError::Parse(_) | BranchOutError::Config { .. } => "configuration",
            BranchOutError::WorkspaceNotFound { .. } | BranchOutError::ConnectionNotFound { .. } => {
                "resolution"
            }
            BranchOutError::PostActivity { .. } => "post-activity",
        }
    }

    /// The error followed by each of its causes.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        chain
    }
}
