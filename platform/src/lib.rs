pub mod auth;
pub mod config;
pub mod fabric;
pub mod github;
mod http;
pub mod lro;
pub mod provider;
pub mod types;

pub use auth::{token_preview, Credential, CredentialInputs, TokenResolver};
pub use config::{FabricConfig, GitHubConfig, IdentityConfig, PollPolicy, RetryPolicy};
pub use fabric::FabricClient;
pub use github::GitHubClient;
pub use lro::LroPoller;
pub use provider::{ApiError, ApiResult, GitHosting, OperationSource, WorkspacePlatform};
pub use types::{
    Accepted, BranchRef, Connection, CreateConnectionRequest, CreateShortcutRequest,
    CreateWorkspaceRequest, DefinitionPart, GitConnectRequest, InitializeConnectionResponse, Item,
    ItemDefinition, ItemDefinitionResponse, ItemType, LakehouseTable, OperationHandle,
    OperationKind, OperationState, OperationStatus, RequiredAction, RunJobRequest, Shortcut,
    UpdateFromGitRequest, WorkspaceRecord,
};

pub mod prelude {
    pub use crate::auth::*;
    pub use crate::config::*;
    pub use crate::lro::*;
    pub use crate::provider::*;
    pub use crate::types::*;
    pub use crate::{FabricClient, GitHubClient};
}
