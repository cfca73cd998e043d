use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Reply of a call the platform may finish inline (200/201) or hand off as a
/// long running operation (202 + `Location`).
#[derive(Debug, Clone, PartialEq)]
pub enum Accepted<T> {
    Completed(T),
    Pending(OperationHandle),
}

impl<T> Accepted<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Accepted::Pending(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// `/v1/operations/{id}`; succeeded operations may expose `/result`.
    Operation,
    /// `/jobs/instances/{id}` of an on-demand item job.
    JobInstance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    pub location: String,
    pub kind: OperationKind,
    pub operation_id: Option<String>,
    pub retry_after: Option<Duration>,
}

impl OperationHandle {
    pub fn new(location: impl Into<String>) -> Self {
        let location = location.into();
        let kind = if location.contains("/jobs/instances/") {
            OperationKind::JobInstance
        } else {
            OperationKind::Operation
        };
        Self {
            location,
            kind,
            operation_id: None,
            retry_after: None,
        }
    }

    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation_id {
            Some(id) => write!(f, "{} ({})", id, self.location),
            None => write!(f, "{}", self.location),
        }
    }
}

/// Status of an operation or job instance. Both vocabularies the platform uses
/// are folded into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    NotStarted,
    #[serde(alias = "InProgress")]
    Running,
    #[serde(alias = "Completed")]
    Succeeded,
    Failed,
    #[serde(alias = "Deduped")]
    Cancelled,
    Undetermined,
    #[serde(other)]
    Unknown,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Succeeded | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationState {
    pub status: OperationStatus,
    #[serde(default)]
    pub percent_complete: Option<f64>,
    #[serde(default, alias = "failureReason", alias = "Error")]
    pub error: Option<serde_json::Value>,
    /// Result payload, filled in by `LroPoller::wait_for_result` for operations
    /// that have one.
    #[serde(skip)]
    pub result: Option<serde_json::Value>,
}

impl OperationState {
    pub fn new(status: OperationStatus) -> Self {
        Self {
            status,
            percent_complete: None,
            error: None,
            result: None,
        }
    }

    pub fn with_error(mut self, error: serde_json::Value) -> Self {
        self.error = Some(error);
        self
    }

    pub fn failure_detail(&self) -> String {
        match &self.error {
            Some(error) => error.to_string(),
            None => "no error detail reported".to_string(),
        }
    }
}

/// Paged list envelope of the Fabric API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    #[serde(alias = "data")]
    pub value: Vec<T>,
    #[serde(default)]
    pub continuation_uri: Option<String>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecord {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceRequest {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_id: Option<String>,
}

impl CreateWorkspaceRequest {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            capacity_id: None,
        }
    }

    pub fn with_capacity(mut self, capacity_id: impl Into<String>) -> Self {
        self.capacity_id = Some(capacity_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignToCapacityRequest {
    pub capacity_id: String,
}

/// Power BI admin API body for adding a workspace user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupUserRequest {
    pub email_address: String,
    pub group_user_access_right: String,
}

impl GroupUserRequest {
    pub fn admin(email_address: impl Into<String>) -> Self {
        Self {
            email_address: email_address.into(),
            group_user_access_right: "Admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub connectivity_type: Option<String>,
}

/// A shareable cloud connection holding a GitHub personal access token.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectionRequest {
    pub connectivity_type: String,
    pub display_name: String,
    pub connection_details: ConnectionDetails,
    pub credential_details: CredentialDetails,
}

impl CreateConnectionRequest {
    pub fn github_pat(display_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            connectivity_type: "ShareableCloud".to_string(),
            display_name: display_name.into(),
            connection_details: ConnectionDetails {
                connection_type: "GitHubSourceControl".to_string(),
                creation_method: "GitHubSourceControl.Contents".to_string(),
            },
            credential_details: CredentialDetails {
                credentials: KeyCredentials {
                    credential_type: "Key".to_string(),
                    key: token.into(),
                },
            },
        }
    }
}

impl fmt::Debug for CreateConnectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateConnectionRequest")
            .field("connectivity_type", &self.connectivity_type)
            .field("display_name", &self.display_name)
            .field("connection_details", &self.connection_details)
            .field("credential_details", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    #[serde(rename = "type")]
    pub connection_type: String,
    pub creation_method: String,
}

#[derive(Clone, Serialize)]
pub struct CredentialDetails {
    pub credentials: KeyCredentials,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyCredentials {
    pub credential_type: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitProviderDetails {
    pub owner_name: String,
    pub git_provider_type: String,
    pub repository_name: String,
    pub branch_name: String,
    pub directory_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCredentials {
    pub source: String,
    pub connection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConnectRequest {
    pub git_provider_details: GitProviderDetails,
    pub my_git_credentials: GitCredentials,
}

impl GitConnectRequest {
    pub fn github(
        owner: impl Into<String>,
        repository: impl Into<String>,
        branch: impl Into<String>,
        directory: impl Into<String>,
        connection_id: impl Into<String>,
    ) -> Self {
        Self {
            git_provider_details: GitProviderDetails {
                owner_name: owner.into(),
                git_provider_type: "GitHub".to_string(),
                repository_name: repository.into(),
                branch_name: branch.into(),
                directory_name: directory.into(),
            },
            my_git_credentials: GitCredentials {
                source: "ConfiguredConnection".to_string(),
                connection_id: connection_id.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequiredAction {
    None,
    UpdateFromGit,
    CommitToGit,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeConnectionResponse {
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub workspace_head: Option<String>,
    #[serde(default)]
    pub remote_commit_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    pub conflict_resolution_type: String,
    pub conflict_resolution_policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    pub allow_override_items: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFromGitRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_head: Option<String>,
    pub remote_commit_hash: String,
    pub conflict_resolution: ConflictResolution,
    pub options: UpdateOptions,
}

impl UpdateFromGitRequest {
    /// Remote content wins: the workspace is brand new and mirrors the branch.
    pub fn prefer_remote(workspace_head: Option<String>, remote_commit_hash: String) -> Self {
        Self {
            workspace_head,
            remote_commit_hash,
            conflict_resolution: ConflictResolution {
                conflict_resolution_type: "Workspace".to_string(),
                conflict_resolution_policy: "PreferRemote".to_string(),
            },
            options: UpdateOptions {
                allow_override_items: true,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    Lakehouse,
    Warehouse,
    Notebook,
    DataPipeline,
    #[serde(other)]
    Other,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Lakehouse => "Lakehouse",
            ItemType::Warehouse => "Warehouse",
            ItemType::Notebook => "Notebook",
            ItemType::DataPipeline => "DataPipeline",
            ItemType::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LakehouseTable {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneLakeTarget {
    pub workspace_id: String,
    pub item_id: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutTarget {
    pub one_lake: OneLakeTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShortcutRequest {
    pub path: String,
    pub name: String,
    pub target: ShortcutTarget,
}

impl CreateShortcutRequest {
    /// Shortcut under the `Tables` folder pointing at a table of another lakehouse.
    pub fn table(
        name: impl Into<String>,
        source_workspace_id: impl Into<String>,
        source_lakehouse_id: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            path: "Tables".to_string(),
            target: ShortcutTarget {
                one_lake: OneLakeTarget {
                    workspace_id: source_workspace_id.into(),
                    item_id: source_lakehouse_id.into(),
                    path: format!("Tables/{}", name),
                },
            },
            name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcut {
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameter {
    pub value: String,
    #[serde(rename = "type")]
    pub parameter_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionData {
    pub parameters: BTreeMap<String, JobParameter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunJobRequest {
    pub execution_data: ExecutionData,
}

impl RunJobRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.execution_data.parameters.insert(
            name.into(),
            JobParameter {
                value: value.into(),
                parameter_type: "string".to_string(),
            },
        );
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.execution_data
            .parameters
            .get(name)
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionPart {
    pub path: String,
    pub payload: String,
    pub payload_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub parts: Vec<DefinitionPart>,
}

impl ItemDefinition {
    pub fn part(&self, path: &str) -> Option<&DefinitionPart> {
        self.parts.iter().find(|p| p.path == path)
    }

    pub fn part_mut(&mut self, path: &str) -> Option<&mut DefinitionPart> {
        self.parts.iter_mut().find(|p| p.path == path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinitionResponse {
    pub definition: ItemDefinition,
}

/// Git reference as the hosting API reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub object: GitObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitObject {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRefRequest {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
    pub sha: String,
}

impl From<GitRef> for BranchRef {
    fn from(git_ref: GitRef) -> Self {
        let name = git_ref
            .ref_name
            .strip_prefix("refs/heads/")
            .unwrap_or(&git_ref.ref_name)
            .to_string();
        Self {
            name,
            sha: git_ref.object.sha,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_status_vocabularies() {
        let parse = |s: &str| serde_json::from_value::<OperationStatus>(json!(s)).unwrap();
        assert_eq!(parse("Running"), OperationStatus::Running);
        assert_eq!(parse("InProgress"), OperationStatus::Running);
        assert_eq!(parse("Completed"), OperationStatus::Succeeded);
        assert_eq!(parse("Deduped"), OperationStatus::Cancelled);
        assert_eq!(parse("Undetermined"), OperationStatus::Undetermined);
        assert_eq!(parse("Paused"), OperationStatus::Unknown);
        assert!(!OperationStatus::Undetermined.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_job_instance_failure_reason_is_error() {
        let state: OperationState = serde_json::from_value(json!({
            "id": "job-1",
            "status": "Failed",
            "failureReason": {"errorCode": "NotebookFailed", "message": "boom"}
        }))
        .unwrap();
        assert_eq!(state.status, OperationStatus::Failed);
        assert!(state.failure_detail().contains("NotebookFailed"));
    }

    #[test]
    fn test_handle_kind_from_location() {
        let op = OperationHandle::new("https://api.fabric.microsoft.com/v1/operations/abc");
        assert_eq!(op.kind, OperationKind::Operation);
        let job = OperationHandle::new(
            "https://api.fabric.microsoft.com/v1/workspaces/w/items/n/jobs/instances/j",
        );
        assert_eq!(job.kind, OperationKind::JobInstance);
    }

    #[test]
    fn test_git_connect_request_shape() {
        let request = GitConnectRequest::github("contoso", "fabric", "feature/x", "src", "conn-1");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["gitProviderDetails"]["gitProviderType"], "GitHub");
        assert_eq!(value["gitProviderDetails"]["directoryName"], "src");
        assert_eq!(value["myGitCredentials"]["source"], "ConfiguredConnection");
        assert_eq!(value["myGitCredentials"]["connectionId"], "conn-1");
    }

    #[test]
    fn test_connection_request_debug_redacts_key() {
        let request = CreateConnectionRequest::github_pat("GitHub PAT - a/b", "ghp_secret");
        let debug = format!("{:?}", request);
        assert!(!debug.contains("ghp_secret"));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["credentialDetails"]["credentials"]["key"], "ghp_secret");
        assert_eq!(value["connectionDetails"]["type"], "GitHubSourceControl");
    }

    #[test]
    fn test_branch_ref_strips_heads_prefix() {
        let git_ref: GitRef = serde_json::from_value(json!({
            "ref": "refs/heads/feature/x",
            "object": {"sha": "abc123", "type": "commit"}
        }))
        .unwrap();
        let branch = BranchRef::from(git_ref);
        assert_eq!(branch.name, "feature/x");
        assert_eq!(branch.sha, "abc123");
    }

    #[test]
    fn test_table_shortcut_targets_source_table() {
        let request = CreateShortcutRequest::table("sales", "ws-src", "lh-src");
        assert_eq!(request.path, "Tables");
        assert_eq!(request.name, "sales");
        assert_eq!(request.target.one_lake.path, "Tables/sales");
        assert_eq!(request.target.one_lake.item_id, "lh-src");
    }
}
