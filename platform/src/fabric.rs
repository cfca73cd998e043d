use crate::config::FabricConfig;
use crate::http::{decode_accepted, decode_json, operation_handle, HttpSender};
use crate::provider::{ApiError, ApiResult, OperationSource, WorkspacePlatform};
use crate::types::{
    Accepted, AssignToCapacityRequest, Connection, CreateConnectionRequest, CreateShortcutRequest,
    CreateWorkspaceRequest, GitConnectRequest, GroupUserRequest, InitializeConnectionResponse,
    Item, ItemDefinitionResponse, ItemType, LakehouseTable, ListResponse, OperationHandle,
    OperationState, RunJobRequest, Shortcut, UpdateFromGitRequest, WorkspaceRecord,
};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

/// Fabric REST client. Role assignment goes through the Power BI admin API,
/// which accepts the same bearer token.
pub struct FabricClient {
    http: HttpSender,
    config: FabricConfig,
    base_url: String,
    powerbi_base_url: String,
    token: String,
}

impl FabricClient {
    pub fn new(config: FabricConfig, token: impl Into<String>) -> ApiResult<Self> {
        config
            .validate()
            .map_err(|message| ApiError::InvalidConfig { message })?;

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http: HttpSender::new(client, config.retry.clone()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            powerbi_base_url: config.powerbi_base_url.trim_end_matches('/').to_string(),
            config,
            token: token.into(),
        })
    }

    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let response = self
            .http
            .send(Method::GET, url, |r| self.authorize(r))
            .await?;
        decode_json(response).await
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> ApiResult<reqwest::Response> {
        self.http
            .send(Method::POST, url, |r| self.authorize(r).json(body))
            .await
    }

    /// Follows `continuationUri` until the last page.
    async fn list_all<T: DeserializeOwned>(&self, url: String) -> ApiResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next {
            let page: ListResponse<T> = self.get_json(&url).await?;
            items.extend(page.value);
            next = page.continuation_uri.filter(|u| !u.is_empty());
        }
        Ok(items)
    }
}

#[async_trait]
impl OperationSource for FabricClient {
    async fn operation_state(&self, handle: &OperationHandle) -> ApiResult<OperationState> {
        self.get_json(&handle.location).await
    }

    async fn operation_result(&self, handle: &OperationHandle) -> ApiResult<serde_json::Value> {
        let url = format!("{}/result", handle.location.trim_end_matches('/'));
        self.get_json(&url).await
    }
}

#[async_trait]
impl WorkspacePlatform for FabricClient {
    async fn list_workspaces(&self) -> ApiResult<Vec<WorkspaceRecord>> {
        debug!("Listing workspaces");
        self.list_all(self.url("/workspaces")).await
    }

    async fn create_workspace(
        &self,
        request: &CreateWorkspaceRequest,
    ) -> ApiResult<Accepted<WorkspaceRecord>> {
        info!(workspace = %request.display_name, "Creating Fabric workspace");
        let url = self.url("/workspaces");
        let response = match self.post(&url, request).await {
            Err(err) if err.status() == Some(StatusCode::CONFLICT.as_u16()) => {
                return Err(ApiError::AlreadyExists {
                    resource: format!("workspace '{}'", request.display_name),
                })
            }
            other => other?,
        };
        decode_accepted(response).await
    }

    async fn assign_to_capacity(
        &self,
        workspace_id: &str,
        capacity_id: &str,
    ) -> ApiResult<Accepted<()>> {
        info!(workspace_id, capacity_id, "Assigning workspace to capacity");
        let url = self.url(&format!("/workspaces/{}/assignToCapacity", workspace_id));
        let body = AssignToCapacityRequest {
            capacity_id: capacity_id.to_string(),
        };
        let response = self.post(&url, &body).await?;
        if response.status() == StatusCode::ACCEPTED {
            return Ok(Accepted::Pending(operation_handle(&response)?));
        }
        Ok(Accepted::Completed(()))
    }

    async fn add_workspace_admin(&self, workspace_id: &str, principal: &str) -> ApiResult<()> {
        info!(workspace_id, principal, "Adding workspace admin");
        let url = format!(
            "{}/admin/groups/{}/users",
            self.powerbi_base_url, workspace_id
        );
        self.post(&url, &GroupUserRequest::admin(principal)).await?;
        Ok(())
    }

    async fn list_connections(&self) -> ApiResult<Vec<Connection>> {
        self.list_all(self.url("/connections")).await
    }

    async fn create_connection(&self, request: &CreateConnectionRequest) -> ApiResult<Connection> {
        info!(connection = %request.display_name, "Creating connection");
        let response = self.post(&self.url("/connections"), request).await?;
        decode_json(response).await
    }

    async fn git_connect(&self, workspace_id: &str, request: &GitConnectRequest) -> ApiResult<()> {
        info!(
            workspace_id,
            branch = %request.git_provider_details.branch_name,
            directory = %request.git_provider_details.directory_name,
            "Connecting workspace to git"
        );
        let url = self.url(&format!("/workspaces/{}/git/connect", workspace_id));
        self.post(&url, request).await?;
        Ok(())
    }

    async fn git_initialize(
        &self,
        workspace_id: &str,
    ) -> ApiResult<Accepted<InitializeConnectionResponse>> {
        info!(workspace_id, "Initializing git connection");
        let url = self.url(&format!(
            "/workspaces/{}/git/initializeConnection",
            workspace_id
        ));
        let body = serde_json::json!({ "initializationStrategy": "PreferRemote" });
        let response = self.post(&url, &body).await?;
        decode_accepted(response).await
    }

    async fn git_update_from_git(
        &self,
        workspace_id: &str,
        request: &UpdateFromGitRequest,
    ) -> ApiResult<Accepted<()>> {
        info!(workspace_id, commit = %request.remote_commit_hash, "Updating workspace from git");
        let url = self.url(&format!("/workspaces/{}/git/updateFromGit", workspace_id));
        let response = self.post(&url, request).await?;
        if response.status() == StatusCode::ACCEPTED {
            return Ok(Accepted::Pending(operation_handle(&response)?));
        }
        Ok(Accepted::Completed(()))
    }

    async fn list_items(
        &self,
        workspace_id: &str,
        item_type: Option<ItemType>,
    ) -> ApiResult<Vec<Item>> {
        let mut url = self.url(&format!("/workspaces/{}/items", workspace_id));
        if let Some(item_type) = item_type {
            url.push_str(&format!("?type={}", item_type.as_str()));
        }
        self.list_all(url).await
    }

    async fn list_lakehouse_tables(
        &self,
        workspace_id: &str,
        lakehouse_id: &str,
    ) -> ApiResult<Vec<LakehouseTable>> {
        let url = self.url(&format!(
            "/workspaces/{}/lakehouses/{}/tables",
            workspace_id, lakehouse_id
        ));
        self.list_all(url).await
    }

    async fn run_notebook(
        &self,
        workspace_id: &str,
        notebook_id: &str,
        request: &RunJobRequest,
    ) -> ApiResult<OperationHandle> {
        info!(workspace_id, notebook_id, "Running notebook job");
        let url = self.url(&format!(
            "/workspaces/{}/items/{}/jobs/instances?jobType=RunNotebook",
            workspace_id, notebook_id
        ));
        let response = self.post(&url, request).await?;
        operation_handle(&response)
    }

    async fn create_shortcut(
        &self,
        workspace_id: &str,
        item_id: &str,
        request: &CreateShortcutRequest,
    ) -> ApiResult<Shortcut> {
        debug!(workspace_id, item_id, shortcut = %request.name, "Creating shortcut");
        let url = self.url(&format!(
            "/workspaces/{}/items/{}/shortcuts?shortcutConflictPolicy=CreateOrOverwrite",
            workspace_id, item_id
        ));
        let response = self.post(&url, request).await?;
        decode_json(response).await
    }

    async fn get_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
    ) -> ApiResult<Accepted<ItemDefinitionResponse>> {
        let url = self.url(&format!(
            "/workspaces/{}/items/{}/getDefinition",
            workspace_id, item_id
        ));
        let response = self
            .http
            .send(Method::POST, &url, |r| self.authorize(r))
            .await?;
        decode_accepted(response).await
    }

    async fn update_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
        definition: &ItemDefinitionResponse,
    ) -> ApiResult<Accepted<()>> {
        info!(workspace_id, item_id, "Updating item definition");
        let url = self.url(&format!(
            "/workspaces/{}/items/{}/updateDefinition",
            workspace_id, item_id
        ));
        let response = self.post(&url, definition).await?;
        if response.status() == StatusCode::ACCEPTED {
            return Ok(Accepted::Pending(operation_handle(&response)?));
        }
        Ok(Accepted::Completed(()))
    }
}
