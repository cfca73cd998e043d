#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use platform::prelude::*;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// One recorded call: operation name plus the payload that mattered.
#[derive(Debug, Clone)]
pub struct Call {
    pub op: &'static str,
    pub payload: Value,
}

/// Call log shared by several fakes, so ordering across both APIs can be
/// asserted as one sequence.
pub type Journal = Arc<Mutex<Vec<Call>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn journal_ops(journal: &Journal) -> Vec<&'static str> {
    journal.lock().unwrap().iter().map(|c| c.op).collect()
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    workspaces: Vec<WorkspaceRecord>,
    connections: Vec<Connection>,
    items: HashMap<String, Vec<Item>>,
    tables: HashMap<String, Vec<LakehouseTable>>,
    definitions: HashMap<String, ItemDefinitionResponse>,
    scripts: HashMap<String, VecDeque<OperationState>>,
    results: HashMap<String, Value>,
    polls: u32,
    next_id: u32,
}

/// In-memory workspace platform. Direct failures and asynchronous (202)
/// replies are opted into per operation name.
pub struct FakePlatform {
    state: Mutex<State>,
    asynchronous: HashSet<&'static str>,
    failures: HashMap<&'static str, u16>,
    failed_operations: HashMap<&'static str, Value>,
    required_action: RequiredAction,
    journal: Option<Journal>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            asynchronous: HashSet::new(),
            failures: HashMap::new(),
            failed_operations: HashMap::new(),
            required_action: RequiredAction::UpdateFromGit,
            journal: None,
        }
    }

    /// Also records every call into `journal`.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_workspace(self, id: &str, name: &str, capacity_id: Option<&str>) -> Self {
        self.state.lock().unwrap().workspaces.push(WorkspaceRecord {
            id: id.to_string(),
            display_name: name.to_string(),
            capacity_id: capacity_id.map(str::to_string),
        });
        self
    }

    pub fn with_connection(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().connections.push(Connection {
            id: id.to_string(),
            display_name: Some(name.to_string()),
            connectivity_type: Some("ShareableCloud".to_string()),
        });
        self
    }

    pub fn with_item(self, workspace_id: &str, id: &str, name: &str, item_type: ItemType) -> Self {
        self.state
            .lock()
            .unwrap()
            .items
            .entry(workspace_id.to_string())
            .or_default()
            .push(Item {
                id: id.to_string(),
                display_name: name.to_string(),
                item_type,
            });
        self
    }

    pub fn with_tables(self, lakehouse_id: &str, names: &[&str]) -> Self {
        self.state.lock().unwrap().tables.insert(
            lakehouse_id.to_string(),
            names
                .iter()
                .map(|name| LakehouseTable {
                    name: name.to_string(),
                    location: None,
                })
                .collect(),
        );
        self
    }

    pub fn with_pipeline_content(self, item_id: &str, content: Value) -> Self {
        let definition = ItemDefinitionResponse {
            definition: ItemDefinition {
                format: None,
                parts: vec![
                    DefinitionPart {
                        path: "pipeline-content.json".to_string(),
                        payload: STANDARD.encode(content.to_string()),
                        payload_type: "InlineBase64".to_string(),
                    },
                    DefinitionPart {
                        path: ".platform".to_string(),
                        payload: STANDARD.encode("{}"),
                        payload_type: "InlineBase64".to_string(),
                    },
                ],
            },
        };
        self.state
            .lock()
            .unwrap()
            .definitions
            .insert(item_id.to_string(), definition);
        self
    }

    /// The operation answers 202 and is finished through polling.
    pub fn asynchronous(mut self, op: &'static str) -> Self {
        self.asynchronous.insert(op);
        self
    }

    /// The call itself is rejected with `status`.
    pub fn failing(mut self, op: &'static str, status: u16) -> Self {
        self.failures.insert(op, status);
        self
    }

    /// The call is accepted but its long running operation ends as Failed.
    pub fn failing_operation(mut self, op: &'static str, error: Value) -> Self {
        self.asynchronous.insert(op);
        self.failed_operations.insert(op, error);
        self
    }

    pub fn with_required_action(mut self, action: RequiredAction) -> Self {
        self.required_action = action;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.iter().map(|c| c.op).collect()
    }

    pub fn payloads(&self, op: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.payload.clone())
            .collect()
    }

    pub fn polls(&self) -> u32 {
        self.state.lock().unwrap().polls
    }

    pub fn definition(&self, item_id: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        let part = state.definitions.get(item_id)?.definition.part("pipeline-content.json")?;
        let bytes = STANDARD.decode(&part.payload).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn record(&self, op: &'static str, payload: Value) -> ApiResult<()> {
        let call = Call { op, payload };
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(call.clone());
        }
        self.state.lock().unwrap().calls.push(call);
        match self.failures.get(op) {
            Some(status) => Err(ApiError::Status {
                method: "FAKE".to_string(),
                url: format!("fake://{}", op),
                status: *status,
                body: format!("{{\"errorCode\":\"{}Failed\"}}", op),
            }),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }

    /// Registers a scripted operation for `op` and returns its handle.
    fn pending(&self, op: &'static str, location: String, result: Value) -> OperationHandle {
        let terminal = match self.failed_operations.get(op) {
            Some(error) => OperationState::new(OperationStatus::Failed).with_error(error.clone()),
            None => OperationState::new(OperationStatus::Succeeded),
        };
        let mut state = self.state.lock().unwrap();
        state.scripts.insert(
            location.clone(),
            VecDeque::from(vec![OperationState::new(OperationStatus::Running), terminal]),
        );
        state.results.insert(location.clone(), result);
        OperationHandle::new(location)
    }

    fn reply<T>(&self, op: &'static str, value: T, result: Value) -> Accepted<T> {
        if self.asynchronous.contains(op) {
            let location = format!("https://fake.fabric/v1/operations/{}", self.next_id(op));
            Accepted::Pending(self.pending(op, location, result))
        } else {
            Accepted::Completed(value)
        }
    }
}

#[async_trait]
impl OperationSource for FakePlatform {
    async fn operation_state(&self, handle: &OperationHandle) -> ApiResult<OperationState> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        let script = state
            .scripts
            .get_mut(&handle.location)
            .ok_or_else(|| ApiError::NotFound {
                resource: handle.location.clone(),
            })?;
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        next.ok_or_else(|| ApiError::UnexpectedResponse {
            message: "empty script".to_string(),
        })
    }

    async fn operation_result(&self, handle: &OperationHandle) -> ApiResult<Value> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .results
            .get(&handle.location)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[async_trait]
impl WorkspacePlatform for FakePlatform {
    async fn list_workspaces(&self) -> ApiResult<Vec<WorkspaceRecord>> {
        self.record("list_workspaces", Value::Null)?;
        Ok(self.state.lock().unwrap().workspaces.clone())
    }

    async fn create_workspace(
        &self,
        request: &CreateWorkspaceRequest,
    ) -> ApiResult<Accepted<WorkspaceRecord>> {
        self.record("create_workspace", serde_json::to_value(request)?)?;
        let record = WorkspaceRecord {
            id: self.next_id("ws"),
            display_name: request.display_name.clone(),
            capacity_id: request.capacity_id.clone(),
        };
        self.state.lock().unwrap().workspaces.push(record.clone());
        let result = serde_json::to_value(&record)?;
        Ok(self.reply("create_workspace", record, result))
    }

    async fn assign_to_capacity(
        &self,
        workspace_id: &str,
        capacity_id: &str,
    ) -> ApiResult<Accepted<()>> {
        self.record(
            "assign_to_capacity",
            json!({"workspaceId": workspace_id, "capacityId": capacity_id}),
        )?;
        Ok(self.reply("assign_to_capacity", (), Value::Null))
    }

    async fn add_workspace_admin(&self, workspace_id: &str, principal: &str) -> ApiResult<()> {
        self.record(
            "add_workspace_admin",
            json!({"workspaceId": workspace_id, "emailAddress": principal}),
        )
    }

    async fn list_connections(&self) -> ApiResult<Vec<Connection>> {
        self.record("list_connections", Value::Null)?;
        Ok(self.state.lock().unwrap().connections.clone())
    }

    async fn create_connection(&self, request: &CreateConnectionRequest) -> ApiResult<Connection> {
        self.record("create_connection", serde_json::to_value(request)?)?;
        let connection = Connection {
            id: self.next_id("conn"),
            display_name: Some(request.display_name.clone()),
            connectivity_type: Some(request.connectivity_type.clone()),
        };
        self.state
            .lock()
            .unwrap()
            .connections
            .push(connection.clone());
        Ok(connection)
    }

    async fn git_connect(&self, workspace_id: &str, request: &GitConnectRequest) -> ApiResult<()> {
        let mut payload = serde_json::to_value(request)?;
        payload["workspaceId"] = json!(workspace_id);
        self.record("git_connect", payload)
    }

    async fn git_initialize(
        &self,
        workspace_id: &str,
    ) -> ApiResult<Accepted<InitializeConnectionResponse>> {
        self.record("git_initialize", json!({"workspaceId": workspace_id}))?;
        let response = InitializeConnectionResponse {
            required_action: Some(self.required_action),
            workspace_head: None,
            remote_commit_hash: Some("abc123".to_string()),
        };
        let result = serde_json::to_value(&response)?;
        Ok(self.reply("git_initialize", response, result))
    }

    async fn git_update_from_git(
        &self,
        workspace_id: &str,
        request: &UpdateFromGitRequest,
    ) -> ApiResult<Accepted<()>> {
        let mut payload = serde_json::to_value(request)?;
        payload["workspaceId"] = json!(workspace_id);
        self.record("git_update_from_git", payload)?;
        Ok(self.reply("git_update_from_git", (), Value::Null))
    }

    async fn list_items(
        &self,
        workspace_id: &str,
        item_type: Option<ItemType>,
    ) -> ApiResult<Vec<Item>> {
        self.record(
            "list_items",
            json!({"workspaceId": workspace_id, "type": item_type.map(|t| t.as_str())}),
        )?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .items
            .get(workspace_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item_type.map_or(true, |t| item.item_type == t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_lakehouse_tables(
        &self,
        workspace_id: &str,
        lakehouse_id: &str,
    ) -> ApiResult<Vec<LakehouseTable>> {
        self.record(
            "list_lakehouse_tables",
            json!({"workspaceId": workspace_id, "lakehouseId": lakehouse_id}),
        )?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .tables
            .get(lakehouse_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn run_notebook(
        &self,
        workspace_id: &str,
        notebook_id: &str,
        request: &RunJobRequest,
    ) -> ApiResult<OperationHandle> {
        let mut payload = serde_json::to_value(request)?;
        payload["workspaceId"] = json!(workspace_id);
        payload["notebookId"] = json!(notebook_id);
        self.record("run_notebook", payload)?;
        let location = format!(
            "https://fake.fabric/v1/workspaces/{}/items/{}/jobs/instances/{}",
            workspace_id,
            notebook_id,
            self.next_id("job")
        );
        Ok(self.pending("run_notebook", location, Value::Null))
    }

    async fn create_shortcut(
        &self,
        workspace_id: &str,
        item_id: &str,
        request: &CreateShortcutRequest,
    ) -> ApiResult<Shortcut> {
        let mut payload = serde_json::to_value(request)?;
        payload["workspaceId"] = json!(workspace_id);
        payload["itemId"] = json!(item_id);
        self.record("create_shortcut", payload)?;
        Ok(Shortcut {
            path: request.path.clone(),
            name: request.name.clone(),
        })
    }

    async fn get_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
    ) -> ApiResult<Accepted<ItemDefinitionResponse>> {
        self.record(
            "get_item_definition",
            json!({"workspaceId": workspace_id, "itemId": item_id}),
        )?;
        let definition = self
            .state
            .lock()
            .unwrap()
            .definitions
            .get(item_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("definition of {}", item_id),
            })?;
        let result = serde_json::to_value(&definition)?;
        Ok(self.reply("get_item_definition", definition, result))
    }

    async fn update_item_definition(
        &self,
        workspace_id: &str,
        item_id: &str,
        definition: &ItemDefinitionResponse,
    ) -> ApiResult<Accepted<()>> {
        self.record(
            "update_item_definition",
            json!({"workspaceId": workspace_id, "itemId": item_id}),
        )?;
        self.state
            .lock()
            .unwrap()
            .definitions
            .insert(item_id.to_string(), definition.clone());
        Ok(self.reply("update_item_definition", (), Value::Null))
    }
}

/// In-memory git host keyed by branch name.
pub struct FakeGit {
    branches: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<Call>>,
    create_failure: Option<u16>,
    journal: Option<Journal>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self {
            branches: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            create_failure: None,
            journal: None,
        }
    }

    /// Also records every call into `journal`.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    fn record(&self, op: &'static str, payload: Value) {
        let call = Call { op, payload };
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(call.clone());
        }
        self.calls.lock().unwrap().push(call);
    }

    pub fn with_branch(self, name: &str, sha: &str) -> Self {
        self.branches
            .lock()
            .unwrap()
            .insert(name.to_string(), sha.to_string());
        self
    }

    pub fn failing_create(mut self, status: u16) -> Self {
        self.create_failure = Some(status);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|c| c.op).collect()
    }

    pub fn payloads(&self, op: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.payload.clone())
            .collect()
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.branches.lock().unwrap().contains_key(name)
    }
}

#[async_trait]
impl GitHosting for FakeGit {
    async fn get_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> ApiResult<Option<BranchRef>> {
        self.record(
            "get_branch",
            json!({"owner": owner, "repo": repo, "branch": branch}),
        );
        Ok(self
            .branches
            .lock()
            .unwrap()
            .get(branch)
            .map(|sha| BranchRef {
                name: branch.to_string(),
                sha: sha.clone(),
            }))
    }

    async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> ApiResult<BranchRef> {
        self.record(
            "create_branch",
            json!({"owner": owner, "repo": repo, "branch": branch, "sha": sha}),
        );
        if let Some(status) = self.create_failure {
            return Err(ApiError::Status {
                method: "POST".to_string(),
                url: format!("fake://repos/{}/{}/git/refs", owner, repo),
                status,
                body: "{\"message\":\"Reference already exists\"}".to_string(),
            });
        }
        self.branches
            .lock()
            .unwrap()
            .insert(branch.to_string(), sha.to_string());
        Ok(BranchRef {
            name: branch.to_string(),
            sha: sha.to_string(),
        })
    }

    fn host_name(&self) -> &'static str {
        "fake"
    }
}

/// Poller that never sleeps.
pub fn poller() -> LroPoller {
    LroPoller::new(PollPolicy::immediate(10))
}
