//! Follow-up tasks run after a feature workspace has been synced: copying
//! lakehouse and warehouse data through a utility notebook, creating table
//! shortcuts back to the source lakehouses, and pointing data pipelines at
//! different connections.

use crate::connections::ConnectionPair;
use crate::error::{BranchOutError, BranchOutResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use platform::{
    ApiError, ApiResult, CreateShortcutRequest, Item, ItemDefinitionResponse, ItemType, LroPoller,
    RunJobRequest, WorkspacePlatform,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Definition part of a data pipeline that holds its activities.
pub const PIPELINE_CONTENT_PART: &str = "pipeline-content.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostActivityTask {
    CopyLakehouse,
    CopyWarehouse,
    CreateShortcuts,
    RewireConnections,
}

impl PostActivityTask {
    /// Execution order.
    pub const ALL: [PostActivityTask; 4] = [
        PostActivityTask::CopyLakehouse,
        PostActivityTask::CopyWarehouse,
        PostActivityTask::CreateShortcuts,
        PostActivityTask::RewireConnections,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostActivityTask::CopyLakehouse => "copy-lakehouse",
            PostActivityTask::CopyWarehouse => "copy-warehouse",
            PostActivityTask::CreateShortcuts => "create-shortcuts",
            PostActivityTask::RewireConnections => "rewire-connections",
        }
    }

    /// Value of the notebook's `copy_type` parameter.
    pub fn copy_type(&self) -> Option<&'static str> {
        match self {
            PostActivityTask::CopyLakehouse => Some("lakehouse"),
            PostActivityTask::CopyWarehouse => Some("warehouse"),
            _ => None,
        }
    }
}

impl fmt::Display for PostActivityTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The utility notebook that performs data copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookRef {
    pub workspace_id: String,
    pub notebook_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostActivityConfig {
    /// Name or id.
    pub source_workspace: String,
    /// Name or id.
    pub target_workspace: String,
    pub notebook: Option<NotebookRef>,
    pub copy_lakehouse: bool,
    pub copy_warehouse: bool,
    pub create_shortcuts: bool,
    pub connections: Vec<ConnectionPair>,
    pub fail_fast: bool,
}

impl PostActivityConfig {
    pub fn is_enabled(&self, task: PostActivityTask) -> bool {
        match task {
            PostActivityTask::CopyLakehouse => self.copy_lakehouse,
            PostActivityTask::CopyWarehouse => self.copy_warehouse,
            PostActivityTask::CreateShortcuts => self.create_shortcuts,
            PostActivityTask::RewireConnections => !self.connections.is_empty(),
        }
    }

    pub fn enabled_tasks(&self) -> Vec<PostActivityTask> {
        PostActivityTask::ALL
            .into_iter()
            .filter(|task| self.is_enabled(*task))
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.source_workspace.trim().is_empty() {
            return Err("SOURCE_WORKSPACE must not be empty".to_string());
        }
        if self.target_workspace.trim().is_empty() {
            return Err("TARGET_WORKSPACE must not be empty".to_string());
        }
        if self.copy_lakehouse || self.copy_warehouse {
            match &self.notebook {
                Some(nb) if !nb.workspace_id.trim().is_empty() && !nb.notebook_id.trim().is_empty() => {}
                _ => {
                    return Err(
                        "NOTEBOOK_WORKSPACE_ID and NOTEBOOK_ID are required to copy data"
                            .to_string(),
                    )
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Succeeded(String),
    Failed(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub task: PostActivityTask,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostActivityReport {
    pub source_workspace_id: String,
    pub target_workspace_id: String,
    pub tasks: Vec<TaskReport>,
}

impl PostActivityReport {
    pub fn failed(&self) -> Vec<PostActivityTask> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Failed(_)))
            .map(|t| t.task)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed().is_empty()
    }

    pub fn status(&self, task: PostActivityTask) -> Option<&TaskStatus> {
        self.tasks.iter().find(|t| t.task == task).map(|t| &t.status)
    }

    pub fn into_result(self) -> BranchOutResult<Self> {
        let failed = self.failed();
        if failed.is_empty() {
            Ok(self)
        } else {
            Err(BranchOutError::PostActivity {
                failed: failed.iter().map(|t| t.to_string()).collect(),
            })
        }
    }
}

/// GUID-shaped input is taken as an id without a lookup.
pub fn is_guid(value: &str) -> bool {
    uuid::Uuid::parse_str(value.trim()).is_ok()
}

/// Canonical form of a connection id: GUIDs in any accepted spelling
/// (upper case, braced, `urn:uuid:`) become lower-case hyphenated, anything
/// else is kept as is.
pub fn normalize_connection_id(value: &str) -> String {
    let value = value.trim();
    match uuid::Uuid::parse_str(value) {
        Ok(id) => id.hyphenated().to_string(),
        Err(_) => value.to_string(),
    }
}

/// Replaces every JSON string whose normalized form is a key of
/// `replacements` with its value, recording the matched keys in `used`.
/// Returns how many strings were replaced.
pub fn replace_connection_refs(
    value: &mut Value,
    replacements: &HashMap<String, String>,
    used: &mut HashSet<String>,
) -> usize {
    match value {
        Value::String(s) => {
            let key = normalize_connection_id(s);
            match replacements.get(&key) {
                Some(to) => {
                    *s = to.clone();
                    used.insert(key);
                    1
                }
                None => 0,
            }
        }
        Value::Array(values) => values
            .iter_mut()
            .map(|v| replace_connection_refs(v, replacements, used))
            .sum(),
        Value::Object(map) => map
            .values_mut()
            .map(|v| replace_connection_refs(v, replacements, used))
            .sum(),
        _ => 0,
    }
}

pub struct PostActivityRunner<'a> {
    platform: &'a dyn WorkspacePlatform,
    poller: LroPoller,
}

impl<'a> PostActivityRunner<'a> {
    pub fn new(platform: &'a dyn WorkspacePlatform, poller: LroPoller) -> Self {
        Self { platform, poller }
    }

    /// Runs every enabled task in order. Task failures are recorded in the
    /// report unless `fail_fast` is set, in which case the first one is
    /// returned as the error.
    pub async fn run(&self, config: &PostActivityConfig) -> BranchOutResult<PostActivityReport> {
        config.validate().map_err(BranchOutError::config)?;

        let source = self.resolve_workspace(&config.source_workspace).await?;
        let target = self.resolve_workspace(&config.target_workspace).await?;
        info!(
            source_workspace_id = %source,
            target_workspace_id = %target,
            tasks = ?config.enabled_tasks(),
            "Starting post-activity tasks"
        );

        let mut tasks = Vec::with_capacity(PostActivityTask::ALL.len());
        for task in PostActivityTask::ALL {
            if !config.is_enabled(task) {
                debug!(%task, "Task not requested");
                tasks.push(TaskReport {
                    task,
                    status: TaskStatus::Skipped,
                });
                continue;
            }

            info!(%task, "Running task");
            let status = match self.run_task(task, config, &source, &target).await {
                Ok(summary) => {
                    info!(%task, %summary, "Task succeeded");
                    TaskStatus::Succeeded(summary)
                }
                Err(err) if config.fail_fast => return Err(err),
                Err(err) => {
                    let chain = err.chain();
                    error!(%task, step = err.step(), cause = ?chain, "Task failed, continuing");
                    TaskStatus::Failed(chain.join(": "))
                }
            };
            tasks.push(TaskReport { task, status });
        }

        Ok(PostActivityReport {
            source_workspace_id: source,
            target_workspace_id: target,
            tasks,
        })
    }

    async fn run_task(
        &self,
        task: PostActivityTask,
        config: &PostActivityConfig,
        source: &str,
        target: &str,
    ) -> BranchOutResult<String> {
        match task {
            PostActivityTask::CopyLakehouse | PostActivityTask::CopyWarehouse => {
                let notebook = config.notebook.as_ref().ok_or_else(|| {
                    BranchOutError::config("a notebook is required to copy data")
                })?;
                self.copy(task, notebook, source, target).await
            }
            PostActivityTask::CreateShortcuts => self.create_shortcuts(source, target).await,
            PostActivityTask::RewireConnections => {
                self.rewire_connections(target, &config.connections).await
            }
        }
    }

    pub async fn resolve_workspace(&self, name_or_id: &str) -> BranchOutResult<String> {
        let name_or_id = name_or_id.trim();
        if is_guid(name_or_id) {
            return Ok(name_or_id.to_string());
        }
        self.platform
            .list_workspaces()
            .await?
            .into_iter()
            .find(|ws| ws.display_name == name_or_id)
            .map(|ws| {
                debug!(name = name_or_id, workspace_id = %ws.id, "Resolved workspace");
                ws.id
            })
            .ok_or_else(|| BranchOutError::WorkspaceNotFound {
                name: name_or_id.to_string(),
            })
    }

    async fn copy(
        &self,
        task: PostActivityTask,
        notebook: &NotebookRef,
        source: &str,
        target: &str,
    ) -> BranchOutResult<String> {
        let copy_type = task.copy_type().unwrap_or_default();
        let wrap = |err: ApiError| BranchOutError::DataCopy {
            copy_type: copy_type.to_string(),
            target_workspace_id: target.to_string(),
            source: err,
        };

        let request = RunJobRequest::new()
            .with_parameter("source_workspace", source)
            .with_parameter("target_workspace", target)
            .with_parameter("copy_type", copy_type);
        let handle = self
            .platform
            .run_notebook(&notebook.workspace_id, &notebook.notebook_id, &request)
            .await
            .map_err(wrap)?;
        self.poller
            .wait(self.platform, &handle)
            .await
            .map_err(wrap)?;

        Ok(format!("{} copy finished ({})", copy_type, handle))
    }

    async fn create_shortcuts(&self, source: &str, target: &str) -> BranchOutResult<String> {
        let source_lakehouses = self.list_lakehouses(source).await?;
        let target_lakehouses = self.list_lakehouses(target).await?;

        let mut lakehouses = 0;
        let mut shortcuts = 0;
        for target_lh in &target_lakehouses {
            let Some(source_lh) = source_lakehouses
                .iter()
                .find(|lh| lh.display_name == target_lh.display_name)
            else {
                debug!(lakehouse = %target_lh.display_name, "No source lakehouse with this name");
                continue;
            };

            let wrap = |err: ApiError| BranchOutError::ShortcutCreation {
                lakehouse: target_lh.display_name.clone(),
                source: err,
            };
            let tables = self
                .platform
                .list_lakehouse_tables(source, &source_lh.id)
                .await
                .map_err(wrap)?;
            for table in &tables {
                let request = CreateShortcutRequest::table(&table.name, source, &source_lh.id);
                let shortcut = self
                    .platform
                    .create_shortcut(target, &target_lh.id, &request)
                    .await
                    .map_err(wrap)?;
                debug!(lakehouse = %target_lh.display_name, path = %shortcut.path, name = %shortcut.name, "Created shortcut");
            }
            info!(lakehouse = %target_lh.display_name, tables = tables.len(), "Shortcuts created");
            lakehouses += 1;
            shortcuts += tables.len();
        }

        if lakehouses == 0 {
            warn!(source_workspace_id = source, target_workspace_id = target, "No lakehouse exists in both workspaces");
        }
        Ok(format!(
            "{} shortcut(s) across {} lakehouse(s)",
            shortcuts, lakehouses
        ))
    }

    async fn list_lakehouses(&self, workspace_id: &str) -> BranchOutResult<Vec<Item>> {
        self.platform
            .list_items(workspace_id, Some(ItemType::Lakehouse))
            .await
            .map_err(|err| BranchOutError::ShortcutDiscovery {
                workspace_id: workspace_id.to_string(),
                source: err,
            })
    }

    async fn rewire_connections(
        &self,
        target: &str,
        pairs: &[ConnectionPair],
    ) -> BranchOutResult<String> {
        if pairs.is_empty() {
            return Ok("no connections to rewire".to_string());
        }
        let replacements = self.resolve_connection_pairs(pairs).await?;

        let pipelines = self
            .platform
            .list_items(target, Some(ItemType::DataPipeline))
            .await
            .map_err(|err| BranchOutError::RewireDiscovery {
                listing: format!("pipelines of workspace {}", target),
                source: err,
            })?;
        let mut rewired = 0;
        let mut used = HashSet::new();
        for pipeline in &pipelines {
            let replaced = self
                .rewire_pipeline(target, &pipeline.id, &replacements, &mut used)
                .await
                .map_err(|source| BranchOutError::ConnectionRewire {
                    pipeline: pipeline.display_name.clone(),
                    source,
                })?;
            if replaced > 0 {
                info!(pipeline = %pipeline.display_name, references = replaced, "Rewired pipeline");
                rewired += 1;
            }
        }

        let mut unused: Vec<&String> = replacements
            .keys()
            .filter(|from| !used.contains(*from))
            .collect();
        unused.sort();
        for from in unused {
            warn!(connection_id = %from, "No pipeline references this connection");
        }

        Ok(format!(
            "{} of {} pipeline(s) rewired",
            rewired,
            pipelines.len()
        ))
    }

    async fn resolve_connection_pairs(
        &self,
        pairs: &[ConnectionPair],
    ) -> BranchOutResult<HashMap<String, String>> {
        let needs_lookup = pairs.iter().any(|p| !is_guid(&p.from) || !is_guid(&p.to));
        let connections = if needs_lookup {
            self.platform
                .list_connections()
                .await
                .map_err(|err| BranchOutError::RewireDiscovery {
                    listing: "connections".to_string(),
                    source: err,
                })?
        } else {
            Vec::new()
        };

        let resolve = |name: &str| -> BranchOutResult<String> {
            if is_guid(name) {
                return Ok(normalize_connection_id(name));
            }
            connections
                .iter()
                .find(|c| c.display_name.as_deref() == Some(name))
                .map(|c| normalize_connection_id(&c.id))
                .ok_or_else(|| BranchOutError::ConnectionNotFound {
                    name: name.to_string(),
                })
        };

        let mut replacements = HashMap::new();
        for pair in pairs {
            let from = resolve(&pair.from)?;
            let to = resolve(&pair.to)?;
            debug!(%pair, %from, %to, "Resolved connection pair");
            replacements.insert(from, to);
        }
        Ok(replacements)
    }

    async fn rewire_pipeline(
        &self,
        workspace_id: &str,
        pipeline_id: &str,
        replacements: &HashMap<String, String>,
        used: &mut HashSet<String>,
    ) -> ApiResult<usize> {
        let accepted = self
            .platform
            .get_item_definition(workspace_id, pipeline_id)
            .await?;
        let mut response: ItemDefinitionResponse =
            self.poller.settle(self.platform, accepted).await?;

        let Some(part) = response.definition.part_mut(PIPELINE_CONTENT_PART) else {
            debug!(pipeline_id, "Pipeline definition has no content part");
            return Ok(0);
        };
        let decoded = STANDARD
            .decode(part.payload.as_bytes())
            .map_err(|e| ApiError::UnexpectedResponse {
                message: format!("{} is not valid base64: {}", PIPELINE_CONTENT_PART, e),
            })?;
        let mut content: Value = serde_json::from_slice(&decoded)?;

        let replaced = replace_connection_refs(&mut content, replacements, used);
        if replaced == 0 {
            return Ok(0);
        }
        part.payload = STANDARD.encode(serde_json::to_vec(&content)?);

        let accepted = self
            .platform
            .update_item_definition(workspace_id, pipeline_id, &response)
            .await?;
        self.poller.complete(self.platform, accepted).await?;
        Ok(replaced)
    }
}
