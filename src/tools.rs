//! Tool surface for agent frameworks.
//!
//! Each pipeline operation is described by a name, a natural-language
//! description and a JSON schema of its parameters. [`dispatch`] routes a tool
//! call to the matching [`GitLabProvider`] operation and hands back the
//! uniform result as JSON.

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CiTriageError, Result};
use crate::providers::gitlab::types::{JobId, PipelineId, ProjectId};
use crate::providers::GitLabProvider;

pub const GET_LATEST_PIPELINE_ID: &str = "get_latest_pipeline_id";
pub const GET_PIPELINE_JOB_FAILED: &str = "get_pipeline_job_failed";
pub const GET_LOGS_JOB_FAILED: &str = "get_logs_job_failed";
pub const CREATE_ISSUE: &str = "create_issue";

#[derive(Debug, Deserialize)]
struct LatestPipelineArgs {
    project_id: ProjectId,
}

#[derive(Debug, Deserialize)]
struct FailedJobArgs {
    project_id: ProjectId,
    pipeline_id: PipelineId,
}

#[derive(Debug, Deserialize)]
struct JobLogsArgs {
    project_id: ProjectId,
    job_id: JobId,
}

#[derive(Debug, Deserialize)]
struct CreateIssueArgs {
    project_id: ProjectId,
    issue_title: String,
    issue_content: String,
}

/// A tool invocation as emitted by an agent: the tool name plus its
/// arguments object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    json!({})
}

fn project_id_schema() -> Value {
    json!({
        "type": ["integer", "string"],
        "description": "Numeric project id or full project path (e.g. 'group/project')."
    })
}

/// Tool definitions in the `name` / `description` / `inputSchema` layout.
pub fn definitions() -> Vec<Value> {
    vec![
        json!({
            "name": GET_LATEST_PIPELINE_ID,
            "description": "Retrieves the id of the latest GitLab pipeline of a project.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "project_id": project_id_schema()
                },
                "required": ["project_id"]
            }
        }),
        json!({
            "name": GET_PIPELINE_JOB_FAILED,
            "description": "Retrieves the job which failed (and was not allowed to fail) in a pipeline, based on a project id and a pipeline id.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "project_id": project_id_schema(),
                    "pipeline_id": { "type": ["integer", "string"] }
                },
                "required": ["project_id", "pipeline_id"]
            }
        }),
        json!({
            "name": GET_LOGS_JOB_FAILED,
            "description": "Retrieves the logs of a failed job based on a project id and a job id.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "project_id": project_id_schema(),
                    "job_id": { "type": ["integer", "string"] }
                },
                "required": ["project_id", "job_id"]
            }
        }),
        json!({
            "name": CREATE_ISSUE,
            "description": "Creates an issue after identifying the problem in a pipeline job. The issue has a title and a description written in Markdown ONLY, which must propose a solution to fix the problem.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "project_id": project_id_schema(),
                    "issue_title": { "type": "string" },
                    "issue_content": {
                        "type": "string",
                        "description": "Markdown description of the problem and the proposed fix."
                    }
                },
                "required": ["project_id", "issue_title", "issue_content"]
            }
        }),
    ]
}

fn parse_args<T>(tool: &str, arguments: Value) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_value(arguments).map_err(|source| CiTriageError::InvalidArguments {
        tool: tool.to_string(),
        source,
    })
}

/// Runs the tool `name` with `arguments` and returns its result as JSON.
///
/// # Errors
///
/// Unknown tool names and arguments that do not match the tool's schema are
/// errors, as is anything the underlying operation returns as `Err`.
pub async fn dispatch(provider: &GitLabProvider, name: &str, arguments: Value) -> Result<Value> {
    debug!("Dispatching tool call {name} with {arguments}");

    let result = match name {
        GET_LATEST_PIPELINE_ID => {
            let args: LatestPipelineArgs = parse_args(name, arguments)?;
            serde_json::to_value(provider.get_latest_pipeline_id(&args.project_id).await?)?
        }
        GET_PIPELINE_JOB_FAILED => {
            let args: FailedJobArgs = parse_args(name, arguments)?;
            serde_json::to_value(
                provider
                    .get_pipeline_job_failed(&args.project_id, args.pipeline_id)
                    .await?,
            )?
        }
        GET_LOGS_JOB_FAILED => {
            let args: JobLogsArgs = parse_args(name, arguments)?;
            serde_json::to_value(
                provider
                    .get_logs_job_failed(&args.project_id, args.job_id)
                    .await?,
            )?
        }
        CREATE_ISSUE => {
            let args: CreateIssueArgs = parse_args(name, arguments)?;
            serde_json::to_value(
                provider
                    .create_issue(&args.project_id, &args.issue_title, &args.issue_content)
                    .await?,
            )?
        }
        other => return Err(CiTriageError::UnknownTool(other.to_string())),
    };

    Ok(result)
}

/// [`dispatch`] for an already decoded [`ToolCall`].
pub async fn dispatch_call(provider: &GitLabProvider, call: ToolCall) -> Result<Value> {
    dispatch(provider, &call.name, call.arguments).await
}
