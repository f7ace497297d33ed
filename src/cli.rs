use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::auth::Token;
use crate::config::Config;
use crate::outcome::ToolResult;
use crate::output;
use crate::providers::gitlab::types::{JobId, PipelineId, ProjectId};
use crate::providers::GitLabProvider;
use crate::tools::{self, ToolCall};

#[derive(Parser)]
#[command(name = "ci-triage")]
#[command(author, version, about = "Find failed GitLab CI jobs and file fix issues", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./ci-triage.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// GitLab access token
    #[arg(short, long, global = true, env = "GITLAB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GitLab REST API root, e.g. https://gitlab.com/api/v4
    #[arg(short, long, global = true, env = "GITLAB_API_URL")]
    url: Option<String>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Id of the most recent pipeline
    LatestPipeline {
        #[arg(short = 'P', long)]
        project: ProjectId,
    },
    /// First failed job of a pipeline that was not allowed to fail
    FailedJob {
        #[arg(short = 'P', long)]
        project: ProjectId,

        #[arg(long)]
        pipeline: PipelineId,
    },
    /// Raw trace of a job
    JobLogs {
        #[arg(short = 'P', long)]
        project: ProjectId,

        #[arg(long)]
        job: JobId,
    },
    /// File an issue describing a failure and its fix
    CreateIssue {
        #[arg(short = 'P', long)]
        project: ProjectId,

        #[arg(long)]
        title: String,

        /// Markdown description
        #[arg(long, conflicts_with = "content_file", required_unless_present = "content_file")]
        content: Option<String>,

        /// Read the Markdown description from a file
        #[arg(long)]
        content_file: Option<PathBuf>,
    },
    /// Print the tool definitions offered to agents
    Tools,
    /// Invoke a tool with JSON arguments. Without a name, stdin must hold a
    /// `{"name": ..., "arguments": {...}}` tool call.
    Call {
        name: Option<String>,

        #[arg(long)]
        args: Option<String>,
    },
    /// Latest pipeline, its failed job and that job's logs in one go
    Inspect {
        #[arg(short = 'P', long)]
        project: ProjectId,
    },
}

impl Cli {
    fn provider(&self) -> Result<GitLabProvider> {
        let config = Config::load(self.config.as_deref())?
            .with_overrides(self.token.clone(), self.url.clone());

        let Some(token) = config.gitlab.token else {
            bail!("A GitLab access token is required: pass --token, set GITLAB_TOKEN or add it to the config file");
        };

        info!("Using GitLab API at {}", config.gitlab.base_url);

        let provider = GitLabProvider::new(&config.gitlab.base_url, Token::from(token))?
            .with_issue_labels(config.gitlab.labels);

        Ok(provider)
    }

    fn emit(&self, value: &Value) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            info!("Result written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        let value = match &self.command {
            Commands::Tools => {
                let value = Value::Array(tools::definitions());
                output::print_status(&value);
                value
            }
            Commands::LatestPipeline { project } => {
                report(self.provider()?.get_latest_pipeline_id(project).await?)?
            }
            Commands::FailedJob { project, pipeline } => report(
                self.provider()?
                    .get_pipeline_job_failed(project, *pipeline)
                    .await?,
            )?,
            Commands::JobLogs { project, job } => {
                report(self.provider()?.get_logs_job_failed(project, *job).await?)?
            }
            Commands::CreateIssue {
                project,
                title,
                content,
                content_file,
            } => {
                let content = issue_content(content.as_deref(), content_file.as_deref())?;
                report(
                    self.provider()?
                        .create_issue(project, title, &content)
                        .await?,
                )?
            }
            Commands::Call { name, args } => {
                let arguments = call_arguments(args.as_deref())?;
                let provider = self.provider()?;
                let value = match name {
                    Some(name) => tools::dispatch(&provider, name, arguments).await?,
                    None => {
                        let call: ToolCall = serde_json::from_value(arguments)
                            .context("Expected a tool call with a 'name' field")?;
                        tools::dispatch_call(&provider, call).await?
                    }
                };
                output::print_status(&value);
                value
            }
            Commands::Inspect { project } => {
                let value = inspect(&self.provider()?, project).await?;
                output::print_status(&value);
                value
            }
        };

        self.emit(&value)
    }
}

/// Prints the status line of a typed result and converts it for output.
fn report<T: Serialize>(result: ToolResult<T>) -> Result<Value> {
    output::print_result(&result);
    Ok(serde_json::to_value(result)?)
}

fn issue_content(content: Option<&str>, content_file: Option<&Path>) -> Result<String> {
    match (content, content_file) {
        (Some(content), _) => Ok(content.to_owned()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read issue content: {}", path.display())),
        (None, None) => bail!("Issue content is required"),
    }
}

fn call_arguments(args: Option<&str>) -> Result<Value> {
    let raw = match args {
        Some(args) => args.to_owned(),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read tool arguments from stdin")?;
            buffer
        }
    };

    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    serde_json::from_str(&raw).context("Tool arguments must be a JSON object")
}

/// Runs the read-only operations in the order an agent would, stopping at
/// the first step that comes back as an error result.
async fn inspect(provider: &GitLabProvider, project: &ProjectId) -> Result<Value> {
    let mut report = Map::new();

    let pipeline = provider.get_latest_pipeline_id(project).await?;
    report.insert("pipeline".into(), serde_json::to_value(&pipeline)?);
    let Some(pipeline_id) = pipeline.payload().map(|p| p.id) else {
        return Ok(Value::Object(report));
    };

    let job = provider.get_pipeline_job_failed(project, pipeline_id).await?;
    report.insert("job".into(), serde_json::to_value(&job)?);
    let Some(job_id) = job.payload().map(|j| j.id) else {
        return Ok(Value::Object(report));
    };

    let logs = provider.get_logs_job_failed(project, job_id).await?;
    report.insert("logs".into(), serde_json::to_value(&logs)?);

    Ok(Value::Object(report))
}
