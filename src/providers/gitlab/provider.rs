use chrono::Utc;
use log::{info, warn};
use serde_json::Value;

use crate::auth::Token;
use crate::error::{CiTriageError, Result};
use crate::outcome::ToolResult;

use super::client::{GitLabClient, NewIssue};
use super::types::{
    is_blocking_failure, CreatedIssue, FailedJob, IssueId, Job, JobId, JobLogs, LatestPipeline,
    Pipeline, PipelineId, ProjectId,
};

/// Labels attached to every issue filed by this tool.
pub const DEFAULT_ISSUE_LABELS: [&str; 2] = ["fix", "gitlab-ai-agent"];

/// The four pipeline triage operations exposed to the agent.
///
/// Each operation issues exactly one request. "Nothing found" outcomes come
/// back as [`ToolResult::Error`] so the agent can reason about them, while
/// transport failures, non-2xx answers on JSON endpoints and undecodable
/// bodies are returned as `Err`.
#[derive(Clone)]
pub struct GitLabProvider {
    client: GitLabClient,
    issue_labels: Vec<String>,
}

impl GitLabProvider {
    /// Creates a provider against the REST root `api_url`
    /// (e.g. `https://gitlab.com/api/v4`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// built.
    pub fn new(api_url: &str, token: Token) -> Result<Self> {
        Ok(Self::with_client(GitLabClient::new(api_url, token)?))
    }

    pub fn with_client(client: GitLabClient) -> Self {
        Self {
            client,
            issue_labels: DEFAULT_ISSUE_LABELS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Replaces the labels attached to created issues.
    #[must_use]
    pub fn with_issue_labels(mut self, labels: Vec<String>) -> Self {
        self.issue_labels = labels;
        self
    }

    /// Id of the most recent pipeline of `project`.
    pub async fn get_latest_pipeline_id(
        &self,
        project: &ProjectId,
    ) -> Result<ToolResult<LatestPipeline>> {
        let latest = self
            .client
            .list_pipelines(project)
            .await?
            .and_then(|pipelines| pipelines.into_iter().next());

        match latest {
            Some(entry) => {
                let pipeline: Pipeline = serde_json::from_value(entry)?;
                info!(
                    "Latest pipeline of project {project}: {} ({})",
                    pipeline.id,
                    pipeline.status.as_deref().unwrap_or("unknown status")
                );
                Ok(ToolResult::success(LatestPipeline { id: pipeline.id }))
            }
            None => {
                warn!("No pipelines found for project {project}");
                Ok(ToolResult::error(format!(
                    "Latest pipeline id for project '{project}' is not available."
                )))
            }
        }
    }

    /// First job of `pipeline`, in API order, that failed without being
    /// allowed to.
    pub async fn get_pipeline_job_failed(
        &self,
        project: &ProjectId,
        pipeline: PipelineId,
    ) -> Result<ToolResult<FailedJob>> {
        let jobs = self
            .client
            .list_pipeline_jobs(project, pipeline)
            .await?
            .unwrap_or_default();

        match jobs.into_iter().find(is_blocking_failure) {
            Some(entry) => {
                let job: Job = serde_json::from_value(entry)?;
                info!(
                    "Pipeline {pipeline} failed on job {} ({})",
                    job.id,
                    job.name.as_deref().unwrap_or("unnamed")
                );
                Ok(ToolResult::success(FailedJob { id: job.id }))
            }
            None => {
                warn!("No blocking failed job in pipeline {pipeline} of project {project}");
                Ok(ToolResult::error(format!(
                    "Failed job id for project id : '{project}' and pipeline id: '{pipeline}' is not available."
                )))
            }
        }
    }

    /// Full, unmodified trace of `job`.
    pub async fn get_logs_job_failed(
        &self,
        project: &ProjectId,
        job: JobId,
    ) -> Result<ToolResult<JobLogs>> {
        match self.client.fetch_job_trace(project, job).await? {
            Some(job_logs) => {
                info!("Fetched {} bytes of trace for job {job}", job_logs.len());
                Ok(ToolResult::success(JobLogs { job_logs }))
            }
            None => {
                warn!("Trace of job {job} in project {project} is not available");
                Ok(ToolResult::error(format!(
                    "Failed getting job logs for project id : '{project}' and job id: '{job}' is not available."
                )))
            }
        }
    }

    /// Files an issue with a Markdown description, stamped with the current
    /// UTC time and tagged with the configured labels.
    ///
    /// # Errors
    ///
    /// Besides transport and API errors, a non-empty response that lacks an
    /// `id` field yields [`CiTriageError::MalformedResponse`]. An empty
    /// response is reported as [`ToolResult::Error`] instead.
    pub async fn create_issue(
        &self,
        project: &ProjectId,
        issue_title: &str,
        issue_content: &str,
    ) -> Result<ToolResult<CreatedIssue>> {
        let issue = NewIssue {
            title: issue_title,
            description: issue_content,
            labels: &self.issue_labels,
            created_at: Utc::now(),
        };

        let body = self.client.create_issue(project, &issue).await?;

        if !is_present(&body) {
            warn!("Empty response while creating issue in project {project}");
            return Ok(ToolResult::error(format!(
                "Failed creating issue to fix {issue_title} for project id : '{project}'."
            )));
        }

        let issue_id = match body.get("id") {
            Some(id) if !id.is_null() => serde_json::from_value::<IssueId>(id.clone())?,
            _ => {
                return Err(CiTriageError::MalformedResponse(format!(
                    "Id has not been found : {body}"
                )))
            }
        };

        let web_url = body
            .get("web_url")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);

        info!("Created issue {issue_id} in project {project}");

        Ok(ToolResult::success(CreatedIssue { issue_id, web_url }))
    }
}

/// Whether a decoded body carries anything: `null`, `false`, `0`, and empty
/// strings, arrays or objects count as absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const TOKEN: &str = "glpat-test-token";

    fn provider(server: &ServerGuard) -> GitLabProvider {
        GitLabProvider::new(&server.url(), Token::from(TOKEN)).unwrap()
    }

    fn project() -> ProjectId {
        ProjectId::Numeric(42)
    }

    #[tokio::test]
    async fn test_latest_pipeline_is_first_entry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/42/pipelines")
            .match_header("PRIVATE-TOKEN", TOKEN)
            .with_header("content-type", "application/json")
            .with_body(json!([{"id": 501, "status": "failed"}, {"id": 499}]).to_string())
            .create_async()
            .await;

        let result = assert_ok!(provider(&server).get_latest_pipeline_id(&project()).await);

        mock.assert_async().await;
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"status": "success", "id": "501"})
        );
    }

    #[tokio::test]
    async fn test_latest_pipeline_empty_list_names_project() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/42/pipelines")
            .with_body("[]")
            .create_async()
            .await;

        let result = assert_ok!(provider(&server).get_latest_pipeline_id(&project()).await);

        assert_eq!(
            result.error_message(),
            Some("Latest pipeline id for project '42' is not available.")
        );
    }

    #[tokio::test]
    async fn test_latest_pipeline_null_body_is_error_result() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/42/pipelines")
            .with_body("null")
            .create_async()
            .await;

        let result = assert_ok!(provider(&server).get_latest_pipeline_id(&project()).await);
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_latest_pipeline_api_error_propagates() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/42/pipelines")
            .with_status(404)
            .with_body(r#"{"message":"404 Project Not Found"}"#)
            .create_async()
            .await;

        let err = assert_err!(provider(&server).get_latest_pipeline_id(&project()).await);

        match err {
            CiTriageError::Api { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("Project Not Found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_project_path_is_percent_encoded() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/group%2Fapp/pipelines")
            .with_body(r#"[{"id": 3}]"#)
            .create_async()
            .await;

        let project = ProjectId::Path("group/app".to_string());
        let result = assert_ok!(provider(&server).get_latest_pipeline_id(&project).await);

        mock.assert_async().await;
        assert_eq!(result.payload().unwrap().id, PipelineId(3));
    }

    #[tokio::test]
    async fn test_failed_job_skips_allowed_failures() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/42/pipelines/501/jobs")
            .match_header("PRIVATE-TOKEN", TOKEN)
            .with_body(
                json!([
                    {"id": 6, "status": "success", "allow_failure": false},
                    {"id": 7, "status": "failed", "allow_failure": true},
                    {"id": 8, "status": "failed", "allow_failure": false},
                    {"id": 9, "status": "failed", "allow_failure": false}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let result = assert_ok!(
            provider(&server)
                .get_pipeline_job_failed(&project(), PipelineId(501))
                .await
        );

        mock.assert_async().await;
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"status": "success", "id": "8"})
        );
    }

    #[tokio::test]
    async fn test_latest_pipeline_ignores_entries_after_the_first() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/42/pipelines")
            .with_body(r#"[{"id": 501}, {"id": null}, {"status": "running"}]"#)
            .create_async()
            .await;

        let result = assert_ok!(provider(&server).get_latest_pipeline_id(&project()).await);

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"status": "success", "id": "501"})
        );
    }

    #[tokio::test]
    async fn test_latest_pipeline_without_id_is_json_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/42/pipelines")
            .with_body(r#"[{"status": "running"}, {"id": 499}]"#)
            .create_async()
            .await;

        let err = assert_err!(provider(&server).get_latest_pipeline_id(&project()).await);
        assert!(matches!(err, CiTriageError::Json(_)));
    }

    #[tokio::test]
    async fn test_failed_job_only_decodes_the_match() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/42/pipelines/501/jobs")
            .with_body(
                json!([
                    {"id": null, "status": "success"},
                    {"id": "manual", "status": "manual", "allow_failure": true},
                    {"id": 8, "name": "test", "status": "failed", "allow_failure": false}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let result = assert_ok!(
            provider(&server)
                .get_pipeline_job_failed(&project(), PipelineId(501))
                .await
        );

        assert_eq!(result.payload(), Some(&FailedJob { id: JobId(8) }));
    }

    #[tokio::test]
    async fn test_failed_job_without_match_is_error_result() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/42/pipelines/501/jobs")
            .with_body(
                json!([
                    {"id": 7, "status": "failed", "allow_failure": true},
                    {"id": 10, "status": "failed"},
                    {"id": 11, "status": "success", "allow_failure": false}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let result = assert_ok!(
            provider(&server)
                .get_pipeline_job_failed(&project(), PipelineId(501))
                .await
        );

        assert_eq!(
            result.error_message(),
            Some("Failed job id for project id : '42' and pipeline id: '501' is not available.")
        );
    }

    #[tokio::test]
    async fn test_job_logs_returned_verbatim() {
        let trace = "\u{1b}[0KRunning with gitlab-runner\n$ cargo test\nerror[E0425]: cannot find value `x`\n";
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/projects/42/jobs/8/trace")
            .match_header("PRIVATE-TOKEN", TOKEN)
            .with_header("content-type", "text/plain")
            .with_body(trace)
            .create_async()
            .await;

        let result = assert_ok!(provider(&server).get_logs_job_failed(&project(), JobId(8)).await);

        mock.assert_async().await;
        assert_eq!(result.payload().unwrap().job_logs, trace);
    }

    #[tokio::test]
    async fn test_job_logs_missing_trace_is_error_result() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/projects/42/jobs/8/trace")
            .with_status(404)
            .with_body(r#"{"message":"404 Not found"}"#)
            .create_async()
            .await;

        let result = assert_ok!(provider(&server).get_logs_job_failed(&project(), JobId(8)).await);

        assert_eq!(
            result.error_message(),
            Some("Failed getting job logs for project id : '42' and job id: '8' is not available.")
        );
    }

    #[tokio::test]
    async fn test_create_issue_encodes_title_and_labels() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/projects/42/issues")
            .match_header("PRIVATE-TOKEN", TOKEN)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("title".into(), "Fix build & deploy #3".into()),
                Matcher::UrlEncoded("labels".into(), "fix,gitlab-ai-agent".into()),
                Matcher::UrlEncoded("description".into(), "## Fix\nAdd `x`".into()),
                Matcher::Regex(r"title=Fix%20build%20%26%20deploy%20%233".into()),
                Matcher::Regex(
                    r"created_at=\d{4}-\d{2}-\d{2}T\d{2}%3A\d{2}%3A\d{2}Z".into(),
                ),
            ]))
            .with_status(201)
            .with_body(
                json!({"id": 1234, "iid": 5, "web_url": "https://gitlab.example.com/g/p/-/issues/5"})
                    .to_string(),
            )
            .create_async()
            .await;

        let result = assert_ok!(
            provider(&server)
                .create_issue(&project(), "Fix build & deploy #3", "## Fix\nAdd `x`")
                .await
        );

        mock.assert_async().await;
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "status": "success",
                "issue_id": "1234",
                "web_url": "https://gitlab.example.com/g/p/-/issues/5"
            })
        );
    }

    #[tokio::test]
    async fn test_create_issue_uses_configured_labels() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/projects/42/issues")
            .match_query(Matcher::UrlEncoded("labels".into(), "ci,triage".into()))
            .with_status(201)
            .with_body(r#"{"id": 1}"#)
            .create_async()
            .await;

        let provider = provider(&server).with_issue_labels(vec!["ci".into(), "triage".into()]);
        let result = assert_ok!(provider.create_issue(&project(), "t", "d").await);

        mock.assert_async().await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_create_issue_empty_body_is_error_result() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/projects/42/issues")
            .match_query(Matcher::Any)
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let result = assert_ok!(
            provider(&server)
                .create_issue(&project(), "Broken lint", "content")
                .await
        );

        assert_eq!(
            result.error_message(),
            Some("Failed creating issue to fix Broken lint for project id : '42'.")
        );
    }

    #[tokio::test]
    async fn test_create_issue_without_id_is_fatal() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/projects/42/issues")
            .match_query(Matcher::Any)
            .with_status(201)
            .with_body(r#"{"title": "Broken lint"}"#)
            .create_async()
            .await;

        let err = assert_err!(
            provider(&server)
                .create_issue(&project(), "Broken lint", "content")
                .await
        );

        assert!(matches!(err, CiTriageError::MalformedResponse(_)));
        assert!(err.to_string().contains("Id has not been found"));
    }

    #[tokio::test]
    async fn test_create_issue_rejected_request_propagates() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/projects/42/issues")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"message":"403 Forbidden"}"#)
            .create_async()
            .await;

        let err = assert_err!(provider(&server).create_issue(&project(), "t", "d").await);

        assert!(matches!(err, CiTriageError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_trace_redirect_within_instance_is_followed() {
        let mut server = Server::new_async().await;
        let location = format!("{}/artifacts/8/trace", server.url());
        server
            .mock("GET", "/projects/42/jobs/8/trace")
            .with_status(302)
            .with_header("location", &location)
            .create_async()
            .await;
        let target = server
            .mock("GET", "/artifacts/8/trace")
            .match_header("PRIVATE-TOKEN", TOKEN)
            .with_body("job log")
            .create_async()
            .await;

        let result = assert_ok!(provider(&server).get_logs_job_failed(&project(), JobId(8)).await);

        target.assert_async().await;
        assert_eq!(result.payload().unwrap().job_logs, "job log");
    }

    #[tokio::test]
    async fn test_trace_redirect_to_other_host_does_not_leak_token() {
        let mut server = Server::new_async().await;
        let mut storage = Server::new_async().await;
        let foreign = storage
            .mock("GET", "/trace.log")
            .expect(0)
            .create_async()
            .await;
        let location = format!("{}/trace.log", storage.url());
        server
            .mock("GET", "/projects/42/jobs/8/trace")
            .with_status(302)
            .with_header("location", &location)
            .create_async()
            .await;

        let result = assert_ok!(provider(&server).get_logs_job_failed(&project(), JobId(8)).await);

        foreign.assert_async().await;
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_connection_failure_propagates() {
        let provider = GitLabProvider::new("http://127.0.0.1:1", Token::from(TOKEN)).unwrap();

        let err = assert_err!(provider.get_latest_pipeline_id(&project()).await);

        assert!(matches!(err, CiTriageError::Network(_)));
    }

    #[test]
    fn test_is_present() {
        assert!(!is_present(&Value::Null));
        assert!(!is_present(&json!({})));
        assert!(!is_present(&json!([])));
        assert!(!is_present(&json!("")));
        assert!(is_present(&json!({"id": 1})));
        assert!(is_present(&json!([1])));
    }
}
