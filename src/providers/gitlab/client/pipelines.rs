use log::{debug, info};
use serde_json::Value;

use super::core::GitLabClient;
use crate::error::Result;
use crate::providers::gitlab::types::{JobId, PipelineId, ProjectId};

impl GitLabClient {
    /// `GET /projects/:id/pipelines` with the API's default ordering (newest
    /// first). Returns `None` when the body is `null` or empty.
    ///
    /// Entries stay raw JSON so callers decode only the ones they use.
    pub async fn list_pipelines(&self, project: &ProjectId) -> Result<Option<Vec<Value>>> {
        let url = self.project_url(project, "pipelines")?;
        info!("Fetching pipelines for project {project}");

        self.get_json(url).await
    }

    /// `GET /projects/:id/pipelines/:pipeline_id/jobs`, first page only.
    pub async fn list_pipeline_jobs(
        &self,
        project: &ProjectId,
        pipeline: PipelineId,
    ) -> Result<Option<Vec<Value>>> {
        let url = self.project_url(project, &format!("pipelines/{pipeline}/jobs"))?;
        info!("Fetching jobs of pipeline {pipeline} for project {project}");

        self.get_json(url).await
    }

    /// `GET /projects/:id/jobs/:job_id/trace`.
    ///
    /// Returns the raw log text, or `None` when GitLab answers with a non-2xx
    /// status (unknown job, trace not available, no access).
    pub async fn fetch_job_trace(&self, project: &ProjectId, job: JobId) -> Result<Option<String>> {
        let url = self.project_url(project, &format!("jobs/{job}/trace"))?;
        info!("Fetching trace of job {job} for project {project}");

        let response = self.send(self.client().get(url)).await?;
        let status = response.status();

        if !status.is_success() {
            debug!("Trace request for job {job} answered with status {status}");
            return Ok(None);
        }

        Ok(Some(response.text().await?))
    }
}
