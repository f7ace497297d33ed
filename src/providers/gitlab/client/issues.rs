use chrono::{DateTime, Utc};
use log::info;
use serde_json::Value;

use super::core::{parse_json_body, GitLabClient};
use crate::error::Result;
use crate::providers::gitlab::types::ProjectId;

/// Issue to be filed through `POST /projects/:id/issues`.
#[derive(Debug, Clone)]
pub struct NewIssue<'a> {
    pub title: &'a str,
    /// Markdown body.
    pub description: &'a str,
    pub labels: &'a [String],
    pub created_at: DateTime<Utc>,
}

impl NewIssue<'_> {
    /// Query string carrying the issue attributes. Every value is
    /// percent-encoded; labels are encoded one by one and joined with a
    /// literal comma as GitLab expects.
    pub fn query(&self) -> String {
        let labels = self
            .labels
            .iter()
            .map(|label| urlencoding::encode(label))
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "title={}&labels={}&description={}&created_at={}",
            urlencoding::encode(self.title),
            labels,
            urlencoding::encode(self.description),
            urlencoding::encode(&format_created_at(self.created_at)),
        )
    }
}

/// `YYYY-MM-DDTHH:MM:SSZ`, always UTC.
pub fn format_created_at(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

impl GitLabClient {
    /// Creates an issue and returns the decoded response body, `Value::Null`
    /// when the body is empty. Interpreting the body is left to the caller.
    pub async fn create_issue(&self, project: &ProjectId, issue: &NewIssue<'_>) -> Result<Value> {
        let mut url = self.project_url(project, "issues")?;
        url.set_query(Some(&issue.query()));
        info!("Creating issue '{}' in project {project}", issue.title);

        let response = self.send(self.client().post(url)).await?;
        let response = Self::error_for_status(response).await?;

        parse_json_body(&response.text().await?)
    }
}
