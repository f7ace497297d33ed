use log::debug;
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::Token;
use crate::error::{CiTriageError, Result};
use crate::providers::gitlab::types::ProjectId;

const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const MAX_REDIRECTS: usize = 10;

/// Follows redirects only while they stay on the origin of the first
/// request. reqwest strips `Authorization` on a cross-host hop but not
/// `PRIVATE-TOKEN`, so a foreign redirect is handed back unfollowed.
fn same_origin_redirects() -> Policy {
    Policy::custom(|attempt| {
        let leaves_origin = attempt
            .previous()
            .first()
            .is_some_and(|first| first.origin() != attempt.url().origin());

        if leaves_origin {
            debug!("Not following redirect to {}", attempt.url());
            attempt.stop()
        } else if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

/// Thin REST v4 client. Every call is a single request; nothing is retried,
/// paginated or cached.
#[derive(Clone)]
pub struct GitLabClient {
    client: Client,
    api_url: Url,
    token: Token,
}

impl GitLabClient {
    /// `api_url` is the REST root, e.g. `https://gitlab.com/api/v4`.
    pub fn new(api_url: &str, token: Token) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ci-triage/", env!("CARGO_PKG_VERSION")))
            .redirect(same_origin_redirects())
            .build()
            .map_err(|e| CiTriageError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut api_url = Url::parse(api_url)
            .map_err(|e| CiTriageError::Config(format!("Invalid API URL: {e}")))?;

        if api_url.cannot_be_a_base() {
            return Err(CiTriageError::Config(format!(
                "API URL cannot be used as a base: {api_url}"
            )));
        }

        // Url::join drops the last segment unless the base ends with '/'
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }

        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    pub(super) fn client(&self) -> &Client {
        &self.client
    }

    pub(super) fn auth_request(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(PRIVATE_TOKEN_HEADER, self.token.as_str())
    }

    /// URL of `projects/{project}/{path}` under the API root.
    pub(super) fn project_url(&self, project: &ProjectId, path: &str) -> Result<Url> {
        self.api_url
            .join(&format!("projects/{}/{path}", project.url_segment()))
            .map_err(|e| CiTriageError::Config(format!("Invalid project URL: {e}")))
    }

    pub(super) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = self.auth_request(request).build()?;
        debug!("{} {}", request.method(), request.url());
        Ok(self.client.execute(request).await?)
    }

    /// Fails with [`CiTriageError::Api`] on a non-2xx status, carrying the
    /// response body as the message.
    pub(super) async fn error_for_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        Err(CiTriageError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// GET a JSON document. An empty body is treated as JSON `null`.
    pub(super) async fn get_json<T>(&self, url: Url) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(self.client.get(url)).await?;
        let response = Self::error_for_status(response).await?;
        parse_json_body(&response.text().await?)
    }
}

pub(super) fn parse_json_body<T>(body: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let body = body.trim();
    let body = if body.is_empty() { "null" } else { body };
    Ok(serde_json::from_str(body)?)
}
