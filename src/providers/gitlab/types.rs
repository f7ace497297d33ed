use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Defines a numeric GitLab identifier.
///
/// The REST API returns these as JSON integers while tool callers exchange
/// them as decimal strings, so both forms are accepted on input and the
/// string form is produced on output.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match RawId::deserialize(deserializer)? {
                    RawId::Number(n) => Ok(Self(n)),
                    RawId::Text(s) => s.parse().map_err(serde::de::Error::custom),
                }
            }
        }
    };
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

numeric_id!(
    /// Pipeline identifier (global `id`, not the project-scoped `iid`).
    PipelineId
);
numeric_id!(
    /// Job identifier.
    JobId
);
numeric_id!(
    /// Issue identifier as returned in the `id` field of a created issue.
    IssueId
);

/// GitLab project reference: a numeric id or a namespaced path such as
/// `group/subgroup/project`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProjectId {
    Numeric(u64),
    Path(String),
}

impl ProjectId {
    /// Form usable as a single URL path segment. Paths are percent-encoded,
    /// so `group/project` becomes `group%2Fproject`.
    pub fn url_segment(&self) -> String {
        match self {
            Self::Numeric(id) => id.to_string(),
            Self::Path(path) => urlencoding::encode(path).into_owned(),
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Path(path) => f.write_str(path),
        }
    }
}

impl FromStr for ProjectId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(s.parse::<u64>()
            .map_or_else(|_| Self::Path(s.to_owned()), Self::Numeric))
    }
}

impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Self::Numeric(n),
            RawId::Text(s) => match s.parse::<ProjectId>() {
                Ok(id) => id,
                Err(never) => match never {},
            },
        })
    }
}

/// Entry of `GET /projects/:id/pipelines`.
#[derive(Debug, Clone, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    #[serde(default)]
    pub status: Option<String>,
}

/// Entry of `GET /projects/:id/pipelines/:pipeline_id/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(default)]
    pub name: Option<String>,
}

/// Whether a raw job entry failed without being allowed to, i.e. broke the
/// pipeline. `allow_failure` must be present and exactly `false`.
pub fn is_blocking_failure(entry: &Value) -> bool {
    entry.get("status").and_then(Value::as_str) == Some("failed")
        && entry.get("allow_failure").and_then(Value::as_bool) == Some(false)
}

/// Payload of a successful latest-pipeline lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPipeline {
    pub id: PipelineId,
}

/// Payload of a successful failed-job lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedJob {
    pub id: JobId,
}

/// Payload of a successful trace download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLogs {
    pub job_logs: String,
}

/// Payload of a successful issue creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub issue_id: IssueId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}
