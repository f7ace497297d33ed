mod core;
mod issues;
mod pipelines;

pub use self::core::GitLabClient;
pub use self::issues::NewIssue;
