use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::providers::gitlab::DEFAULT_ISSUE_LABELS;

/// Configuration file structure for ci-triage.
///
/// Holds the GitLab credential and endpoint so they never have to be baked
/// into the binary. Values given on the command line or through the
/// environment take precedence over the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub gitlab: GitLabConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab personal or project access token
    pub token: Option<String>,

    /// REST API root of the GitLab instance
    #[serde(default = "default_gitlab_api_url")]
    pub base_url: String,

    /// Labels attached to created issues
    #[serde(default = "default_issue_labels")]
    pub labels: Vec<String>,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_gitlab_api_url(),
            labels: default_issue_labels(),
        }
    }
}

fn default_gitlab_api_url() -> String {
    "https://gitlab.com/api/v4".to_string()
}

fn default_issue_labels() -> Vec<String> {
    DEFAULT_ISSUE_LABELS.iter().map(ToString::to_string).collect()
}

const CANDIDATES: [&str; 4] = [
    "ci-triage.toml",
    "ci-triage.json",
    "ci-triage.yaml",
    "ci-triage.yml",
];

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./ci-triage.toml, ./ci-triage.json, ./ci-triage.yaml, ./ci-triage.yml
    /// 3. `<user config dir>/ci-triage/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let local = CANDIDATES.iter().map(PathBuf::from);
        let user = Self::user_config_path();

        for candidate in local.chain(user) {
            if candidate.exists() {
                log::debug!("Using config file {}", candidate.display());
                return Self::load_from_path(&candidate);
            }
        }

        Ok(Self::default())
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ci-triage").join("config.toml"))
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Applies command-line / environment overrides on top of the file.
    #[must_use]
    pub fn with_overrides(mut self, token: Option<String>, base_url: Option<String>) -> Self {
        if token.is_some() {
            self.gitlab.token = token;
        }
        if let Some(base_url) = base_url {
            self.gitlab.base_url = base_url;
        }
        self
    }
}
