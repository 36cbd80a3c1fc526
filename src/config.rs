//! Application configuration and environment variable parsing.
//!
//! Settings come from the environment (optionally seeded from a `.env` file).
//! They govern where the Azure DevOps API lives, how aggressively it is paged
//! and fanned out, and how long idle dashboard sessions are kept.

use serde::Deserialize;
use std::time::Duration as StdDuration;

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Port the HTTP server binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the built dashboard assets.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Root of the Azure DevOps service, without organization or project.
    #[serde(default = "default_ado_base_url")]
    pub ado_base_url: String,

    #[serde(default = "default_ado_api_version")]
    pub ado_api_version: String,

    /// Records requested per page (`$top`).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Hard limit on the number of pages requested per pull request query.
    #[serde(default = "default_max_api_pages")]
    pub max_api_pages: u32,

    /// Maximum number of reviewer lookups in flight for one open pull request fetch.
    #[serde(default = "default_reviewer_concurrency_limit")]
    pub reviewer_concurrency_limit: usize,

    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Idle time after which a dashboard session is dropped.
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,

    #[serde(default = "default_session_max_capacity")]
    pub session_max_capacity: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> String {
    "dist".to_string()
}

fn default_ado_base_url() -> String {
    "https://dev.azure.com".to_string()
}

fn default_ado_api_version() -> String {
    "7.1".to_string()
}

fn default_page_size() -> u32 {
    1000
}

fn default_max_api_pages() -> u32 {
    5
}

fn default_reviewer_concurrency_limit() -> usize {
    10
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_session_ttl_seconds() -> u64 {
    3600
}

fn default_session_max_capacity() -> u64 {
    1000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            static_dir: default_static_dir(),
            ado_base_url: default_ado_base_url(),
            ado_api_version: default_ado_api_version(),
            page_size: default_page_size(),
            max_api_pages: default_max_api_pages(),
            reviewer_concurrency_limit: default_reviewer_concurrency_limit(),
            request_timeout_seconds: default_request_timeout_seconds(),
            session_ttl_seconds: default_session_ttl_seconds(),
            session_max_capacity: default_session_max_capacity(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn request_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.request_timeout_seconds)
    }

    pub fn session_ttl(&self) -> StdDuration {
        StdDuration::from_secs(self.session_ttl_seconds)
    }
}
