//! Provider identity and endpoint/credential resolution.
//!
//! Two Drone servers are in play: one fronting GitLab-hosted repositories and
//! a standard one for everything else. Which server a config leaf belongs to
//! is decided by its `gitlab` flag; the [`Provider`] value is resolved once at
//! startup and threaded through every call.

use serde::{Deserialize, Serialize};

use crate::config_tree::RepoEntry;
use crate::error::ConfigError;

pub const DRONE_SERVER_ENV: &str = "DRONE_SERVER";
pub const DRONE_TOKEN_ENV: &str = "DRONE_TOKEN";
pub const GITLAB_DRONE_SERVER_ENV: &str = "GITLAB_DRONE_SERVER";
pub const GITLAB_DRONE_TOKEN_ENV: &str = "GITLAB_DRONE_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Drone server backed by GitLab.
    Gitlab,
    /// Any other Drone server.
    Other,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Gitlab, Provider::Other];

    /// `(server, token)` environment variable names for this provider.
    pub fn env_vars(self) -> (&'static str, &'static str) {
        match self {
            Provider::Gitlab => (GITLAB_DRONE_SERVER_ENV, GITLAB_DRONE_TOKEN_ENV),
            Provider::Other => (DRONE_SERVER_ENV, DRONE_TOKEN_ENV),
        }
    }

    /// Whether `entry` is processed during this provider's pass.
    ///
    /// Exactly one provider accepts any given leaf.
    pub fn in_scope(self, entry: &RepoEntry) -> bool {
        entry.gitlab() == (self == Provider::Gitlab)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Gitlab => f.write_str("gitlab"),
            Provider::Other => f.write_str("other"),
        }
    }
}

/// Server endpoint and credentials for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderContext {
    pub provider: Provider,
    server: String,
    token: String,
}

impl ProviderContext {
    pub fn new(provider: Provider, server: &str, token: &str) -> Self {
        ProviderContext {
            provider,
            server: server.trim().trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Value for the `Authorization` header.
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn builds_url(&self, repo: &str) -> String {
        format!("{}/api/repos/{}/builds", self.server, repo)
    }

    pub fn repos_url(&self) -> String {
        format!("{}/api/user/repos", self.server)
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("provider", &self.provider)
            .field("server", &self.server)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Both provider contexts, resolved together at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub gitlab: ProviderContext,
    pub other: ProviderContext,
}

impl ProviderEndpoints {
    /// Resolve all four variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve using an arbitrary lookup; empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |provider: Provider| -> Result<ProviderContext, ConfigError> {
            let (server_var, token_var) = provider.env_vars();
            let server = required(&lookup, server_var)?;
            let token = required(&lookup, token_var)?;
            Ok(ProviderContext::new(provider, &server, &token))
        };

        Ok(ProviderEndpoints {
            other: resolve(Provider::Other)?,
            gitlab: resolve(Provider::Gitlab)?,
        })
    }

    pub fn get(&self, provider: Provider) -> &ProviderContext {
        match provider {
            Provider::Gitlab => &self.gitlab,
            Provider::Other => &self.other,
        }
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnv(key)),
    }
}
