//! Drone build and repository records.

use serde::{Deserialize, Serialize};

/// Branch whose builds count as development releases.
pub const RELEASE_BRANCH: &str = "master";

/// Events that produce a releasable development build.
pub const RELEASE_EVENTS: [&str; 2] = ["push", "deployment"];

/// One CI execution record as returned by `GET /api/repos/{repo}/builds`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Build {
    pub number: u64,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub deploy_to: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub started_at: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub link_url: String,
}

impl Build {
    /// True for a push or deployment on the release branch.
    ///
    /// This is both the development-bucket filter and the populate filter.
    pub fn is_release_candidate(&self) -> bool {
        self.branch == RELEASE_BRANCH && RELEASE_EVENTS.contains(&self.event.as_str())
    }
}

/// Entry of `GET /api/user/repos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

impl Repository {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(branch: &str, event: &str) -> Build {
        Build {
            branch: branch.to_string(),
            event: event.to_string(),
            ..Build::default()
        }
    }

    #[test]
    fn test_release_candidate_requires_master_and_event() {
        assert!(build("master", "push").is_release_candidate());
        assert!(build("master", "deployment").is_release_candidate());
        assert!(!build("master", "pull_request").is_release_candidate());
        assert!(!build("develop", "push").is_release_candidate());
    }

    #[test]
    fn test_build_decodes_with_missing_optional_fields() {
        let json = r#"{"number": 7, "commit": "abc", "deploy_to": "staging"}"#;
        let b: Build = serde_json::from_str(json).expect("decode");
        assert_eq!(b.number, 7);
        assert_eq!(b.commit, "abc");
        assert_eq!(b.deploy_to, "staging");
        assert!(b.link_url.is_empty());
    }

    #[test]
    fn test_build_ignores_unknown_fields() {
        let json = r#"{"number": 1, "message": "fix", "sender": "bot", "finished_at": 12}"#;
        let b: Build = serde_json::from_str(json).expect("decode");
        assert_eq!(b.number, 1);
    }
}
