//! Deploy mode: find the build behind a recorded tag and emit a directive.
//!
//! Nothing here runs a deployment. The directive is a line for an external
//! executor, e.g. `drone-deploy deploy --target staging | sh`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::build::Build;
use crate::config_tree::RepoEntry;
use crate::error::ConfigError;

/// `deploy <repo> <build> <target>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployDirective {
    pub repo: String,
    pub build_number: u64,
    pub target: String,
}

impl fmt::Display for DeployDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deploy {} {} {}", self.repo, self.build_number, self.target)
    }
}

/// Validate a user-supplied target environment name.
pub fn parse_target(raw: &str) -> Result<String, ConfigError> {
    let target = raw.trim();
    if target.is_empty() {
        return Err(ConfigError::EmptyDeployTarget);
    }
    Ok(target.to_string())
}

/// First build whose commit equals the leaf's tag.
pub fn find_tagged_build<'a>(entry: &RepoEntry, builds: &'a [Build]) -> Option<&'a Build> {
    let tag = entry.tag()?;
    builds.iter().find(|b| b.commit == tag)
}

/// Emit a directive for the tagged build, or `None` when there is nothing
/// to deploy (no tag recorded, or the tag is not in the build list).
pub fn match_and_emit(entry: &RepoEntry, builds: &[Build], target: &str) -> Option<DeployDirective> {
    find_tagged_build(entry, builds).map(|build| DeployDirective {
        repo: entry.drone_repo().to_string(),
        build_number: build.number,
        target: target.to_string(),
    })
}
