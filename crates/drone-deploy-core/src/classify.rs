//! Partition a repository's build list by deployment target.

use serde::{Deserialize, Serialize};

use crate::build::Build;

/// Environment a build was deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployTarget {
    Development,
    Secrets,
    Staging,
    Production,
}

impl DeployTarget {
    /// Bucket order used by every report.
    pub const ALL: [DeployTarget; 4] = [
        DeployTarget::Development,
        DeployTarget::Secrets,
        DeployTarget::Staging,
        DeployTarget::Production,
    ];

    /// Route a build to its bucket, or `None` when it is dropped.
    ///
    /// Explicit `deploy_to` targets win over the development predicate.
    pub fn of(build: &Build) -> Option<DeployTarget> {
        match build.deploy_to.as_str() {
            "production" => Some(DeployTarget::Production),
            "staging" => Some(DeployTarget::Staging),
            "secrets" => Some(DeployTarget::Secrets),
            _ if build.is_release_candidate() => Some(DeployTarget::Development),
            _ => None,
        }
    }

    /// Short upper-case label for report headings.
    pub fn label(self) -> &'static str {
        match self {
            DeployTarget::Development => "DEV",
            DeployTarget::Secrets => "SECRETS",
            DeployTarget::Staging => "STAGING",
            DeployTarget::Production => "PRODUCTION",
        }
    }
}

impl std::fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeployTarget::Development => "development",
            DeployTarget::Secrets => "secrets",
            DeployTarget::Staging => "staging",
            DeployTarget::Production => "production",
        };
        f.write_str(s)
    }
}

/// Builds of one repository split into four disjoint buckets.
///
/// Relative input order is kept inside each bucket, so index 0 is the most
/// recent build when the server returns newest-first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedBuilds {
    pub production: Vec<Build>,
    pub staging: Vec<Build>,
    pub secrets: Vec<Build>,
    pub development: Vec<Build>,
}

impl ClassifiedBuilds {
    pub fn bucket(&self, target: DeployTarget) -> &[Build] {
        match target {
            DeployTarget::Development => &self.development,
            DeployTarget::Secrets => &self.secrets,
            DeployTarget::Staging => &self.staging,
            DeployTarget::Production => &self.production,
        }
    }

    fn bucket_mut(&mut self, target: DeployTarget) -> &mut Vec<Build> {
        match target {
            DeployTarget::Development => &mut self.development,
            DeployTarget::Secrets => &mut self.secrets,
            DeployTarget::Staging => &mut self.staging,
            DeployTarget::Production => &mut self.production,
        }
    }

    /// Non-empty buckets in report order.
    pub fn non_empty(&self) -> impl Iterator<Item = (DeployTarget, &[Build])> + '_ {
        DeployTarget::ALL
            .into_iter()
            .map(move |t| (t, self.bucket(t)))
            .filter(|(_, builds)| !builds.is_empty())
    }

    /// Most recent build of each non-empty bucket, in report order.
    pub fn latest(&self) -> Vec<(DeployTarget, &Build)> {
        self.non_empty()
            .filter_map(|(t, builds)| builds.first().map(|b| (t, b)))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.production.len() + self.staging.len() + self.secrets.len() + self.development.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Single pass over `builds`; unmatched builds are dropped.
pub fn classify(builds: impl IntoIterator<Item = Build>) -> ClassifiedBuilds {
    let mut out = ClassifiedBuilds::default();
    for build in builds {
        if let Some(target) = DeployTarget::of(&build) {
            out.bucket_mut(target).push(build);
        }
    }
    out
}
