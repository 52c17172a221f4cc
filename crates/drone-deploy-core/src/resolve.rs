//! Populate mode: record the latest releasable commit on a config leaf.

use crate::build::Build;
use crate::config_tree::RepoEntry;

/// What [`resolve_tag`] did to a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagResolution {
    /// The leaf now points at a different commit.
    Updated {
        previous: Option<String>,
        commit: String,
    },
    /// The latest candidate is the commit already recorded.
    Unchanged { commit: String },
    /// No build qualified; the leaf was left untouched.
    NoCandidate,
}

/// First release candidate in server order, i.e. the most recent one.
pub fn latest_release_build(builds: &[Build]) -> Option<&Build> {
    builds.iter().find(|b| b.is_release_candidate())
}

/// Point `entry.tag` at the newest master push/deployment build.
pub fn resolve_tag(entry: &mut RepoEntry, builds: &[Build]) -> TagResolution {
    let Some(build) = latest_release_build(builds) else {
        return TagResolution::NoCandidate;
    };

    if entry.tag() == Some(build.commit.as_str()) {
        return TagResolution::Unchanged {
            commit: build.commit.clone(),
        };
    }

    let previous = entry.tag().map(str::to_string);
    entry.set_tag(build.commit.clone());
    TagResolution::Updated {
        previous,
        commit: build.commit.clone(),
    }
}
