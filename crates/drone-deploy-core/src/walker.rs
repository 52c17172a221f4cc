//! Config tree walker.
//!
//! A walk runs in three phases so that fetches can fan out while the tree
//! stays under a single exclusive borrow:
//!
//! 1. **Plan**: read the tree and pick the in-scope leaves of each provider.
//! 2. **Fetch**: per provider, fetch build lists on a bounded stream, all
//!    under one overall deadline. Providers run concurrently.
//! 3. **Apply**: in document order, hand each leaf and its builds to the tag
//!    resolver (populate) or deploy matcher (deploy).
//!
//! A leaf belongs to exactly one provider, so the apply phase never touches a
//! leaf twice. A failed fetch only marks its own leaf as skipped.

use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, Instrument};

use crate::build::Build;
use crate::config_tree::{ConfigTree, LeafPath};
use crate::deploy::{match_and_emit, DeployDirective};
use crate::error::FetchError;
use crate::fetcher::BuildSource;
use crate::obs::{
    emit_directive, emit_leaf_skipped, emit_tag_updated, emit_walk_finished, walk_span,
};
use crate::provider::Provider;
use crate::resolve::{resolve_tag, TagResolution};

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// What to do with each in-scope leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkMode {
    /// Record the latest release commit on the leaf.
    Populate,
    /// Emit a deploy directive for the leaf's recorded commit.
    Deploy { target: String },
}

impl WalkMode {
    pub fn name(&self) -> &'static str {
        match self {
            WalkMode::Populate => "populate",
            WalkMode::Deploy { .. } => "deploy",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// In-flight fetches per provider.
    pub concurrency: usize,
    /// Budget for the whole walk, measured from its start.
    pub deadline: Duration,
    /// Only process leaves whose `drone_repo` equals this.
    pub repo_filter: Option<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            concurrency: DEFAULT_CONCURRENCY,
            deadline: DEFAULT_DEADLINE,
            repo_filter: None,
        }
    }
}

/// One provider's pass over the tree.
#[derive(Clone, Copy)]
pub struct ProviderPass<'a> {
    pub provider: Provider,
    pub source: &'a dyn BuildSource,
}

impl<'a> ProviderPass<'a> {
    pub fn new(provider: Provider, source: &'a dyn BuildSource) -> Self {
        ProviderPass { provider, source }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUpdate {
    pub path: String,
    pub repo: String,
    pub previous: Option<String>,
    pub commit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoMatchReason {
    /// Populate: no master push/deployment build.
    NoCandidate,
    /// Populate: the latest candidate is already recorded.
    AlreadyCurrent,
    /// Deploy: the leaf has no `tag`.
    MissingTag,
    /// Deploy: no build carries the recorded commit.
    TagNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoMatch {
    pub path: String,
    pub repo: String,
    pub reason: NoMatchReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLeaf {
    pub path: String,
    pub repo: String,
    pub provider: Provider,
    pub reason: String,
}

/// Per-leaf outcomes of a walk, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkSummary {
    /// In-scope leaves processed.
    pub visited: usize,
    /// Leaves no pass of this walk selected.
    pub out_of_scope: usize,
    pub tag_updates: Vec<TagUpdate>,
    pub directives: Vec<DeployDirective>,
    pub no_match: Vec<NoMatch>,
    pub skipped: Vec<SkippedLeaf>,
}

impl WalkSummary {
    pub fn has_skips(&self) -> bool {
        !self.skipped.is_empty()
    }
}

#[derive(Debug, Clone)]
struct LeafJob {
    seq: usize,
    provider: Provider,
    path: LeafPath,
    repo: String,
    needs_fetch: bool,
}

type JobResult = (LeafJob, Option<Result<Vec<Build>, FetchError>>);

/// Walk the tree for a single provider.
pub async fn walk(
    tree: &mut ConfigTree,
    source: &dyn BuildSource,
    provider: Provider,
    mode: &WalkMode,
    options: &WalkOptions,
) -> WalkSummary {
    walk_all(tree, &[ProviderPass::new(provider, source)], mode, options).await
}

/// Walk the tree for several providers at once.
pub async fn walk_all(
    tree: &mut ConfigTree,
    passes: &[ProviderPass<'_>],
    mode: &WalkMode,
    options: &WalkOptions,
) -> WalkSummary {
    let deadline = Instant::now() + options.deadline;
    let mut summary = WalkSummary::default();

    let plans = plan(tree, passes, mode, options, &mut summary);

    let fetches = passes.iter().zip(plans).map(|(pass, jobs)| {
        run_pass(*pass, jobs, mode.name(), options.concurrency, deadline)
    });
    let mut results: Vec<JobResult> = join_all(fetches).await.into_iter().flatten().collect();
    results.sort_by_key(|(job, _)| job.seq);

    for (job, fetched) in results {
        apply(tree, mode, job, fetched, &mut summary);
    }

    emit_walk_finished(
        summary.visited,
        summary.tag_updates.len(),
        summary.directives.len(),
        summary.skipped.len(),
    );
    summary
}

fn plan(
    tree: &ConfigTree,
    passes: &[ProviderPass<'_>],
    mode: &WalkMode,
    options: &WalkOptions,
    summary: &mut WalkSummary,
) -> Vec<Vec<LeafJob>> {
    let mut plans: Vec<Vec<LeafJob>> = vec![Vec::new(); passes.len()];

    for (seq, (path, entry)) in tree.leaves().into_iter().enumerate() {
        let selected = options
            .repo_filter
            .as_deref()
            .map_or(true, |repo| entry.drone_repo() == repo);
        let slot = passes.iter().position(|p| p.provider.in_scope(entry));

        let Some(slot) = slot.filter(|_| selected) else {
            summary.out_of_scope += 1;
            continue;
        };

        summary.visited += 1;
        let needs_fetch = match mode {
            WalkMode::Populate => true,
            WalkMode::Deploy { .. } => entry.tag().is_some(),
        };
        plans[slot].push(LeafJob {
            seq,
            provider: passes[slot].provider,
            path,
            repo: entry.drone_repo().to_string(),
            needs_fetch,
        });
    }

    plans
}

async fn run_pass(
    pass: ProviderPass<'_>,
    jobs: Vec<LeafJob>,
    mode: &str,
    concurrency: usize,
    deadline: Instant,
) -> Vec<JobResult> {
    let span = walk_span(pass.provider, mode);

    async move {
        debug!(leaves = jobs.len(), "fetching build lists");
        stream::iter(jobs)
            .map(move |job| async move {
                if !job.needs_fetch {
                    return (job, None);
                }
                debug!(repo = %job.repo, "fetching builds");
                let fetched = match timeout_at(deadline, pass.source.fetch_builds(&job.repo)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::DeadlineExceeded),
                };
                (job, Some(fetched))
            })
            .buffer_unordered(concurrency.max(1))
            .collect::<Vec<JobResult>>()
            .await
    }
    .instrument(span)
    .await
}

fn apply(
    tree: &mut ConfigTree,
    mode: &WalkMode,
    job: LeafJob,
    fetched: Option<Result<Vec<Build>, FetchError>>,
    summary: &mut WalkSummary,
) {
    let path = job.path.to_string();
    let no_match = |reason| NoMatch {
        path: path.clone(),
        repo: job.repo.clone(),
        reason,
    };

    let builds = match fetched {
        None => {
            summary.no_match.push(no_match(NoMatchReason::MissingTag));
            return;
        }
        Some(Err(err)) => {
            emit_leaf_skipped(&path, &job.repo, &err);
            summary.skipped.push(SkippedLeaf {
                path: path.clone(),
                repo: job.repo.clone(),
                provider: job.provider,
                reason: err.to_string(),
            });
            return;
        }
        Some(Ok(builds)) => builds,
    };

    let Some(entry) = tree.leaf_mut(&job.path) else {
        debug!(path = %path, "leaf disappeared between plan and apply");
        return;
    };

    match mode {
        WalkMode::Populate => match resolve_tag(entry, &builds) {
            TagResolution::Updated { previous, commit } => {
                emit_tag_updated(&path, &job.repo, previous.as_deref(), &commit);
                summary.tag_updates.push(TagUpdate {
                    path: path.clone(),
                    repo: job.repo.clone(),
                    previous,
                    commit,
                });
            }
            TagResolution::Unchanged { .. } => {
                summary.no_match.push(no_match(NoMatchReason::AlreadyCurrent));
            }
            TagResolution::NoCandidate => {
                summary.no_match.push(no_match(NoMatchReason::NoCandidate));
            }
        },
        WalkMode::Deploy { target } => match match_and_emit(entry, &builds, target) {
            Some(directive) => {
                emit_directive(&directive);
                summary.directives.push(directive);
            }
            None => summary.no_match.push(no_match(NoMatchReason::TagNotFound)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryBuildSource;
    use tracing_test::traced_test;

    fn master_push(number: u64, commit: &str) -> Build {
        Build {
            number,
            branch: "master".to_string(),
            event: "push".to_string(),
            commit: commit.to_string(),
            ..Build::default()
        }
    }

    const TREE: &str = r#"
teamA:
  svc1:
    gitlab: false
    drone_repo: a/1
teamB:
  gitlab: true
  drone_repo: b/2
"#;

    #[tokio::test]
    async fn test_gitlab_pass_only_touches_gitlab_leaves() {
        let mut tree = ConfigTree::from_yaml_str(TREE).unwrap();
        let source = MemoryBuildSource::new().with_builds("b/2", vec![master_push(3, "c3")]);

        let summary = walk(
            &mut tree,
            &source,
            Provider::Gitlab,
            &WalkMode::Populate,
            &WalkOptions::default(),
        )
        .await;

        assert_eq!(source.calls(), vec!["b/2".to_string()]);
        assert_eq!(summary.visited, 1);
        assert_eq!(summary.out_of_scope, 1);
        assert_eq!(summary.tag_updates[0].path, "teamB");
        let leaves = tree.leaves();
        assert!(leaves[0].1.tag().is_none());
        assert_eq!(leaves[1].1.tag(), Some("c3"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_fetches_run_inside_walk_span() {
        let mut tree = ConfigTree::from_yaml_str(TREE).unwrap();
        let source = MemoryBuildSource::new().with_builds("b/2", vec![master_push(3, "c3")]);

        walk(
            &mut tree,
            &source,
            Provider::Gitlab,
            &WalkMode::Populate,
            &WalkOptions::default(),
        )
        .await;

        logs_assert(|lines: &[&str]| {
            let inside = lines.iter().any(|line| {
                line.contains("drone.walk")
                    && line.contains("provider=gitlab")
                    && line.contains("fetching builds")
                    && line.contains("b/2")
            });
            if inside {
                Ok(())
            } else {
                Err("fetch event not recorded inside the walk span".to_string())
            }
        });
    }

    #[tokio::test]
    async fn test_deploy_without_tag_skips_fetch() {
        let mut tree = ConfigTree::from_yaml_str(TREE).unwrap();
        let source = MemoryBuildSource::new().with_builds("b/2", vec![master_push(3, "c3")]);
        let mode = WalkMode::Deploy {
            target: "staging".to_string(),
        };

        let summary = walk(&mut tree, &source, Provider::Gitlab, &mode, &WalkOptions::default())
            .await;

        assert!(source.calls().is_empty());
        assert!(summary.directives.is_empty());
        assert!(summary.skipped.is_empty());
        assert_eq!(summary.no_match[0].reason, NoMatchReason::MissingTag);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated() {
        let text = "x:\n  gitlab: false\n  drone_repo: org/broken\ny:\n  gitlab: false\n  drone_repo: org/ok\n";
        let mut tree = ConfigTree::from_yaml_str(text).unwrap();
        let source = MemoryBuildSource::new().with_builds("org/ok", vec![master_push(1, "ok1")]);

        let summary = walk(
            &mut tree,
            &source,
            Provider::Other,
            &WalkMode::Populate,
            &WalkOptions::default(),
        )
        .await;

        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].repo, "org/broken");
        assert!(summary.skipped[0].reason.contains("404"));
        assert_eq!(summary.tag_updates.len(), 1);
        assert_eq!(summary.tag_updates[0].repo, "org/ok");
    }

    #[tokio::test]
    async fn test_repo_filter_limits_walk() {
        let text = "x:\n  gitlab: false\n  drone_repo: org/a\ny:\n  gitlab: false\n  drone_repo: org/b\n";
        let mut tree = ConfigTree::from_yaml_str(text).unwrap();
        let source = MemoryBuildSource::new().with_builds("org/b", vec![master_push(1, "b1")]);
        let options = WalkOptions {
            repo_filter: Some("org/b".to_string()),
            ..WalkOptions::default()
        };

        let summary = walk(&mut tree, &source, Provider::Other, &WalkMode::Populate, &options).await;

        assert_eq!(source.calls(), vec!["org/b".to_string()]);
        assert_eq!(summary.visited, 1);
        assert_eq!(summary.out_of_scope, 1);
    }
}
