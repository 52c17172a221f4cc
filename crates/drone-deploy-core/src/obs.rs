//! Structured tracing hooks for walk and report lifecycle events.
//!
//! Every event carries an `event` field so log pipelines can filter on it
//! without parsing messages.

use tracing::{debug, info, warn, Span};

use crate::deploy::DeployDirective;
use crate::provider::Provider;

/// Span tagged with the provider and mode of a walk.
///
/// Attach it to the provider's fetch future with `Instrument::instrument`;
/// an entered guard cannot be held across `.await`.
pub fn walk_span(provider: Provider, mode: &str) -> Span {
    tracing::info_span!("drone.walk", provider = %provider, mode = %mode)
}

/// Per-leaf skip detail. The end-of-run summary carries the warning.
pub fn emit_leaf_skipped(path: &str, repo: &str, error: &dyn std::fmt::Display) {
    debug!(event = "leaf.skipped", path = %path, repo = %repo, error = %error);
}

pub fn emit_tag_updated(path: &str, repo: &str, previous: Option<&str>, commit: &str) {
    info!(
        event = "leaf.tag_updated",
        path = %path,
        repo = %repo,
        previous = previous.unwrap_or("-"),
        commit = %commit,
    );
}

pub fn emit_directive(directive: &DeployDirective) {
    info!(
        event = "leaf.deploy_matched",
        repo = %directive.repo,
        build = directive.build_number,
        target = %directive.target,
    );
}

pub fn emit_walk_finished(visited: usize, updated: usize, directives: usize, skipped: usize) {
    info!(
        event = "walk.finished",
        visited = visited,
        updated = updated,
        directives = directives,
        skipped = skipped,
    );
}

pub fn emit_repo_report_skipped(repo: &str, error: &dyn std::fmt::Display) {
    warn!(event = "report.repo_skipped", repo = %repo, error = %error);
}
