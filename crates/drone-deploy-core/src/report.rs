//! Build status reports per repository and environment.
//!
//! Fetching and classification are shared with the walker; everything else
//! here is presentation.

use std::time::Duration;

use chrono::DateTime;
use futures::stream::{self, StreamExt};
use tabled::{Table, Tabled};
use tokio::time::{timeout_at, Instant};

use crate::build::Build;
use crate::classify::{classify, ClassifiedBuilds, DeployTarget};
use crate::error::FetchError;
use crate::fetcher::BuildSource;
use crate::obs::emit_repo_report_skipped;

/// How much of each bucket to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportKind {
    /// Latest build of each environment, one table per repository.
    #[default]
    Summary,
    /// Every build, one table per environment.
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Table,
    /// `key: value` blocks, one per build.
    List,
}

/// Classified builds of one repository, or why they are missing.
#[derive(Debug)]
pub struct RepoReport {
    pub repo: String,
    pub builds: Result<ClassifiedBuilds, FetchError>,
}

/// Repositories to report on: the override, or everything the account sees.
pub async fn report_repositories(
    source: &dyn BuildSource,
    repo_override: Option<&str>,
) -> Result<Vec<String>, FetchError> {
    match repo_override {
        Some(repo) => Ok(vec![repo.to_string()]),
        None => Ok(source
            .list_repos()
            .await?
            .into_iter()
            .map(|r| r.full_name)
            .collect()),
    }
}

/// Fetch and classify every repository, keeping input order.
///
/// Fetches still pending once `deadline` has elapsed from the call are
/// reported as [`FetchError::DeadlineExceeded`].
pub async fn build_report(
    source: &dyn BuildSource,
    repos: Vec<String>,
    concurrency: usize,
    deadline: Duration,
) -> Vec<RepoReport> {
    let deadline = Instant::now() + deadline;

    stream::iter(repos)
        .map(move |repo| async move {
            let builds = match timeout_at(deadline, source.fetch_builds(&repo)).await {
                Ok(result) => result.map(classify),
                Err(_) => Err(FetchError::DeadlineExceeded),
            };
            if let Err(err) = &builds {
                emit_repo_report_skipped(&repo, err);
            }
            RepoReport { repo, builds }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

pub fn render_report(reports: &[RepoReport], kind: ReportKind, format: ReportFormat) -> String {
    reports
        .iter()
        .map(|r| render_repo(r, kind, format))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_repo(report: &RepoReport, kind: ReportKind, format: ReportFormat) -> String {
    let mut out = format!("**{}**\n", report.repo.to_uppercase());

    let classified = match &report.builds {
        Ok(c) => c,
        Err(err) => {
            out.push_str(&format!("skipped {}: {}\n", report.repo, err));
            return out;
        }
    };

    match kind {
        ReportKind::Detailed => {
            for (target, builds) in classified.non_empty() {
                out.push_str(&format!("**{}**\n", target.label()));
                out.push_str(&render_bucket(builds, format));
            }
        }
        ReportKind::Summary => {
            let latest = classified.latest();
            if !latest.is_empty() {
                out.push_str(&render_latest(&latest, format));
            }
        }
    }
    out
}

#[derive(Tabled)]
struct BuildRow {
    #[tabled(rename = "Build")]
    number: u64,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Commit")]
    commit: String,
    #[tabled(rename = "Author")]
    author: String,
}

#[derive(Tabled)]
struct EnvironmentRow {
    #[tabled(rename = "Environment")]
    environment: &'static str,
    #[tabled(rename = "Build")]
    number: u64,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Commit")]
    commit: String,
}

fn render_bucket(builds: &[Build], format: ReportFormat) -> String {
    match format {
        ReportFormat::Table => {
            let rows = builds.iter().map(|b| BuildRow {
                number: b.number,
                date: format_timestamp(b.started_at),
                status: b.status.clone(),
                commit: b.link_url.clone(),
                author: b.author.clone(),
            });
            format!("{}\n", Table::new(rows))
        }
        ReportFormat::List => builds
            .iter()
            .map(|b| {
                format!(
                    "build: {}\ndate: {}\nstatus: {}\ncommit: {}\nauthor: {}\n\n",
                    b.number,
                    format_timestamp(b.started_at),
                    b.status,
                    b.link_url,
                    b.author
                )
            })
            .collect(),
    }
}

fn render_latest(latest: &[(DeployTarget, &Build)], format: ReportFormat) -> String {
    match format {
        ReportFormat::Table => {
            let rows = latest.iter().map(|(target, b)| EnvironmentRow {
                environment: target.label(),
                number: b.number,
                date: format_timestamp(b.started_at),
                status: b.status.clone(),
                commit: b.link_url.clone(),
            });
            format!("{}\n", Table::new(rows))
        }
        ReportFormat::List => latest
            .iter()
            .map(|(target, b)| {
                format!(
                    "environment: {}\nbuild: {}\ndate: {}\nstatus: {}\ncommit: {}\n\n",
                    target.label(),
                    b.number,
                    format_timestamp(b.started_at),
                    b.status,
                    b.link_url
                )
            })
            .collect(),
    }
}

/// Unix seconds as UTC `YYYY-MM-DD HH:MM:SS`; unset renders as `-`.
pub fn format_timestamp(secs: i64) -> String {
    if secs <= 0 {
        return "-".to_string();
    }
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
