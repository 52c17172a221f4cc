//! In-memory [`BuildSource`] for tests and dry runs.
//!
//! Records every call, can fail chosen repositories, and can delay responses
//! to exercise deadlines and bounded concurrency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::build::{Build, Repository};
use crate::error::FetchError;
use crate::fetcher::BuildSource;

#[derive(Debug, Default)]
pub struct MemoryBuildSource {
    builds: HashMap<String, Vec<Build>>,
    failing: HashMap<String, u16>,
    repos: Option<Vec<Repository>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryBuildSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `builds` for `repo`, newest first.
    pub fn with_builds(mut self, repo: &str, builds: Vec<Build>) -> Self {
        self.builds.insert(repo.to_string(), builds);
        self
    }

    /// Answer `repo` with HTTP `status`.
    pub fn with_failure(mut self, repo: &str, status: u16) -> Self {
        self.failing.insert(repo.to_string(), status);
        self
    }

    /// Fix the `list_repos` answer; otherwise it lists every served repo.
    pub fn with_repos(mut self, repos: &[&str]) -> Self {
        self.repos = Some(repos.iter().map(|r| Repository::new(*r)).collect());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Repositories passed to `fetch_builds`, in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Highest number of overlapping `fetch_builds` calls seen.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildSource for MemoryBuildSource {
    async fn fetch_builds(&self, repo: &str) -> Result<Vec<Build>, FetchError> {
        lock(&self.calls).push(repo.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let url = format!("memory:///api/repos/{repo}/builds");
        if let Some(&status) = self.failing.get(repo) {
            return Err(FetchError::Status { url, status });
        }
        self.builds
            .get(repo)
            .cloned()
            .ok_or(FetchError::Status { url, status: 404 })
    }

    async fn list_repos(&self) -> Result<Vec<Repository>, FetchError> {
        if let Some(repos) = &self.repos {
            return Ok(repos.clone());
        }
        let mut names: Vec<&String> = self.builds.keys().chain(self.failing.keys()).collect();
        names.sort();
        names.dedup();
        Ok(names.into_iter().map(|n| Repository::new(n.as_str())).collect())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
