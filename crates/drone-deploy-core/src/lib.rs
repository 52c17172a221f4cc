//! drone-deploy core library.
//!
//! Queries Drone CI servers for build history, classifies builds by
//! deployment environment, and maintains a YAML document recording which
//! commit of each repository is due for promotion.
//!
//! ## Modes
//!
//! - **report**: [`report::build_report`] + [`report::render_report`]
//! - **populate**: [`walker::walk_all`] with [`WalkMode::Populate`]
//! - **deploy**: [`walker::walk_all`] with [`WalkMode::Deploy`], yielding
//!   [`DeployDirective`]s for an external executor

pub mod build;
pub mod classify;
pub mod config_tree;
pub mod deploy;
pub mod error;
pub mod fakes;
pub mod fetcher;
pub mod obs;
pub mod provider;
pub mod report;
pub mod resolve;
pub mod telemetry;
pub mod walker;

pub use build::{Build, Repository, RELEASE_BRANCH, RELEASE_EVENTS};
pub use classify::{classify, ClassifiedBuilds, DeployTarget};
pub use config_tree::{ConfigNode, ConfigTree, LeafPath, RepoEntry};
pub use deploy::{find_tagged_build, match_and_emit, parse_target, DeployDirective};
pub use error::{ConfigError, DroneError, FetchError, Result};
pub use fetcher::{BuildSource, DroneClient, DEFAULT_REQUEST_TIMEOUT};
pub use provider::{Provider, ProviderContext, ProviderEndpoints};
pub use report::{
    build_report, format_timestamp, render_report, render_repo, report_repositories,
    RepoReport, ReportFormat, ReportKind,
};
pub use resolve::{latest_release_build, resolve_tag, TagResolution};
pub use telemetry::init_tracing;
pub use walker::{
    walk, walk_all, NoMatch, NoMatchReason, ProviderPass, SkippedLeaf, TagUpdate, WalkMode,
    WalkOptions, WalkSummary, DEFAULT_CONCURRENCY, DEFAULT_DEADLINE,
};

/// drone-deploy version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
