//! drone-deploy - Drone CI release promotion CLI
//!
//! ## Commands
//!
//! - `report`: Show the builds of each repository grouped by environment
//! - `populate`: Record the latest release commit of every repository in the config
//! - `deploy`: Print a `deploy <repo> <build> <target>` line for every recorded commit
//!
//! Server endpoints and tokens come from `DRONE_SERVER`/`DRONE_TOKEN` and
//! `GITLAB_DRONE_SERVER`/`GITLAB_DRONE_TOKEN`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};

use drone_deploy_core::{
    build_report, parse_target, render_report, report_repositories, walk_all, ConfigTree,
    DroneClient, Provider, ProviderEndpoints, ProviderPass, ReportFormat, ReportKind, WalkMode,
    WalkOptions, WalkSummary, DEFAULT_CONCURRENCY,
};

#[derive(Parser)]
#[command(name = "drone-deploy")]
#[command(author = "Platform Engineering")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Promote Drone CI builds between environments", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show builds per repository and environment
    Report {
        /// Latest build per environment, or every build
        #[arg(short = 't', long = "type", value_enum, default_value = "summary")]
        kind: ReportKindArg,

        /// Output layout
        #[arg(short, long, value_enum, default_value = "table")]
        format: ReportFormatArg,

        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Write the latest release commit of each repository into the config
    Populate {
        /// Config document to read
        #[arg(short, long, default_value = "blocal.yml")]
        config: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Print deploy directives for the commits recorded in the config
    Deploy {
        /// Environment to deploy to (e.g. staging, production)
        #[arg(long)]
        target: String,

        /// Config document to read
        #[arg(short, long, default_value = "blocal.yml")]
        config: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        tuning: TuningArgs,
    },
}

#[derive(Args)]
struct ScopeArgs {
    /// Only this repository (requires --store)
    #[arg(long, requires = "store")]
    repo: Option<String>,

    /// Only this provider
    #[arg(long, value_enum)]
    store: Option<StoreArg>,
}

impl ScopeArgs {
    fn providers(&self) -> Vec<Provider> {
        match self.store {
            Some(store) => vec![store.into()],
            None => Provider::ALL.to_vec(),
        }
    }
}

#[derive(Args)]
struct TuningArgs {
    /// Concurrent requests per provider
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Overall deadline in seconds
    #[arg(long, default_value_t = 300)]
    deadline_secs: u64,
}

impl TuningArgs {
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    fn walk_options(&self, repo: Option<&str>) -> WalkOptions {
        WalkOptions {
            concurrency: self.concurrency.max(1),
            deadline: self.deadline(),
            repo_filter: repo.map(str::to_string),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreArg {
    Gitlab,
    Other,
}

impl From<StoreArg> for Provider {
    fn from(store: StoreArg) -> Self {
        match store {
            StoreArg::Gitlab => Provider::Gitlab,
            StoreArg::Other => Provider::Other,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportKindArg {
    Summary,
    Detailed,
}

impl From<ReportKindArg> for ReportKind {
    fn from(kind: ReportKindArg) -> Self {
        match kind {
            ReportKindArg::Summary => ReportKind::Summary,
            ReportKindArg::Detailed => ReportKind::Detailed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormatArg {
    Table,
    List,
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(format: ReportFormatArg) -> Self {
        match format {
            ReportFormatArg::Table => ReportFormat::Table,
            ReportFormatArg::List => ReportFormat::List,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    drone_deploy_core::init_tracing(cli.json, level);

    // All four endpoint variables are required up front
    let endpoints =
        ProviderEndpoints::from_env().context("Failed to resolve Drone server settings")?;

    match cli.command {
        Commands::Report {
            kind,
            format,
            scope,
            tuning,
        } => cmd_report(&endpoints, kind.into(), format.into(), &scope, &tuning).await,
        Commands::Populate {
            config,
            output,
            scope,
            tuning,
        } => cmd_populate(&endpoints, &config, output.as_deref(), &scope, &tuning).await,
        Commands::Deploy {
            target,
            config,
            scope,
            tuning,
        } => cmd_deploy(&endpoints, &target, &config, &scope, &tuning).await,
    }
}

/// One HTTP client per selected provider.
fn build_clients(
    endpoints: &ProviderEndpoints,
    providers: &[Provider],
    request_timeout: Duration,
) -> Result<Vec<DroneClient>> {
    providers
        .iter()
        .map(|&provider| {
            DroneClient::new(endpoints.get(provider).clone(), request_timeout)
                .with_context(|| format!("Failed to create {} client", provider))
        })
        .collect()
}

fn load_config(path: &Path) -> Result<ConfigTree> {
    ConfigTree::load(path).with_context(|| format!("Failed to load config {:?}", path))
}

/// Report builds per repository
async fn cmd_report(
    endpoints: &ProviderEndpoints,
    kind: ReportKind,
    format: ReportFormat,
    scope: &ScopeArgs,
    tuning: &TuningArgs,
) -> Result<()> {
    let clients = build_clients(endpoints, &scope.providers(), tuning.request_timeout())?;
    let deadline = Instant::now() + tuning.deadline();

    for client in &clients {
        let provider = client.context().provider;
        let repos = match report_repositories(client, scope.repo.as_deref()).await {
            Ok(repos) => repos,
            Err(err) => {
                warn!(provider = %provider, error = %err, "repository listing failed");
                println!("skipped {} repositories: {}", provider, err);
                continue;
            }
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let reports = build_report(client, repos, tuning.concurrency, remaining).await;
        if !reports.is_empty() {
            println!("{}", render_report(&reports, kind, format));
        }
    }

    Ok(())
}

/// Record latest release commits in the config document
async fn cmd_populate(
    endpoints: &ProviderEndpoints,
    config: &Path,
    output: Option<&Path>,
    scope: &ScopeArgs,
    tuning: &TuningArgs,
) -> Result<()> {
    let mut tree = load_config(config)?;
    let clients = build_clients(endpoints, &scope.providers(), tuning.request_timeout())?;
    let passes = provider_passes(&clients);

    let summary = walk_all(
        &mut tree,
        &passes,
        &WalkMode::Populate,
        &tuning.walk_options(scope.repo.as_deref()),
    )
    .await;
    log_summary(&summary);

    match output {
        Some(path) => {
            tree.save(path)
                .with_context(|| format!("Failed to write config {:?}", path))?;
            info!(path = ?path, updated = summary.tag_updates.len(), "config written");
        }
        None => {
            let text = tree
                .to_yaml_string()
                .context("Failed to serialize config")?;
            print!("{}", text);
        }
    }

    Ok(())
}

/// Print deploy directives for recorded commits
async fn cmd_deploy(
    endpoints: &ProviderEndpoints,
    target: &str,
    config: &Path,
    scope: &ScopeArgs,
    tuning: &TuningArgs,
) -> Result<()> {
    let target = parse_target(target).context("Invalid --target")?;
    let mut tree = load_config(config)?;
    let clients = build_clients(endpoints, &scope.providers(), tuning.request_timeout())?;
    let passes = provider_passes(&clients);

    let summary = walk_all(
        &mut tree,
        &passes,
        &WalkMode::Deploy { target },
        &tuning.walk_options(scope.repo.as_deref()),
    )
    .await;
    log_summary(&summary);

    for directive in &summary.directives {
        println!("{}", directive);
    }

    Ok(())
}

fn provider_passes(clients: &[DroneClient]) -> Vec<ProviderPass<'_>> {
    clients
        .iter()
        .map(|client| ProviderPass::new(client.context().provider, client))
        .collect()
}

fn log_summary(summary: &WalkSummary) {
    for skipped in &summary.skipped {
        warn!(
            provider = %skipped.provider,
            path = %skipped.path,
            repo = %skipped.repo,
            reason = %skipped.reason,
            "leaf skipped"
        );
    }
    info!(
        visited = summary.visited,
        out_of_scope = summary.out_of_scope,
        updated = summary.tag_updates.len(),
        directives = summary.directives.len(),
        no_match = summary.no_match.len(),
        skipped = summary.skipped.len(),
        "walk complete"
    );
}
