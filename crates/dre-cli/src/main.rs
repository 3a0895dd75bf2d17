use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dre_storage::FeedLocation;
use dre_sync::{maybe_build_scheduler, StalenessPolicy, SyncConfig, SyncPipeline, SyncRunSummary};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "dre-cli")]
#[command(about = "Diário da República procurement tracker")]
struct Cli {
    /// Root directory for snapshots, the active registry and feeds.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    /// YAML file overriding section markers and field patterns.
    #[arg(long, global = true)]
    profile: Option<PathBuf>,
    /// Serve detail pages from a recorded index instead of a browser.
    #[arg(long, global = true)]
    replay_pages: Option<PathBuf>,
    /// Default log filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Default, Args)]
struct SyncArgs {
    /// Feed URL or local XML file.
    #[arg(long)]
    feed: Option<String>,
    /// Scrape every page even if today's snapshot already has its details.
    #[arg(long)]
    no_resume: bool,
    /// `retain` or `deadline:<grace_days>`.
    #[arg(long)]
    staleness: Option<String>,
}

impl SyncArgs {
    fn apply(self, config: &mut SyncConfig) -> Result<()> {
        if let Some(feed) = self.feed {
            config.feed = FeedLocation::parse(&feed);
        }
        if self.no_resume {
            config.resume = false;
        }
        if let Some(policy) = self.staleness {
            config.staleness = StalenessPolicy::parse(&policy)?;
        }
        Ok(())
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the pipeline once.
    Sync(SyncArgs),
    /// Run on the configured cron schedule until Ctrl-C.
    Watch(SyncArgs),
    /// Regenerate the output feed from the persisted registry.
    Feed,
    /// Apply the staleness policy to the persisted registry.
    Prune {
        #[arg(long)]
        staleness: Option<String>,
    },
    /// Render one detail page and print the extracted fields as JSON.
    Scrape { url: String },
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(summary: &SyncRunSummary) {
    println!(
        "sync complete: run_id={} items={} detailed={} reused={} basic_only={} registry={} removed={} failures={}",
        summary.run_id,
        summary.basic_records,
        summary.detailed,
        summary.reused,
        summary.basic_only,
        summary.registry_size,
        summary.removed_stale,
        summary.persistence_failures.len()
    );
    for failure in &summary.persistence_failures {
        eprintln!("  not persisted: {failure}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = SyncConfig::from_env();
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(profile) = cli.profile {
        config.extraction_profile = Some(profile);
    }
    if cli.replay_pages.is_some() {
        config.replay_pages = cli.replay_pages;
    }

    match cli.command.unwrap_or(Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => {
            args.apply(&mut config)?;
            let summary = SyncPipeline::new(config)?.run_once().await?;
            print_summary(&summary);
        }
        Commands::Watch(args) => {
            args.apply(&mut config)?;
            config.scheduler_enabled = true;
            let crons = [config.sync_cron_1.clone(), config.sync_cron_2.clone()];
            let pipeline = Arc::new(SyncPipeline::new(config)?);
            let mut sched = maybe_build_scheduler(pipeline)
                .await?
                .context("scheduler was not built")?;
            sched.start().await.context("starting scheduler")?;
            info!(cron_1 = %crons[0], cron_2 = %crons[1], "watching; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
        Commands::Feed => {
            let (path, items) = SyncPipeline::new(config)?.regenerate_feed().await?;
            println!("feed written: {} ({items} items)", path.display());
        }
        Commands::Prune { staleness } => {
            if let Some(policy) = staleness {
                config.staleness = StalenessPolicy::parse(&policy)?;
            }
            if config.staleness == StalenessPolicy::Retain {
                println!("staleness policy is retain; nothing to prune");
                return Ok(());
            }
            let expired = SyncPipeline::new(config)?.prune_registry().await?;
            println!("pruned {} expired procedures", expired.len());
        }
        Commands::Scrape { url } => {
            let page = SyncPipeline::new(config)?
                .scrape_one(&url)
                .await
                .with_context(|| format!("scraping {url}"))?;
            let json = serde_json::to_string_pretty(&page.detail).context("serializing detail")?;
            println!("{json}");
        }
    }

    Ok(())
}
