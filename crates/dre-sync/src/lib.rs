//! Sync pipeline orchestration: fetch, parse, scrape, snapshot, merge, publish.

pub mod feed_out;
pub mod registry;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use dre_adapters::{
    basic_from_item, parse_feed, ChromiumRenderer, DetailScraper, ExtractionProfile, FixtureRenderer,
    PageRenderer, RenderSettings, ScrapeError, ScrapedPage, SettleMode,
};
use dre_core::{ProcedureBasic, ProcedureRecord};
use dre_storage::{
    fetch_feed, read_json_opt, write_atomic, write_json_atomic, ArtifactStore, FeedLocation, HttpClientConfig, HttpFetcher,
    StoredArtifact,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use feed_out::{FeedChannel, FeedGenerator};
pub use registry::{
    parse_deadline, registry_from_records, ActiveRegistry, ExpiredRecord, MergeStats, RegistryManager,
    RegistryMerger, StalenessPolicy,
};

pub const CRATE_NAME: &str = "dre-sync";

pub const DEFAULT_FEED_URL: &str = "https://files.diariodarepublica.pt/rss/serie2&parte=l-html.xml";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub feed: FeedLocation,
    pub output_dir: PathBuf,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub render: RenderSettings,
    pub chromium_path: Option<PathBuf>,
    pub extraction_profile: Option<PathBuf>,
    pub replay_pages: Option<PathBuf>,
    pub staleness: StalenessPolicy,
    pub debug_artifacts: bool,
    pub resume: bool,
    pub scheduler_enabled: bool,
    pub sync_cron_1: String,
    pub sync_cron_2: String,
    pub channel: FeedChannel,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            feed: FeedLocation::parse(DEFAULT_FEED_URL),
            output_dir: PathBuf::from("."),
            http_timeout_secs: 30,
            user_agent: "dre-bot/0.1".to_string(),
            render: RenderSettings::default(),
            chromium_path: None,
            extraction_profile: None,
            replay_pages: None,
            staleness: StalenessPolicy::Retain,
            debug_artifacts: true,
            resume: true,
            scheduler_enabled: false,
            sync_cron_1: "0 0 6 * * *".to_string(),
            sync_cron_2: "0 0 18 * * *".to_string(),
            channel: FeedChannel::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let staleness = match std::env::var("DRE_STALENESS") {
            Ok(raw) => StalenessPolicy::parse(&raw).unwrap_or_else(|err| {
                warn!(error = %err, "ignoring DRE_STALENESS; entries are retained");
                StalenessPolicy::Retain
            }),
            Err(_) => defaults.staleness,
        };

        let settle_mode = match std::env::var("DRE_SETTLE_MODE") {
            Ok(raw) => SettleMode::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unknown DRE_SETTLE_MODE; polling for markers");
                SettleMode::Poll
            }),
            Err(_) => defaults.render.settle_mode,
        };

        let mut channel = defaults.channel.clone();
        if let Ok(title) = std::env::var("DRE_FEED_TITLE") {
            channel.title = title;
        }
        if let Ok(link) = std::env::var("DRE_FEED_LINK") {
            channel.link = link;
        }

        Self {
            feed: std::env::var("DRE_FEED_URL")
                .map(|v| FeedLocation::parse(&v))
                .unwrap_or(defaults.feed),
            output_dir: std::env::var("DRE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            http_timeout_secs: env_parse("DRE_HTTP_TIMEOUT_SECS").unwrap_or(defaults.http_timeout_secs),
            user_agent: std::env::var("DRE_USER_AGENT").unwrap_or(defaults.user_agent),
            render: RenderSettings {
                ready_timeout: env_parse("DRE_RENDER_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.render.ready_timeout),
                settle_budget: env_parse("DRE_SETTLE_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.render.settle_budget),
                settle_mode,
            },
            chromium_path: std::env::var("DRE_CHROMIUM_PATH").ok().map(PathBuf::from),
            extraction_profile: std::env::var("DRE_EXTRACTION_PROFILE").ok().map(PathBuf::from),
            replay_pages: None,
            staleness,
            debug_artifacts: env_flag("DRE_DEBUG_ARTIFACTS").unwrap_or(defaults.debug_artifacts),
            resume: defaults.resume,
            scheduler_enabled: env_flag("DRE_SCHEDULER_ENABLED").unwrap_or(defaults.scheduler_enabled),
            sync_cron_1: std::env::var("DRE_SYNC_CRON_1").unwrap_or(defaults.sync_cron_1),
            sync_cron_2: std::env::var("DRE_SYNC_CRON_2").unwrap_or(defaults.sync_cron_2),
            channel,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True" | "yes"))
}

/// `DD-MM-YYYY.json`, the dated snapshot name for `date`.
pub fn dated_snapshot_filename(date: NaiveDate) -> String {
    date.format("%d-%m-%Y.json").to_string()
}

/// Fixed relative locations of every persisted file.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn basic_snapshot(&self) -> PathBuf {
        self.root.join("RSS").join("procedimentos_basicos.json")
    }

    pub fn full_snapshot(&self) -> PathBuf {
        self.root.join("RSS").join("procedimentos_completos.json")
    }

    pub fn raw_feed(&self) -> PathBuf {
        self.root.join("RSS").join("feed_raw.xml")
    }

    pub fn output_feed(&self) -> PathBuf {
        self.root.join("RSS").join("feed_rss_procedimentos.xml")
    }

    pub fn dated_snapshot(&self, date: NaiveDate) -> PathBuf {
        self.root.join("data").join(dated_snapshot_filename(date))
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    pub fn run_report(&self, run_id: Uuid) -> PathBuf {
        self.root.join("runs").join(format!("{run_id}.json"))
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root).unwrap_or(path).display().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub kind: String,
    pub path: String,
    pub sha256: String,
    pub bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub feed_items: usize,
    pub basic_records: usize,
    pub detailed: usize,
    pub basic_only: usize,
    pub reused: usize,
    pub registry_size: usize,
    pub merge: MergeStats,
    pub removed_stale: usize,
    pub persistence_failures: Vec<String>,
    pub artifacts: Vec<ArtifactRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Detailed,
    Reused,
    BasicOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub identity: String,
    pub link: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub missing_fields: Vec<String>,
}

/// Contents of `runs/<run_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub summary: SyncRunSummary,
    pub items: Vec<ItemOutcome>,
}

#[derive(Debug, Default)]
struct RunLedger {
    artifacts: Vec<ArtifactRecord>,
    failures: Vec<String>,
}

impl RunLedger {
    fn record(&mut self, kind: &str, path: String, bytes: &[u8]) {
        self.artifacts.push(ArtifactRecord {
            kind: kind.to_string(),
            path,
            sha256: ArtifactStore::sha256_hex(bytes),
            bytes: bytes.len(),
        });
    }

    fn record_stored(&mut self, kind: &str, artifact: &StoredArtifact) {
        self.artifacts.push(ArtifactRecord {
            kind: kind.to_string(),
            path: Path::new("artifacts")
                .join(&artifact.relative_path)
                .display()
                .to_string(),
            sha256: artifact.content_hash.clone(),
            bytes: artifact.byte_size,
        });
    }

    fn failed(&mut self, step: &str, err: &anyhow::Error) {
        warn!(step, error = %format!("{err:#}"), "persistence step failed; continuing");
        self.failures.push(format!("{step}: {err:#}"));
    }
}

pub struct SyncPipeline {
    config: SyncConfig,
    layout: OutputLayout,
    http: HttpFetcher,
    scraper: DetailScraper,
    artifact_store: ArtifactStore,
    registry: RegistryManager,
    feed: FeedGenerator,
    run_lock: Mutex<()>,
}

impl SyncPipeline {
    /// Pipeline with the renderer selected by `config`: replayed pages when
    /// `replay_pages` is set, headless Chromium otherwise.
    pub fn new(config: SyncConfig) -> Result<Self> {
        let renderer: Box<dyn PageRenderer> = match &config.replay_pages {
            Some(index) => {
                let fixtures = FixtureRenderer::from_index(index)?;
                info!(pages = fixtures.len(), index = %index.display(), "replaying recorded detail pages");
                Box::new(fixtures)
            }
            None => Box::new(ChromiumRenderer::new(config.chromium_path.clone())),
        };
        Self::with_renderer(config, renderer)
    }

    pub fn with_renderer(config: SyncConfig, renderer: Box<dyn PageRenderer>) -> Result<Self> {
        let layout = OutputLayout::new(config.output_dir.clone());
        let artifact_store = ArtifactStore::new(layout.artifacts_dir());

        let profile = match &config.extraction_profile {
            Some(path) => ExtractionProfile::load(path)?,
            None => ExtractionProfile::default(),
        };
        let mut scraper = DetailScraper::from_profile(renderer, &profile, config.render)
            .context("compiling extraction profile")?;
        if config.debug_artifacts {
            scraper = scraper.with_debug_store(artifact_store.clone());
        }

        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?;

        Ok(Self {
            registry: RegistryManager::new(&config.output_dir),
            feed: FeedGenerator::new(config.channel.clone()),
            config,
            layout,
            http,
            scraper,
            artifact_store,
            run_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// One full run dated with the local calendar day.
    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        self.run_for_date(Local::now().date_naive()).await
    }

    /// One full run whose dated snapshot is named after `today`. Runs are
    /// serialized; a second caller waits for the first to finish.
    pub async fn run_for_date(&self, today: NaiveDate) -> Result<SyncRunSummary> {
        let _guard = self.run_lock.lock().await;
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id);
        self.execute(run_id, today).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, today: NaiveDate) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let mut ledger = RunLedger::default();

        info!(feed = %self.config.feed, "fetching feed");
        let bytes = fetch_feed(&self.http, &self.config.feed)
            .await
            .with_context(|| format!("fetching feed {}", self.config.feed))?;
        self.cache_raw_feed(&bytes, started_at, &mut ledger).await;

        let items = parse_feed(&bytes).context("parsing feed")?;
        info!(items = items.len(), "feed parsed");

        let mut basics = Vec::with_capacity(items.len());
        for item in &items {
            match basic_from_item(item) {
                Some(basic) => basics.push(basic),
                None => warn!(title = %item.title, "feed item without link skipped"),
            }
        }

        let reusable = self.reusable_details(today).await;

        let mut records = Vec::with_capacity(basics.len());
        let mut outcomes = Vec::with_capacity(basics.len());
        for (index, basic) in basics.iter().enumerate() {
            info!(
                n = index + 1,
                of = basics.len(),
                procedure = %basic.procedure_number,
                "processing procedure"
            );
            let (record, outcome) = match reusable.get(&basic.link) {
                Some(previous) => (
                    ProcedureRecord {
                        basic: basic.clone(),
                        detail: previous.detail.clone(),
                    },
                    outcome(basic, ItemStatus::Reused, None, Vec::new()),
                ),
                None => self.scrape_item(basic, &mut ledger).await,
            };
            records.push(record);
            outcomes.push(outcome);
        }

        let count = |status| outcomes.iter().filter(|o| o.status == status).count();
        let (detailed, reused, basic_only) = (
            count(ItemStatus::Detailed),
            count(ItemStatus::Reused),
            count(ItemStatus::BasicOnly),
        );
        info!(detailed, reused, basic_only, "detail extraction finished");

        self.persist_json(&mut ledger, "basic_snapshot", &self.layout.basic_snapshot(), &basics)
            .await;
        self.persist_json(&mut ledger, "full_snapshot", &self.layout.full_snapshot(), &records)
            .await;
        let dated_path = self.layout.dated_snapshot(today);
        let dated_written = self
            .persist_json(&mut ledger, "dated_snapshot", &dated_path, &records)
            .await;

        let fresh = if dated_written {
            match self.registry.update_from_date_file(&dated_path).await {
                Ok(from_file) => from_file,
                Err(err) => {
                    ledger.failed("dated_snapshot_reload", &err);
                    records.clone()
                }
            }
        } else {
            records.clone()
        };

        let mut merge = MergeStats::default();
        let mut removed_stale = 0;
        let mut registry_size = 0;
        match self.registry.merge_with_existing(fresh).await {
            Ok((mut registry, stats)) => {
                merge = stats;
                match self
                    .registry
                    .prune(&mut registry, self.config.staleness, Utc::now())
                    .await
                {
                    Ok(expired) => removed_stale = expired.len(),
                    Err(err) => ledger.failed("staleness_archive", &err),
                }
                registry_size = registry.len();

                match self.registry.save(&registry).await {
                    Ok(path) => {
                        if let Ok(bytes) = tokio::fs::read(&path).await {
                            ledger.record("registry", self.layout.relative(&path), &bytes);
                        }
                        info!(path = %path.display(), entries = registry_size, "registry saved");
                    }
                    Err(err) => ledger.failed("registry", &err),
                }

                self.publish_feed(&registry, &mut ledger).await;
            }
            // An unreadable registry is never overwritten.
            Err(err) => ledger.failed("registry_merge", &err),
        }

        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            feed_items: items.len(),
            basic_records: basics.len(),
            detailed,
            basic_only,
            reused,
            registry_size,
            merge,
            removed_stale,
            persistence_failures: ledger.failures,
            artifacts: ledger.artifacts,
        };

        let report = RunReport {
            summary,
            items: outcomes,
        };
        let report_path = self.layout.run_report(run_id);
        let mut summary = report.summary.clone();
        if let Err(err) = write_json_atomic(&report_path, &report).await {
            warn!(error = %format!("{err:#}"), "run report not written");
            summary.persistence_failures.push(format!("run_report: {err:#}"));
        }

        info!(
            feed_items = summary.feed_items,
            registry_size = summary.registry_size,
            failures = summary.persistence_failures.len(),
            "sync run finished"
        );
        Ok(summary)
    }

    async fn cache_raw_feed(&self, bytes: &[u8], fetched_at: DateTime<Utc>, ledger: &mut RunLedger) {
        let raw_path = self.layout.raw_feed();
        let from_cache = matches!(&self.config.feed, FeedLocation::Path(p) if p == &raw_path);
        if !from_cache {
            match write_atomic(&raw_path, bytes).await {
                Ok(()) => ledger.record("raw_feed", self.layout.relative(&raw_path), bytes),
                Err(err) => ledger.failed("raw_feed", &err),
            }
        }
        match self
            .artifact_store
            .store_bytes(fetched_at, "feed", "xml", bytes)
            .await
        {
            Ok(artifact) => ledger.record_stored("feed_artifact", &artifact),
            Err(err) => ledger.failed("feed_artifact", &err),
        }
    }

    /// Detailed records of today's snapshot, by link, unless resume is off.
    async fn reusable_details(&self, today: NaiveDate) -> HashMap<String, ProcedureRecord> {
        if !self.config.resume {
            return HashMap::new();
        }
        let path = self.layout.dated_snapshot(today);
        match read_json_opt::<Vec<ProcedureRecord>>(&path).await {
            Ok(Some(previous)) => {
                let reusable: HashMap<_, _> = previous
                    .into_iter()
                    .filter(ProcedureRecord::has_detail)
                    .map(|r| (r.basic.link.clone(), r))
                    .collect();
                info!(reusable = reusable.len(), path = %path.display(), "resuming from today's snapshot");
                reusable
            }
            Ok(None) => HashMap::new(),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "today's snapshot unreadable; scraping everything");
                HashMap::new()
            }
        }
    }

    async fn scrape_item(&self, basic: &ProcedureBasic, ledger: &mut RunLedger) -> (ProcedureRecord, ItemOutcome) {
        match self.scraper.scrape(&basic.link).await {
            Ok(page) => {
                if let Some(artifact) = &page.debug_artifact {
                    ledger.record_stored("detail_page", artifact);
                }
                let missing = page
                    .detail
                    .missing_fields()
                    .iter()
                    .map(|f| f.key().to_string())
                    .collect();
                info!(link = %basic.link, "details extracted");
                (
                    ProcedureRecord::with_detail(basic.clone(), page.detail),
                    outcome(basic, ItemStatus::Detailed, None, missing),
                )
            }
            Err(err) => {
                warn!(link = %basic.link, error = %err, "details unavailable; keeping basic record");
                (
                    ProcedureRecord::basic_only(basic.clone()),
                    outcome(basic, ItemStatus::BasicOnly, Some(err.to_string()), Vec::new()),
                )
            }
        }
    }

    async fn persist_json<T: Serialize + Sync + ?Sized>(
        &self,
        ledger: &mut RunLedger,
        kind: &str,
        path: &Path,
        value: &T,
    ) -> bool {
        match write_json_atomic(path, value).await {
            Ok(bytes) => {
                info!(path = %path.display(), "snapshot written");
                ledger.record(kind, self.layout.relative(path), &bytes);
                true
            }
            Err(err) => {
                ledger.failed(kind, &err);
                false
            }
        }
    }

    async fn publish_feed(&self, registry: &ActiveRegistry, ledger: &mut RunLedger) {
        let path = self.layout.output_feed();
        let rendered = self.feed.render(registry, Utc::now());
        let result = match rendered {
            Ok(xml) => write_atomic(&path, xml.as_bytes()).await.map(|()| xml),
            Err(err) => Err(err),
        };
        match result {
            Ok(xml) => {
                info!(path = %path.display(), items = registry.len(), "output feed written");
                ledger.record("output_feed", self.layout.relative(&path), xml.as_bytes());
            }
            Err(err) => ledger.failed("output_feed", &err),
        }
    }

    /// Rebuild the output feed from the persisted registry alone.
    pub async fn regenerate_feed(&self) -> Result<(PathBuf, usize)> {
        let registry = self.registry.load().await?;
        let path = self.layout.output_feed();
        self.feed.write(&registry, Utc::now(), &path).await?;
        info!(path = %path.display(), items = registry.len(), "output feed regenerated");
        Ok((path, registry.len()))
    }

    /// Apply the configured staleness policy to the persisted registry.
    pub async fn prune_registry(&self) -> Result<Vec<ExpiredRecord>> {
        let _guard = self.run_lock.lock().await;
        let mut registry = self.registry.load().await?;
        let expired = self
            .registry
            .prune(&mut registry, self.config.staleness, Utc::now())
            .await?;
        if !expired.is_empty() {
            self.registry.save(&registry).await?;
        }
        Ok(expired)
    }

    /// Render and extract a single detail page.
    pub async fn scrape_one(&self, url: &str) -> Result<ScrapedPage, ScrapeError> {
        self.scraper.scrape(url).await
    }
}

fn outcome(basic: &ProcedureBasic, status: ItemStatus, error: Option<String>, missing_fields: Vec<String>) -> ItemOutcome {
    ItemOutcome {
        identity: basic.identity_key().to_string(),
        link: basic.link.clone(),
        status,
        error,
        missing_fields,
    }
}

/// Cron-driven runs of `pipeline`, when the scheduler is enabled.
pub async fn maybe_build_scheduler(pipeline: Arc<SyncPipeline>) -> Result<Option<JobScheduler>> {
    if !pipeline.config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let crons = [
        pipeline.config.sync_cron_1.clone(),
        pipeline.config.sync_cron_2.clone(),
    ];
    for cron in crons {
        let job_pipeline = Arc::clone(&pipeline);
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let pipeline = Arc::clone(&job_pipeline);
            Box::pin(async move {
                match pipeline.run_once().await {
                    Ok(summary) => info!(
                        run_id = %summary.run_id,
                        registry_size = summary.registry_size,
                        "scheduled sync finished"
                    ),
                    Err(err) => error!(error = %format!("{err:#}"), "scheduled sync failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
    }
    Ok(Some(sched))
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    SyncPipeline::new(SyncConfig::from_env())?.run_once().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dated_snapshot_name_is_day_month_year() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert_eq!(dated_snapshot_filename(date), "16-10-2026.json");
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(dated_snapshot_filename(date), "05-01-2026.json");
    }

    #[test]
    fn layout_uses_legacy_relative_paths() {
        let layout = OutputLayout::new("/srv/dre");
        assert_eq!(
            layout.basic_snapshot(),
            PathBuf::from("/srv/dre/RSS/procedimentos_basicos.json")
        );
        assert_eq!(
            layout.output_feed(),
            PathBuf::from("/srv/dre/RSS/feed_rss_procedimentos.xml")
        );
        assert_eq!(
            layout.relative(&layout.dated_snapshot(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap())),
            "data/16-10-2026.json"
        );
    }

    #[test]
    fn defaults_match_the_gazette_feed() {
        let config = SyncConfig::default();
        assert_eq!(config.feed, FeedLocation::Url(DEFAULT_FEED_URL.to_string()));
        assert_eq!(config.staleness, StalenessPolicy::Retain);
        assert_eq!(config.sync_cron_1, "0 0 6 * * *");
        assert!(config.resume);
    }

    #[tokio::test]
    async fn scheduler_is_not_built_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig {
            output_dir: dir.path().to_path_buf(),
            ..SyncConfig::default()
        };
        let pipeline = Arc::new(SyncPipeline::with_renderer(config, Box::new(FixtureRenderer::new())).unwrap());
        assert!(maybe_build_scheduler(pipeline).await.unwrap().is_none());
    }
}
