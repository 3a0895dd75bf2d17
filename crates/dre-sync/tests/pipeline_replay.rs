use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use dre_core::ProcedureRecord;
use dre_storage::FeedLocation;
use dre_sync::{ExpiredRecord, RunReport, StalenessPolicy, SyncConfig, SyncPipeline};
use tempfile::tempdir;

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root")
}

fn replay_config(output_dir: &Path) -> SyncConfig {
    let root = workspace_root();
    SyncConfig {
        feed: FeedLocation::Path(root.join("fixtures/feed/serie2-parte-l.xml")),
        output_dir: output_dir.to_path_buf(),
        replay_pages: Some(root.join("fixtures/detail/index.json")),
        ..SyncConfig::default()
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

fn read_registry(output_dir: &Path) -> Vec<ProcedureRecord> {
    let text = std::fs::read_to_string(output_dir.join("data/ativos.json")).expect("ativos.json");
    serde_json::from_str(&text).expect("parse ativos.json")
}

#[tokio::test]
async fn first_run_writes_every_artifact() {
    let dir = tempdir().unwrap();
    let pipeline = SyncPipeline::new(replay_config(dir.path())).unwrap();

    let summary = pipeline.run_for_date(today()).await.unwrap();
    assert_eq!(summary.feed_items, 4);
    assert_eq!(summary.basic_records, 3);
    assert_eq!(summary.detailed, 2);
    assert_eq!(summary.basic_only, 1);
    assert_eq!(summary.reused, 0);
    assert_eq!(summary.registry_size, 3);
    assert_eq!(summary.merge.inserted, 3);
    assert!(summary.persistence_failures.is_empty(), "{:?}", summary.persistence_failures);

    for rel in [
        "RSS/procedimentos_basicos.json",
        "RSS/procedimentos_completos.json",
        "RSS/feed_raw.xml",
        "RSS/feed_rss_procedimentos.xml",
        "data/16-10-2026.json",
        "data/ativos.json",
    ] {
        assert!(dir.path().join(rel).exists(), "{rel} missing");
    }

    let report_path = dir.path().join("runs").join(format!("{}.json", summary.run_id));
    let report: RunReport = serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
    assert_eq!(report.items.len(), 3);
    assert!(summary.artifacts.iter().any(|a| a.kind == "detail_page"));
    assert!(summary.artifacts.iter().any(|a| a.path == "data/ativos.json"));
}

#[tokio::test]
async fn page_without_section_keeps_only_basic_fields() {
    let dir = tempdir().unwrap();
    let pipeline = SyncPipeline::new(replay_config(dir.path())).unwrap();
    pipeline.run_for_date(today()).await.unwrap();

    let registry = read_registry(dir.path());
    let retificacao = registry
        .iter()
        .find(|r| r.basic.link.ends_with("declaracao-retificacao/900000003"))
        .expect("basic-only record kept");
    assert_eq!(retificacao.basic.procedure_number, "N/A");
    assert!(retificacao.detail.is_none());

    let raw: Vec<serde_json::Value> = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("data/ativos.json")).unwrap(),
    )
    .unwrap();
    let keys = raw
        .iter()
        .find(|v| v["numero_procedimento"] == "N/A")
        .and_then(|v| v.as_object())
        .map(|o| o.len());
    assert_eq!(keys, Some(3));

    let feed = std::fs::read(dir.path().join("RSS/feed_rss_procedimentos.xml")).unwrap();
    assert_eq!(dre_adapters::parse_feed(&feed).unwrap().len(), registry.len());
}

#[tokio::test]
async fn repeated_runs_are_idempotent() {
    let dir = tempdir().unwrap();
    let pipeline = SyncPipeline::new(replay_config(dir.path())).unwrap();

    pipeline.run_for_date(today()).await.unwrap();
    let first = std::fs::read(dir.path().join("data/ativos.json")).unwrap();

    let second_summary = pipeline.run_for_date(today()).await.unwrap();
    let second = std::fs::read(dir.path().join("data/ativos.json")).unwrap();
    assert_eq!(first, second);
    assert_eq!(second_summary.reused, 2);
    assert_eq!(second_summary.basic_only, 1);
    assert_eq!(second_summary.merge.inserted, 0);
    assert_eq!(second_summary.merge.refreshed, 3);

    let fresh = SyncPipeline::new(SyncConfig {
        resume: false,
        ..replay_config(dir.path())
    })
    .unwrap();
    let third_summary = fresh.run_for_date(today()).await.unwrap();
    assert_eq!(third_summary.reused, 0);
    assert_eq!(std::fs::read(dir.path().join("data/ativos.json")).unwrap(), first);
}

#[tokio::test]
async fn entries_absent_from_the_feed_are_retained() {
    let dir = tempdir().unwrap();
    let pipeline = SyncPipeline::new(replay_config(dir.path())).unwrap();
    pipeline.run_for_date(today()).await.unwrap();

    let empty_feed = dir.path().join("empty.xml");
    std::fs::write(&empty_feed, "<rss version=\"2.0\"><channel><title>x</title></channel></rss>").unwrap();
    let later = SyncPipeline::new(SyncConfig {
        feed: FeedLocation::Path(empty_feed),
        ..replay_config(dir.path())
    })
    .unwrap();
    let summary = later
        .run_for_date(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap())
        .await
        .unwrap();
    assert_eq!(summary.feed_items, 0);
    assert_eq!(summary.registry_size, 3);
    assert_eq!(summary.merge.retained, 3);
}

#[tokio::test]
async fn deadline_policy_archives_expired_procedures() {
    let dir = tempdir().unwrap();
    let pipeline = SyncPipeline::new(SyncConfig {
        staleness: StalenessPolicy::DeadlinePassed { grace_days: 0 },
        ..replay_config(dir.path())
    })
    .unwrap();
    let summary = pipeline.run_for_date(today()).await.unwrap();
    assert!(summary.removed_stale >= 1);

    let archive: Vec<ExpiredRecord> = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("data/expirados.json")).unwrap(),
    )
    .unwrap();
    assert!(archive
        .iter()
        .any(|e| e.record.basic.procedure_number == "88"));
    assert!(read_registry(dir.path())
        .iter()
        .all(|r| r.basic.procedure_number != "88"));
}

#[tokio::test]
async fn malformed_feed_fails_the_run_without_touching_the_registry() {
    let dir = tempdir().unwrap();
    let broken = dir.path().join("broken.xml");
    std::fs::write(&broken, "<rss><channel><item><title>x</link></item></channel></rss>").unwrap();

    let pipeline = SyncPipeline::new(SyncConfig {
        feed: FeedLocation::Path(broken),
        ..replay_config(dir.path())
    })
    .unwrap();
    let err = pipeline.run_for_date(today()).await.unwrap_err();
    assert!(format!("{err:#}").contains("parsing feed"));
    assert!(!dir.path().join("data/ativos.json").exists());
}

#[tokio::test]
async fn unwritable_snapshot_dir_is_reported_and_later_steps_still_run() {
    let dir = tempdir().unwrap();
    // A plain file where the RSS/ directory should be.
    std::fs::write(dir.path().join("RSS"), b"not a directory").unwrap();

    let pipeline = SyncPipeline::new(replay_config(dir.path())).unwrap();
    let summary = pipeline.run_for_date(today()).await.unwrap();

    let failed_steps: Vec<&str> = summary
        .persistence_failures
        .iter()
        .filter_map(|f| f.split(':').next())
        .collect();
    assert!(failed_steps.contains(&"basic_snapshot"), "{failed_steps:?}");
    assert!(failed_steps.contains(&"full_snapshot"), "{failed_steps:?}");
    assert!(failed_steps.contains(&"output_feed"), "{failed_steps:?}");

    assert!(dir.path().join("data/16-10-2026.json").exists());
    assert_eq!(read_registry(dir.path()).len(), 3);
    assert_eq!(summary.registry_size, 3);
    assert!(dir
        .path()
        .join("runs")
        .join(format!("{}.json", summary.run_id))
        .exists());
}
