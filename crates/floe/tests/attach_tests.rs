//! Integration tests for the attach sequence against in-memory clients.
//!
//! Run with: cargo test -p floe --test attach_tests

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use floe::assess::Assessor;
use floe::attach::{EndpointKind, EndpointOutcome, Orchestrator};
use floe::config::DEFAULT_EXTENSIONS;
use floe::error::{AttachError, RetryError};
use floe_core::FixedBackoff;
use tokio_util::sync::CancellationToken;

use common::{CATALOG_ATTACH, FakeBuckets, FakeCatalogs, RecordingEngine, config};

fn orchestrator(
    buckets: &FakeBuckets,
    catalogs: &FakeCatalogs,
    shutdown: &CancellationToken,
) -> Orchestrator {
    let assessor = Assessor::new(buckets.clone(), catalogs.clone(), FixedBackoff::default());
    let extensions = DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect();
    Orchestrator::new(assessor, extensions, shutdown.clone())
}

fn twelve_tables() -> Vec<String> {
    (1..=12).map(|i| format!("t{i}")).collect()
}

#[tokio::test]
async fn test_existing_lake_attaches_without_provisioning() {
    let config = config();
    let tables = twelve_tables();
    let names: Vec<&str> = tables.iter().map(String::as_str).collect();
    let engine = RecordingEngine::with_tables(&names);
    let (buckets, catalogs) = (FakeBuckets::default(), FakeCatalogs::default());

    let attached = orchestrator(&buckets, &catalogs, &CancellationToken::new())
        .attach(engine.clone(), &config.source, &config.destination)
        .await
        .unwrap();

    let aliases: Vec<_> = attached.session.attached().map(|a| a.id()).collect();
    assert_eq!(aliases, vec!["lake", "pgsrc", "s3a"]);
    assert_eq!(attached.tables.len(), 12);
    assert!(attached.provisioned.is_none());
    assert!(!attached.report.is_degraded());

    // The destination was never checked.
    assert_eq!(buckets.calls.load(Ordering::SeqCst), 0);

    let state = engine.snapshot();
    assert_eq!(state.count("INSTALL"), 0);
    assert_eq!(state.count(CATALOG_ATTACH), 1);
    assert_eq!(state.executed.last().map(String::as_str), Some("USE lake"));
}

#[tokio::test]
async fn test_statements_run_in_dependency_order() {
    let config = config();
    let engine = RecordingEngine::with_tables(&["orders"]);

    orchestrator(&FakeBuckets::default(), &FakeCatalogs::default(), &CancellationToken::new())
        .attach(engine.clone(), &config.source, &config.destination)
        .await
        .unwrap();

    let state = engine.snapshot();
    let order = [
        "SECRET lake_files",
        "SECRET s3a_secret",
        "SECRET pgsrc_secret",
        "AS pgsrc",
        "SECRET lake_secret",
        CATALOG_ATTACH,
        "USE lake",
    ];
    let positions: Vec<usize> = order
        .iter()
        .map(|fragment| state.position(fragment).unwrap_or_else(|| panic!("{fragment} not run")))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", state.executed);
}

#[tokio::test]
async fn test_empty_lake_is_provisioned() {
    let config = config();
    let engine = RecordingEngine::with_tables(&[]);
    engine.push_tables(&["orders"]);
    let (buckets, catalogs) = (FakeBuckets::default(), FakeCatalogs::default());

    let attached = orchestrator(&buckets, &catalogs, &CancellationToken::new())
        .attach(engine.clone(), &config.source, &config.destination)
        .await
        .unwrap();

    let ready = attached.provisioned.expect("destination should be provisioned");
    assert_eq!(ready.attempts, 1);
    assert!(ready.bucket_created);
    assert!(ready.database_created);
    assert_eq!(*buckets.created.lock().unwrap(), vec!["lake"]);
    assert_eq!(*catalogs.created.lock().unwrap(), vec!["lake_catalog"]);
    assert_eq!(catalogs.open_sessions.load(Ordering::SeqCst), 0);
    assert_eq!(attached.tables, vec!["orders"]);

    let state = engine.snapshot();
    let installs: Vec<usize> = DEFAULT_EXTENSIONS
        .iter()
        .map(|e| state.position(&format!("INSTALL {e};")).unwrap())
        .collect();
    assert!(installs.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(state.count(CATALOG_ATTACH), 2);
}

#[tokio::test]
async fn test_failed_catalog_attach_triggers_provisioning() {
    let config = config();
    let engine = RecordingEngine::with_tables(&["orders"]);
    engine.fail_times(CATALOG_ATTACH, 1);

    let attached = orchestrator(&FakeBuckets::default(), &FakeCatalogs::default(), &CancellationToken::new())
        .attach(engine.clone(), &config.source, &config.destination)
        .await
        .unwrap();

    assert!(attached.provisioned.is_some());
    assert!(!attached.report.is_degraded());
    assert!(attached.session.attached().any(|a| a.id() == "lake"));
}

#[tokio::test]
async fn test_extension_failure_is_fatal() {
    let config = config();
    let engine = RecordingEngine::with_tables(&[]);
    engine.fail_on("INSTALL httpfs");

    let result = orchestrator(&FakeBuckets::default(), &FakeCatalogs::default(), &CancellationToken::new())
        .attach(engine.clone(), &config.source, &config.destination)
        .await;

    match result {
        Err(AttachError::Extension { extension, .. }) => assert_eq!(extension, "httpfs"),
        Err(other) => panic!("expected extension failure, got {other}"),
        Ok(_) => panic!("expected extension failure"),
    }
    assert_eq!(engine.snapshot().count("INSTALL excel"), 0);
}

#[tokio::test]
async fn test_source_failure_is_isolated() {
    let config = config();
    let engine = RecordingEngine::with_tables(&["orders"]);
    engine.fail_on("AS pgsrc");

    let attached = orchestrator(&FakeBuckets::default(), &FakeCatalogs::default(), &CancellationToken::new())
        .attach(engine.clone(), &config.source, &config.destination)
        .await
        .unwrap();

    assert!(attached.report.is_degraded());
    let failed: Vec<_> = attached.report.failed().map(|s| (s.alias.id(), s.kind)).collect();
    assert_eq!(failed, vec![("pgsrc", EndpointKind::Postgres)]);

    let aliases: Vec<_> = attached.session.attached().map(|a| a.id()).collect();
    assert_eq!(aliases, vec!["lake", "s3a"]);
    assert!(attached.provisioned.is_none());
}

#[tokio::test]
async fn test_rejected_secrets_do_not_reveal_credentials() {
    let config = config();
    let engine = RecordingEngine::with_tables(&["orders"]);
    engine.fail_on("SECRET pgsrc_secret");
    engine.fail_on("SECRET lake_secret");

    let attached = orchestrator(&FakeBuckets::default(), &FakeCatalogs::default(), &CancellationToken::new())
        .attach(engine.clone(), &config.source, &config.destination)
        .await
        .unwrap();

    let failed: Vec<_> = attached.report.failed().collect();
    assert_eq!(failed.len(), 1);
    let EndpointOutcome::Failed { reason } = &failed[0].outcome else {
        panic!("pgsrc should have failed");
    };
    assert!(reason.contains("pgsrc_secret"), "{reason}");
    assert!(reason.contains("[REDACTED]"), "{reason}");
    for credential in ["s3cr3t-pg", "reader"] {
        assert!(!reason.contains(credential), "{reason}");
    }
    assert!(!format!("{:?}", attached.report).contains("s3cr3t"));

    // The statements did reach the engine with their credentials.
    let state = engine.snapshot();
    assert_eq!(state.count("s3cr3t-pg"), 1);
    assert_eq!(state.count("s3cr3t-lake"), 1);
}

#[tokio::test]
async fn test_catalog_still_failing_after_provisioning() {
    let config = config();
    let engine = RecordingEngine::with_tables(&["orders"]);
    engine.fail_on(CATALOG_ATTACH);

    let result = orchestrator(&FakeBuckets::default(), &FakeCatalogs::default(), &CancellationToken::new())
        .attach(engine.clone(), &config.source, &config.destination)
        .await;

    match result {
        Err(AttachError::CatalogUnavailable { alias, .. }) => assert_eq!(alias, "lake"),
        Err(other) => panic!("expected catalog failure, got {other}"),
        Ok(_) => panic!("expected catalog failure"),
    }
    assert_eq!(engine.snapshot().count(CATALOG_ATTACH), 2);
}

#[tokio::test]
async fn test_lake_still_empty_after_provisioning_is_accepted() {
    let config = config();
    let engine = RecordingEngine::with_tables(&[]);

    let attached = orchestrator(&FakeBuckets::default(), &FakeCatalogs::default(), &CancellationToken::new())
        .attach(engine.clone(), &config.source, &config.destination)
        .await
        .unwrap();

    assert!(attached.tables.is_empty());
    assert!(attached.provisioned.is_some());
    assert_eq!(engine.snapshot().executed.last().map(String::as_str), Some("USE lake"));
}

#[tokio::test(start_paused = true)]
async fn test_assessment_waits_for_unreachable_storage() {
    let config = config();
    let engine = RecordingEngine::with_tables(&[]);
    engine.push_tables(&["orders"]);
    let buckets = FakeBuckets::unreachable_for(3);

    let start = tokio::time::Instant::now();
    let attached = orchestrator(&buckets, &FakeCatalogs::default(), &CancellationToken::new())
        .attach(engine, &config.source, &config.destination)
        .await
        .unwrap();

    let ready = attached.provisioned.unwrap();
    assert_eq!(ready.attempts, 4);
    assert_eq!(buckets.calls.load(Ordering::SeqCst), 4);
    assert!(start.elapsed() >= Duration::from_secs(9));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_assessment() {
    let config = config();
    let engine = RecordingEngine::with_tables(&[]);
    let buckets = FakeBuckets::unreachable_for(usize::MAX);
    let shutdown = CancellationToken::new();

    let canceller = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        canceller.cancel();
    });

    let result = orchestrator(&buckets, &FakeCatalogs::default(), &shutdown)
        .attach(engine, &config.source, &config.destination)
        .await;

    assert!(matches!(
        result,
        Err(AttachError::Assess {
            source: RetryError::Cancelled { .. }
        })
    ));
}
