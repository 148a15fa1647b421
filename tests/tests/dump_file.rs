//! Scheduler runs writing real dump files.

use std::sync::Arc;
use std::time::Duration;

use integration_tests::fixtures::{self, at, unix, VisitSeed};
use integration_tests::setup::TestContext;
use purge_core::RunConfig;
use worker::{PurgeScheduler, RunMode, SchedulerConfig};

fn scheduler(ctx: &TestContext, config: RunConfig, scheduler: SchedulerConfig) -> PurgeScheduler {
    PurgeScheduler::new(Arc::new(ctx.dialect(config)), scheduler).with_clock(ctx.clock.clone())
}

/// A drained site produces one loadable file holding every purged row.
#[tokio::test]
async fn test_site_drain_writes_one_file() {
    let ctx = TestContext::new();
    VisitSeed::new(7, 1, 25, at(3, 12)).insert_into(&ctx.store);
    fixtures::seed_site_tables(&ctx.store, 7);
    let dir = tempfile::tempdir().unwrap();

    let purge = scheduler(
        &ctx,
        RunConfig::site(7).with_limit(10),
        SchedulerConfig {
            dump_dir: dir.path().join("dumps"),
            file_prefix: "piwik".into(),
            ..Default::default()
        },
    );
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let reports = purge.run(rx).await.unwrap();

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.invocations, 4);
    assert_eq!(report.visits_processed, 25);
    assert!(report.completed);

    let path = report.dump_path.clone().unwrap();
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("piwik-site-7-20130201-030000.sql")
    );

    let content = tokio::fs::read_to_string(&path).await.unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[1], "--  Mysql Dump");
    assert!(lines.contains(&"SET FOREIGN_KEY_CHECKS=0;"));
    assert_eq!(lines.last(), Some(&"-- "));
    assert_eq!(content.matches("INSERT INTO `piwik_log_visit` ").count(), 25);
    assert_eq!(content.matches("INSERT INTO `piwik_log_link_visit_action` ").count(), 50);
    assert_eq!(content.matches("INSERT INTO `piwik_site` ").count(), 1);
    assert_eq!(content.matches("-- Mysql Dump End").count(), 1);
}

/// Historical files are labelled with the cutoff.
#[tokio::test]
async fn test_once_mode_historical_label() {
    let ctx = TestContext::new();
    VisitSeed::new(1, 1, 5, at(3, 12)).insert_into(&ctx.store);
    let dir = tempfile::tempdir().unwrap();

    let purge = scheduler(
        &ctx,
        RunConfig::historical(unix(at(15, 0))),
        SchedulerConfig {
            mode: RunMode::Once,
            dump_dir: dir.path().to_path_buf(),
            ..Default::default()
        },
    );
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let reports = purge.run(rx).await.unwrap();

    let path = reports[0].dump_path.clone().unwrap();
    assert!(path
        .to_string_lossy()
        .ends_with("purge-until-20130115-000000-20130201-030000.sql"));
    assert_eq!(reports[0].visits_processed, 5);
    assert_eq!(ctx.row_count("piwik_log_visit"), 0);
}

/// Schedule mode drains on the first tick and stops on shutdown.
#[tokio::test]
async fn test_schedule_mode_stops_on_shutdown() {
    let ctx = TestContext::new();
    VisitSeed::new(1, 1, 12, at(3, 12)).insert_into(&ctx.store);
    let dir = tempfile::tempdir().unwrap();

    let purge = scheduler(
        &ctx,
        RunConfig::historical(unix(at(15, 0))).with_limit(5),
        SchedulerConfig {
            mode: RunMode::Schedule,
            interval: Duration::from_secs(3600),
            dump_dir: dir.path().to_path_buf(),
            ..Default::default()
        },
    );
    let (tx, rx) = tokio::sync::watch::channel(false);

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).ok();
    });
    let reports = purge.run(rx).await.unwrap();
    stopper.await.unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].visits_processed, 12);
    assert!(reports[0].completed);
    assert_eq!(ctx.row_count("piwik_log_visit"), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

/// Once a site is gone, later schedule ticks find nothing and write nothing.
#[tokio::test]
async fn test_schedule_mode_finished_site_writes_one_file() {
    let ctx = TestContext::new();
    VisitSeed::new(3, 1, 1, at(3, 12)).insert_into(&ctx.store);
    fixtures::seed_site_tables(&ctx.store, 3);
    let dir = tempfile::tempdir().unwrap();

    let purge = scheduler(
        &ctx,
        RunConfig::site(3),
        SchedulerConfig {
            mode: RunMode::Schedule,
            interval: Duration::from_millis(40),
            dump_dir: dir.path().to_path_buf(),
            ..Default::default()
        },
    );
    let (tx, rx) = tokio::sync::watch::channel(false);

    // a second passing per tick gives every drain its own file name
    let clock = ctx.clock.clone();
    let stopper = tokio::spawn(async move {
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            clock.advance(chrono::Duration::seconds(1));
        }
        tx.send(true).ok();
    });
    let reports = purge.run(rx).await.unwrap();
    stopper.await.unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].visits_processed, 1);
    assert!(reports[0].completed);
    assert_eq!(ctx.row_count("piwik_site"), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
