//! End to end purge runs against an in-memory Piwik schema.
//!
//! Every delete is checked against the dump captured so far, so each test
//! also verifies that no row is removed before its INSERT was written.

use integration_tests::fixtures::{self, at, unix, VisitSeed};
use integration_tests::setup::TestContext;
use purge_core::RunConfig;
use worker::Dialect;

fn cutoff_config(limit: u32) -> RunConfig {
    RunConfig::historical(unix(at(15, 0))).with_limit(limit)
}

/// Historical purge removes old visits in one pass and then reports done.
#[tokio::test]
async fn test_historical_purge_then_done() {
    let ctx = TestContext::new();
    VisitSeed::new(1, 1, 120, at(3, 12)).insert_into(&ctx.store);
    VisitSeed::new(1, 1001, 30, at(20, 12)).insert_into(&ctx.store);

    let dialect = ctx.dialect(cutoff_config(500));
    let mut out = ctx.writer();

    assert_eq!(dialect.execute(&mut out).await.unwrap(), 120);
    assert_eq!(dialect.execute(&mut out).await.unwrap(), 0);

    assert_eq!(ctx.row_count("piwik_log_visit"), 30);
    assert_eq!(ctx.row_count("piwik_log_link_visit_action"), 60);
    assert_eq!(ctx.row_count("piwik_log_conversion"), 30);
    assert_eq!(ctx.row_count("piwik_log_conversion_item"), 30);

    assert_eq!(ctx.inserts_for("piwik_log_visit").len(), 120);
    assert_eq!(ctx.inserts_for("piwik_log_link_visit_action").len(), 240);
    assert!(ctx.storage.violations().is_empty());
}

/// Historical mode never touches site configuration or archives.
#[tokio::test]
async fn test_historical_purge_skips_site_tables() {
    let ctx = TestContext::new();
    VisitSeed::new(4, 1, 5, at(3, 12)).insert_into(&ctx.store);
    fixtures::seed_site_tables(&ctx.store, 4);

    let dialect = ctx.dialect(cutoff_config(500));
    let mut out = ctx.writer();

    assert_eq!(dialect.execute(&mut out).await.unwrap(), 5);
    assert_eq!(dialect.execute(&mut out).await.unwrap(), 0);

    for table in fixtures::SITE_TABLES.iter().chain(&fixtures::ARCHIVE_TABLES) {
        assert_eq!(ctx.row_count(table), 1, "table {}", table);
    }
}

/// 85 visits: dependents go in slices of 40, 40 and 5; visits in 50 and 35.
#[tokio::test]
async fn test_slice_boundaries() {
    let ctx = TestContext::new();
    VisitSeed::new(1, 1, 85, at(3, 12)).insert_into(&ctx.store);

    let dialect = ctx.dialect(cutoff_config(500));
    let mut out = ctx.writer();

    assert_eq!(dialect.execute(&mut out).await.unwrap(), 85);

    let journal = ctx.journal();
    let deletes = |table: &str| {
        let prefix = format!("DELETE FROM `{}` ", table);
        journal
            .iter()
            .filter(|sql| sql.starts_with(&prefix))
            .cloned()
            .collect::<Vec<_>>()
    };

    let action_deletes = deletes("piwik_log_link_visit_action");
    assert_eq!(action_deletes.len(), 3);
    assert!(action_deletes[0].ends_with("IN (1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21,22,23,24,25,26,27,28,29,30,31,32,33,34,35,36,37,38,39,40)"));
    assert!(action_deletes[2].ends_with("IN (81,82,83,84,85)"));

    assert_eq!(deletes("piwik_log_conversion").len(), 3);
    assert_eq!(deletes("piwik_log_conversion_item").len(), 3);
    assert_eq!(deletes("piwik_log_visit").len(), 2);

    // limit 500 pages dependents by 50: 80 rows, 80 rows, 10 rows
    let action_selects = journal
        .iter()
        .filter(|sql| sql.starts_with("SELECT * FROM `piwik_log_link_visit_action`"))
        .count();
    assert_eq!(action_selects, 5);
    assert!(ctx.storage.violations().is_empty());
}

/// Dependents are written before the visits of the same pass.
#[tokio::test]
async fn test_dependents_dumped_before_visits() {
    let ctx = TestContext::new();
    VisitSeed::new(1, 1, 10, at(3, 12)).insert_into(&ctx.store);

    let dialect = ctx.dialect(cutoff_config(500));
    let mut out = ctx.writer();
    dialect.execute(&mut out).await.unwrap();

    let lines = ctx.lines();
    let first_visit = lines
        .iter()
        .position(|l| l.starts_with("INSERT INTO `piwik_log_visit` "))
        .unwrap();
    let last_dependent = lines
        .iter()
        .rposition(|l| !l.starts_with("INSERT INTO `piwik_log_visit` "))
        .unwrap();
    assert!(last_dependent < first_visit);
}

/// Binary columns are hex, text is escaped, NULL stays bare.
#[tokio::test]
async fn test_dump_literals() {
    let ctx = TestContext::new();
    ctx.store
        .insert("piwik_log_visit", fixtures::visit(258, 1, at(3, 12)));

    let dialect = ctx.dialect(cutoff_config(500));
    let mut out = ctx.writer();
    dialect.execute(&mut out).await.unwrap();

    let visits = ctx.inserts_for("piwik_log_visit");
    assert_eq!(visits.len(), 1);
    assert_eq!(
        visits[0],
        "INSERT INTO `piwik_log_visit` (`idvisit`,`idsite`,`idvisitor`,`visit_last_action_time`,\
         `config_id`,`location_ip`,`referer_name`,`custom_var_k1`) VALUES (258,1,\
         0x0000000000000102,'2013-01-03 12:00:00',0xdeadbeef,0x0a000003,\
         'O\\'Reilly \\\\ Partners',NULL);"
    );
}

/// Small limits take several invocations without dumping any row twice.
#[tokio::test]
async fn test_resumption_dumps_each_visit_once() {
    let ctx = TestContext::new();
    VisitSeed::new(1, 1, 47, at(3, 12)).insert_into(&ctx.store);

    let dialect = ctx.dialect(cutoff_config(10));
    let mut out = ctx.writer();

    let mut counts = Vec::new();
    loop {
        let n = dialect.execute(&mut out).await.unwrap();
        counts.push(n);
        if n == 0 {
            break;
        }
    }

    assert_eq!(counts, vec![10, 10, 10, 10, 7, 0]);
    let visits = ctx.inserts_for("piwik_log_visit");
    assert_eq!(visits.len(), 47);
    let mut unique = visits.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 47);
    assert!(ctx.storage.violations().is_empty());
}

/// The count and the extraction select exactly the same visits.
#[tokio::test]
async fn test_count_matches_processed() {
    let ctx = TestContext::new();
    VisitSeed::new(1, 1, 70, at(14, 23)).insert_into(&ctx.store);
    // exactly at the cutoff: kept
    VisitSeed::new(1, 500, 3, at(15, 0)).insert_into(&ctx.store);
    VisitSeed::new(2, 900, 12, at(16, 1)).insert_into(&ctx.store);

    let dialect = ctx.dialect(cutoff_config(500));
    let mut out = ctx.writer();

    let pending = dialect.count_matching().await.unwrap();
    assert_eq!(pending, 70);
    assert_eq!(dialect.execute(&mut out).await.unwrap(), pending);
    assert_eq!(dialect.count_matching().await.unwrap(), 0);
    assert_eq!(ctx.row_count("piwik_log_visit"), 15);
}

/// Site mode drains the site's visits, then its archives and configuration.
#[tokio::test]
async fn test_site_purge() {
    let ctx = TestContext::new();
    VisitSeed::new(7, 1, 30, at(3, 12)).insert_into(&ctx.store);
    VisitSeed::new(8, 100, 10, at(3, 12)).insert_into(&ctx.store);
    fixtures::seed_site_tables(&ctx.store, 7);
    fixtures::seed_site_tables(&ctx.store, 8);

    let dialect = ctx.dialect(RunConfig::site(7).with_limit(20));
    let mut out = ctx.writer();

    assert_eq!(dialect.execute(&mut out).await.unwrap(), 20);
    assert_eq!(dialect.execute(&mut out).await.unwrap(), 10);
    // site tables stay untouched while visits remain
    assert!(ctx.inserts_for("piwik_site").is_empty());

    assert_eq!(dialect.execute(&mut out).await.unwrap(), 0);

    assert_eq!(ctx.row_count("piwik_log_visit"), 10);
    for table in fixtures::SITE_TABLES.iter().chain(&fixtures::ARCHIVE_TABLES) {
        assert_eq!(ctx.row_count(table), 1, "table {}", table);
        assert_eq!(ctx.inserts_for(table).len(), 1, "table {}", table);
    }

    let blob = &ctx.inserts_for("piwik_archive_blob_2013_01")[0];
    assert!(blob.ends_with("VALUES (70,7,'Referers_keywordBySearchEngine',0x789c0300);"));

    // archives come before the fixed tables
    let lines = ctx.lines();
    let archive = lines
        .iter()
        .position(|l| l.starts_with("INSERT INTO `piwik_archive_"))
        .unwrap();
    let goal = lines
        .iter()
        .position(|l| l.starts_with("INSERT INTO `piwik_goal`"))
        .unwrap();
    assert!(archive < goal);

    // a finished site stays finished
    let before = ctx.lines().len();
    assert_eq!(dialect.execute(&mut out).await.unwrap(), 0);
    assert_eq!(ctx.lines().len(), before);
    assert!(ctx.storage.violations().is_empty());
}

/// Tables offered for optimization after a purge.
#[tokio::test]
async fn test_tables_to_optimize() {
    let ctx = TestContext::new();
    let dialect = ctx.dialect(RunConfig::site(7));

    let tables = dialect.tables_to_optimize().await.unwrap();
    assert_eq!(tables.len(), 10);
    assert_eq!(tables[0], "piwik_archive_blob_2013_01");
    assert_eq!(tables[1], "piwik_archive_numeric_2013_01");
    assert!(tables.contains(&"piwik_log_visit".to_string()));
    assert!(tables.contains(&"piwik_access".to_string()));

    for table in &tables {
        dialect.optimize_table(table).await.unwrap();
    }
    assert!(ctx
        .journal()
        .contains(&"OPTIMIZE TABLE `piwik_site`".to_string()));
}
