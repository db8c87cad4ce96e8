//! Detail crawl tests
//!
//! These drive `crawl_with` end to end over the scripted site: partitioning,
//! the worker pool, session handling, extraction and persistence.

use crate::support::{dish_page, dish_url, fake_images, test_config, FakeSite};
use nutri_harvest::crawler::{build_detail_record, crawl_with, CrawlOptions, DetailKind};
use nutri_harvest::output::{load_snapshot, write_records};
use nutri_harvest::state::{FailureReason, Record};
use std::collections::HashSet;
use std::sync::Arc;

fn ids(records: &[Record]) -> Vec<u64> {
    let mut ids: Vec<u64> = records.iter().map(Record::id).collect();
    ids.sort_unstable();
    ids
}

fn failures_starting_with<'a>(records: &'a [Record], prefix: &str) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|r| r.error().map(|e| e.starts_with(prefix)).unwrap_or(false))
        .collect()
}

#[tokio::test]
async fn test_detail_crawl_one_record_per_unit() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(FakeSite::new().with_dishes(1..=10));
    let config = test_config("dish-detail", 1, 10, 3, 2, dir.path(), false);

    let summary = crawl_with(&config, &CrawlOptions::default(), site.launcher(), fake_images())
        .await
        .unwrap();

    assert_eq!(summary.units_total, 10);
    assert_eq!(summary.units_succeeded, 10);
    assert_eq!(summary.units_failed, 0);

    let progress = load_snapshot(&config.output.progress_path()).unwrap().unwrap();
    assert_eq!(ids(&progress), (1..=10).collect::<Vec<_>>());

    let complete = load_snapshot(&config.output.complete_path()).unwrap().unwrap();
    assert_eq!(complete.len(), 10);
    let unique: HashSet<u64> = complete.iter().map(Record::id).collect();
    assert_eq!(unique.len(), 10);

    // ceil(10 / 3) sessions, every one of them closed
    assert_eq!(site.launches(), 4);
    assert_eq!(site.closes(), 4);

    let Some(Record::Detail(seven)) = complete.iter().find(|r| r.id() == 7) else {
        panic!("unit 7 should have a detail record");
    };
    assert_eq!(seven.name, "Dish 7");
    assert_eq!(seven.ingredients, "Tofu");
    assert_eq!(seven.macronutrients, "Energy 7kcal");
    assert_eq!(seven.image_url, "https://img.nutridata.test/dish/7.png");
    assert!(seven.image_path.ends_with("7.png"));
    assert!(config.output.image_path().join("7.png").exists());
    assert!(config.output.summary_path().exists());
}

#[tokio::test]
async fn test_failed_login_only_affects_its_batch() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(FakeSite::new().with_dishes(1..=9).failing_login(2));
    let config = test_config("dish-detail", 1, 9, 3, 3, dir.path(), true);

    let summary = crawl_with(&config, &CrawlOptions::default(), site.launcher(), fake_images())
        .await
        .unwrap();

    let records = load_snapshot(&config.output.complete_path()).unwrap().unwrap();
    assert_eq!(ids(&records), (1..=9).collect::<Vec<_>>());

    let failed = failures_starting_with(&records, "authentication failed");
    assert_eq!(failed.len(), 3);
    assert_eq!(records.iter().filter(|r| r.is_success()).count(), 6);
    assert_eq!(summary.failure_reasons.get("authentication failed"), Some(&3));

    // A failed login still releases its browser
    assert_eq!(site.closes(), 3);
}

#[tokio::test]
async fn test_session_init_failure_fails_whole_batch() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(FakeSite::new().with_dishes(1..=6).failing_launch(1));
    let config = test_config("dish-detail", 1, 6, 3, 1, dir.path(), false);

    let summary = crawl_with(&config, &CrawlOptions::default(), site.launcher(), fake_images())
        .await
        .unwrap();

    let records = load_snapshot(&config.output.complete_path()).unwrap().unwrap();
    assert_eq!(records.len(), 6);
    assert_eq!(failures_starting_with(&records, "session init failed").len(), 3);
    assert_eq!(summary.units_succeeded, 3);
    assert_eq!(summary.units_failed, 3);

    assert_eq!(site.launches(), 2);
    assert_eq!(site.closes(), 1);
}

#[tokio::test]
async fn test_lost_session_fails_rest_of_batch() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(
        FakeSite::new()
            .with_dishes(1..=6)
            .fatal_at(dish_url(5)),
    );
    let config = test_config("dish-detail", 1, 6, 3, 1, dir.path(), false);

    crawl_with(&config, &CrawlOptions::default(), site.launcher(), fake_images())
        .await
        .unwrap();

    let records = load_snapshot(&config.output.complete_path()).unwrap().unwrap();
    assert_eq!(ids(&records), (1..=6).collect::<Vec<_>>());

    let failed: Vec<u64> = ids(&records
        .iter()
        .filter(|r| !r.is_success())
        .cloned()
        .collect::<Vec<_>>());
    assert_eq!(failed, vec![5, 6]);
    assert_eq!(failures_starting_with(&records, "batch failed").len(), 2);

    // Unit 6 is never attempted once the browser is gone
    assert!(!site.visited().contains(&dish_url(6)));
}

#[tokio::test]
async fn test_worker_pool_bounds_open_browsers() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(FakeSite::new().with_dishes(1..=12));
    let config = test_config("dish-detail", 1, 12, 2, 2, dir.path(), false);

    let summary = crawl_with(&config, &CrawlOptions::default(), site.launcher(), fake_images())
        .await
        .unwrap();
    assert_eq!(summary.units_succeeded, 12);

    // Six batches, never more than two browsers open at once
    assert_eq!(site.launches(), 6);
    assert_eq!(site.closes(), 6);
    assert_eq!(site.peak_sessions(), 2);

    // Every browser served exactly one batch
    let mut served: Vec<Vec<String>> = (1..=6).map(|n| site.visited_by(n)).collect();
    served.sort();
    let mut batches: Vec<Vec<String>> = (0..6u64)
        .map(|b| vec![dish_url(2 * b + 1), dish_url(2 * b + 2)])
        .collect();
    batches.sort();
    assert_eq!(served, batches);
}

#[tokio::test]
async fn test_panicking_worker_fails_only_its_batch() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(FakeSite::new().with_dishes(1..=6).panic_at(dish_url(2)));
    let config = test_config("dish-detail", 1, 6, 3, 1, dir.path(), false);

    let summary = crawl_with(&config, &CrawlOptions::default(), site.launcher(), fake_images())
        .await
        .unwrap();

    let records = load_snapshot(&config.output.complete_path()).unwrap().unwrap();
    assert_eq!(ids(&records), (1..=6).collect::<Vec<_>>());

    let crashed: Vec<u64> = failures_starting_with(&records, "batch worker crashed")
        .into_iter()
        .map(Record::id)
        .collect();
    assert_eq!(crashed.len(), 3);
    assert!(crashed.iter().all(|id| (1..=3).contains(id)));
    assert_eq!(summary.units_succeeded, 3);
    assert_eq!(summary.units_failed, 3);

    // The other batch still ran and released its browser
    assert!(site.visited().contains(&dish_url(6)));
    assert_eq!(site.closes(), 1);

    let progress = load_snapshot(&config.output.progress_path()).unwrap().unwrap();
    assert_eq!(progress.len(), 6);
}

fn previous_run(dir: &std::path::Path) -> Vec<Record> {
    let done = |id: u64| {
        Record::Detail(build_detail_record(
            DetailKind::Dish,
            id,
            &dish_page(id),
            "https://img.nutridata.test/dish/old.png".to_string(),
            String::new(),
        ))
    };
    let records = vec![
        done(1),
        done(2),
        Record::failed(3, &FailureReason::AuthenticationFailed),
    ];
    write_records(&dir.join("progress.json"), &records).unwrap();
    records
}

#[tokio::test]
async fn test_resume_skips_completed_units() {
    let dir = tempfile::tempdir().unwrap();
    previous_run(dir.path());
    let site = Arc::new(FakeSite::new().with_dishes(1..=4));
    let config = test_config("dish-detail", 1, 4, 2, 1, dir.path(), false);

    let summary = crawl_with(&config, &CrawlOptions::default(), site.launcher(), fake_images())
        .await
        .unwrap();

    assert_eq!(site.visited(), vec![dish_url(3), dish_url(4)]);
    assert_eq!(summary.units_resumed, 2);
    assert_eq!(summary.units_succeeded, 4);

    let records = load_snapshot(&config.output.complete_path()).unwrap().unwrap();
    assert_eq!(ids(&records), vec![1, 2, 3, 4]);
    assert!(records.iter().all(Record::is_success));
}

#[tokio::test]
async fn test_fresh_run_ignores_progress() {
    let dir = tempfile::tempdir().unwrap();
    previous_run(dir.path());
    let site = Arc::new(FakeSite::new().with_dishes(1..=4));
    let config = test_config("dish-detail", 1, 4, 2, 1, dir.path(), false);
    let options = CrawlOptions {
        fresh: true,
        config_hash: "abc123".to_string(),
    };

    let summary = crawl_with(&config, &options, site.launcher(), fake_images())
        .await
        .unwrap();

    assert_eq!(site.visited().len(), 4);
    assert_eq!(summary.units_resumed, 0);
    assert_eq!(summary.config_hash, "abc123");

    let records = load_snapshot(&config.output.complete_path()).unwrap().unwrap();
    assert_eq!(ids(&records), vec![1, 2, 3, 4]);
}
