//! List crawl and pagination tests

use crate::support::{fake_images, list_entries, list_url, test_config, FakeSite, ListEnd};
use nutri_harvest::crawler::{crawl_with, Advance, CrawlOptions, PageConfirmation, Paginator, Termination};
use nutri_harvest::driver::{Locator, PageDriver};
use std::sync::Arc;
use std::time::Duration;

fn three_pages(end: ListEnd) -> FakeSite {
    FakeSite::new().with_list(
        vec![list_entries(1, 2), list_entries(2, 2), list_entries(3, 2)],
        end,
    )
}

fn paginator() -> Paginator {
    Paginator::new(
        Locator::css("button.btn-next"),
        PageConfirmation::ActiveIndicator(Locator::css(".el-pager li.active")),
        Duration::from_millis(100),
    )
}

async fn open_list(site: &Arc<FakeSite>) -> Box<dyn PageDriver> {
    let mut driver = site.launcher().launch().await.unwrap();
    driver
        .navigate(&list_url(), Duration::from_secs(1))
        .await
        .unwrap();
    driver
}

#[tokio::test]
async fn test_paginator_stops_on_disabled_next() {
    let site = Arc::new(three_pages(ListEnd::Disabled));
    let mut driver = open_list(&site).await;
    let mut pages = paginator();

    assert_eq!(pages.advance(driver.as_mut()).await, Advance::Loaded(2));
    assert_eq!(pages.advance(driver.as_mut()).await, Advance::Loaded(3));
    assert_eq!(
        pages.advance(driver.as_mut()).await,
        Advance::Finished(Termination::NextButtonDisabled)
    );
    assert_eq!(pages.current_page(), 3);
}

#[tokio::test]
async fn test_paginator_stops_without_next_button() {
    let site = Arc::new(three_pages(ListEnd::Missing));
    let mut driver = open_list(&site).await;
    let mut pages = paginator();

    pages.advance(driver.as_mut()).await;
    pages.advance(driver.as_mut()).await;
    let last = pages.advance(driver.as_mut()).await;

    assert_eq!(last, Advance::Finished(Termination::NoNextButton));
    assert!(matches!(last, Advance::Finished(t) if t.is_end_of_data()));
}

#[tokio::test]
async fn test_paginator_times_out_when_page_never_changes() {
    let site = Arc::new(three_pages(ListEnd::Stuck));
    let mut driver = open_list(&site).await;
    let mut pages = paginator();

    pages.advance(driver.as_mut()).await;
    pages.advance(driver.as_mut()).await;

    let last = pages.advance(driver.as_mut()).await;
    assert_eq!(last, Advance::Finished(Termination::WaitTimeout));
    // The counter only moves on a confirmed page
    assert_eq!(pages.current_page(), 3);
}

#[tokio::test]
async fn test_list_crawl_writes_batches_and_cumulative_csv() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(three_pages(ListEnd::Disabled));
    let config = test_config("dish-list", 1, 5, 2, 1, dir.path(), false);

    let summary = crawl_with(&config, &CrawlOptions::default(), site.launcher(), fake_images())
        .await
        .unwrap();

    assert_eq!(summary.rows_written, Some(6));
    assert_eq!(summary.units_total, 5);
    assert_eq!(summary.units_succeeded, 3);
    assert_eq!(
        summary.failure_reasons.get("not reached: next button disabled"),
        Some(&2)
    );
    assert_eq!(site.launches(), 1);
    assert_eq!(site.closes(), 1);

    let csv = std::fs::read_to_string(config.output.csv_path()).unwrap();
    let csv = csv.trim_start_matches('\u{feff}');
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "sequence_no,page_no,name,energy,category,ingredients");
    assert_eq!(lines.len(), 7);
    assert_eq!(lines[1], "1,1,Dish 1-1,115,Staple,Rice");
    assert_eq!(lines[3], "11,2,Dish 2-1,215,Staple,Rice");
    assert_eq!(lines[6], "22,3,Dish 3-2,325,Staple,Rice");

    // Pages 1-2 in the first batch file, page 3 in the second
    let first = std::fs::read_to_string(config.output.batch_path(1)).unwrap();
    assert_eq!(first.lines().count(), 5);
    let second = std::fs::read_to_string(config.output.batch_path(2)).unwrap();
    assert!(second.contains("Dish 3-1"));
    assert!(!second.contains("Dish 2-1"));
}

#[tokio::test]
async fn test_list_crawl_skips_pages_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(three_pages(ListEnd::Disabled));
    let config = test_config("dish-list", 2, 3, 5, 1, dir.path(), false);

    let summary = crawl_with(&config, &CrawlOptions::default(), site.launcher(), fake_images())
        .await
        .unwrap();

    assert_eq!(summary.rows_written, Some(4));
    assert_eq!(summary.units_failed, 0);

    let csv = std::fs::read_to_string(config.output.csv_path()).unwrap();
    assert!(!csv.contains("Dish 1-"));
    assert!(csv.contains("Dish 2-1"));
    assert!(csv.contains("Dish 3-2"));
}

#[tokio::test]
async fn test_batch_numbers_skip_empty_batches() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(FakeSite::new().with_list(
        vec![list_entries(1, 2), Vec::new(), list_entries(3, 2)],
        ListEnd::Disabled,
    ));
    let config = test_config("dish-list", 1, 3, 1, 1, dir.path(), false);

    let summary = crawl_with(&config, &CrawlOptions::default(), site.launcher(), fake_images())
        .await
        .unwrap();

    assert_eq!(summary.rows_written, Some(4));
    assert_eq!(summary.failure_reasons.get("no rows extracted"), Some(&1));

    // Page 2 has no rows, so page 3 lands in the second file
    let first = std::fs::read_to_string(config.output.batch_path(1)).unwrap();
    assert!(first.contains("Dish 1-1"));
    let second = std::fs::read_to_string(config.output.batch_path(2)).unwrap();
    assert!(second.contains("Dish 3-1"));
    assert!(!config.output.batch_path(3).exists());
    assert_eq!(
        summary.outputs,
        vec![
            config.output.csv_path(),
            config.output.batch_path(1),
            config.output.batch_path(2),
        ]
    );
}
