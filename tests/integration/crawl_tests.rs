//! Integration tests for the crawl loop
//!
//! These tests run the orchestrator against the in-memory portal and check
//! the collected records, the persisted state files, and the run counters.

use crate::portal::{Announcement, Faults, OpenSnapshot, Portal, RowKind};
use nuri_harvest::config::{Config, CrawlerConfig, MenuStep, OutputConfig, SiteProfile};
use nuri_harvest::output::{export_all, Workbook, MAIN_SHEET};
use nuri_harvest::state::{RecoveryRung, RejectReason};
use nuri_harvest::storage::{load_snapshot, JsonVisitedStore, VisitedStore};
use nuri_harvest::{CrawlPhase, Orchestrator};
use std::path::Path;
use tempfile::TempDir;

/// Creates a configuration matching the in-memory portal's markup
fn create_test_config(dir: &Path) -> Config {
    let mut crawler = CrawlerConfig::with_entry_url("https://portal.test/");
    crawler.max_duplicates = 3;
    crawler.row_delay_ms = 10;
    crawler.page_settle_ms = 10;
    crawler.max_retries = 3;
    crawler.retry_delay_ms = 10;
    crawler.locate_attempts = 3;
    crawler.locate_interval_ms = 10;
    crawler.detail_timeout_ms = 500;
    crawler.verify_timeout_ms = 500;
    crawler.rows_timeout_ms = 500;
    crawler.pagination_attempts = 2;

    let site = SiteProfile {
        content_url_marker: "BidPbancL".to_string(),
        search_button: "#btnSearch".to_string(),
        grid_row: "tr.gridBodyDefault".to_string(),
        row_selectors: Vec::new(),
        list_button: "input.btn_list".to_string(),
        popup_closers: vec![".popup-close".to_string()],
        loading_overlay: String::new(),
        menu_path: vec![MenuStep {
            selector: "a.menu".to_string(),
            text: "입찰공고목록".to_string(),
        }],
        pagination_id_prefix: "pg_".to_string(),
        ..SiteProfile::default()
    };

    let path = |name: &str| dir.join(name).display().to_string();
    let output = OutputConfig {
        state_path: path("visited.json"),
        snapshot_path: path("results.json"),
        csv_path: path("results.csv"),
        workbook_path: path("results.xlsx"),
        summary_path: path("summary.md"),
        pagination_dump_path: path("debug_pagination.html"),
    };

    Config {
        browser: Default::default(),
        crawler,
        site,
        output,
    }
}

fn data(bid_no: &str) -> Announcement {
    Announcement::data(bid_no)
}

fn two_pages() -> Vec<Vec<Announcement>> {
    vec![
        vec![data("R24BK0001"), data("R24BK0002"), data("R24BK0003")],
        vec![data("R24BK0004"), data("R24BK0005"), data("R24BK0006")],
    ]
}

fn orchestrator(portal: Portal, config: &Config) -> Orchestrator<Portal> {
    let visited = JsonVisitedStore::new(&config.output.state_path);
    Orchestrator::new(portal, config.clone(), visited).expect("valid extractor selectors")
}

fn ids(results: &nuri_harvest::ResultCollection) -> Vec<String> {
    results.ids().map(str::to_string).collect()
}

fn preload_visited(config: &Config, ids: &[&str]) {
    let mut store = JsonVisitedStore::new(&config.output.state_path);
    for id in ids {
        store.mark_visited(id);
    }
    store.flush().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_full_crawl_across_pages() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let mut crawler = orchestrator(Portal::new(two_pages()), &config);
    let results = crawler.run().await;

    assert_eq!(
        ids(&results),
        vec!["R24BK0001", "R24BK0002", "R24BK0003", "R24BK0004", "R24BK0005", "R24BK0006"]
    );
    assert_eq!(crawler.phase(), CrawlPhase::Done);
    assert_eq!(crawler.stats().pages_visited, 2);
    assert_eq!(
        crawler.stats().pagination_log,
        vec![(2, "index_attribute".to_string())]
    );
    assert_eq!(crawler.stats().recoveries_for(RecoveryRung::ListButton), 6);
    assert_eq!(crawler.driver().navigations(), 1);

    let record = &results.records()[0];
    assert_eq!(record.title, "R24BK0001 청사 청소 용역");
    assert_eq!(record.text("수요기관"), Some("조달청"));
    assert!(record
        .source_url
        .as_deref()
        .is_some_and(|url| url.contains("bid=R24BK0001")));
    assert_eq!(record.tables().count(), 1);

    let snapshot = load_snapshot(Path::new(&config.output.snapshot_path)).unwrap();
    assert_eq!(snapshot.len(), 6);

    let mut visited = JsonVisitedStore::new(&config.output.state_path);
    visited.load();
    assert_eq!(visited.len(), 6);

    // end of list leaves a dump of the pager for diagnosis
    assert!(Path::new(&config.output.pagination_dump_path).exists());
}

#[tokio::test(start_paused = true)]
async fn test_resume_collects_only_new_records() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let mut first = orchestrator(Portal::new(two_pages()), &config);
    assert_eq!(first.run().await.len(), 6);

    // a new announcement is published at the top of the list
    let pages = vec![
        vec![data("R24BK0007"), data("R24BK0001"), data("R24BK0002")],
        vec![data("R24BK0003"), data("R24BK0004"), data("R24BK0005")],
        vec![data("R24BK0006")],
    ];
    let mut second = orchestrator(Portal::new(pages), &config);
    let results = second.run().await;

    assert_eq!(ids(&results), vec!["R24BK0007"]);
    assert_eq!(second.driver().opened(), vec!["R24BK0007"]);
    assert_eq!(second.stats().duplicates_skipped, 3);
    assert_eq!(second.phase(), CrawlPhase::Done);

    let mut visited = JsonVisitedStore::new(&config.output.state_path);
    visited.load();
    assert_eq!(visited.len(), 7);
    assert!(visited.is_visited("R24BK0007"));
    assert!(visited.is_visited("R24BK0001"));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_ceiling_stops_crawl() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());
    preload_visited(&config, &["A-1", "A-2", "A-3"]);

    let pages = vec![vec![data("A-1"), data("A-2"), data("A-3"), data("A-4")]];
    let mut crawler = orchestrator(Portal::new(pages), &config);
    let results = crawler.run().await;

    assert!(results.is_empty());
    assert!(crawler.driver().opened().is_empty());
    assert_eq!(crawler.stats().duplicates_skipped, 3);
    assert_eq!(crawler.phase(), CrawlPhase::Done);
}

#[tokio::test(start_paused = true)]
async fn test_new_record_resets_duplicate_streak() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.crawler.max_duplicates = 2;
    preload_visited(&config, &["A-1", "A-3"]);

    let pages = vec![vec![data("A-1"), data("A-2"), data("A-3"), data("A-4"), data("A-5")]];
    let mut crawler = orchestrator(Portal::new(pages), &config);
    let results = crawler.run().await;

    assert_eq!(ids(&results), vec!["A-2", "A-4", "A-5"]);
    assert_eq!(crawler.stats().duplicates_skipped, 2);
    assert_eq!(crawler.cursor().consecutive_duplicate_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_inadmissible_rows_are_never_opened() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let pages = vec![vec![
        Announcement::with_kind("S-1", RowKind::SystemRow),
        Announcement::with_kind("H-1", RowKind::Hidden),
        Announcement::with_kind("N-1", RowKind::Narrow),
        Announcement::with_kind("B-1", RowKind::BlankId),
        data("OK-1"),
        Announcement::with_kind("X-1", RowKind::NoDetailId),
        data("OK-2"),
    ]];
    let mut crawler = orchestrator(Portal::new(pages), &config);
    let results = crawler.run().await;

    assert_eq!(crawler.driver().opened(), vec!["OK-1", "X-1", "OK-2"]);
    assert_eq!(ids(&results), vec!["OK-1", "OK-2"]);

    let stats = crawler.stats();
    assert_eq!(stats.rows_seen, 7);
    assert_eq!(stats.rows_rejected[&RejectReason::SystemRow], 1);
    assert_eq!(stats.rows_rejected[&RejectReason::NotVisible], 1);
    assert_eq!(stats.rows_rejected[&RejectReason::TooFewCells], 1);
    assert_eq!(stats.rows_rejected[&RejectReason::EmptyIdentifier], 1);
    assert_eq!(stats.extraction_failures, 1);

    // a detail page without an identifier is not remembered
    assert!(!crawler.visited().is_visited("X-1"));
    assert_eq!(crawler.visited().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pagination_falls_back_to_script() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let portal = Portal::new(two_pages()).with_faults(Faults {
        pager_hidden: true,
        ..Faults::default()
    });
    let mut crawler = orchestrator(portal, &config);
    let results = crawler.run().await;

    assert_eq!(results.len(), 6);
    assert_eq!(
        crawler.stats().pagination_log,
        vec![(2, "script_by_id".to_string())]
    );
    assert_eq!(crawler.driver().script_clicks(), 1);
    assert_eq!(crawler.driver().current_page(), 2);
    assert_eq!(crawler.cursor().page_number(), 2);
    assert_eq!(
        crawler.driver().opened()[3..],
        ["R24BK0004", "R24BK0005", "R24BK0006"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_history_back_when_list_button_fails() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let portal = Portal::new(vec![vec![data("A-1"), data("A-2")]]).with_faults(Faults {
        list_button_broken: true,
        ..Faults::default()
    });
    let mut crawler = orchestrator(portal, &config);
    let results = crawler.run().await;

    assert_eq!(results.len(), 2);
    assert_eq!(crawler.stats().recoveries_for(RecoveryRung::ListButton), 0);
    assert_eq!(crawler.stats().recoveries_for(RecoveryRung::HistoryBack), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hard_recovery_restarts_from_first_page() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let portal = Portal::new(vec![vec![data("A-1"), data("A-2"), data("A-3")]]).with_faults(Faults {
        list_button_broken: true,
        history_back_broken: true,
        ..Faults::default()
    });
    let mut crawler = orchestrator(portal, &config);
    let results = crawler.run().await;

    assert_eq!(ids(&results), vec!["A-1", "A-2", "A-3"]);
    assert_eq!(crawler.driver().opened(), vec!["A-1", "A-2", "A-3"]);
    assert_eq!(crawler.stats().recoveries_for(RecoveryRung::Hard), 3);
    assert_eq!(crawler.stats().recoveries_for(RecoveryRung::Soft), 0);
    // one initial bootstrap plus one per hard recovery
    assert_eq!(crawler.driver().navigations(), 4);
    assert_eq!(crawler.phase(), CrawlPhase::Done);
}

#[tokio::test(start_paused = true)]
async fn test_soft_recovery_resumes_same_page() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let pages = vec![
        vec![data("A-1"), data("A-2")],
        vec![data("B-1"), data("B-2"), data("B-3")],
    ];
    let portal = Portal::new(pages).with_faults(Faults {
        list_button_broken: true,
        history_back_broken: true,
        menu_on_detail: true,
        ..Faults::default()
    });
    let mut crawler = orchestrator(portal, &config);
    let results = crawler.run().await;

    // the menu reloads the list on page 1; page 2 is walked back to each time
    assert_eq!(ids(&results), vec!["A-1", "A-2", "B-1", "B-2", "B-3"]);
    assert_eq!(crawler.driver().opened(), vec!["A-1", "A-2", "B-1", "B-2", "B-3"]);

    let stats = crawler.stats();
    assert_eq!(stats.recoveries_for(RecoveryRung::Soft), 5);
    assert_eq!(stats.recoveries_for(RecoveryRung::Hard), 0);
    assert_eq!(stats.rows_rejected.get(&RejectReason::Unreadable), None);
    assert_eq!(stats.duplicates_skipped, 0);
    assert_eq!(stats.pagination_log, vec![(2, "index_attribute".to_string())]);
    assert_eq!(crawler.driver().navigations(), 1);
    assert_eq!(crawler.phase(), CrawlPhase::Done);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_recovery_abandons_page_and_paginates() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let pages = vec![vec![data("A-1"), data("A-2")], vec![data("B-1")]];
    let portal = Portal::new(pages).with_faults(Faults {
        list_button_broken: true,
        history_back_broken: true,
        menu_on_detail: true,
        search_limit: Some(1),
        reentry_broken: true,
        ..Faults::default()
    });
    let mut crawler = orchestrator(portal, &config);
    let results = crawler.run().await;

    // A-2 is lost with the abandoned page; the crawl still reaches page 2
    assert_eq!(ids(&results), vec!["A-1", "B-1"]);
    assert_eq!(crawler.driver().opened(), vec!["A-1", "B-1"]);
    assert_eq!(crawler.stats().recoveries_for(RecoveryRung::Exhausted), 2);
    assert_eq!(crawler.stats().recoveries_for(RecoveryRung::Hard), 0);
    assert_eq!(
        crawler.stats().pagination_log,
        vec![(2, "index_attribute".to_string())]
    );
    assert_eq!(crawler.phase(), CrawlPhase::Done);
    assert!(crawler.stats().terminal_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_blocked_link_is_force_clicked() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let portal = Portal::new(vec![vec![data("A-1"), data("A-2")]]).with_faults(Faults {
        links_blocked: true,
        ..Faults::default()
    });
    let mut crawler = orchestrator(portal, &config);
    let results = crawler.run().await;

    assert_eq!(ids(&results), vec!["A-1", "A-2"]);
    assert_eq!(crawler.stats().forced_clicks, 2);
    assert_eq!(crawler.stats().extraction_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_row_without_anchor_is_clicked_itself() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let pages = vec![vec![
        Announcement::with_kind("A-1", RowKind::NoAnchor),
        Announcement::with_kind("A-2", RowKind::NoAnchor),
    ]];
    let mut crawler = orchestrator(Portal::new(pages), &config);
    let results = crawler.run().await;

    assert_eq!(crawler.driver().opened(), vec!["A-1", "A-2"]);
    assert_eq!(ids(&results), vec!["A-1", "A-2"]);
    assert_eq!(crawler.stats().forced_clicks, 0);
}

#[tokio::test(start_paused = true)]
async fn test_search_failure_is_terminal() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let portal = Portal::new(two_pages()).with_faults(Faults {
        search_limit: Some(0),
        ..Faults::default()
    });
    let mut crawler = orchestrator(portal, &config);
    let results = crawler.run().await;

    assert!(results.is_empty());
    assert_eq!(crawler.phase(), CrawlPhase::Failed);
    assert!(crawler
        .stats()
        .terminal_error
        .as_deref()
        .is_some_and(|e| e.contains("Search")));
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_failure_is_terminal() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let portal = Portal::new(two_pages()).with_faults(Faults {
        menu_missing: true,
        ..Faults::default()
    });
    let mut crawler = orchestrator(portal, &config);
    let results = crawler.run().await;

    assert!(results.is_empty());
    assert_eq!(crawler.phase(), CrawlPhase::Failed);
    assert_eq!(crawler.stats().terminal_phase, Some(CrawlPhase::Failed));
    assert!(crawler
        .stats()
        .terminal_error
        .as_deref()
        .is_some_and(|e| e.contains("3 attempts")));
    assert_eq!(crawler.driver().navigations(), 3);
    assert!(crawler.driver().opened().is_empty());

    // state is still persisted
    let snapshot = load_snapshot(Path::new(&config.output.snapshot_path)).unwrap();
    assert!(snapshot.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_target_count_stops_crawl() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path());
    config.crawler.target_count = Some(2);

    let mut crawler = orchestrator(Portal::new(two_pages()), &config);
    let results = crawler.run().await;

    assert_eq!(ids(&results), vec!["R24BK0001", "R24BK0002"]);
    assert_eq!(crawler.driver().opened().len(), 2);
    assert_eq!(crawler.stats().pages_visited, 1);
    assert_eq!(crawler.phase(), CrawlPhase::Done);
}

#[tokio::test(start_paused = true)]
async fn test_progress_persisted_before_each_row() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let portal = Portal::new(vec![vec![data("A-1"), data("A-2"), data("A-3")]]).watching_state(
        dir.path().join("results.json"),
        dir.path().join("visited.json"),
    );
    let mut crawler = orchestrator(portal, &config);
    crawler.run().await;

    // when a row is opened, every earlier record is already on disk
    let openings = crawler.driver().openings();
    assert_eq!(
        openings,
        vec![
            OpenSnapshot { snapshot_records: 0, visited_ids: 0 },
            OpenSnapshot { snapshot_records: 1, visited_ids: 1 },
            OpenSnapshot { snapshot_records: 2, visited_ids: 2 },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_then_export() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let mut crawler = orchestrator(Portal::new(two_pages()), &config);
    crawler.run().await;

    let snapshot = load_snapshot(Path::new(&config.output.snapshot_path)).unwrap();
    let written = export_all(&config.output, &snapshot).unwrap();
    assert!(written.iter().any(|p| p.ends_with("results.csv")));

    let xlsx = dir.path().join("results.xlsx");
    assert!(written.contains(&xlsx));
    assert!(std::fs::read(&xlsx).unwrap().starts_with(b"PK"));

    let flat = std::fs::read_to_string(dir.path().join("results.csv")).unwrap();
    assert!(flat.contains("[Sub-grid: See Sheet '참가업체']"));

    let workbook = Workbook::build(&snapshot);
    let main = workbook.sheet(MAIN_SHEET).unwrap();
    assert_eq!(main.rows.len(), 6);
    assert!(main
        .rows
        .iter()
        .any(|row| row.contains(&"[Sub-grid: See Sheet '참가업체']".to_string())));

    let grid = workbook.sheet("참가업체").unwrap();
    assert!(grid
        .rows
        .iter()
        .any(|row| row[0] == "R24BK0004" && row.contains(&"가나건설".to_string())));
}
