use serde::{Deserialize, Serialize};

/// Main configuration structure for Nuri-Harvest
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub site: SiteProfile,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Browser launch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    /// Run the browser without a visible window
    #[serde(default)]
    pub headless: bool,

    #[serde(rename = "window-width", default = "default_window_width")]
    pub window_width: u32,

    #[serde(rename = "window-height", default = "default_window_height")]
    pub window_height: u32,

    /// Overrides the browser's default user agent
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<String>,

    /// Explicit path to the Chrome/Chromium executable
    #[serde(rename = "chrome-path", default)]
    pub chrome_path: Option<String>,

    /// Accept-Language / locale passed to the browser
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Additional command line flags for the browser process
    #[serde(rename = "extra-args", default)]
    pub extra_args: Vec<String>,

    /// Timeout for a full page navigation (milliseconds)
    #[serde(rename = "navigation-timeout-ms", default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: default_window_width(),
            window_height: default_window_height(),
            user_agent: None,
            chrome_path: None,
            locale: default_locale(),
            extra_args: Vec::new(),
            navigation_timeout_ms: default_navigation_timeout(),
        }
    }
}

/// Crawl loop behavior configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlerConfig {
    /// Page that hosts the portal's landing view
    #[serde(rename = "entry-url")]
    pub entry_url: String,

    /// Stop after this many records are committed (unbounded when absent)
    #[serde(rename = "target-count", default)]
    pub target_count: Option<usize>,

    /// Consecutive already-visited rows that end the crawl
    #[serde(rename = "max-duplicates", default = "default_max_duplicates")]
    pub max_duplicates: u32,

    /// Delay applied after every row attempt (milliseconds)
    #[serde(rename = "row-delay-ms", default = "default_row_delay")]
    pub row_delay_ms: u64,

    /// Settle delay after a page transition (milliseconds)
    #[serde(rename = "page-settle-ms", default = "default_page_settle")]
    pub page_settle_ms: u64,

    /// Attempts made by the retry helper before giving up
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the exponential backoff (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Number of content-frame discovery rounds
    #[serde(rename = "locate-attempts", default = "default_locate_attempts")]
    pub locate_attempts: u32,

    /// Pause between content-frame discovery rounds (milliseconds)
    #[serde(rename = "locate-interval-ms", default = "default_locate_interval")]
    pub locate_interval_ms: u64,

    /// How long to wait for the detail marker after a row click (milliseconds)
    #[serde(rename = "detail-timeout-ms", default = "default_detail_timeout")]
    pub detail_timeout_ms: u64,

    /// How long to wait for the list's search control when verifying a return (milliseconds)
    #[serde(rename = "verify-timeout-ms", default = "default_verify_timeout")]
    pub verify_timeout_ms: u64,

    /// How long to wait for the first grid row after a search (milliseconds)
    #[serde(rename = "rows-timeout-ms", default = "default_rows_timeout")]
    pub rows_timeout_ms: u64,

    /// Full pagination ladder passes before the list is declared exhausted
    #[serde(rename = "pagination-attempts", default = "default_pagination_attempts")]
    pub pagination_attempts: u32,

    /// Optional wall-clock ceiling for the whole run (minutes)
    #[serde(rename = "max-run-minutes", default)]
    pub max_run_minutes: Option<u64>,
}

/// One level of the portal's navigation menu
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MenuStep {
    /// CSS selector for candidate menu anchors
    pub selector: String,

    /// Text the anchor must contain
    pub text: String,
}

/// Selectors and marker strings describing the target portal
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SiteProfile {
    /// Substring of the content frame's address
    pub content_url_marker: String,
    /// Header text rendered above the list grid
    pub header_phrase: String,
    /// Class selector of a grid container
    pub grid_container: String,

    pub search_button: String,
    /// Configured row selector, used when no priority strategy yields rows
    pub grid_row: String,
    /// Priority-ordered row selectors tried before `grid_row`
    pub row_selectors: Vec<String>,

    /// CSS selectors of the detail page's "return to list" control
    pub list_button: String,
    /// Visible text of the "return to list" control for text-matched fallbacks
    pub list_button_text: String,

    pub popup_closers: Vec<String>,
    pub loading_overlay: String,
    /// Hovered in order; the last step is clicked
    pub menu_path: Vec<MenuStep>,

    pub detail_marker_selector: String,
    pub detail_marker_text: String,

    pub id_cell_index: usize,
    pub min_cells: usize,
    pub link_cell_candidates: Vec<usize>,
    pub hidden_row_class: String,
    pub scroll_helper_token: String,

    pub pagination_id_prefix: String,
    pub page_label_selector: String,

    pub label_selector: String,
    pub value_selector: String,
    /// Grid containers embedded in a detail page
    pub detail_grid: String,
    pub grid_title_selector: String,
    pub grid_header_selector: String,
    pub grid_header_fallback: String,
    pub grid_body_table: String,
    pub grid_body_rows_fallback: String,
    pub grid_cell_value: String,

    /// Field labels holding the announcement number, in priority order
    pub id_aliases: Vec<String>,
    /// Field labels holding the announcement title, in priority order
    pub title_aliases: Vec<String>,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            content_url_marker: "BidPbancL".to_string(),
            header_phrase: "입찰공고번호".to_string(),
            grid_container: ".w2grid".to_string(),
            search_button: "#mf_wfm_container_btnS0001, input[value='검색']".to_string(),
            grid_row: "tr.gridBodyDefault".to_string(),
            row_selectors: vec![
                ".w2grid_body tbody tr".to_string(),
                ".w2grid tbody tr".to_string(),
                "tbody tr".to_string(),
            ],
            list_button: ".w2trigger.btn_list, #mf_wfm_container_btn_list, img[alt='목록'], \
                          input[value='목록'], .btn_cm.list"
                .to_string(),
            list_button_text: "목록".to_string(),
            popup_closers: vec![
                "input[type='button'].btn.close".to_string(),
                ".w2window_close".to_string(),
                ".w2trigger.btn.close".to_string(),
            ],
            loading_overlay: "iframe[name='__processbarIFrame']".to_string(),
            menu_path: vec![
                MenuStep {
                    selector: "a.depth1".to_string(),
                    text: "입찰공고".to_string(),
                },
                MenuStep {
                    selector: "a.depth2".to_string(),
                    text: "입찰공고".to_string(),
                },
                MenuStep {
                    selector: "a.depth3".to_string(),
                    text: "입찰공고목록".to_string(),
                },
            ],
            detail_marker_selector: "label".to_string(),
            detail_marker_text: "입찰공고번호".to_string(),
            id_cell_index: 1,
            min_cells: 5,
            link_cell_candidates: vec![1, 3, 4],
            hidden_row_class: "w2grid_hidedRow".to_string(),
            scroll_helper_token: "scroll".to_string(),
            pagination_id_prefix: "mf_wfm_container_pagelist_page_".to_string(),
            page_label_selector: ".w2pageList_label".to_string(),
            label_selector: "label.w2textbox".to_string(),
            value_selector: "span.w2textbox".to_string(),
            detail_grid: "div.w2grid".to_string(),
            grid_title_selector: "div.df_tit, div.tit, div.w2textbox, h3.df_tit, h3.tit, \
                                  h3.w2textbox, h4.df_tit, h4.tit, h4.w2textbox"
                .to_string(),
            grid_header_selector: ".w2grid_head_sort_div_main_outer nobr".to_string(),
            grid_header_fallback: "thead th, .w2grid_hRow td".to_string(),
            grid_body_table: ".w2grid_body_table, .w2grid_body table".to_string(),
            grid_body_rows_fallback: "tbody tr, .w2grid_body tr".to_string(),
            grid_cell_value: "nobr, span, input".to_string(),
            id_aliases: vec!["입찰공고번호".to_string()],
            title_aliases: vec!["공고명".to_string(), "입찰공고명".to_string()],
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// JSON file holding the visited identifier set
    #[serde(rename = "state-path", default = "default_state_path")]
    pub state_path: String,

    /// JSON snapshot of every collected record
    #[serde(rename = "snapshot-path", default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// Flat CSV export
    #[serde(rename = "csv-path", default = "default_csv_path")]
    pub csv_path: String,

    /// Multi-sheet `.xlsx` workbook
    #[serde(rename = "workbook-path", default = "default_workbook_path")]
    pub workbook_path: String,

    /// Path to the markdown run summary
    #[serde(rename = "summary-path", default = "default_summary_path")]
    pub summary_path: String,

    /// Where the list frame is dumped when no next-page control is found (empty disables)
    #[serde(rename = "pagination-dump-path", default = "default_pagination_dump_path")]
    pub pagination_dump_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            snapshot_path: default_snapshot_path(),
            csv_path: default_csv_path(),
            workbook_path: default_workbook_path(),
            summary_path: default_summary_path(),
            pagination_dump_path: default_pagination_dump_path(),
        }
    }
}

impl CrawlerConfig {
    /// Crawler settings with every optional knob at its default
    pub fn with_entry_url(entry_url: impl Into<String>) -> Self {
        Self {
            entry_url: entry_url.into(),
            target_count: None,
            max_duplicates: default_max_duplicates(),
            row_delay_ms: default_row_delay(),
            page_settle_ms: default_page_settle(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            locate_attempts: default_locate_attempts(),
            locate_interval_ms: default_locate_interval(),
            detail_timeout_ms: default_detail_timeout(),
            verify_timeout_ms: default_verify_timeout(),
            rows_timeout_ms: default_rows_timeout(),
            pagination_attempts: default_pagination_attempts(),
            max_run_minutes: None,
        }
    }
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_locale() -> String {
    "ko-KR".to_string()
}

fn default_navigation_timeout() -> u64 {
    30_000
}

fn default_max_duplicates() -> u32 {
    10
}

fn default_row_delay() -> u64 {
    2_000
}

fn default_page_settle() -> u64 {
    3_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2_000
}

fn default_locate_attempts() -> u32 {
    15
}

fn default_locate_interval() -> u64 {
    2_000
}

fn default_detail_timeout() -> u64 {
    15_000
}

fn default_verify_timeout() -> u64 {
    3_000
}

fn default_rows_timeout() -> u64 {
    10_000
}

fn default_pagination_attempts() -> u32 {
    1
}

fn default_state_path() -> String {
    "data/state.json".to_string()
}

fn default_snapshot_path() -> String {
    "data/results.json".to_string()
}

fn default_csv_path() -> String {
    "data/results.csv".to_string()
}

fn default_workbook_path() -> String {
    "data/results.xlsx".to_string()
}

fn default_summary_path() -> String {
    "data/summary.md".to_string()
}

fn default_pagination_dump_path() -> String {
    "data/debug_pagination.html".to_string()
}
