use crate::config::types::{BrowserConfig, Config, CrawlerConfig, OutputConfig, SiteProfile};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_browser_config(&config.browser)?;
    validate_crawler_config(&config.crawler)?;
    validate_site_profile(&config.site)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates browser configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.window_width < 320 || config.window_height < 240 {
        return Err(ConfigError::Validation(format!(
            "window size must be at least 320x240, got {}x{}",
            config.window_width, config.window_height
        )));
    }

    if config.navigation_timeout_ms < 1_000 {
        return Err(ConfigError::Validation(format!(
            "navigation_timeout_ms must be >= 1000ms, got {}ms",
            config.navigation_timeout_ms
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.entry_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid entry_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "entry_url '{}' must use http or https",
            config.entry_url
        )));
    }

    if config.target_count == Some(0) {
        return Err(ConfigError::Validation(
            "target_count must be >= 1 when set".to_string(),
        ));
    }

    if config.max_duplicates < 1 {
        return Err(ConfigError::Validation(format!(
            "max_duplicates must be >= 1, got {}",
            config.max_duplicates
        )));
    }

    if config.max_retries < 1 || config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be between 1 and 10, got {}",
            config.max_retries
        )));
    }

    if config.locate_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "locate_attempts must be >= 1, got {}",
            config.locate_attempts
        )));
    }

    if config.pagination_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "pagination_attempts must be >= 1, got {}",
            config.pagination_attempts
        )));
    }

    if config.max_run_minutes == Some(0) {
        return Err(ConfigError::Validation(
            "max_run_minutes must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the site profile
fn validate_site_profile(site: &SiteProfile) -> Result<(), ConfigError> {
    if site.min_cells == 0 {
        return Err(ConfigError::Validation(
            "min_cells must be >= 1".to_string(),
        ));
    }

    if site.id_cell_index >= site.min_cells {
        return Err(ConfigError::Validation(format!(
            "id_cell_index {} falls outside the minimum row width of {} cells",
            site.id_cell_index, site.min_cells
        )));
    }

    if site.id_aliases.iter().all(|alias| alias.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "id_aliases must contain at least one non-empty label".to_string(),
        ));
    }

    if site.menu_path.is_empty() {
        return Err(ConfigError::Validation(
            "menu_path must contain at least one step".to_string(),
        ));
    }

    for (name, selector) in [
        ("search_button", &site.search_button),
        ("grid_container", &site.grid_container),
        ("label_selector", &site.label_selector),
        ("value_selector", &site.value_selector),
        ("detail_grid", &site.detail_grid),
    ] {
        if selector.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    // Detail pages are parsed offline, so these must be valid for scraper too
    for (name, selector) in [
        ("label_selector", &site.label_selector),
        ("value_selector", &site.value_selector),
        ("detail_grid", &site.detail_grid),
        ("grid_title_selector", &site.grid_title_selector),
        ("grid_header_selector", &site.grid_header_selector),
        ("grid_header_fallback", &site.grid_header_fallback),
        ("grid_body_table", &site.grid_body_table),
        ("grid_body_rows_fallback", &site.grid_body_rows_fallback),
        ("grid_cell_value", &site.grid_cell_value),
    ] {
        if scraper::Selector::parse(selector).is_err() {
            return Err(ConfigError::Validation(format!(
                "{} is not a valid CSS selector: '{}'",
                name, selector
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    for (name, path) in [
        ("state_path", &config.state_path),
        ("snapshot_path", &config.snapshot_path),
        ("csv_path", &config.csv_path),
        ("workbook_path", &config.workbook_path),
        ("summary_path", &config.summary_path),
    ] {
        if path.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}
