//! Site navigation: reaching the list view and getting back to it
//!
//! This module contains:
//! - The bootstrap sequence (entry page, overlays, menu, spinner, frame)
//! - The search trigger that loads the grid
//! - The return-to-list ladder run after every row

use crate::browser::wait::{first_visible, query_by_text, wait_for_hidden, wait_for_visible, POLL_INTERVAL};
use crate::browser::{ClickMode, Driver, DriverError, DriverResult, ElementHandle, FramePath};
use crate::config::{Config, MenuStep, SiteProfile};
use crate::crawler::locator::{ContentLocator, ContentSurface};
use crate::crawler::retry::RetryPolicy;
use crate::state::RecoveryRung;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// Wait for the search control when verifying a fresh list view
const BOOTSTRAP_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);
/// Wait for the loading overlay to disappear
const SPINNER_TIMEOUT: Duration = Duration::from_secs(10);
/// Wait for the list control to become visible on a detail page
const LIST_BUTTON_TIMEOUT: Duration = Duration::from_secs(2);
/// Wait for the search control after a soft recovery
const SOFT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

const POPUP_PAUSE: Duration = Duration::from_millis(500);
const MENU_HOVER_PAUSE: Duration = Duration::from_secs(1);

/// Drives the portal between its entry page, list view, and detail views
#[derive(Debug, Clone)]
pub struct Navigator {
    site: SiteProfile,
    entry_url: String,
    navigation_timeout: Duration,
    rows_timeout: Duration,
    verify_timeout: Duration,
    locator: ContentLocator,
    retry: RetryPolicy,
}

impl Navigator {
    pub fn new(config: &Config) -> Self {
        Self {
            site: config.site.clone(),
            entry_url: config.crawler.entry_url.clone(),
            navigation_timeout: Duration::from_millis(config.browser.navigation_timeout_ms),
            rows_timeout: Duration::from_millis(config.crawler.rows_timeout_ms),
            verify_timeout: Duration::from_millis(config.crawler.verify_timeout_ms),
            locator: ContentLocator::from_config(&config.site, &config.crawler),
            retry: RetryPolicy::from_config(&config.crawler),
        }
    }

    pub fn locator(&self) -> &ContentLocator {
        &self.locator
    }

    /// Opens the entry page and walks to a verified list view
    ///
    /// Returns the surface hosting the list, or `None` if the list's search
    /// control never showed up.
    pub async fn bootstrap<D: Driver + ?Sized>(&self, driver: &D) -> Option<ContentSurface> {
        info!(url = %self.entry_url, "Navigating to entry page");
        let navigated = self
            .retry
            .retry("navigate to entry page", || driver.navigate(&self.entry_url, self.navigation_timeout))
            .await;
        if let Err(e) = navigated {
            error!(error = %e, "Navigation failed");
            return None;
        }
        self.settle(driver).await;

        self.dismiss_popups(driver).await;

        if let Err(e) = self.walk_menu(driver).await {
            error!(error = %e, "Menu navigation failed");
            return None;
        }
        self.settle(driver).await;

        if !self.site.loading_overlay.is_empty() {
            debug!("Waiting for loading overlay to hide");
            if let Err(e) =
                wait_for_hidden(driver, &FramePath::top(), &self.site.loading_overlay, SPINNER_TIMEOUT).await
            {
                warn!(error = %e, "Loading overlay wait timed out");
            }
        }

        let surface = self.locator.locate_or_main(driver).await;

        match wait_for_visible(driver, &surface.frame, &self.site.search_button, BOOTSTRAP_VERIFY_TIMEOUT).await {
            Ok(_) => {
                info!(frame = %surface.frame, "List page loaded");
                Some(surface)
            }
            Err(e) => {
                error!(error = %e, "Failed to verify list page");
                None
            }
        }
    }

    async fn settle<D: Driver + ?Sized>(&self, driver: &D) {
        if let Err(e) = driver.wait_for_network_idle(self.navigation_timeout).await {
            debug!(error = %e, "Network did not go idle");
        }
    }

    /// Clicks every visible overlay close control, then presses Escape
    async fn dismiss_popups<D: Driver + ?Sized>(&self, driver: &D) {
        let top = FramePath::top();
        for selector in &self.site.popup_closers {
            let Ok(closers) = driver.query_all(&top, selector).await else {
                continue;
            };
            for closer in closers {
                if !matches!(driver.is_visible(&closer).await, Ok(true)) {
                    continue;
                }
                match driver.click(&closer, ClickMode::Normal).await {
                    Ok(()) => {
                        debug!(selector = %selector, "Closed popup");
                        sleep(POPUP_PAUSE).await;
                    }
                    Err(e) => debug!(selector = %selector, error = %e, "Popup close failed"),
                }
            }
        }

        if let Err(e) = driver.press_key("Escape").await {
            warn!(error = %e, "Popup handling warning");
        }
        sleep(POPUP_PAUSE).await;
    }

    async fn find_menu_item<D: Driver + ?Sized>(&self, driver: &D, step: &MenuStep) -> Option<ElementHandle> {
        query_by_text(driver, &FramePath::top(), &step.selector, &step.text, false)
            .await
            .ok()
            .and_then(|found| found.into_iter().next())
    }

    /// Hovers every menu level but the last, then clicks the last one
    async fn walk_menu<D: Driver + ?Sized>(&self, driver: &D) -> DriverResult<()> {
        let Some((last, intermediate)) = self.site.menu_path.split_last() else {
            return Ok(());
        };

        for (depth, step) in intermediate.iter().enumerate() {
            let Some(item) = self.find_menu_item(driver, step).await else {
                debug!(depth = depth + 1, text = %step.text, "Menu level not present");
                continue;
            };
            // deeper levels only exist once their parent is hovered
            if depth > 0 && !matches!(driver.is_visible(&item).await, Ok(true)) {
                continue;
            }
            info!(depth = depth + 1, text = %step.text, "Hovering menu");
            driver.hover(&item).await?;
            sleep(MENU_HOVER_PAUSE).await;
        }

        let Some(item) = self.find_menu_item(driver, last).await else {
            error!(text = %last.text, "Menu entry not found");
            return Err(DriverError::NotFound(format!("menu entry '{}'", last.text)));
        };

        info!(text = %last.text, "Clicking menu entry");
        if driver.is_visible(&item).await.unwrap_or(false) {
            self.retry
                .retry("menu click", || driver.click(&item, ClickMode::Normal))
                .await
        } else {
            warn!("Menu entry not visible, forcing click");
            driver.click(&item, ClickMode::Force).await
        }
    }

    /// Triggers the list query and waits for the first data row
    ///
    /// Returns false if the search control could not be clicked.
    pub async fn search<D: Driver + ?Sized>(&self, driver: &D, frame: &FramePath) -> bool {
        info!("Clicking search button to load data");
        let button = match driver.query_all(frame, &self.site.search_button).await {
            Ok(found) => found.into_iter().next(),
            Err(e) => {
                warn!(error = %e, "Search button lookup failed");
                None
            }
        };
        let Some(button) = button else {
            warn!("Search button not found with configured selector");
            return false;
        };

        if let Err(e) = self
            .retry
            .retry("search button click", || driver.click(&button, ClickMode::Normal))
            .await
        {
            error!(error = %e, "Failed to click search button");
            return false;
        }
        self.settle(driver).await;

        debug!("Waiting for grid rows");
        if let Err(e) = wait_for_visible(driver, frame, &self.site.grid_row, self.rows_timeout).await {
            warn!(error = %e, "Timeout waiting for first row");
        }
        true
    }

    /// Re-resolves the content frame if the current one went away
    async fn refresh_surface<D: Driver + ?Sized>(&self, driver: &D, surface: &mut ContentSurface) -> bool {
        if surface.frame.is_top() || driver.frame_url(&surface.frame).await.is_ok() {
            return true;
        }
        warn!(frame = %surface.frame, "Content frame detached, locating again");
        match self.locator.locate(driver).await {
            Some(found) => {
                *surface = found;
                true
            }
            None => false,
        }
    }

    /// Visible "return to list" control, polled for a short while
    async fn find_list_button<D: Driver + ?Sized>(&self, driver: &D, frame: &FramePath) -> Option<ElementHandle> {
        let deadline = Instant::now() + LIST_BUTTON_TIMEOUT;
        loop {
            let mut candidates = driver.query_all(frame, &self.site.list_button).await.unwrap_or_default();
            if !self.site.list_button_text.is_empty() {
                if let Ok(by_text) =
                    query_by_text(driver, frame, "a, button", &self.site.list_button_text, false).await
                {
                    candidates.extend(by_text);
                }
            }
            if let Some(button) = first_visible(driver, &candidates).await {
                return Some(button);
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Re-resolves the frame and confirms the list is back
    async fn verify_return<D: Driver + ?Sized>(&self, driver: &D, surface: &mut ContentSurface) -> bool {
        self.refresh_surface(driver, surface).await
            && self.verify_list(driver, &surface.frame, self.verify_timeout).await
    }

    /// Confirms the list view is showing in `frame`
    async fn verify_list<D: Driver + ?Sized>(&self, driver: &D, frame: &FramePath, timeout: Duration) -> bool {
        if wait_for_visible(driver, frame, &self.site.search_button, timeout).await.is_err() {
            return false;
        }
        if let Err(e) = wait_for_visible(driver, frame, &self.site.grid_row, self.verify_timeout).await {
            warn!(error = %e, "Grid rows not immediately visible");
        }
        true
    }

    /// Brings the browser back to the list view after a row attempt
    ///
    /// Escalates through list button, history back, soft recovery (menu
    /// click plus search), and hard recovery (full bootstrap plus search).
    /// The returned rung tells which one succeeded. After
    /// [`RecoveryRung::Soft`] and [`RecoveryRung::Hard`] the list has been
    /// searched again and shows its first page.
    pub async fn return_to_list<D: Driver + ?Sized>(
        &self,
        driver: &D,
        surface: &mut ContentSurface,
    ) -> RecoveryRung {
        // a. list button
        if self.refresh_surface(driver, surface).await {
            if let Some(button) = self.find_list_button(driver, &surface.frame).await {
                info!(rung = "list_button", "Clicking list button on detail page");
                match driver.click(&button, ClickMode::Normal).await {
                    Ok(()) => {
                        if self.verify_return(driver, surface).await {
                            info!(rung = "list_button", "Returned to list page (verified)");
                            return RecoveryRung::ListButton;
                        }
                        warn!("List button click could not be verified");
                    }
                    Err(e) => warn!(error = %e, "List button strategy failed"),
                }
            }
        }

        // b. history back
        info!(rung = "history_back", "Trying browser back");
        if let Err(e) = driver.go_back().await {
            warn!(error = %e, "Browser back failed");
        }
        if self.verify_return(driver, surface).await {
            info!(rung = "history_back", "Returned to list page (verified)");
            return RecoveryRung::HistoryBack;
        }

        // d. soft recovery
        warn!(rung = "soft", "Still on detail page or lost, clicking menu");
        if self.soft_recover(driver, surface).await {
            if self.search(driver, &surface.frame).await {
                info!(rung = "soft", "Soft recovery returned to list");
                return RecoveryRung::Soft;
            }
            warn!(rung = "soft", "List reloaded by menu but search failed");
        }

        // e. hard recovery
        error!(rung = "hard", "All back strategies failed, restarting navigation");
        if let Some(fresh) = self.bootstrap(driver).await {
            *surface = fresh;
            if self.search(driver, &surface.frame).await {
                info!(rung = "hard", "Full navigation reset completed");
                warn!("Hard recovery resets pagination to page 1; its rows will be checked again");
                return RecoveryRung::Hard;
            }
            error!(rung = "hard", "Search failed after navigation reset");
        }

        error!(rung = "exhausted", "Recovery failed, abandoning current page");
        RecoveryRung::Exhausted
    }

    async fn soft_recover<D: Driver + ?Sized>(&self, driver: &D, surface: &mut ContentSurface) -> bool {
        let Some(step) = self.site.menu_path.last() else {
            return false;
        };
        let Some(item) = self.find_menu_item(driver, step).await else {
            warn!("Soft recovery: menu entry not found");
            return false;
        };
        if !driver.is_visible(&item).await.unwrap_or(false) {
            warn!("Soft recovery: menu entry not visible");
            return false;
        }
        if let Err(e) = driver.click(&item, ClickMode::Normal).await {
            warn!(error = %e, "Soft recovery failed");
            return false;
        }

        debug!("Clicked menu item, waiting for list");
        let Some(found) = self.locator.locate(driver).await else {
            return false;
        };
        *surface = found;
        wait_for_visible(driver, &surface.frame, &self.site.search_button, SOFT_VERIFY_TIMEOUT)
            .await
            .is_ok()
    }
}
