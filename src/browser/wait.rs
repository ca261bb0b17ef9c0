//! Polling helpers built on top of [`Driver`] primitives
//!
//! These implement the "wait for element state" and text-filtered lookups
//! that the orchestrator uses, so drivers only need to answer point-in-time
//! queries.

use crate::browser::driver::{Driver, DriverError, DriverResult, ElementHandle, FramePath};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Interval between two polls of the DOM
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Returns the first visible element out of `elements`
///
/// Elements whose visibility cannot be queried (detached, stale) are skipped.
pub async fn first_visible<D: Driver + ?Sized>(
    driver: &D,
    elements: &[ElementHandle],
) -> Option<ElementHandle> {
    for element in elements {
        if let Ok(true) = driver.is_visible(element).await {
            return Some(element.clone());
        }
    }
    None
}

/// Elements matching `selector` whose rendered text contains (or equals) `text`
pub async fn query_by_text<D: Driver + ?Sized>(
    driver: &D,
    frame: &FramePath,
    selector: &str,
    text: &str,
    exact: bool,
) -> DriverResult<Vec<ElementHandle>> {
    let mut matched = Vec::new();
    for element in driver.query_all(frame, selector).await? {
        let Ok(inner) = driver.inner_text(&element).await else {
            continue;
        };
        let inner = inner.trim();
        let hit = if exact { inner == text } else { inner.contains(text) };
        if hit {
            matched.push(element);
        }
    }
    Ok(matched)
}

/// Waits until an element matching `selector` is visible
pub async fn wait_for_visible<D: Driver + ?Sized>(
    driver: &D,
    frame: &FramePath,
    selector: &str,
    timeout: Duration,
) -> DriverResult<ElementHandle> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(elements) = driver.query_all(frame, selector).await {
            if let Some(element) = first_visible(driver, &elements).await {
                return Ok(element);
            }
        }
        if Instant::now() >= deadline {
            return Err(DriverError::timeout(selector, timeout));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Waits until no element matching `selector` is visible
pub async fn wait_for_hidden<D: Driver + ?Sized>(
    driver: &D,
    frame: &FramePath,
    selector: &str,
    timeout: Duration,
) -> DriverResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let elements = driver.query_all(frame, selector).await.unwrap_or_default();
        if first_visible(driver, &elements).await.is_none() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(DriverError::timeout(format!("{} to hide", selector), timeout));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Waits until an element matching `selector` contains `text`
pub async fn wait_for_text<D: Driver + ?Sized>(
    driver: &D,
    frame: &FramePath,
    selector: &str,
    text: &str,
    timeout: Duration,
) -> DriverResult<ElementHandle> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(elements) = query_by_text(driver, frame, selector, text, false).await {
            if let Some(element) = elements.into_iter().next() {
                return Ok(element);
            }
        }
        if Instant::now() >= deadline {
            return Err(DriverError::timeout(
                format!("{} containing '{}'", selector, text),
                timeout,
            ));
        }
        sleep(POLL_INTERVAL).await;
    }
}
