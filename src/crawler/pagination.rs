//! Page-number navigation
//!
//! The list's pager is re-rendered by the site on every page change and its
//! markup varies, so the next page control is searched for with an ordered
//! set of strategies. The first one that clicks something wins.

use crate::browser::wait::query_by_text;
use crate::browser::{ClickMode, Driver, ElementHandle, FramePath};
use crate::config::SiteProfile;
use std::fmt;
use tracing::{debug, info, warn};

/// One way of reaching a numbered page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStrategy {
    /// `a[index='N']`, if visible
    IndexAttribute,
    /// Element id derived from the pager's id prefix
    DerivedId,
    /// Anchor whose trimmed text is exactly `N`, if visible
    ExactText,
    /// Pager label class with text `N`
    LabelClass,
    /// Anchor whose digits read `N`
    LooseText,
    /// `getElementById(..).click()` evaluated in the frame
    ScriptById,
    /// Script scan over rendered `a, li, div` elements with text `N`
    ScriptTextScan,
}

impl PageStrategy {
    pub const ORDERED: [PageStrategy; 7] = [
        Self::IndexAttribute,
        Self::DerivedId,
        Self::ExactText,
        Self::LabelClass,
        Self::LooseText,
        Self::ScriptById,
        Self::ScriptTextScan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndexAttribute => "index_attribute",
            Self::DerivedId => "derived_id",
            Self::ExactText => "exact_text",
            Self::LabelClass => "label_class",
            Self::LooseText => "loose_text",
            Self::ScriptById => "script_by_id",
            Self::ScriptTextScan => "script_text_scan",
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Self::ScriptById | Self::ScriptTextScan)
    }

    /// Tries to click page `page`; true if a click went through
    pub async fn attempt<D: Driver + ?Sized>(
        &self,
        driver: &D,
        frame: &FramePath,
        profile: &SiteProfile,
        page: u32,
    ) -> bool {
        let label = page.to_string();
        match self {
            Self::IndexAttribute => {
                let selector = format!("a[index='{}']", page);
                let found = first_of(driver.query_all(frame, &selector).await.ok());
                click_if(driver, found, true).await
            }
            Self::DerivedId => {
                let selector = format!("#{}{}", profile.pagination_id_prefix, page);
                let found = first_of(driver.query_all(frame, &selector).await.ok());
                click_if(driver, found, false).await
            }
            Self::ExactText => {
                let found = first_of(query_by_text(driver, frame, "a", &label, true).await.ok());
                click_if(driver, found, true).await
            }
            Self::LabelClass => {
                let found = first_of(
                    query_by_text(driver, frame, &profile.page_label_selector, &label, true)
                        .await
                        .ok(),
                );
                click_if(driver, found, false).await
            }
            Self::LooseText => {
                let anchors = query_by_text(driver, frame, "a", &label, false).await.unwrap_or_default();
                let mut found = None;
                for anchor in anchors {
                    let Ok(text) = driver.inner_text(&anchor).await else {
                        continue;
                    };
                    if digits_of(&text) == label {
                        found = Some(anchor);
                        break;
                    }
                }
                click_if(driver, found, false).await
            }
            Self::ScriptById => {
                let id = format!("{}{}", profile.pagination_id_prefix, page);
                evaluate_flag(driver, frame, &click_by_id_script(&id)).await
            }
            Self::ScriptTextScan => evaluate_flag(driver, frame, &click_by_text_script(&label)).await,
        }
    }
}

impl fmt::Display for PageStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn first_of(found: Option<Vec<ElementHandle>>) -> Option<ElementHandle> {
    found.and_then(|elements| elements.into_iter().next())
}

fn digits_of(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

async fn click_if<D: Driver + ?Sized>(driver: &D, element: Option<ElementHandle>, require_visible: bool) -> bool {
    let Some(element) = element else {
        return false;
    };
    if require_visible && !driver.is_visible(&element).await.unwrap_or(false) {
        return false;
    }
    match driver.click(&element, ClickMode::Normal).await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Pager click failed");
            false
        }
    }
}

async fn evaluate_flag<D: Driver + ?Sized>(driver: &D, frame: &FramePath, script: &str) -> bool {
    match driver.evaluate(frame, script).await {
        Ok(value) => value.as_bool().unwrap_or(false),
        Err(e) => {
            warn!(error = %e, "Script fallback failed");
            false
        }
    }
}

/// Function expression clicking the element with id `id`
pub fn click_by_id_script(id: &str) -> String {
    let literal = serde_json::Value::String(id.to_string()).to_string();
    format!(
        "function () {{ const el = document.getElementById({}); if (el) {{ el.click(); return true; }} return false; }}",
        literal
    )
}

/// Function expression clicking the first rendered `a, li, div` whose text is `text`
pub fn click_by_text_script(text: &str) -> String {
    let literal = serde_json::Value::String(text.to_string()).to_string();
    format!(
        "function () {{ const want = {}; for (const el of document.querySelectorAll('a, li, div')) {{ \
         if (el.innerText.trim() === want && el.offsetParent !== null) {{ el.click(); return true; }} }} \
         return false; }}",
        literal
    )
}

/// Walks the strategy ladder for page `page`
///
/// Returns the strategy that clicked, or `None` when no control for that page
/// exists (which is also what the end of the list looks like).
pub async fn go_to_page<D: Driver + ?Sized>(
    driver: &D,
    frame: &FramePath,
    profile: &SiteProfile,
    page: u32,
) -> Option<PageStrategy> {
    info!(page, "Trying to find page");
    for strategy in PageStrategy::ORDERED {
        if strategy.attempt(driver, frame, profile, page).await {
            info!(page, strategy = %strategy, "Clicked page link");
            return Some(strategy);
        }
        debug!(page, strategy = %strategy, "Pagination strategy did not apply");
    }
    warn!(page, "Could not find link for page");
    None
}

/// Texts of the pager controls currently in the frame, for diagnostics
pub async fn visible_page_labels<D: Driver + ?Sized>(
    driver: &D,
    frame: &FramePath,
    profile: &SiteProfile,
) -> Vec<String> {
    let selector = format!("{}, .w2pageList a", profile.page_label_selector);
    let mut labels = Vec::new();
    for element in driver.query_all(frame, &selector).await.unwrap_or_default() {
        if let Ok(text) = driver.inner_text(&element).await {
            labels.push(text.trim().to_string());
        }
    }
    labels
}
