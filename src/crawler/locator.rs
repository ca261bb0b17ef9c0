//! Content frame discovery
//!
//! The portal renders the list grid and the detail form inside nested frames
//! that appear asynchronously. [`ContentLocator`] checks every sub-frame with
//! an ordered set of independent checks and falls back to the top document.

use crate::browser::{Driver, FrameHandle, FramePath};
use crate::config::{CrawlerConfig, SiteProfile};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One independent test telling whether a frame hosts the content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSignal {
    /// Frame address contains the content-service marker
    UrlMarker,
    /// Frame text contains the list header phrase
    HeaderPhrase,
    /// Frame contains a grid container element
    GridContainer,
}

impl FrameSignal {
    /// Signals in the order they are tried against each frame
    pub const ORDERED: [FrameSignal; 3] = [
        FrameSignal::UrlMarker,
        FrameSignal::HeaderPhrase,
        FrameSignal::GridContainer,
    ];

    /// Tests the signal; driver failures count as "no match"
    pub async fn matches<D: Driver + ?Sized>(
        &self,
        driver: &D,
        frame: &FrameHandle,
        profile: &SiteProfile,
    ) -> bool {
        match self {
            Self::UrlMarker => {
                !profile.content_url_marker.is_empty()
                    && frame.url.contains(&profile.content_url_marker)
            }
            Self::HeaderPhrase => match driver.text_content(&frame.path).await {
                Ok(text) => !profile.header_phrase.is_empty() && text.contains(&profile.header_phrase),
                Err(_) => false,
            },
            Self::GridContainer => has_grid(driver, &frame.path, profile).await,
        }
    }
}

impl fmt::Display for FrameSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UrlMarker => "url_marker",
            Self::HeaderPhrase => "header_phrase",
            Self::GridContainer => "grid_container",
        };
        f.write_str(name)
    }
}

async fn has_grid<D: Driver + ?Sized>(driver: &D, frame: &FramePath, profile: &SiteProfile) -> bool {
    driver
        .query_all(frame, &profile.grid_container)
        .await
        .map(|found| !found.is_empty())
        .unwrap_or(false)
}

/// How the content surface was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatedBy {
    Frame(FrameSignal),
    /// The grid lives in the top-level document
    MainPage,
}

/// Frame currently hosting the grid or the detail form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSurface {
    pub frame: FramePath,
    pub located_by: LocatedBy,
}

impl ContentSurface {
    /// The top document, used when no frame could be identified
    pub fn main_page() -> Self {
        Self {
            frame: FramePath::top(),
            located_by: LocatedBy::MainPage,
        }
    }
}

/// Finds the frame hosting the portal content
#[derive(Debug, Clone)]
pub struct ContentLocator {
    profile: SiteProfile,
    attempts: u32,
    interval: Duration,
}

impl ContentLocator {
    pub fn new(profile: SiteProfile, attempts: u32, interval: Duration) -> Self {
        Self {
            profile,
            attempts: attempts.max(1),
            interval,
        }
    }

    pub fn from_config(profile: &SiteProfile, config: &CrawlerConfig) -> Self {
        Self::new(
            profile.clone(),
            config.locate_attempts,
            Duration::from_millis(config.locate_interval_ms),
        )
    }

    /// Single discovery pass over the current frame tree
    pub async fn scan<D: Driver + ?Sized>(&self, driver: &D) -> Option<ContentSurface> {
        let frames = match driver.frames().await {
            Ok(frames) => frames,
            Err(e) => {
                debug!(error = %e, "Could not list frames");
                Vec::new()
            }
        };

        for frame in &frames {
            for signal in FrameSignal::ORDERED {
                if signal.matches(driver, frame, &self.profile).await {
                    info!(frame = %frame.path, name = %frame.name, strategy = %signal, "Found content frame");
                    return Some(ContentSurface {
                        frame: frame.path.clone(),
                        located_by: LocatedBy::Frame(signal),
                    });
                }
            }
        }

        if has_grid(driver, &FramePath::top(), &self.profile).await {
            info!("Found grid on main page");
            return Some(ContentSurface::main_page());
        }

        None
    }

    /// Repeats [`scan`](Self::scan) on a fixed interval until something is found
    pub async fn locate<D: Driver + ?Sized>(&self, driver: &D) -> Option<ContentSurface> {
        for attempt in 1..=self.attempts {
            if let Some(surface) = self.scan(driver).await {
                return Some(surface);
            }
            debug!(attempt, max = self.attempts, "Content frame not found yet");
            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        warn!(attempts = self.attempts, "Content frame not found");
        None
    }

    /// Like [`locate`](Self::locate), but settles for the top document
    pub async fn locate_or_main<D: Driver + ?Sized>(&self, driver: &D) -> ContentSurface {
        match self.locate(driver).await {
            Some(surface) => surface,
            None => {
                warn!("Falling back to main page as content surface");
                ContentSurface::main_page()
            }
        }
    }
}
