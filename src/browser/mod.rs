//! Browser automation layer
//!
//! This module contains:
//! - The [`Driver`] trait: the navigation, lookup, and input primitives the
//!   crawl consumes
//! - Frame and element handles shared by every driver
//! - Polling helpers for waiting on element state
//! - A chromiumoxide-backed driver (feature `chrome`)

mod driver;
pub mod wait;


#[cfg(feature = "chrome")]
mod chrome;

pub use driver::{
    ClickMode, Driver, DriverError, DriverResult, ElementHandle, FrameHandle, FramePath,
};

#[cfg(feature = "chrome")]
pub use chrome::ChromeDriver;
