//! Common utilities for usb-hotplug
//!
//! This crate provides functionality shared between the hotplug library and
//! the watcher binary: logging setup, the common error type, and test
//! helpers used across crates.

pub mod error;
pub mod logging;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::setup_logging;
