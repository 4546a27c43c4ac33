//! Utility functions shared by the library and the CLI.
//!
//! - [`app_data`] - Configuration file in the app data directory (XDG-compliant)
//! - [`known_folder`] - Well-known user folders usable as scopes
//! - [`progress`] - Crawl spinner, no-op without the `progress` feature

pub mod app_data;
pub mod known_folder;
pub mod progress;

pub use app_data::*;
pub use known_folder::*;
