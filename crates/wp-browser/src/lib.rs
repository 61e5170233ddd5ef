//! wp-browser: Chrome backend and built-in browser actions for webpilot
//!
//! ## Features
//!
//! - [`ChromeDriver`], a [`wp_core::BrowserDriver`] over headless_chrome
//! - Frame-aware tree queries with positions in top-level viewport coordinates
//! - Input dispatch that works with framework-controlled form fields
//! - The local action catalog: navigate, click, type, scroll, hover, keys,
//!   select, back, wait, screenshot, text extraction and page scripts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wp_browser::{BrowserConfig, ChromeDriver, register_browser_actions};
//! use wp_core::CapabilityRegistry;
//!
//! let config = BrowserConfig::default();
//! let driver = Arc::new(ChromeDriver::launch(config.clone())?);
//!
//! let mut registry = CapabilityRegistry::new();
//! register_browser_actions(&mut registry, &config)?;
//! ```

pub mod actions;
pub mod config;
pub mod driver;
pub mod error;
mod script;

pub use actions::register_browser_actions;
pub use config::{BrowserConfig, launch_args};
pub use driver::ChromeDriver;
pub use error::{BrowserError, Result};
