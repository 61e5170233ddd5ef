//! Error types for wp-browser

use thiserror::Error;
use wp_core::driver::DriverError;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Browser initialization failed: {0}")]
    Initialization(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Tab error: {0}")]
    TabError(String),

    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Unexpected script result: {0}")]
    Script(String),

    #[error("Page script threw: {0}")]
    Evaluation(String),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

impl From<BrowserError> for DriverError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::Navigation(msg) => DriverError::Navigation(msg),
            BrowserError::ElementNotFound(msg) => DriverError::ElementNotFound(msg),
            BrowserError::Interaction(msg) => DriverError::Input(msg),
            BrowserError::Screenshot(msg) => DriverError::Screenshot(msg),
            BrowserError::Frame(msg) => DriverError::FrameNotFound(msg),
            BrowserError::Evaluation(msg) => DriverError::Script(msg),
            BrowserError::Extraction(msg) | BrowserError::Script(msg) => DriverError::Query(msg),
            BrowserError::Initialization(msg) | BrowserError::TabError(msg) => DriverError::Unavailable(msg),
        }
    }
}
