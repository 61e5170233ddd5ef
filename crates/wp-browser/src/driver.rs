//! headless_chrome implementation of the browser driver

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use wp_core::driver::{BrowserDriver, DriverError, ElementTarget, FramePath, InputEvent, PageState, RawNode};

use crate::config::{BrowserConfig, launch_args};
use crate::error::{BrowserError, Result};
use crate::script::{self, EvalReply, InputReply, TreeReply};

/// The transport closes the browser after this long without protocol traffic
const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// One Chrome instance driving a single tab.
///
/// headless_chrome is blocking, so every call runs on the blocking pool.
pub struct ChromeDriver {
    // Keeps the browser process alive for as long as the tab is used
    _browser: Browser,
    tab: Arc<Tab>,
    config: BrowserConfig,
}

impl ChromeDriver {
    pub fn launch(config: BrowserConfig) -> Result<Self> {
        info!(headless = config.headless, width = config.width, height = config.height, "Launching browser");

        let args = launch_args(&config);
        let os_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();

        let launch_options = LaunchOptionsBuilder::default()
            .headless(config.headless)
            .window_size(Some((config.width, config.height)))
            .args(os_args)
            .idle_browser_timeout(IDLE_TIMEOUT)
            .build()
            .map_err(|e| BrowserError::Initialization(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| BrowserError::Initialization(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::TabError(format!("Failed to open tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_secs(config.navigation_timeout_secs));

        info!("Browser ready");
        Ok(Self {
            _browser: browser,
            tab,
            config,
        })
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    async fn blocking<T, F>(&self, call: F) -> std::result::Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || call(&tab))
            .await
            .map_err(|e| DriverError::Unavailable(format!("browser task failed: {}", e)))?
            .map_err(DriverError::from)
    }
}

/// Evaluate a script that returns a JSON string and decode it
fn evaluate_json<T: DeserializeOwned>(tab: &Tab, script: &str) -> Result<T> {
    evaluate_json_with(tab, script, false)
}

fn evaluate_json_with<T: DeserializeOwned>(tab: &Tab, script: &str, await_promise: bool) -> Result<T> {
    let object = tab
        .evaluate(script, await_promise)
        .map_err(|e| BrowserError::Extraction(format!("Script evaluation failed: {}", e)))?;

    let raw = object
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .ok_or_else(|| BrowserError::Script("script did not return a string".to_string()))?;

    serde_json::from_str(raw).map_err(|e| BrowserError::Script(e.to_string()))
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> std::result::Result<(), DriverError> {
        let url = url.to_string();
        self.blocking(move |tab| {
            info!(url = %url, "Navigating");
            tab.navigate_to(&url)
                .and_then(|tab| tab.wait_until_navigated())
                .map_err(|e| BrowserError::Navigation(format!("{}: {}", url, e)))?;
            Ok(())
        })
        .await
    }

    async fn page_state(&self) -> std::result::Result<PageState, DriverError> {
        self.blocking(|tab| evaluate_json(tab, script::PAGE_STATE)).await
    }

    async fn query_tree(&self, frame_path: &FramePath) -> std::result::Result<Vec<RawNode>, DriverError> {
        let path = frame_path.clone();
        let query = script::tree_query(frame_path);
        self.blocking(move |tab| {
            let reply: TreeReply = evaluate_json(tab, &query)?;
            if let Some(error) = reply.error {
                return Err(if path.is_root() {
                    BrowserError::Extraction(error)
                } else {
                    BrowserError::Frame(error)
                });
            }
            debug!(frame = %path, roots = reply.roots.len(), "Queried frame document");
            Ok(reply.roots)
        })
        .await
    }

    async fn dispatch_input(&self, target: &ElementTarget, event: &InputEvent) -> std::result::Result<(), DriverError> {
        let script = script::dispatch_input(target, event);
        let locator = target.locator.clone();
        let event = event.clone();
        self.blocking(move |tab| {
            let reply: InputReply = evaluate_json(tab, &script)?;
            if !reply.ok {
                let error = reply.error.unwrap_or_else(|| "unknown error".to_string());
                return Err(if reply.missing {
                    BrowserError::ElementNotFound(format!("{} ({})", locator, error))
                } else {
                    BrowserError::Interaction(error)
                });
            }

            if let InputEvent::Key { key } = &event {
                tab.press_key(key)
                    .map_err(|e| BrowserError::Interaction(format!("Failed to press '{}': {}", key, e)))?;
            }
            debug!(event = event.name(), locator = %locator, "Dispatched input");
            Ok(())
        })
        .await
    }

    async fn screenshot(&self) -> std::result::Result<Vec<u8>, DriverError> {
        self.blocking(|tab| {
            tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| BrowserError::Screenshot(e.to_string()))
        })
        .await
    }

    async fn go_back(&self) -> std::result::Result<(), DriverError> {
        self.blocking(|tab| {
            tab.evaluate("history.back()", false)
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            tab.wait_until_navigated()
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn scroll_viewport(&self, dy: f64) -> std::result::Result<(), DriverError> {
        let script = script::scroll_viewport(dy);
        self.blocking(move |tab| {
            tab.evaluate(&script, false)
                .map_err(|e| BrowserError::Interaction(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn evaluate(
        &self,
        function: &str,
        args: &[JsonValue],
        target: Option<&ElementTarget>,
    ) -> std::result::Result<JsonValue, DriverError> {
        let script = script::evaluate_function(function, args, target);
        let locator = target.map(|t| t.locator.clone());
        self.blocking(move |tab| {
            let reply: EvalReply = evaluate_json_with(tab, &script, true)?;
            if reply.ok {
                return Ok(reply.value);
            }
            let error = reply.error.unwrap_or_else(|| "unknown error".to_string());
            Err(match (reply.missing, locator) {
                (true, Some(locator)) => BrowserError::ElementNotFound(format!("{} ({})", locator, error)),
                _ => BrowserError::Evaluation(error),
            })
        })
        .await
    }
}
