//! wp-tools: built-in remote tools for webpilot
//!
//! Remote tools run outside the browser and may be invoked concurrently,
//! each bounded by its own concurrency limit.

use std::sync::Arc;

use tracing::info;
use wp_core::config::DetectorConfig;
use wp_core::tool::{CapabilityRegistry, RemoteTool};

pub mod detector;

pub use detector::{DETECTOR_TOOL, Detection, DetectorTool};

/// Register every built-in tool whose configuration is complete.
///
/// The detector is only registered when an endpoint is configured.
pub fn register_default_tools(registry: &mut CapabilityRegistry, detector: &DetectorConfig) -> wp_core::Result<()> {
    let Some(endpoint) = detector.endpoint.as_deref().filter(|e| !e.is_empty()) else {
        info!("No detector endpoint configured, skipping detector tool");
        return Ok(());
    };

    let tool = DetectorTool::new(endpoint, detector.clone()).map_err(|e| wp_core::Error::Config(e.to_string()))?;
    registry.register_tool(Arc::new(tool) as Arc<dyn RemoteTool>)?;
    Ok(())
}
