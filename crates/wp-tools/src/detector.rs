//! Image object detector backed by an HTTP inference service
//!
//! The service receives `{"image_base64": ...}` and answers with the image
//! size and raw boxes. Only boxes that look like free-standing upright
//! objects are kept: at least 5% of the image width, 10% of its height,
//! no wider than tall, and above the confidence threshold.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info};

use wp_core::config::DetectorConfig;
use wp_core::tool::{ParamKind, ParamSpec, RemoteTool, ToolDescriptor, ToolError, ToolInput, param_str};

pub const DETECTOR_TOOL: &str = "detect_objects";

const MIN_WIDTH_RATIO: f64 = 0.05;
const MIN_HEIGHT_RATIO: f64 = 0.10;

/// Largest image accepted from `image_url`
const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct DetectorReply {
    image_width: f64,
    image_height: f64,
    #[serde(default)]
    detections: Vec<RawDetection>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    /// `[x1, y1, x2, y2]` in image pixels
    #[serde(rename = "box")]
    bbox: [f64; 4],
    confidence: f64,
    #[serde(default)]
    class: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
    pub confidence: f64,
    pub class: Option<i64>,
    pub width: f64,
    pub height: f64,
    pub area: f64,
    pub aspect_ratio: f64,
}

impl From<RawDetection> for Detection {
    fn from(raw: RawDetection) -> Self {
        let [x1, y1, x2, y2] = raw.bbox;
        let width = x2 - x1;
        let height = y2 - y1;
        Self {
            bbox: raw.bbox,
            confidence: raw.confidence,
            class: raw.class,
            width,
            height,
            area: width * height,
            aspect_ratio: if height > 0.0 { width / height } else { 0.0 },
        }
    }
}

impl Detection {
    pub fn meets_criteria(&self, image_width: f64, image_height: f64, threshold: f64) -> bool {
        if self.width < image_width * MIN_WIDTH_RATIO || self.height < image_height * MIN_HEIGHT_RATIO {
            return false;
        }
        if self.aspect_ratio > 1.0 {
            return false;
        }
        self.confidence >= threshold
    }
}

fn too_large(limit: u64) -> ToolError {
    ToolError::Failed(format!("Image larger than {} bytes", limit))
}

pub struct DetectorTool {
    client: Client,
    endpoint: String,
    config: DetectorConfig,
    max_image_bytes: u64,
}

impl DetectorTool {
    pub fn new(endpoint: impl Into<String>, config: DetectorConfig) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("webpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            config,
            max_image_bytes: MAX_IMAGE_BYTES,
        })
    }

    #[cfg(test)]
    fn with_max_image_bytes(mut self, limit: u64) -> Self {
        self.max_image_bytes = limit;
        self
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ToolError> {
        info!(url = %url, "Downloading image for detection");
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Transport(format!("Image download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ToolError::Failed(format!("Failed to download image: {}", response.status())));
        }
        let limit = self.max_image_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(too_large(limit));
        }

        // Chunked replies carry no length, so cap while reading
        let mut image = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ToolError::Transport(format!("Failed to read image: {}", e)))?
        {
            if (image.len() + chunk.len()) as u64 > limit {
                return Err(too_large(limit));
            }
            image.extend_from_slice(&chunk);
        }
        Ok(image)
    }

    async fn detect(&self, image: &[u8]) -> Result<DetectorReply, ToolError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "image_base64": BASE64.encode(image) }))
            .send()
            .await
            .map_err(|e| ToolError::Transport(format!("Detector request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ToolError::Failed(format!("Detector returned {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| ToolError::InvalidOutput(e.to_string()))
    }
}

#[async_trait]
impl RemoteTool for DetectorTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            DETECTOR_TOOL,
            "Find upright free-standing objects (standees, banners, signs) in the current page \
             screenshot or in an image URL",
        )
        .param(
            ParamSpec::new("image_url", ParamKind::Url)
                .describe("Image to analyse instead of the current viewport")
                .optional(),
        )
        .concurrency_limit(self.config.concurrency_limit.max(1))
        .timeout(Duration::from_secs(self.config.timeout_secs))
        .depends_on_page(true)
        .tag("vision")
        .output_schema(json!({
            "type": "object",
            "properties": {
                "detections": {"type": "array"},
                "count": {"type": "integer"}
            }
        }))
    }

    async fn invoke(&self, input: ToolInput) -> Result<JsonValue, ToolError> {
        let image = match param_str(&input.params, "image_url") {
            Some(url) => self.download(url).await?,
            None => input
                .screenshot
                .ok_or_else(|| ToolError::Failed("no image_url given and no screenshot available".to_string()))?,
        };

        let reply = self.detect(&image).await?;
        let raw_count = reply.detections.len();
        let detections: Vec<Detection> = reply
            .detections
            .into_iter()
            .map(Detection::from)
            .filter(|d| d.meets_criteria(reply.image_width, reply.image_height, self.config.confidence_threshold))
            .collect();

        debug!(raw = raw_count, kept = detections.len(), "Filtered detections");
        Ok(json!({
            "detections": detections,
            "count": detections.len(),
            "image": {"width": reply.image_width, "height": reply.image_height},
            "page_url": input.page_url,
        }))
    }
}
