//! Frame ingestion sources.
//!
//! This module provides the camera side of the rig:
//! - Synthetic source for `stub://` URLs (bench and tests)
//! - HTTP MJPEG/JPEG cameras (feature: ingest-http)
//!
//! All sources produce owned `Frame` instances that the capture loop hands to
//! the classifier and the gating engine. Sources are responsible for decoding
//! to RGB24 and for decimating to the configured frame rate.
//!
//! The ingestion layer MUST NOT store frames to disk or log pixel content.

#[cfg(feature = "ingest-http")]
pub mod http;
pub mod synthetic;

use std::time::Duration;

use anyhow::{bail, Result};

use crate::frame::Frame;

#[cfg(feature = "ingest-http")]
pub use http::HttpSource;
pub use synthetic::SyntheticSource;

/// Source used when nothing is configured.
pub const DEFAULT_SOURCE_URL: &str = "stub://belt_camera";

/// Where frames come from and how they are shaped.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceSettings {
    /// Source URL. `stub://...` selects the synthetic source, `http(s)://...`
    /// an MJPEG or snapshot camera.
    pub url: String,
    /// Target frame rate. Sources decimate to this rate; 0 means unthrottled.
    pub target_fps: u32,
    /// Frame width (synthetic frames only; cameras report their own).
    pub width: u32,
    /// Frame height (synthetic frames only; cameras report their own).
    pub height: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            target_fps: 15,
            width: 640,
            height: 480,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// A continuous supply of frames.
pub trait FrameSource: Send {
    /// Open the underlying stream. Called again after the source reports
    /// itself unhealthy.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Pick a source implementation by URL scheme.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let url = settings.url.trim();
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())?));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        #[cfg(feature = "ingest-http")]
        {
            return Ok(Box::new(HttpSource::new(settings.clone())));
        }
        #[cfg(not(feature = "ingest-http"))]
        {
            bail!("http sources require the ingest-http feature");
        }
    }
    bail!("unsupported source url '{}'", url)
}

/// Minimum spacing between delivered frames for a target rate.
pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

/// How long a source may go without a frame before it counts as unhealthy.
pub(crate) fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}
