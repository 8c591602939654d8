//! Scene analysis: per-frame statistics, arming baseline and motion tracking.
//!
//! Statistics are computed on the luma plane:
//! - edge richness: variance of the 4-neighbour Laplacian over interior pixels
//! - contrast: population standard deviation of pixel intensities
//!
//! Computation can fail (degenerate frame sizes, non-finite results). That is
//! reported as `SceneReading::Unavailable`; the gating machine decides to fail
//! open on it.

use anyhow::{anyhow, Result};

use super::thresholds::GateThresholds;
use crate::frame::{Frame, GrayFrame};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneStats {
    pub edge_richness: f64,
    pub contrast: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SceneReading {
    Ok(SceneStats),
    Unavailable,
}

impl SceneReading {
    pub fn stats(&self) -> Option<&SceneStats> {
        match self {
            SceneReading::Ok(stats) => Some(stats),
            SceneReading::Unavailable => None,
        }
    }
}

/// Compute scene statistics for a frame. Pure.
pub fn compute_stats(frame: &Frame) -> SceneReading {
    match stats_for_gray(&frame.to_gray()) {
        Ok(stats) => SceneReading::Ok(stats),
        Err(err) => {
            log::debug!("scene stats unavailable: {}", err);
            SceneReading::Unavailable
        }
    }
}

pub fn stats_for_gray(gray: &GrayFrame) -> Result<SceneStats> {
    let w = gray.width() as usize;
    let h = gray.height() as usize;
    if w < 3 || h < 3 {
        return Err(anyhow!("frame {}x{} too small for edge statistics", w, h));
    }
    let px = gray.data();

    let n = px.len() as f64;
    let mean = px.iter().map(|&p| p as f64).sum::<f64>() / n;
    let var = px
        .iter()
        .map(|&p| {
            let d = p as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;

    let mut lap_sum = 0.0;
    let mut lap_sq = 0.0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let c = px[y * w + x] as f64;
            let l = px[(y - 1) * w + x] as f64
                + px[(y + 1) * w + x] as f64
                + px[y * w + x - 1] as f64
                + px[y * w + x + 1] as f64
                - 4.0 * c;
            lap_sum += l;
            lap_sq += l * l;
        }
    }
    let count = ((w - 2) * (h - 2)) as f64;
    let lap_mean = lap_sum / count;
    let lap_var = (lap_sq / count - lap_mean * lap_mean).max(0.0);

    let stats = SceneStats {
        edge_richness: lap_var,
        contrast: var.sqrt(),
    };
    if !stats.edge_richness.is_finite() || !stats.contrast.is_finite() {
        return Err(anyhow!("scene statistics are not finite"));
    }
    Ok(stats)
}

/// Retained scene state: arming baseline, previous luma plane and the sticky
/// motion-since-arm flag.
#[derive(Debug)]
pub struct SceneAnalyzer {
    edge_min: f64,
    contrast_min: f64,
    edge_delta_min: f64,
    contrast_delta_min: f64,
    motion_threshold: f64,
    baseline: Option<SceneStats>,
    last_gray: Option<GrayFrame>,
    motion_seen_since_arm: bool,
    last_motion_score: f64,
}

impl SceneAnalyzer {
    pub fn new(thresholds: &GateThresholds) -> Self {
        Self {
            edge_min: thresholds.scene_edge_min,
            contrast_min: thresholds.scene_contrast_min,
            edge_delta_min: thresholds.edge_delta_min,
            contrast_delta_min: thresholds.contrast_delta_min,
            motion_threshold: thresholds.motion_score_threshold,
            baseline: None,
            last_gray: None,
            motion_seen_since_arm: false,
            last_motion_score: 0.0,
        }
    }

    /// Frame is neither flat nor blank.
    pub fn has_object(&self, stats: &SceneStats) -> bool {
        stats.edge_richness > self.edge_min && stats.contrast > self.contrast_min
    }

    /// True when no baseline is set yet.
    pub fn changed_vs_baseline(&self, stats: &SceneStats) -> bool {
        let Some(baseline) = self.baseline else {
            return true;
        };
        (stats.edge_richness - baseline.edge_richness).abs() > self.edge_delta_min
            || (stats.contrast - baseline.contrast).abs() > self.contrast_delta_min
    }

    /// Feed the next frame into the motion tracker and return the sticky
    /// motion-seen-since-arm flag.
    ///
    /// The first frame after a reset only primes the tracker. The flag is only
    /// raised while `armed`, and stays raised until the next `reset`.
    pub fn update_motion(&mut self, frame: &Frame, armed: bool) -> bool {
        let gray = frame.to_gray();
        let Some(prev) = self.last_gray.take() else {
            self.last_gray = Some(gray);
            return self.motion_seen_since_arm;
        };
        match gray.mean_abs_diff(&prev) {
            Ok(score) => {
                self.last_motion_score = score;
                if armed && score > self.motion_threshold {
                    self.motion_seen_since_arm = true;
                }
            }
            Err(err) => log::debug!("motion score unavailable: {}", err),
        }
        self.last_gray = Some(gray);
        self.motion_seen_since_arm
    }

    /// Store the frame's statistics as the arming baseline.
    pub fn snapshot_baseline(&mut self, frame: &Frame) {
        self.snapshot_reading(compute_stats(frame));
    }

    /// Store an already computed reading as the baseline. An unavailable
    /// reading leaves no baseline, so the next frame retries.
    pub fn snapshot_reading(&mut self, reading: SceneReading) {
        self.baseline = reading.stats().copied();
        if let Some(b) = self.baseline {
            log::debug!(
                "scene baseline captured: edges={:.2} contrast={:.2}",
                b.edge_richness,
                b.contrast
            );
        }
    }

    pub fn baseline(&self) -> Option<SceneStats> {
        self.baseline
    }

    pub fn motion_seen(&self) -> bool {
        self.motion_seen_since_arm
    }

    pub fn last_motion_score(&self) -> f64 {
        self.last_motion_score
    }

    /// Forget the previous frame, the baseline and the motion flag.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.last_gray = None;
        self.motion_seen_since_arm = false;
        self.last_motion_score = 0.0;
    }
}
