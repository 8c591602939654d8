use anyhow::{anyhow, Result};

/// Consecutive gated+stable ticks required before acceptance.
pub const MIN_PRESENT_STREAK: u32 = 1;
/// Identical class triples required in a row.
pub const CLASS_STABILITY: usize = 1;
/// Confidence floor for the first detection after arming.
pub const ARMED_FIRST_MIN_CONF: f32 = 0.40;
/// Mean absolute pixel difference that counts as "object moved in".
pub const MOTION_SCORE_THRESHOLD: f64 = 1.0;
/// Edge-richness floor for a frame to contain an object.
pub const SCENE_EDGE_MIN: f64 = 10.0;
/// Contrast floor for a frame to contain an object.
pub const SCENE_CONTRAST_MIN: f64 = 5.0;
/// Edge-richness change required against the arming baseline.
pub const EDGE_DELTA_MIN: f64 = 5.0;
/// Contrast change required against the arming baseline.
pub const CONTRAST_DELTA_MIN: f64 = 2.0;

/// Tunable gate thresholds.
#[derive(Clone, Debug, PartialEq)]
pub struct GateThresholds {
    pub min_present_streak: u32,
    pub class_stability: usize,
    pub armed_first_min_conf: f32,
    pub motion_score_threshold: f64,
    pub scene_edge_min: f64,
    pub scene_contrast_min: f64,
    pub edge_delta_min: f64,
    pub contrast_delta_min: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_present_streak: MIN_PRESENT_STREAK,
            class_stability: CLASS_STABILITY,
            armed_first_min_conf: ARMED_FIRST_MIN_CONF,
            motion_score_threshold: MOTION_SCORE_THRESHOLD,
            scene_edge_min: SCENE_EDGE_MIN,
            scene_contrast_min: SCENE_CONTRAST_MIN,
            edge_delta_min: EDGE_DELTA_MIN,
            contrast_delta_min: CONTRAST_DELTA_MIN,
        }
    }
}

impl GateThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.min_present_streak == 0 {
            return Err(anyhow!("min_present_streak must be at least 1"));
        }
        if self.class_stability == 0 {
            return Err(anyhow!("class_stability must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.armed_first_min_conf) {
            return Err(anyhow!(
                "armed_first_min_conf must be within 0..=1, got {}",
                self.armed_first_min_conf
            ));
        }
        for (name, value) in [
            ("motion_score_threshold", self.motion_score_threshold),
            ("scene_edge_min", self.scene_edge_min),
            ("scene_contrast_min", self.scene_contrast_min),
            ("edge_delta_min", self.edge_delta_min),
            ("contrast_delta_min", self.contrast_delta_min),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(anyhow!("{} must be a non-negative number, got {}", name, value));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(GateThresholds::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_window_and_bad_floor() {
        let mut t = GateThresholds {
            class_stability: 0,
            ..GateThresholds::default()
        };
        assert!(t.validate().is_err());

        t.class_stability = 2;
        t.armed_first_min_conf = 1.5;
        assert!(t.validate().is_err());

        t.armed_first_min_conf = 0.4;
        t.edge_delta_min = f64::NAN;
        assert!(t.validate().is_err());
    }
}
