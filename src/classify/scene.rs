use anyhow::Result;

use super::labels::{ClassLabel, Color, Condition, CropType};
use super::{Classifier, RawPrediction};
use crate::frame::Frame;

/// Minimum share of strongly coloured pixels before anything is reported.
const MIN_COVERAGE: f32 = 0.01;
/// Channel dominance (0..255) for a pixel to count as red or green.
const DOMINANCE: i16 = 40;
/// Channel ceiling for a pixel to count as a dark blemish.
const BLEMISH_MAX: u8 = 40;
/// Blemish share of the produce area above which it is reported damaged.
const DAMAGE_RATIO: f32 = 0.05;

/// Model-free colour classifier.
///
/// Reports the configured crop whenever enough strongly red or green pixels
/// are in view, with a confidence that grows with coverage. Used with the
/// synthetic source and on rigs without a model file.
pub struct SceneClassifier {
    crop: CropType,
    presence_min_conf: f32,
}

impl SceneClassifier {
    pub fn new(crop_name: &str, presence_min_conf: f32) -> Self {
        let crop = match CropType::from_name(crop_name) {
            CropType::Unknown => CropType::Tomato,
            crop => crop,
        };
        Self {
            crop,
            presence_min_conf,
        }
    }
}

impl Classifier for SceneClassifier {
    fn name(&self) -> &'static str {
        "scene"
    }

    fn predict(&mut self, frame: &Frame) -> Result<RawPrediction> {
        let mut red = 0u32;
        let mut green = 0u32;
        let mut blemish = 0u32;
        for px in frame.pixels().chunks_exact(3) {
            let (r, g, b) = (px[0] as i16, px[1] as i16, px[2] as i16);
            if r - g > DOMINANCE && r - b > DOMINANCE {
                red += 1;
            } else if g - r > DOMINANCE && g - b > DOMINANCE {
                green += 1;
            } else if px.iter().all(|&c| c < BLEMISH_MAX) {
                blemish += 1;
            }
        }

        let total = (frame.pixels().len() / 3).max(1) as f32;
        let produce = (red + green) as f32;
        let coverage = produce / total;
        if coverage < MIN_COVERAGE {
            return Ok(RawPrediction {
                confidence: coverage,
                ..RawPrediction::absent()
            });
        }

        let color = if red >= green { Color::Red } else { Color::Green };
        let condition = if blemish as f32 / produce > DAMAGE_RATIO {
            Condition::Damaged
        } else {
            Condition::NotDamaged
        };
        let confidence = (0.3 + coverage * 8.0).min(0.99);
        let label = ClassLabel {
            crop: self.crop,
            condition,
            color,
        };
        Ok(label.into_prediction(confidence, self.presence_min_conf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::PRESENCE_MIN_CONF;

    fn patch_frame(rgb: [u8; 3], size: u32) -> Frame {
        let (w, h) = (40u32, 40u32);
        let mut pixels = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                if x < size && y < size {
                    pixels.extend_from_slice(&rgb);
                } else {
                    pixels.extend_from_slice(&[85, 85, 85]);
                }
            }
        }
        Frame::from_rgb(pixels, w, h).unwrap()
    }

    #[test]
    fn empty_scene_is_not_present() -> Result<()> {
        let mut classifier = SceneClassifier::new("tomato", PRESENCE_MIN_CONF);
        let pred = classifier.predict(&Frame::solid(40, 40, [85, 85, 85])?)?;
        assert!(!pred.present);
        assert_eq!(pred.confidence, 0.0);
        Ok(())
    }

    #[test]
    fn red_patch_is_a_red_tomato() -> Result<()> {
        let mut classifier = SceneClassifier::new("tomato", PRESENCE_MIN_CONF);
        let pred = classifier.predict(&patch_frame([200, 30, 30], 12))?;
        assert!(pred.present);
        assert_eq!(pred.crop_type, "Tomato");
        assert_eq!(pred.color, "Red");
        assert_eq!(pred.condition, "Not Damaged");
        assert_eq!(pred.sorted_to, "Right Bin");
        assert!(pred.confidence > 0.4);
        Ok(())
    }

    #[test]
    fn green_patch_uses_configured_crop() -> Result<()> {
        let mut classifier = SceneClassifier::new("Bell Pepper", PRESENCE_MIN_CONF);
        let pred = classifier.predict(&patch_frame([20, 180, 30], 12))?;
        assert_eq!(pred.crop_type, "Bell Pepper");
        assert_eq!(pred.color, "Green");
        assert_eq!(pred.sorted_to, "Right Bin");
        Ok(())
    }
}
