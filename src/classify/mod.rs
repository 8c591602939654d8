//! Classifier adapter.
//!
//! A classifier turns one frame into one `RawPrediction`. Backends implement
//! `Classifier` and may fail; the capture loop only ever talks to a
//! `ClassifierAdapter`, which absorbs backend failures into a non-present,
//! zero-confidence prediction so a broken model can never stop the loop.

mod labels;
mod scene;
mod scripted;
#[cfg(feature = "backend-tract")]
mod tract;

use anyhow::Result;
use serde::Serialize;

use crate::frame::Frame;

pub use labels::{crop_display_name, ClassLabel, Color, Condition, CropType, SortBin, REPORTED_SIZE};
pub use scene::SceneClassifier;
pub use scripted::ScriptedClassifier;
#[cfg(feature = "backend-tract")]
pub use tract::OnnxClassifier;

/// General presence floor applied by label-producing backends.
pub const PRESENCE_MIN_CONF: f32 = 0.20;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local wall-clock timestamp in the rig's record format.
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Classifier output for a single frame. Never retained beyond one gating pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RawPrediction {
    pub present: bool,
    pub confidence: f32,
    pub crop_type: String,
    pub condition: String,
    pub color: String,
    pub sorted_to: String,
    pub size: String,
    pub timestamp: String,
}

impl RawPrediction {
    /// Non-present, zero-confidence prediction stamped now.
    pub fn absent() -> Self {
        Self {
            timestamp: now_timestamp(),
            ..Self::default()
        }
    }

    pub fn class_triple(&self) -> (&str, &str, &str) {
        (&self.crop_type, &self.condition, &self.color)
    }
}

/// Classifier backend.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Classify a frame.
    fn predict(&mut self, frame: &Frame) -> Result<RawPrediction>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Never-failing wrapper around a classifier backend.
pub struct ClassifierAdapter {
    inner: Box<dyn Classifier>,
    degraded: u64,
}

impl ClassifierAdapter {
    pub fn new<C: Classifier + 'static>(classifier: C) -> Self {
        Self::from_boxed(Box::new(classifier))
    }

    pub fn from_boxed(inner: Box<dyn Classifier>) -> Self {
        Self { inner, degraded: 0 }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn warm_up(&mut self) {
        if let Err(err) = self.inner.warm_up() {
            log::warn!("classifier {} warm-up failed: {:#}", self.inner.name(), err);
        }
    }

    /// Classify a frame. Backend errors degrade to `RawPrediction::absent()`.
    pub fn predict(&mut self, frame: &Frame) -> RawPrediction {
        match self.inner.predict(frame) {
            Ok(mut pred) => {
                if !pred.confidence.is_finite() {
                    pred.confidence = 0.0;
                    pred.present = false;
                }
                pred.confidence = pred.confidence.clamp(0.0, 1.0);
                if pred.timestamp.is_empty() {
                    pred.timestamp = now_timestamp();
                }
                pred
            }
            Err(err) => {
                self.degraded += 1;
                log::warn!(
                    "classifier {} failed, treating frame as empty: {:#}",
                    self.inner.name(),
                    err
                );
                RawPrediction::absent()
            }
        }
    }

    /// Number of predictions absorbed because the backend failed.
    pub fn degraded_count(&self) -> u64 {
        self.degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Broken;

    impl Classifier for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn predict(&mut self, _frame: &Frame) -> Result<RawPrediction> {
            Err(anyhow!("model session lost"))
        }
    }

    #[test]
    fn adapter_absorbs_backend_failures() {
        let mut adapter = ClassifierAdapter::new(Broken);
        let frame = Frame::solid(4, 4, [0, 0, 0]).unwrap();
        let pred = adapter.predict(&frame);
        assert!(!pred.present);
        assert_eq!(pred.confidence, 0.0);
        assert!(!pred.timestamp.is_empty());
        assert_eq!(adapter.degraded_count(), 1);
    }

    #[test]
    fn adapter_sanitizes_confidence() {
        let mut scripted = ScriptedClassifier::new();
        scripted.push(RawPrediction {
            present: true,
            confidence: f32::NAN,
            ..RawPrediction::default()
        });
        scripted.push(RawPrediction {
            present: true,
            confidence: 1.7,
            ..RawPrediction::default()
        });
        let mut adapter = ClassifierAdapter::new(scripted);
        let frame = Frame::solid(4, 4, [0, 0, 0]).unwrap();

        let first = adapter.predict(&frame);
        assert!(!first.present);
        assert_eq!(first.confidence, 0.0);

        let second = adapter.predict(&frame);
        assert!(second.present);
        assert_eq!(second.confidence, 1.0);
        assert!(!second.timestamp.is_empty());
    }
}
