//! Gating state machine.
//!
//! One `evaluate` call per inference tick. Gates run in a fixed order and the
//! first failure yields a non-present event:
//!
//! 1. armed confidence floor (first detection after arming)
//! 2. model presence
//! 3. scene has object
//! 4. scene changed against the arming baseline
//! 5. motion seen since arming
//! 6. class stability window
//! 7. present-streak debounce
//!
//! Passing all of them assigns the next `seq`, clears the window and streak and
//! consumes the armed flag.

use std::collections::VecDeque;

use super::event::DetectionEvent;
use super::scene::{compute_stats, SceneAnalyzer};
use super::thresholds::GateThresholds;
use crate::classify::{crop_display_name, now_timestamp, RawPrediction};
use crate::frame::Frame;

/// Outcome of the most recent gating pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateVerdict {
    Idle,
    LowFirstConfidence,
    ModelAbsent,
    SceneEmpty,
    SceneUnchanged,
    NoMotion,
    ClassUnstable,
    Debouncing,
    Accepted,
}

impl GateVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            GateVerdict::Idle => "idle",
            GateVerdict::LowFirstConfidence => "low_first_confidence",
            GateVerdict::ModelAbsent => "model_absent",
            GateVerdict::SceneEmpty => "scene_empty",
            GateVerdict::SceneUnchanged => "scene_unchanged",
            GateVerdict::NoMotion => "no_motion",
            GateVerdict::ClassUnstable => "class_unstable",
            GateVerdict::Debouncing => "debouncing",
            GateVerdict::Accepted => "accepted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassTriple {
    pub crop_type: String,
    pub condition: String,
    pub color: String,
}

impl From<&RawPrediction> for ClassTriple {
    fn from(pred: &RawPrediction) -> Self {
        let (crop_type, condition, color) = pred.class_triple();
        Self {
            crop_type: crop_type.to_string(),
            condition: condition.to_string(),
            color: color.to_string(),
        }
    }
}

/// Sliding window over the last `capacity` class triples.
#[derive(Debug)]
pub struct ClassWindow {
    entries: VecDeque<ClassTriple>,
    capacity: usize,
}

impl ClassWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, triple: ClassTriple) {
        self.entries.push_back(triple);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Full, and every entry identical.
    pub fn is_stable(&self) -> bool {
        if self.entries.len() != self.capacity {
            return false;
        }
        match self.entries.front() {
            Some(first) => self.entries.iter().all(|t| t == first),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub struct GatingStateMachine {
    thresholds: GateThresholds,
    scene: SceneAnalyzer,
    window: ClassWindow,
    present_streak: u32,
    seq: u64,
    armed: bool,
    target_crop: String,
    last_verdict: GateVerdict,
}

impl GatingStateMachine {
    pub fn new(thresholds: GateThresholds) -> Self {
        Self {
            scene: SceneAnalyzer::new(&thresholds),
            window: ClassWindow::new(thresholds.class_stability),
            thresholds,
            present_streak: 0,
            seq: 0,
            armed: false,
            target_crop: String::new(),
            last_verdict: GateVerdict::Idle,
        }
    }

    /// Enter armed mode: the next acceptance must clear the stricter
    /// confidence floor and must follow fresh motion and a fresh baseline.
    pub fn arm(&mut self) {
        self.armed = true;
        self.present_streak = 0;
        self.window.clear();
        self.scene.reset();
        self.last_verdict = GateVerdict::Idle;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Last assigned sequence number (0 before the first acceptance).
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn last_verdict(&self) -> GateVerdict {
        self.last_verdict
    }

    pub fn present_streak(&self) -> u32 {
        self.present_streak
    }

    /// Advisory crop name used when the classifier leaves the crop blank.
    pub fn set_target_crop(&mut self, name: &str) {
        self.target_crop = name.trim().to_lowercase();
    }

    pub fn target_crop(&self) -> &str {
        &self.target_crop
    }

    pub fn evaluate(&mut self, pred: RawPrediction, frame: &Frame) -> DetectionEvent {
        let confidence = pred.confidence;

        // Scene state advances every tick, whatever the verdict.
        let reading = compute_stats(frame);
        if self.armed && self.scene.baseline().is_none() {
            self.scene.snapshot_reading(reading);
        }
        let scene_ok = reading.stats().map_or(true, |s| self.scene.has_object(s));
        let changed = reading
            .stats()
            .map_or(true, |s| self.scene.changed_vs_baseline(s));
        let motion_ok = self.scene.update_motion(frame, self.armed);

        let low_first = self.armed && confidence < self.thresholds.armed_first_min_conf;
        let failed = if low_first {
            Some(GateVerdict::LowFirstConfidence)
        } else if !pred.present {
            Some(GateVerdict::ModelAbsent)
        } else if !scene_ok {
            Some(GateVerdict::SceneEmpty)
        } else if !changed {
            Some(GateVerdict::SceneUnchanged)
        } else if !motion_ok {
            Some(GateVerdict::NoMotion)
        } else {
            None
        };
        if let Some(verdict) = failed {
            self.present_streak = 0;
            self.window.clear();
            return self.reject(verdict, confidence);
        }

        self.window.push(ClassTriple::from(&pred));
        if !self.window.is_stable() {
            self.present_streak = 0;
            return self.reject(GateVerdict::ClassUnstable, confidence);
        }

        self.present_streak += 1;
        if self.present_streak < self.thresholds.min_present_streak {
            return self.reject(GateVerdict::Debouncing, confidence);
        }

        self.accept(pred)
    }

    fn reject(&mut self, verdict: GateVerdict, confidence: f32) -> DetectionEvent {
        if verdict != self.last_verdict {
            log::debug!(
                "gate rejected tick: {} (conf={:.2}, armed={}, streak={})",
                verdict.as_str(),
                confidence,
                self.armed,
                self.present_streak
            );
        }
        self.last_verdict = verdict;
        DetectionEvent::absent(self.seq, confidence)
    }

    fn accept(&mut self, pred: RawPrediction) -> DetectionEvent {
        self.seq += 1;
        let crop_type = if pred.crop_type.is_empty() {
            crop_display_name(&self.target_crop)
        } else {
            pred.crop_type
        };
        let time_detected = if pred.timestamp.is_empty() {
            now_timestamp()
        } else {
            pred.timestamp
        };
        let event = DetectionEvent {
            present: true,
            seq: self.seq,
            crop_type,
            condition: pred.condition,
            color: pred.color,
            sorted_to: pred.sorted_to,
            size: pred.size,
            time_detected,
            confidence: pred.confidence,
        };

        self.present_streak = 0;
        self.window.clear();
        let was_armed = std::mem::replace(&mut self.armed, false);
        self.last_verdict = GateVerdict::Accepted;

        log::info!(
            "detection accepted: seq={} {} / {} / {} -> {} (conf={:.2}, consumed_arm={})",
            event.seq,
            event.crop_type,
            event.condition,
            event.color,
            event.sorted_to,
            event.confidence,
            was_armed
        );
        event
    }
}
