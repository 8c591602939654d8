mod event;
mod machine;
pub mod scene;
mod thresholds;

pub use event::DetectionEvent;
pub use machine::{ClassTriple, ClassWindow, GateVerdict, GatingStateMachine};
pub use scene::{SceneAnalyzer, SceneReading, SceneStats};
pub use thresholds::{
    GateThresholds, ARMED_FIRST_MIN_CONF, CLASS_STABILITY, CONTRAST_DELTA_MIN, EDGE_DELTA_MIN,
    MIN_PRESENT_STREAK, MOTION_SCORE_THRESHOLD, SCENE_CONTRAST_MIN, SCENE_EDGE_MIN,
};
