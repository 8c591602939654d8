//! Sort Kernel
//!
//! This crate implements the detection arming and gating engine of a
//! produce-sorting rig: a camera feeds frames to a classifier, and the engine
//! turns the noisy per-frame predictions into a small number of trustworthy,
//! uniquely sequenced detection events that a request-driven caller can wait
//! for after explicitly arming.
//!
//! # Architecture
//!
//! The engine holds these properties by construction:
//!
//! 1. **Monotonic sequence**: `seq` is assigned only at acceptance and is
//!    strictly increasing for the process lifetime.
//! 2. **Arm suppression**: while armed, readers never see an event whose
//!    `seq` is not newer than the arm token.
//! 3. **Single lock**: the shared result, armed flag, arm token, streak,
//!    class window, baseline and motion buffer live behind one mutex.
//! 4. **Never-failing inputs**: classifier and frame-source failures degrade
//!    to "no detection" and never stop the capture loop.
//!
//! # Module Structure
//!
//! - `frame`: owned RGB frames and their grey planes
//! - `ingest`: frame sources (synthetic, HTTP MJPEG/JPEG)
//! - `classify`: classifier adapter, label parsing, backends
//! - `gate`: scene analyzer, thresholds, gating state machine
//! - `engine`: shared result store and arming protocol
//! - `capture`: the background capture loop
//! - `record`: normalised sort records for UI and storage
//! - `config`: `sortd` configuration (file + env)

pub mod capture;
pub mod classify;
pub mod config;
pub mod engine;
pub mod frame;
pub mod gate;
pub mod ingest;
pub mod record;

pub use capture::{CaptureHandle, CaptureSettings};
pub use classify::{
    now_timestamp, Classifier, ClassifierAdapter, RawPrediction, SceneClassifier,
    ScriptedClassifier, PRESENCE_MIN_CONF,
};
#[cfg(feature = "backend-tract")]
pub use classify::OnnxClassifier;
pub use engine::{CancelToken, Engine, WaitOutcome, DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT};
pub use frame::{Frame, GrayFrame, MAX_FRAME_DIM};
pub use gate::{DetectionEvent, GateThresholds, GateVerdict, GatingStateMachine};
#[cfg(feature = "ingest-http")]
pub use ingest::HttpSource;
pub use ingest::{open_source, FrameSource, SourceSettings, SourceStats, SyntheticSource};
pub use record::SortRecord;
