use serde::Serialize;

/// The unit of record produced by the gating machine.
///
/// `seq` is assigned at acceptance, never reused, and strictly increasing over
/// the process lifetime. Non-present events carry the last assigned `seq` so
/// readers can tell which acceptance they are "after".
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionEvent {
    pub present: bool,
    pub seq: u64,
    pub crop_type: String,
    pub condition: String,
    pub color: String,
    pub sorted_to: String,
    pub size: String,
    pub time_detected: String,
    pub confidence: f32,
}

impl DetectionEvent {
    /// Absence sentinel carrying the last known `seq`.
    pub fn absent(seq: u64, confidence: f32) -> Self {
        Self {
            present: false,
            seq,
            confidence,
            ..Self::default()
        }
    }
}
