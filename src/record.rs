//! Sort records: the normalised form of an accepted detection handed to the
//! UI and to durable storage. `seq` is the storage dedup key.

use serde::Serialize;

use crate::classify::{crop_display_name, now_timestamp, CropType};
use crate::gate::DetectionEvent;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SortRecord {
    pub seq: u64,
    pub crop_type: String,
    pub condition: String,
    pub color: String,
    pub sorted_to: String,
    pub size: String,
    pub time_detected: String,
    pub confidence: f32,
}

impl SortRecord {
    /// Normalise a visible detection. Returns `None` for non-present events.
    ///
    /// Crop names are collapsed to `Tomato` / `Bell Pepper`, falling back to
    /// the operator's target crop. Unrecognised colours default per crop
    /// (peppers red, tomatoes green).
    pub fn from_event(event: &DetectionEvent, target_crop: &str) -> Option<Self> {
        if !event.present {
            return None;
        }

        let crop_type = match CropType::from_name(&event.crop_type) {
            CropType::Unknown if target_crop.trim().is_empty() => "Unknown".to_string(),
            CropType::Unknown => crop_display_name(target_crop),
            known => known.as_str().to_string(),
        };

        let color_raw = event.color.to_lowercase();
        let color = if color_raw.contains("red") {
            "Red"
        } else if color_raw.contains("green") {
            "Green"
        } else {
            match crop_type.as_str() {
                "Bell Pepper" => "Red",
                "Tomato" => "Green",
                _ => "",
            }
        };

        let time_detected = if event.time_detected.is_empty() {
            now_timestamp()
        } else {
            event.time_detected.clone()
        };

        Some(Self {
            seq: event.seq,
            crop_type,
            condition: event.condition.clone(),
            color: color.to_string(),
            sorted_to: event.sorted_to.clone(),
            size: event.size.clone(),
            time_detected,
            confidence: event.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(crop: &str, color: &str) -> DetectionEvent {
        DetectionEvent {
            present: true,
            seq: 9,
            crop_type: crop.to_string(),
            condition: "Not Damaged".to_string(),
            color: color.to_string(),
            sorted_to: "Left Bin".to_string(),
            size: "Medium".to_string(),
            time_detected: "2026-10-19 09:30:00".to_string(),
            confidence: 0.77,
        }
    }

    #[test]
    fn absent_event_has_no_record() {
        assert!(SortRecord::from_event(&DetectionEvent::absent(3, 0.5), "tomato").is_none());
    }

    #[test]
    fn normalises_known_crops() {
        let record = SortRecord::from_event(&event("bell pepper", "GREEN"), "tomato").unwrap();
        assert_eq!(record.crop_type, "Bell Pepper");
        assert_eq!(record.color, "Green");
        assert_eq!(record.seq, 9);
        assert_eq!(record.time_detected, "2026-10-19 09:30:00");
    }

    #[test]
    fn unknown_crop_falls_back_to_target() {
        let record = SortRecord::from_event(&event("", "Unknown"), "tomato").unwrap();
        assert_eq!(record.crop_type, "Tomato");
        assert_eq!(record.color, "Green");

        let record = SortRecord::from_event(&event("", "Unknown"), "bell pepper").unwrap();
        assert_eq!(record.crop_type, "Bell Pepper");
        assert_eq!(record.color, "Red");

        let record = SortRecord::from_event(&event("", "Unknown"), "eggplant").unwrap();
        assert_eq!(record.crop_type, "Eggplant");
        assert_eq!(record.color, "");

        let record = SortRecord::from_event(&event("", "Unknown"), "").unwrap();
        assert_eq!(record.crop_type, "Unknown");
    }

    #[test]
    fn colour_defaults_by_crop() {
        let pepper = SortRecord::from_event(&event("Bell Pepper", "Unknown"), "").unwrap();
        assert_eq!(pepper.color, "Red");
        let tomato = SortRecord::from_event(&event("Tomato", ""), "").unwrap();
        assert_eq!(tomato.color, "Green");
    }
}
