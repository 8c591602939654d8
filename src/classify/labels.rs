//! Model class labels.
//!
//! Models emit snake_case labels such as `tomato_not_damaged_red` or
//! `bellpepper_damaged_green`. This module parses them into typed fields and
//! derives the sorting bin.

use super::{now_timestamp, RawPrediction};

/// Size reported in every prediction payload.
///
/// The per-class `ClassLabel::estimated_size` heuristic is computed but not
/// reported; the rig has always shipped this constant.
pub const REPORTED_SIZE: &str = "Medium";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropType {
    Tomato,
    BellPepper,
    Unknown,
}

impl CropType {
    pub fn as_str(self) -> &'static str {
        match self {
            CropType::Tomato => "Tomato",
            CropType::BellPepper => "Bell Pepper",
            CropType::Unknown => "",
        }
    }

    /// Parse a free-form crop name ("tomato", "Bell Pepper", "bellpepper").
    pub fn from_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("pepper") || name.contains("bellpep") {
            CropType::BellPepper
        } else if name.contains("tomato") {
            CropType::Tomato
        } else {
            CropType::Unknown
        }
    }
}

/// Canonical display name for a free-form crop name: known crops map to
/// their canonical spelling, anything else is capitalised.
pub fn crop_display_name(name: &str) -> String {
    let name = name.trim();
    match CropType::from_name(name) {
        CropType::Unknown => {
            let lower = name.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        known => known.as_str().to_string(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Damaged,
    NotDamaged,
    Unknown,
}

impl Condition {
    pub fn as_str(self) -> &'static str {
        match self {
            Condition::Damaged => "Damaged",
            Condition::NotDamaged => "Not Damaged",
            Condition::Unknown => "Unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Unknown,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Color::Red => "Red",
            Color::Green => "Green",
            Color::Unknown => "Unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortBin {
    Left,
    Center,
    Right,
    Unknown,
}

impl SortBin {
    pub fn as_str(self) -> &'static str {
        match self {
            SortBin::Left => "Left Bin",
            SortBin::Center => "Center Bin",
            SortBin::Right => "Right Bin",
            SortBin::Unknown => "Unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassLabel {
    pub crop: CropType,
    pub condition: Condition,
    pub color: Color,
}

impl ClassLabel {
    pub fn parse(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        let parts: Vec<&str> = label
            .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();

        let crop = parts
            .first()
            .map(|base| CropType::from_name(base))
            .unwrap_or(CropType::Unknown);

        let has = |word: &str| parts.iter().any(|p| *p == word);
        let condition = if has("notdamaged") || (has("not") && has("damaged")) {
            Condition::NotDamaged
        } else if has("damaged") {
            Condition::Damaged
        } else {
            Condition::Unknown
        };

        let color = if has("red") {
            Color::Red
        } else if has("green") {
            Color::Green
        } else {
            Color::Unknown
        };

        Self {
            crop,
            condition,
            color,
        }
    }

    pub fn sort_bin(&self) -> SortBin {
        if self.condition == Condition::Damaged {
            return SortBin::Center;
        }
        match (self.crop, self.color) {
            (CropType::Tomato, Color::Green) => SortBin::Left,
            (_, Color::Green) => SortBin::Right,
            (CropType::Tomato, Color::Red) => SortBin::Right,
            (_, Color::Red) => SortBin::Left,
            _ => SortBin::Unknown,
        }
    }

    /// Per-class size guess. Logged for diagnostics only, see `REPORTED_SIZE`.
    pub fn estimated_size(&self) -> &'static str {
        match (self.crop, self.color) {
            (CropType::Tomato, Color::Red) => "Large",
            (CropType::Tomato, _) => "Medium",
            (CropType::BellPepper, Color::Green) => "Small",
            (CropType::BellPepper, _) => "Medium",
            (CropType::Unknown, _) => "Unknown",
        }
    }

    /// Build a prediction; `present` iff `confidence >= presence_min_conf`.
    pub fn into_prediction(self, confidence: f32, presence_min_conf: f32) -> RawPrediction {
        log::debug!(
            "label {:?}/{:?}/{:?} conf={:.3} estimated_size={} (reported {})",
            self.crop,
            self.condition,
            self.color,
            confidence,
            self.estimated_size(),
            REPORTED_SIZE
        );
        RawPrediction {
            present: confidence >= presence_min_conf,
            confidence,
            crop_type: self.crop.as_str().to_string(),
            condition: self.condition.as_str().to_string(),
            color: self.color.as_str().to_string(),
            sorted_to: self.sort_bin().as_str().to_string(),
            size: REPORTED_SIZE.to_string(),
            timestamp: now_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tomato_labels() {
        let label = ClassLabel::parse("tomato_not_damaged_red");
        assert_eq!(label.crop, CropType::Tomato);
        assert_eq!(label.condition, Condition::NotDamaged);
        assert_eq!(label.color, Color::Red);
        assert_eq!(label.sort_bin(), SortBin::Right);

        let label = ClassLabel::parse("Tomato_Damaged_Green");
        assert_eq!(label.condition, Condition::Damaged);
        assert_eq!(label.sort_bin(), SortBin::Center);
    }

    #[test]
    fn parses_pepper_labels() {
        let label = ClassLabel::parse("bellpepper_not_damaged_green");
        assert_eq!(label.crop, CropType::BellPepper);
        assert_eq!(label.sort_bin(), SortBin::Right);
        assert_eq!(label.estimated_size(), "Small");

        let label = ClassLabel::parse("bellpepper_notdamaged_red");
        assert_eq!(label.condition, Condition::NotDamaged);
        assert_eq!(label.sort_bin(), SortBin::Left);
    }

    #[test]
    fn unknown_label_sorts_nowhere() {
        let label = ClassLabel::parse("background");
        assert_eq!(label.crop, CropType::Unknown);
        assert_eq!(label.condition, Condition::Unknown);
        assert_eq!(label.color, Color::Unknown);
        assert_eq!(label.sort_bin(), SortBin::Unknown);
        assert_eq!(label.crop.as_str(), "");
    }

    #[test]
    fn display_names_are_canonical() {
        assert_eq!(crop_display_name("bell pepper"), "Bell Pepper");
        assert_eq!(crop_display_name(" TOMATO "), "Tomato");
        assert_eq!(crop_display_name("eggplant"), "Eggplant");
        assert_eq!(crop_display_name(""), "");
    }

    #[test]
    fn prediction_reports_constant_size() {
        let pred = ClassLabel::parse("tomato_not_damaged_red").into_prediction(0.91, 0.2);
        assert!(pred.present);
        assert_eq!(pred.crop_type, "Tomato");
        assert_eq!(pred.condition, "Not Damaged");
        assert_eq!(pred.sorted_to, "Right Bin");
        assert_eq!(pred.size, REPORTED_SIZE);

        let weak = ClassLabel::parse("tomato_not_damaged_red").into_prediction(0.19, 0.2);
        assert!(!weak.present);
    }
}
