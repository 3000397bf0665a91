use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{HabitId, HabitKind, VisionKind};

pub const MAX_VISION_TITLE_LENGTH: usize = 80;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewHabit {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: HabitKind,
    #[serde(default)]
    pub unit: Option<String>,
}

impl NewHabit {
    /// Trims inputs; a unit only survives on numeric habits.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        let unit = match self.kind {
            HabitKind::Binary => None,
            HabitKind::Numeric => non_blank(self.unit),
        };
        Ok(Self {
            name,
            kind: self.kind,
            unit,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewVisionItem {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: VisionKind,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewVisionItem {
    pub fn validate(self) -> Result<Self, ValidationError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        let len = title.chars().count();
        if len > MAX_VISION_TITLE_LENGTH {
            return Err(ValidationError::TitleTooLong {
                max: MAX_VISION_TITLE_LENGTH,
                len,
            });
        }
        Ok(Self {
            title,
            kind: self.kind,
            description: non_blank(self.description),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Selected habits that are not linked yet, first occurrence order.
pub fn select_new_links(selected: &[HabitId], already_linked: &[HabitId]) -> Vec<HabitId> {
    let mut seen: HashSet<&str> = already_linked.iter().map(String::as_str).collect();
    selected
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn habit_names_are_trimmed_and_required() {
        let habit = NewHabit {
            name: "  Read  ".into(),
            kind: HabitKind::Numeric,
            unit: Some(" pages ".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(habit.name, "Read");
        assert_eq!(habit.unit.as_deref(), Some("pages"));

        let err = NewHabit {
            name: "   ".into(),
            kind: HabitKind::Binary,
            unit: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingName);
    }

    #[test]
    fn binary_habits_drop_units() {
        let habit = NewHabit {
            name: "Meditate".into(),
            kind: HabitKind::Binary,
            unit: Some("min".into()),
        }
        .validate()
        .unwrap();
        assert!(habit.unit.is_none());
    }

    #[test]
    fn vision_titles_are_bounded() {
        let ok = NewVisionItem {
            title: " Run a marathon ".into(),
            kind: VisionKind::LongTerm,
            description: Some("   ".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(ok.title, "Run a marathon");
        assert!(ok.description.is_none());

        let long = NewVisionItem {
            title: "x".repeat(81),
            kind: VisionKind::ShortTerm,
            description: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(long, ValidationError::TitleTooLong { max: 80, len: 81 });

        let blank = NewVisionItem {
            title: "".into(),
            kind: VisionKind::ShortTerm,
            description: None,
        };
        assert_eq!(blank.validate().unwrap_err(), ValidationError::MissingTitle);
    }

    #[test]
    fn new_links_skip_existing_and_repeats() {
        let selected: Vec<HabitId> = ["h2", "h1", "h3", "h2"].map(String::from).to_vec();
        let linked: Vec<HabitId> = vec!["h1".into()];
        assert_eq!(select_new_links(&selected, &linked), vec!["h2", "h3"]);
    }
}
