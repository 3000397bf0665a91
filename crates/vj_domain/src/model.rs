use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dates::{DateKey, MonthKey};

pub type HabitId = String;
pub type VisionId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HabitKind {
    Binary,
    Numeric,
}

impl HabitKind {
    /// Completion threshold: binary habits need exactly 1, numeric ones at least 1.
    pub fn is_done(self, value: f64) -> bool {
        match self {
            HabitKind::Binary => value == 1.0,
            HabitKind::Numeric => value >= 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Habit {
    pub id: HabitId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: HabitKind,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(rename = "is_archived", default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HabitLog {
    pub habit_id: HabitId,
    pub date: DateKey,
    #[serde(default)]
    pub value: Option<f64>,
}

impl HabitLog {
    /// Null values are treated as "not done".
    pub fn value_or_zero(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisionKind {
    ShortTerm,
    LongTerm,
}

impl VisionKind {
    pub fn label(self) -> &'static str {
        match self {
            VisionKind::ShortTerm => "Short-term",
            VisionKind::LongTerm => "Long-term",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisionItem {
    pub id: VisionId,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: VisionKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "is_archived", default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

/// Many-to-many join between a vision item and a habit. `weight` is stored but
/// progress is an equal-weight mean.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisionHabitLink {
    pub vision_item_id: VisionId,
    pub habit_id: HabitId,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEntry {
    pub date: DateKey,
    #[serde(default)]
    pub content: Option<String>,
}

impl JournalEntry {
    pub fn has_text(&self) -> bool {
        self.content
            .as_deref()
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthlyReflection {
    pub month: MonthKey,
    #[serde(default)]
    pub reflection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub week_start_day: Option<u8>,
}
