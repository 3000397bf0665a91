use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dates::{date_key, diff_date_keys_inclusive, DateKey, DateRange};
use crate::error::DateError;
use crate::model::{Habit, HabitId, HabitLog, VisionHabitLink, VisionId, VisionItem};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RangeSelector {
    #[serde(rename = "7D")]
    Last7Days,
    #[serde(rename = "30D")]
    Last30Days,
}

impl RangeSelector {
    fn start_offset_days(self) -> i64 {
        match self {
            RangeSelector::Last7Days => -6,
            RangeSelector::Last30Days => -29,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RangeSelector::Last7Days => "7D",
            RangeSelector::Last30Days => "30D",
        }
    }
}

impl fmt::Display for RangeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeSelector {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "7D" => Ok(RangeSelector::Last7Days),
            "30D" => Ok(RangeSelector::Last30Days),
            other => Err(DateError::UnknownRange(other.to_string())),
        }
    }
}

pub fn date_range(selector: RangeSelector, tz: Tz) -> DateRange {
    date_range_at(selector, tz, Utc::now())
}

pub fn date_range_at(selector: RangeSelector, tz: Tz, now: DateTime<Utc>) -> DateRange {
    let end_key = date_key(now, tz);
    DateRange::new(end_key.add_days(selector.start_offset_days()), end_key)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HabitConsistency {
    pub habit_id: HabitId,
    pub consistency: f64,
    pub done_days: u32,
    pub eligible_days: u32,
}

impl HabitConsistency {
    fn not_applicable(habit_id: &str) -> Self {
        Self {
            habit_id: habit_id.to_string(),
            consistency: 0.0,
            done_days: 0,
            eligible_days: 0,
        }
    }

    /// A zero ratio only means 0% when at least one day was eligible.
    pub fn has_data(&self) -> bool {
        self.eligible_days > 0
    }
}

/// Counts done days between the later of the habit's creation date and the
/// range start, and the range end. Logs outside that window are ignored and
/// missing days count as not done.
pub fn compute_habit_consistency(
    habit: &Habit,
    logs_by_date: &HashMap<DateKey, f64>,
    range: &DateRange,
    tz: Tz,
) -> HabitConsistency {
    let created_key = date_key(habit.created_at, tz);
    let eligible_start = created_key.max(range.start_key);
    let eligible_days = diff_date_keys_inclusive(&eligible_start, &range.end_key);
    if eligible_days == 0 {
        return HabitConsistency::not_applicable(&habit.id);
    }

    let eligible = DateRange::new(eligible_start, range.end_key);
    let done_days = logs_by_date
        .iter()
        .filter(|(key, value)| eligible.contains(key) && habit.kind.is_done(**value))
        .count() as u32;

    HabitConsistency {
        habit_id: habit.id.clone(),
        consistency: f64::from(done_days) / f64::from(eligible_days),
        done_days,
        eligible_days,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisionProgress {
    pub progress: f64,
    pub has_data: bool,
}

/// Equal-weight mean of the linked habits' consistency. Callers pass only
/// non-archived habits; a habit missing from the map contributes 0.
pub fn compute_vision_progress(
    vision: &VisionItem,
    linked_habits: &[&Habit],
    consistency_by_habit: &HashMap<HabitId, HabitConsistency>,
) -> VisionProgress {
    if linked_habits.is_empty() {
        tracing::trace!(vision_id = %vision.id, "vision has no linked habits");
        return VisionProgress {
            progress: 0.0,
            has_data: false,
        };
    }

    let total: f64 = linked_habits
        .iter()
        .map(|habit| {
            consistency_by_habit
                .get(&habit.id)
                .map(|entry| entry.consistency)
                .unwrap_or(0.0)
        })
        .sum();

    VisionProgress {
        progress: total / linked_habits.len() as f64,
        has_data: true,
    }
}

/// Groups logs per habit, last row winning for a repeated (habit, date).
pub fn index_logs_by_habit(logs: &[HabitLog]) -> HashMap<HabitId, HashMap<DateKey, f64>> {
    let mut index: HashMap<HabitId, HashMap<DateKey, f64>> = HashMap::new();
    for log in logs {
        index
            .entry(log.habit_id.clone())
            .or_default()
            .insert(log.date, log.value_or_zero());
    }
    index
}

/// Habits linked to `vision_id`, skipping archived or unknown habits and
/// repeated links.
pub fn linked_habits<'a>(
    vision_id: &str,
    links: &[VisionHabitLink],
    habits_by_id: &HashMap<&str, &'a Habit>,
) -> Vec<&'a Habit> {
    let mut seen = HashSet::new();
    links
        .iter()
        .filter(|link| link.vision_item_id == vision_id)
        .filter_map(|link| habits_by_id.get(link.habit_id.as_str()).copied())
        .filter(|habit| !habit.archived)
        .filter(|habit| seen.insert(habit.id.clone()))
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressData {
    pub habits: Vec<Habit>,
    pub visions: Vec<VisionItem>,
    pub links: Vec<VisionHabitLink>,
    pub habit_logs: Vec<HabitLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisionProgressRow {
    pub vision_id: VisionId,
    pub title: String,
    pub linked_habits: usize,
    #[serde(flatten)]
    pub progress: VisionProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub range: DateRange,
    pub habits: Vec<HabitConsistency>,
    pub visions: Vec<VisionProgressRow>,
}

pub fn build_progress_report(data: &ProgressData, range: DateRange, tz: Tz) -> ProgressReport {
    let logs = index_logs_by_habit(&data.habit_logs);
    let empty = HashMap::new();
    let active: Vec<&Habit> = data.habits.iter().filter(|habit| !habit.archived).collect();

    let habits: Vec<HabitConsistency> = active
        .iter()
        .map(|habit| {
            compute_habit_consistency(habit, logs.get(&habit.id).unwrap_or(&empty), &range, tz)
        })
        .collect();
    let consistency_by_habit: HashMap<HabitId, HabitConsistency> = habits
        .iter()
        .map(|entry| (entry.habit_id.clone(), entry.clone()))
        .collect();
    let habits_by_id: HashMap<&str, &Habit> =
        active.iter().map(|habit| (habit.id.as_str(), *habit)).collect();

    let visions = data
        .visions
        .iter()
        .filter(|vision| !vision.archived)
        .map(|vision| {
            let linked = linked_habits(&vision.id, &data.links, &habits_by_id);
            VisionProgressRow {
                vision_id: vision.id.clone(),
                title: vision.title.clone(),
                linked_habits: linked.len(),
                progress: compute_vision_progress(vision, &linked, &consistency_by_habit),
            }
        })
        .collect();

    ProgressReport {
        range,
        habits,
        visions,
    }
}

pub fn clamp_ratio(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

pub fn percent_label(value: f64) -> String {
    format!("{}%", (clamp_ratio(value) * 100.0).round() as u32)
}
