use std::collections::{HashMap, HashSet};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dates::{month_range, DateRange, MonthKey};
use crate::insights::{compute_habit_consistency, index_logs_by_habit, HabitConsistency};
use crate::model::{Habit, HabitLog, JournalEntry, VisionHabitLink, VisionItem};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JournalStats {
    pub days_journaled: u32,
    pub days_written: u32,
}

/// `days_journaled` counts distinct dates; `days_written` counts every row
/// with non-blank text, so duplicate-date rows are not collapsed there.
pub fn compute_journal_stats(entries: &[JournalEntry]) -> JournalStats {
    let mut days = HashSet::new();
    let mut days_written = 0;
    for entry in entries {
        days.insert(entry.date);
        if entry.has_text() {
            days_written += 1;
        }
    }
    JournalStats {
        days_journaled: days.len() as u32,
        days_written,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyHabitStat {
    pub habit: Habit,
    #[serde(flatten)]
    pub consistency: HabitConsistency,
    pub has_data: bool,
}

pub fn compute_habit_monthly_stats(
    habits: &[Habit],
    habit_logs: &[HabitLog],
    range: &DateRange,
    tz: Tz,
) -> Vec<MonthlyHabitStat> {
    let logs = index_logs_by_habit(habit_logs);
    let empty = HashMap::new();
    habits
        .iter()
        .map(|habit| {
            let consistency = compute_habit_consistency(
                habit,
                logs.get(&habit.id).unwrap_or(&empty),
                range,
                tz,
            );
            let has_data = !range.is_inverted() && consistency.has_data();
            MonthlyHabitStat {
                habit: habit.clone(),
                consistency,
                has_data,
            }
        })
        .collect()
}

/// Highest consistency first; ties keep their input order.
pub fn rank_habit_stats(stats: &mut [MonthlyHabitStat]) {
    stats.sort_by(|a, b| {
        b.consistency
            .consistency
            .total_cmp(&a.consistency.consistency)
    });
}

/// Non-archived visions with at least one link to a habit in `habits_by_id`.
pub fn compute_vision_tracked_count(
    visions: &[VisionItem],
    links: &[VisionHabitLink],
    habits_by_id: &HashMap<&str, &Habit>,
) -> usize {
    let tracked: HashSet<&str> = links
        .iter()
        .filter(|link| habits_by_id.contains_key(link.habit_id.as_str()))
        .map(|link| link.vision_item_id.as_str())
        .collect();
    visions
        .iter()
        .filter(|vision| !vision.archived && tracked.contains(vision.id.as_str()))
        .count()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonthlyData {
    pub journal_entries: Vec<JournalEntry>,
    pub habits: Vec<Habit>,
    pub habit_logs: Vec<HabitLog>,
    pub visions: Vec<VisionItem>,
    pub links: Vec<VisionHabitLink>,
    #[serde(default)]
    pub reflection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub month: MonthKey,
    pub label: String,
    pub range: DateRange,
    pub journal: JournalStats,
    pub habits: Vec<MonthlyHabitStat>,
    pub vision_tracked_count: usize,
    pub reflection: String,
}

pub fn build_monthly_summary(month: MonthKey, data: &MonthlyData, tz: Tz) -> MonthlySummary {
    let range = month_range(&month);
    let mut habits = compute_habit_monthly_stats(&data.habits, &data.habit_logs, &range, tz);
    rank_habit_stats(&mut habits);
    let habits_by_id: HashMap<&str, &Habit> = data
        .habits
        .iter()
        .map(|habit| (habit.id.as_str(), habit))
        .collect();

    MonthlySummary {
        month,
        label: month.label(),
        range,
        journal: compute_journal_stats(&data.journal_entries),
        habits,
        vision_tracked_count: compute_vision_tracked_count(
            &data.visions,
            &data.links,
            &habits_by_id,
        ),
        reflection: data.reflection.clone(),
    }
}

/// Month pager; moving forward stops at the current month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthNav {
    selected: MonthKey,
    current: MonthKey,
}

impl MonthNav {
    pub fn new(selected: MonthKey, current: MonthKey) -> Self {
        Self {
            selected: selected.min(current),
            current,
        }
    }

    pub fn selected(&self) -> MonthKey {
        self.selected
    }

    pub fn label(&self) -> String {
        self.selected.label()
    }

    pub fn can_go_next(&self) -> bool {
        self.selected < self.current
    }

    pub fn previous(&mut self) -> MonthKey {
        self.selected = self.selected.add_months(-1);
        self.selected
    }

    pub fn next(&mut self) -> Option<MonthKey> {
        if !self.can_go_next() {
            return None;
        }
        self.selected = self.selected.add_months(1);
        Some(self.selected)
    }
}
