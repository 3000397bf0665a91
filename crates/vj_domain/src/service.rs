use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    dates::{month_range, DateKey, DateRange, MonthKey},
    error::StoreError,
    forms::{select_new_links, NewHabit, NewVisionItem},
    insights::{self, ProgressData, ProgressReport, RangeSelector},
    model::{
        Habit, HabitId, HabitLog, JournalEntry, MonthlyReflection, Profile, VisionHabitLink,
        VisionItem,
    },
    monthly::{self, MonthlyData, MonthlySummary},
};

/// Every row the signed-in user can read, as exported from the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub habits: Vec<Habit>,
    #[serde(default)]
    pub habit_logs: Vec<HabitLog>,
    #[serde(default, rename = "vision_items")]
    pub visions: Vec<VisionItem>,
    #[serde(default, rename = "vision_habit_maps")]
    pub links: Vec<VisionHabitLink>,
    #[serde(default)]
    pub journal_entries: Vec<JournalEntry>,
    #[serde(default, rename = "monthly_summaries")]
    pub reflections: Vec<MonthlyReflection>,
}

impl StoreSnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse snapshot {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_string_pretty(self)?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write snapshot {}", path.display()))
    }
}

/// A joined vision link as shown on the vision detail screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkedHabit {
    #[serde(flatten)]
    pub link: VisionHabitLink,
    pub habit: Option<Habit>,
}

/// In-memory row store honouring the backend's natural keys: one log per
/// (habit, date), one journal entry per date, one reflection per month.
pub struct JournalService {
    rows: RwLock<StoreSnapshot>,
}

pub struct JournalServiceBuilder {
    snapshot: StoreSnapshot,
    snapshot_file: Option<PathBuf>,
}

impl JournalServiceBuilder {
    pub fn new() -> Self {
        Self {
            snapshot: StoreSnapshot::default(),
            snapshot_file: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: StoreSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn with_snapshot_file(mut self, path: impl AsRef<Path>) -> Self {
        self.snapshot_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> Result<JournalService> {
        let snapshot = match &self.snapshot_file {
            Some(path) => StoreSnapshot::load(path)?,
            None => self.snapshot,
        };
        tracing::debug!(
            habits = snapshot.habits.len(),
            logs = snapshot.habit_logs.len(),
            visions = snapshot.visions.len(),
            entries = snapshot.journal_entries.len(),
            "journal service loaded"
        );
        Ok(JournalService {
            rows: RwLock::new(snapshot),
        })
    }
}

impl Default for JournalServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JournalService {
    pub fn builder() -> JournalServiceBuilder {
        JournalServiceBuilder::new()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.rows.read().clone()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.rows.read().save(path)
    }

    pub fn profile(&self) -> Option<Profile> {
        self.rows.read().profile.clone()
    }

    /// Non-archived habits, oldest first.
    pub fn active_habits(&self) -> Vec<Habit> {
        let mut habits: Vec<Habit> = self
            .rows
            .read()
            .habits
            .iter()
            .filter(|habit| !habit.archived)
            .cloned()
            .collect();
        habits.sort_by_key(|habit| habit.created_at);
        habits
    }

    pub fn habits_by_ids(&self, habit_ids: &[HabitId]) -> Vec<Habit> {
        if habit_ids.is_empty() {
            return Vec::new();
        }
        self.rows
            .read()
            .habits
            .iter()
            .filter(|habit| !habit.archived && habit_ids.contains(&habit.id))
            .cloned()
            .collect()
    }

    #[instrument(skip(self))]
    pub fn create_habit(&self, input: NewHabit) -> Result<Habit, StoreError> {
        let input = input.validate()?;
        let habit = Habit {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            kind: input.kind,
            unit: input.unit,
            archived: false,
            created_at: Utc::now(),
        };
        self.rows.write().habits.push(habit.clone());
        Ok(habit)
    }

    pub fn habit_logs_for_date(&self, date: DateKey, habit_ids: &[HabitId]) -> Vec<HabitLog> {
        self.rows
            .read()
            .habit_logs
            .iter()
            .filter(|log| log.date == date && habit_ids.contains(&log.habit_id))
            .cloned()
            .collect()
    }

    #[instrument(skip(self))]
    pub fn upsert_habit_log(
        &self,
        habit_id: &str,
        date: DateKey,
        value: f64,
    ) -> Result<HabitLog, StoreError> {
        let mut rows = self.rows.write();
        if !rows.habits.iter().any(|habit| habit.id == habit_id) {
            return Err(StoreError::not_found("habit", habit_id));
        }
        let log = HabitLog {
            habit_id: habit_id.to_string(),
            date,
            value: Some(value),
        };
        match rows
            .habit_logs
            .iter_mut()
            .find(|existing| existing.habit_id == habit_id && existing.date == date)
        {
            Some(existing) => *existing = log.clone(),
            None => rows.habit_logs.push(log.clone()),
        }
        Ok(log)
    }

    pub fn journal_entry(&self, date: DateKey) -> Option<JournalEntry> {
        self.rows
            .read()
            .journal_entries
            .iter()
            .find(|entry| entry.date == date)
            .cloned()
    }

    #[instrument(skip(self, content))]
    pub fn upsert_journal_entry(&self, date: DateKey, content: String) -> JournalEntry {
        let entry = JournalEntry {
            date,
            content: Some(content),
        };
        let mut rows = self.rows.write();
        match rows
            .journal_entries
            .iter_mut()
            .find(|existing| existing.date == date)
        {
            Some(existing) => *existing = entry.clone(),
            None => rows.journal_entries.push(entry.clone()),
        }
        entry
    }

    /// Non-archived vision items, newest first.
    pub fn vision_items(&self) -> Vec<VisionItem> {
        let mut visions: Vec<VisionItem> = self
            .rows
            .read()
            .visions
            .iter()
            .filter(|vision| !vision.archived)
            .cloned()
            .collect();
        visions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        visions
    }

    pub fn vision_item(&self, id: &str) -> Result<VisionItem, StoreError> {
        self.rows
            .read()
            .visions
            .iter()
            .find(|vision| vision.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("vision item", id))
    }

    #[instrument(skip(self))]
    pub fn create_vision_item(&self, input: NewVisionItem) -> Result<VisionItem, StoreError> {
        let input = input.validate()?;
        let vision = VisionItem {
            id: Uuid::new_v4().to_string(),
            title: input.title,
            kind: input.kind,
            description: input.description,
            archived: false,
            created_at: Utc::now(),
        };
        self.rows.write().visions.push(vision.clone());
        Ok(vision)
    }

    #[instrument(skip(self))]
    pub fn archive_vision_item(&self, id: &str) -> Result<VisionItem, StoreError> {
        let mut rows = self.rows.write();
        let vision = rows
            .visions
            .iter_mut()
            .find(|vision| vision.id == id)
            .ok_or_else(|| StoreError::not_found("vision item", id))?;
        vision.archived = true;
        Ok(vision.clone())
    }

    pub fn vision_links(&self, vision_id: &str) -> Vec<LinkedHabit> {
        let rows = self.rows.read();
        rows.links
            .iter()
            .filter(|link| link.vision_item_id == vision_id)
            .map(|link| LinkedHabit {
                link: link.clone(),
                habit: rows
                    .habits
                    .iter()
                    .find(|habit| habit.id == link.habit_id)
                    .cloned(),
            })
            .collect()
    }

    /// Links the selected habits, skipping ones already linked. Returns the new rows.
    #[instrument(skip(self))]
    pub fn add_vision_links(
        &self,
        vision_id: &str,
        habit_ids: &[HabitId],
    ) -> Result<Vec<VisionHabitLink>, StoreError> {
        let mut rows = self.rows.write();
        if !rows.visions.iter().any(|vision| vision.id == vision_id) {
            return Err(StoreError::not_found("vision item", vision_id));
        }
        if let Some(missing) = habit_ids
            .iter()
            .find(|id| !rows.habits.iter().any(|habit| &habit.id == *id))
        {
            return Err(StoreError::not_found("habit", missing.clone()));
        }
        let existing: Vec<HabitId> = rows
            .links
            .iter()
            .filter(|link| link.vision_item_id == vision_id)
            .map(|link| link.habit_id.clone())
            .collect();
        let added: Vec<VisionHabitLink> = select_new_links(habit_ids, &existing)
            .into_iter()
            .map(|habit_id| VisionHabitLink {
                vision_item_id: vision_id.to_string(),
                habit_id,
                weight: None,
            })
            .collect();
        rows.links.extend(added.iter().cloned());
        Ok(added)
    }

    /// Returns whether a link was removed.
    pub fn remove_vision_link(&self, vision_id: &str, habit_id: &str) -> bool {
        let mut rows = self.rows.write();
        let before = rows.links.len();
        rows.links
            .retain(|link| !(link.vision_item_id == vision_id && link.habit_id == habit_id));
        rows.links.len() != before
    }

    pub fn monthly_reflection(&self, month: MonthKey) -> Option<MonthlyReflection> {
        self.rows
            .read()
            .reflections
            .iter()
            .find(|row| row.month == month)
            .cloned()
    }

    #[instrument(skip(self, reflection))]
    pub fn upsert_monthly_reflection(&self, month: MonthKey, reflection: String) -> MonthlyReflection {
        let row = MonthlyReflection { month, reflection };
        let mut rows = self.rows.write();
        match rows.reflections.iter_mut().find(|existing| existing.month == month) {
            Some(existing) => *existing = row.clone(),
            None => rows.reflections.push(row.clone()),
        }
        row
    }

    fn links_for_visions(&self, visions: &[VisionItem]) -> Vec<VisionHabitLink> {
        if visions.is_empty() {
            return Vec::new();
        }
        self.rows
            .read()
            .links
            .iter()
            .filter(|link| visions.iter().any(|vision| vision.id == link.vision_item_id))
            .cloned()
            .collect()
    }

    fn logs_in_range(&self, habits: &[Habit], range: &DateRange) -> Vec<HabitLog> {
        if habits.is_empty() {
            return Vec::new();
        }
        self.rows
            .read()
            .habit_logs
            .iter()
            .filter(|log| {
                range.contains(&log.date) && habits.iter().any(|habit| habit.id == log.habit_id)
            })
            .cloned()
            .collect()
    }

    pub fn progress_data(&self, range: &DateRange) -> ProgressData {
        let habits = self.active_habits();
        let visions = self.vision_items();
        let links = self.links_for_visions(&visions);
        let habit_logs = self.logs_in_range(&habits, range);
        ProgressData {
            habits,
            visions,
            links,
            habit_logs,
        }
    }

    pub fn monthly_data(&self, month: MonthKey) -> MonthlyData {
        let range = month_range(&month);
        let habits = self.active_habits();
        let visions = self.vision_items();
        let links = self.links_for_visions(&visions);
        let habit_logs = self.logs_in_range(&habits, &range);
        let journal_entries = self
            .rows
            .read()
            .journal_entries
            .iter()
            .filter(|entry| range.contains(&entry.date))
            .cloned()
            .collect();
        let reflection = self
            .monthly_reflection(month)
            .map(|row| row.reflection)
            .unwrap_or_default();
        MonthlyData {
            journal_entries,
            habits,
            habit_logs,
            visions,
            links,
            reflection,
        }
    }

    pub fn progress_report(&self, selector: RangeSelector, tz: Tz) -> ProgressReport {
        self.progress_report_for(insights::date_range(selector, tz), tz)
    }

    pub fn progress_report_for(&self, range: DateRange, tz: Tz) -> ProgressReport {
        insights::build_progress_report(&self.progress_data(&range), range, tz)
    }

    pub fn monthly_summary(&self, month: MonthKey, tz: Tz) -> MonthlySummary {
        monthly::build_monthly_summary(month, &self.monthly_data(month), tz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HabitKind, VisionKind};

    fn key(raw: &str) -> DateKey {
        raw.parse().unwrap()
    }

    fn service() -> JournalService {
        JournalService::builder().build().expect("empty service")
    }

    #[test]
    fn habit_logs_upsert_on_habit_and_date() {
        let service = service();
        let habit = service
            .create_habit(NewHabit {
                name: "Water".into(),
                kind: HabitKind::Numeric,
                unit: Some("glasses".into()),
            })
            .unwrap();
        service.upsert_habit_log(&habit.id, key("2025-01-01"), 2.0).unwrap();
        service.upsert_habit_log(&habit.id, key("2025-01-01"), 5.0).unwrap();
        service.upsert_habit_log(&habit.id, key("2025-01-02"), 1.0).unwrap();

        let logs = service.habit_logs_for_date(key("2025-01-01"), &[habit.id.clone()]);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].value, Some(5.0));
        assert_eq!(service.snapshot().habit_logs.len(), 2);

        let err = service.upsert_habit_log("ghost", key("2025-01-01"), 1.0).unwrap_err();
        assert_eq!(err, StoreError::not_found("habit", "ghost"));
    }

    #[test]
    fn journal_and_reflection_upserts_keep_one_row() {
        let service = service();
        service.upsert_journal_entry(key("2025-01-01"), "draft".into());
        service.upsert_journal_entry(key("2025-01-01"), "final".into());
        let entry = service.journal_entry(key("2025-01-01")).unwrap();
        assert_eq!(entry.content.as_deref(), Some("final"));
        assert!(service.journal_entry(key("2025-01-02")).is_none());

        let month: MonthKey = "2025-01".parse().unwrap();
        service.upsert_monthly_reflection(month, "one".into());
        service.upsert_monthly_reflection(month, "two".into());
        assert_eq!(service.snapshot().reflections.len(), 1);
        assert_eq!(service.monthly_reflection(month).unwrap().reflection, "two");
    }

    #[test]
    fn vision_links_skip_duplicates_and_archive_hides_items() {
        let service = service();
        let habit = service
            .create_habit(NewHabit {
                name: "Run".into(),
                kind: HabitKind::Binary,
                unit: None,
            })
            .unwrap();
        let vision = service
            .create_vision_item(NewVisionItem {
                title: "Marathon".into(),
                kind: VisionKind::LongTerm,
                description: None,
            })
            .unwrap();

        let added = service
            .add_vision_links(&vision.id, &[habit.id.clone(), habit.id.clone()])
            .unwrap();
        assert_eq!(added.len(), 1);
        assert!(service
            .add_vision_links(&vision.id, &[habit.id.clone()])
            .unwrap()
            .is_empty());
        let links = service.vision_links(&vision.id);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].habit.as_ref().map(|h| h.name.as_str()), Some("Run"));

        assert!(service.remove_vision_link(&vision.id, &habit.id));
        assert!(!service.remove_vision_link(&vision.id, &habit.id));

        service.archive_vision_item(&vision.id).unwrap();
        assert!(service.vision_items().is_empty());
        assert!(service.vision_item(&vision.id).unwrap().archived);
        assert!(service.archive_vision_item("missing").is_err());
    }

    #[test]
    fn invalid_input_is_rejected_before_writing() {
        let service = service();
        let err = service
            .create_vision_item(NewVisionItem {
                title: "  ".into(),
                kind: VisionKind::ShortTerm,
                description: None,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(service.snapshot().visions.is_empty());
    }
}
