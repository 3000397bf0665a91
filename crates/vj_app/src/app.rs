use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info, warn};
use vj_domain::{
    dates::{self, format_month_day, MonthKey},
    insights::{self, percent_label, ProgressReport, RangeSelector},
    monthly::MonthlySummary,
    JournalService,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) data_path: Option<PathBuf>,
    pub(crate) profile_time_zone: Option<String>,
    pub(crate) device_time_zone: Option<String>,
    pub(crate) range: RangeSelector,
    pub(crate) month: Option<MonthKey>,
    pub(crate) output: OutputFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = lookup("VJ_DATA").filter(|value| !value.trim().is_empty()) {
            config.data_path = Some(PathBuf::from(path.trim()));
        }
        config.profile_time_zone = lookup("VJ_TIMEZONE");
        if let Some(device) = lookup("TZ") {
            config.device_time_zone = Some(device);
        }
        if let Some(range) = lookup("VJ_RANGE") {
            match range.parse::<RangeSelector>() {
                Ok(value) => config.range = value,
                Err(err) => warn!(%err, "ignoring VJ_RANGE"),
            }
        }
        if let Some(month) = lookup("VJ_MONTH") {
            match month.trim().parse::<MonthKey>() {
                Ok(value) => config.month = Some(value),
                Err(err) => warn!(%err, "ignoring VJ_MONTH"),
            }
        }
        if let Some(output) = lookup("VJ_OUTPUT") {
            match output.trim().to_ascii_lowercase().as_str() {
                "json" => config.output = OutputFormat::Json,
                "text" => config.output = OutputFormat::Text,
                other => warn!(value = other, "ignoring VJ_OUTPUT"),
            }
        }
        Ok(config)
    }

    /// Config override, then the snapshot's profile zone, then the device zone.
    pub(crate) fn time_zone(&self, snapshot_profile_zone: Option<&str>) -> Tz {
        let profile = self.profile_time_zone.as_deref().or(snapshot_profile_zone);
        dates::resolve_time_zone(profile, self.device_time_zone.as_deref())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            profile_time_zone: None,
            device_time_zone: None,
            range: RangeSelector::Last7Days,
            month: None,
            output: OutputFormat::Text,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub time_zone: String,
    pub habit_names: HashMap<String, String>,
    pub progress: ProgressReport,
    pub monthly: MonthlySummary,
}

pub fn run(config: AppConfig) -> Result<()> {
    let report = build_report(&config, Utc::now())?;
    let output = match config.output {
        OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        OutputFormat::Text => render_text(&report, config.range),
    };
    println!("{output}");
    Ok(())
}

pub fn build_report(config: &AppConfig, now: DateTime<Utc>) -> Result<Report> {
    let path = config
        .data_path
        .as_ref()
        .context("VJ_DATA must point at an exported snapshot")?;
    let service = JournalService::builder()
        .with_snapshot_file(path)
        .build()
        .context("failed to load journal snapshot")?;

    let profile = service.profile();
    let tz = config.time_zone(profile.as_ref().and_then(|p| p.timezone.as_deref()));
    info!(time_zone = %tz, path = %path.display(), "building report");

    let range = insights::date_range_at(config.range, tz, now);
    let month = config.month.unwrap_or_else(|| dates::month_key(now, tz));
    debug!(start = %range.start_key, end = %range.end_key, %month, "resolved windows");

    let habit_names = service
        .active_habits()
        .into_iter()
        .map(|habit| (habit.id, habit.name))
        .collect();

    Ok(Report {
        time_zone: tz.name().to_string(),
        habit_names,
        progress: service.progress_report_for(range, tz),
        monthly: service.monthly_summary(month, tz),
    })
}

pub fn render_text(report: &Report, selector: RangeSelector) -> String {
    let mut out = String::new();
    let progress = &report.progress;
    let _ = writeln!(
        out,
        "Progress {} ({} - {}, {})",
        selector,
        format_month_day(&progress.range.start_key),
        format_month_day(&progress.range.end_key),
        report.time_zone
    );
    for habit in &progress.habits {
        let name = report
            .habit_names
            .get(&habit.habit_id)
            .map(String::as_str)
            .unwrap_or(habit.habit_id.as_str());
        if habit.has_data() {
            let _ = writeln!(
                out,
                "  {:<24} {:>3}/{:<3} {}",
                name,
                habit.done_days,
                habit.eligible_days,
                percent_label(habit.consistency)
            );
        } else {
            let _ = writeln!(out, "  {:<24} no data yet", name);
        }
    }
    let _ = writeln!(out, "Visions");
    for vision in &progress.visions {
        if vision.progress.has_data {
            let _ = writeln!(
                out,
                "  {:<24} {}",
                vision.title,
                percent_label(vision.progress.progress)
            );
        } else {
            let _ = writeln!(out, "  {:<24} no linked habits", vision.title);
        }
    }

    let monthly = &report.monthly;
    let _ = writeln!(out, "{}", monthly.label);
    let _ = writeln!(
        out,
        "  Days journaled: {}  Days written: {}  Visions tracked: {}",
        monthly.journal.days_journaled, monthly.journal.days_written, monthly.vision_tracked_count
    );
    for stat in &monthly.habits {
        if stat.has_data {
            let _ = writeln!(
                out,
                "  {:<24} {}",
                stat.habit.name,
                percent_label(stat.consistency.consistency)
            );
        } else {
            let _ = writeln!(out, "  {:<24} no data yet", stat.habit.name);
        }
    }
    if !monthly.reflection.trim().is_empty() {
        let _ = writeln!(out, "  Reflection: {}", monthly.reflection.trim());
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn reads_config_from_environment() {
        let config = AppConfig::from_lookup(lookup(&[
            ("VJ_DATA", "/tmp/export.json"),
            ("VJ_RANGE", "30D"),
            ("VJ_MONTH", "2025-02"),
            ("VJ_OUTPUT", "JSON"),
            ("VJ_TIMEZONE", "Asia/Tokyo"),
        ]))
        .unwrap();
        assert_eq!(config.data_path, Some(PathBuf::from("/tmp/export.json")));
        assert_eq!(config.range, RangeSelector::Last30Days);
        assert_eq!(config.month, Some("2025-02".parse().unwrap()));
        assert_eq!(config.output, OutputFormat::Json);
        assert_eq!(config.time_zone(Some("Europe/Paris")), chrono_tz::Asia::Tokyo);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("VJ_RANGE", "90D"),
            ("VJ_MONTH", "2025-13"),
            ("VJ_OUTPUT", "xml"),
            ("TZ", "Not/AZone"),
        ]))
        .unwrap();
        assert_eq!(config.range, RangeSelector::Last7Days);
        assert!(config.month.is_none());
        assert_eq!(config.output, OutputFormat::Text);
        assert_eq!(config.time_zone(None), chrono_tz::UTC);
        assert_eq!(config.time_zone(Some("Europe/Paris")), chrono_tz::Europe::Paris);
    }

    #[test]
    fn report_requires_a_data_path() {
        let err = build_report(&AppConfig::default(), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("VJ_DATA"));
    }

    #[test]
    fn builds_and_renders_a_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("snapshot.json");
        fs::write(
            &path,
            r#"{
  "profile": { "id": "u1", "timezone": "UTC" },
  "habits": [
    { "id": "run", "name": "Run", "type": "BINARY", "created_at": "2025-01-01T00:00:00Z" }
  ],
  "habit_logs": [
    { "habit_id": "run", "date": "2025-01-09", "value": 1 },
    { "habit_id": "run", "date": "2025-01-10", "value": 1 }
  ],
  "vision_items": [
    { "id": "fit", "title": "Get fit", "type": "LONG_TERM", "created_at": "2025-01-01T00:00:00Z" }
  ],
  "vision_habit_maps": [ { "vision_item_id": "fit", "habit_id": "run" } ],
  "journal_entries": [ { "date": "2025-01-10", "content": "Ran twice" } ],
  "monthly_summaries": [ { "month": "2025-01", "reflection": "Good start" } ]
}"#,
        )
        .expect("write snapshot");

        let config = AppConfig {
            data_path: Some(path),
            ..AppConfig::default()
        };
        let now: DateTime<Utc> = "2025-01-10T12:00:00Z".parse().unwrap();
        let report = build_report(&config, now).expect("report");
        assert_eq!(report.time_zone, "UTC");
        assert_eq!(report.progress.habits[0].done_days, 2);
        assert_eq!(report.progress.habits[0].eligible_days, 7);
        assert_eq!(report.monthly.month.to_string(), "2025-01");
        assert_eq!(report.monthly.journal.days_written, 1);

        let text = render_text(&report, config.range);
        assert!(text.starts_with("Progress 7D (January 4 - January 10, UTC)"));
        assert!(text.contains("Get fit"));
        assert!(text.contains("29%"));
        assert!(text.contains("January 2025"));
        assert!(text.contains("Reflection: Good start"));
    }
}
