use std::collections::HashMap;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use napi_derive::napi;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use vj_domain::{
    dates::{self, DateKey, DateRange, MonthKey},
    insights::{self, HabitConsistency, ProgressData, RangeSelector},
    model::{Habit, HabitId, JournalEntry, VisionItem},
    monthly::{self, MonthlyData},
    error::failure_message,
    FailureKind, StoreError,
};
use vj_sync::{AutosaveRegistry, SaveTicket};

static AUTOSAVE: Lazy<RwLock<AutosaveRegistry<String>>> =
    Lazy::new(|| RwLock::new(AutosaveRegistry::default()));

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsistencyPayload {
    habit: Habit,
    #[serde(default)]
    logs_by_date: HashMap<DateKey, f64>,
    range: DateRange,
    time_zone: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisionProgressPayload {
    vision: VisionItem,
    #[serde(default)]
    linked_habits: Vec<Habit>,
    #[serde(default)]
    consistency_by_habit: HashMap<HabitId, HabitConsistency>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressPayload {
    data: ProgressData,
    range: RangeSelector,
    time_zone: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonthlyPayload {
    month: MonthKey,
    data: MonthlyData,
    time_zone: String,
}

#[napi]
pub fn ping() -> String {
    "vision-journal-bridge".to_owned()
}

#[napi]
pub fn date_range(selector: String, time_zone: String) -> napi::Result<Value> {
    let run = || -> Result<Value> {
        let selector: RangeSelector = selector.parse()?;
        let tz = time_zone_from(&time_zone)?;
        to_json(&insights::date_range(selector, tz))
    };
    run().map_err(to_napi_error)
}

#[napi]
pub fn month_range(month: String) -> napi::Result<Value> {
    let month = month_from(&month).map_err(to_napi_error)?;
    to_json(&dates::month_range(&month)).map_err(to_napi_error)
}

#[napi]
pub fn shift_month(month: String, delta: i32) -> napi::Result<String> {
    let month = month_from(&month).map_err(to_napi_error)?;
    Ok(dates::add_months_to_month_key(&month, i64::from(delta)).to_string())
}

#[napi]
pub fn habit_consistency(payload: Value) -> napi::Result<Value> {
    let run = || -> Result<Value> {
        let payload: ConsistencyPayload = from_payload(payload, "habit consistency")?;
        let tz = time_zone_from(&payload.time_zone)?;
        to_json(&insights::compute_habit_consistency(
            &payload.habit,
            &payload.logs_by_date,
            &payload.range,
            tz,
        ))
    };
    run().map_err(to_napi_error)
}

#[napi]
pub fn vision_progress(payload: Value) -> napi::Result<Value> {
    let run = || -> Result<Value> {
        let payload: VisionProgressPayload = from_payload(payload, "vision progress")?;
        let linked: Vec<&Habit> = payload
            .linked_habits
            .iter()
            .filter(|habit| !habit.archived)
            .collect();
        to_json(&insights::compute_vision_progress(
            &payload.vision,
            &linked,
            &payload.consistency_by_habit,
        ))
    };
    run().map_err(to_napi_error)
}

#[napi]
pub fn journal_stats(entries: Value) -> napi::Result<Value> {
    let run = || -> Result<Value> {
        let entries: Vec<JournalEntry> = from_payload(entries, "journal entries")?;
        to_json(&monthly::compute_journal_stats(&entries))
    };
    run().map_err(to_napi_error)
}

#[napi]
pub fn progress_report(payload: Value) -> napi::Result<Value> {
    let run = || -> Result<Value> {
        let payload: ProgressPayload = from_payload(payload, "progress report")?;
        let tz = time_zone_from(&payload.time_zone)?;
        let range = insights::date_range(payload.range, tz);
        to_json(&insights::build_progress_report(&payload.data, range, tz))
    };
    run().map_err(to_napi_error)
}

#[napi]
pub fn monthly_summary(payload: Value) -> napi::Result<Value> {
    let run = || -> Result<Value> {
        let payload: MonthlyPayload = from_payload(payload, "monthly summary")?;
        let tz = time_zone_from(&payload.time_zone)?;
        to_json(&monthly::build_monthly_summary(
            payload.month,
            &payload.data,
            tz,
        ))
    };
    run().map_err(to_napi_error)
}

#[napi]
pub fn classify_failure(message: String) -> String {
    match FailureKind::classify(&message) {
        FailureKind::Network => "network".to_owned(),
        FailureKind::Other => "other".to_owned(),
    }
}

#[napi]
pub fn failure_text(message: Option<String>) -> String {
    failure_message(message.as_deref())
}

#[napi]
pub fn autosave_edit(field: String, target: String, value: String) {
    AUTOSAVE
        .write()
        .edit(&field, &target, value, Instant::now());
}

#[napi]
pub fn autosave_flush(field: String) -> napi::Result<bool> {
    AUTOSAVE
        .write()
        .flush(&field)
        .map_err(|err| to_napi_error(err.into()))
}

/// Returns every write that is ready to run, oldest first.
#[napi]
pub fn autosave_poll() -> napi::Result<Value> {
    let mut guard = AUTOSAVE.write();
    guard.poll(Instant::now());
    let mut tickets = Vec::new();
    while let Some(ticket) = guard.dequeue() {
        tickets.push(ticket);
    }
    to_json(&tickets).map_err(to_napi_error)
}

#[napi]
pub fn autosave_complete(ticket: Value, error: Option<String>) -> napi::Result<Value> {
    let run = || -> Result<Value> {
        let ticket: SaveTicket<String> = from_payload(ticket, "save ticket")?;
        let outcome = match error {
            Some(message) => Err(StoreError::request(message)),
            None => Ok(()),
        };
        let mut guard = AUTOSAVE.write();
        let completion = guard.complete(&ticket, outcome)?;
        Ok(json!({
            "completion": completion,
            "status": guard.status(&ticket.field),
        }))
    };
    run().map_err(to_napi_error)
}

#[napi]
pub fn autosave_status(field: String) -> napi::Result<Value> {
    to_json(&AUTOSAVE.read().status(&field)).map_err(to_napi_error)
}

fn time_zone_from(raw: &str) -> Result<Tz> {
    dates::parse_time_zone(raw).context("time zone must be an IANA name")
}

fn month_from(raw: &str) -> Result<MonthKey> {
    raw.parse::<MonthKey>()
        .with_context(|| format!("invalid month `{raw}`"))
}

fn from_payload<T: DeserializeOwned>(payload: Value, what: &str) -> Result<T> {
    serde_json::from_value(payload).with_context(|| format!("malformed {what} payload"))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("failed to encode response")
}

fn to_napi_error(err: anyhow::Error) -> napi::Error {
    napi::Error::new(napi::Status::GenericFailure, format!("{err:#}"))
}
