//! Civil-date keys (`YYYY-MM-DD`) and month keys (`YYYY-MM`).
//!
//! Keys are compared chronologically, which matches the lexicographic order of
//! their fixed-width text form. Every function that needs "which day is it"
//! takes an explicit [`Tz`]; nothing here reads the process time zone.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::DateError;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const EPOCH_DAYS_FROM_CE: i64 = 719_163;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn day_index(&self) -> i64 {
        i64::from(self.0.num_days_from_ce()) - EPOCH_DAYS_FROM_CE
    }

    /// Inverse of [`DateKey::day_index`]; saturates at the supported calendar range.
    pub fn from_day_index(index: i64) -> Self {
        let date = i32::try_from(index.saturating_add(EPOCH_DAYS_FROM_CE))
            .ok()
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .unwrap_or(if index >= 0 {
                NaiveDate::MAX
            } else {
                NaiveDate::MIN
            });
        Self(date)
    }

    pub fn add_days(&self, days: i64) -> Self {
        Self::from_day_index(self.day_index().saturating_add(days))
    }

    pub fn month_key(&self) -> MonthKey {
        MonthKey {
            year: self.0.year(),
            month: self.0.month(),
        }
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DateKey {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_date_key(s)
            .map(DateKey)
            .ok_or_else(|| DateError::InvalidDateKey(s.to_string()))
    }
}

impl TryFrom<String> for DateKey {
    type Error = DateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=12).contains(&month) {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    fn index(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_index(index: i64) -> Self {
        let min_year = i64::from(NaiveDate::MIN.year());
        let max_year = i64::from(NaiveDate::MAX.year());
        let year = index.div_euclid(12);
        if year < min_year {
            return Self {
                year: NaiveDate::MIN.year(),
                month: 1,
            };
        }
        if year > max_year {
            return Self {
                year: NaiveDate::MAX.year(),
                month: 12,
            };
        }
        Self {
            year: year as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn add_months(&self, months: i64) -> Self {
        Self::from_index(self.index().saturating_add(months))
    }

    pub fn first_day(&self) -> DateKey {
        DateKey(NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN))
    }

    pub fn last_day(&self) -> DateKey {
        let first = self.first_day().date();
        let last = first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        DateKey(last)
    }

    pub fn label(&self) -> String {
        self.first_day().date().format("%B %Y").to_string()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DateError::InvalidMonthKey(s.to_string());
        let bytes = s.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return Err(invalid());
        }
        let year = parse_digits(&s[..4]).ok_or_else(invalid)?;
        let month = parse_digits(&s[5..]).ok_or_else(invalid)?;
        if year == 0 {
            return Err(invalid());
        }
        MonthKey::new(year as i32, month).ok_or_else(invalid)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = DateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_key: DateKey,
    pub end_key: DateKey,
}

impl DateRange {
    pub fn new(start_key: DateKey, end_key: DateKey) -> Self {
        Self { start_key, end_key }
    }

    pub fn is_inverted(&self) -> bool {
        self.end_key < self.start_key
    }

    pub fn contains(&self, key: &DateKey) -> bool {
        *key >= self.start_key && *key <= self.end_key
    }

    pub fn day_count(&self) -> u32 {
        diff_date_keys_inclusive(&self.start_key, &self.end_key)
    }
}

fn parse_digits(segment: &str) -> Option<u32> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

pub fn date_key(instant: DateTime<Utc>, tz: Tz) -> DateKey {
    DateKey(instant.with_timezone(&tz).date_naive())
}

pub fn month_key(instant: DateTime<Utc>, tz: Tz) -> MonthKey {
    date_key(instant, tz).month_key()
}

pub fn today_date_key(tz: Tz) -> DateKey {
    date_key(Utc::now(), tz)
}

pub fn compare_date_keys(a: &DateKey, b: &DateKey) -> Ordering {
    a.cmp(b)
}

pub fn compare_month_keys(a: &MonthKey, b: &MonthKey) -> Ordering {
    a.cmp(b)
}

pub fn add_days_to_date_key(key: &DateKey, days: i64) -> DateKey {
    key.add_days(days)
}

/// `(end - start) + 1` in whole days, or 0 when `end` precedes `start`.
pub fn diff_date_keys_inclusive(start: &DateKey, end: &DateKey) -> u32 {
    let days = end.day_index() - start.day_index() + 1;
    u32::try_from(days.max(0)).unwrap_or(u32::MAX)
}

pub fn add_months_to_month_key(key: &MonthKey, months: i64) -> MonthKey {
    key.add_months(months)
}

pub fn month_range(key: &MonthKey) -> DateRange {
    DateRange::new(key.first_day(), key.last_day())
}

/// Parses `YYYY-MM-DD`. The day is only checked against 1-31; a day past the
/// end of its month rolls forward into the next month (`2025-02-31` is
/// 2025-03-03).
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    let bytes = key.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let year = parse_digits(&key[..4])?;
    let month = parse_digits(&key[5..7])?;
    let day = parse_digits(&key[8..])?;
    if year == 0 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    let first = NaiveDate::from_ymd_opt(year as i32, month, 1)?;
    first.checked_add_signed(Duration::days(i64::from(day) - 1))
}

/// Local noon of `key` in `tz`. When noon falls in a gap, the first local
/// hour after it is used; a day the zone skipped entirely maps to the first
/// instant after the gap.
pub fn date_from_date_key(key: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let date = parse_date_key(key)?;
    let noon = date.and_hms_opt(12, 0, 0)?;
    let base = (0..=24)
        .find_map(|hour| {
            tz.from_local_datetime(&(noon + Duration::hours(hour)))
                .earliest()
        })
        .unwrap_or_else(|| Utc.from_utc_datetime(&noon).with_timezone(&tz));
    let wanted = DateKey(date);
    let nudged = match date_key(base.with_timezone(&Utc), tz).cmp(&wanted) {
        Ordering::Equal => return Some(base),
        Ordering::Less => base + Duration::days(1),
        Ordering::Greater => base - Duration::days(1),
    };
    if date_key(nudged.with_timezone(&Utc), tz) == wanted {
        Some(nudged)
    } else {
        Some(base)
    }
}

pub fn is_future_date_key(key: &DateKey, tz: Tz, now: DateTime<Utc>) -> bool {
    *key > date_key(now, tz)
}

pub fn format_month_day(key: &DateKey) -> String {
    key.date().format("%B %-d").to_string()
}

pub fn format_weekday(key: &DateKey) -> String {
    key.date().format("%A").to_string()
}

pub fn parse_time_zone(raw: &str) -> Result<Tz, DateError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<Tz>()
        .map_err(|_| DateError::UnknownTimeZone(trimmed.to_string()))
}

pub fn resolve_time_zone(profile: Option<&str>, device: Option<&str>) -> Tz {
    for (source, raw) in [("profile", profile), ("device", device)] {
        let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
            continue;
        };
        match parse_time_zone(raw) {
            Ok(tz) => return tz,
            Err(err) => tracing::warn!(source, %err, "ignoring time zone"),
        }
    }
    chrono_tz::UTC
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(raw: &str) -> DateKey {
        raw.parse().unwrap()
    }

    fn month(raw: &str) -> MonthKey {
        raw.parse().unwrap()
    }

    #[test]
    fn date_key_follows_the_requested_zone() {
        let instant = Utc.with_ymd_and_hms(2025, 3, 1, 3, 30, 0).unwrap();
        assert_eq!(date_key(instant, chrono_tz::UTC).to_string(), "2025-03-01");
        assert_eq!(
            date_key(instant, chrono_tz::America::Los_Angeles).to_string(),
            "2025-02-28"
        );
        assert_eq!(
            date_key(instant, chrono_tz::Pacific::Kiritimati).to_string(),
            "2025-03-01"
        );
        assert_eq!(month_key(instant, chrono_tz::America::Los_Angeles).to_string(), "2025-02");
    }

    #[test]
    fn date_key_is_stable_across_the_local_day() {
        let tz = chrono_tz::Europe::Berlin;
        let morning = tz.with_ymd_and_hms(2025, 3, 30, 0, 30, 0).unwrap();
        let night = tz.with_ymd_and_hms(2025, 3, 30, 23, 30, 0).unwrap();
        assert_eq!(
            date_key(morning.with_timezone(&Utc), tz),
            date_key(night.with_timezone(&Utc), tz)
        );
    }

    #[test]
    fn parses_only_fixed_width_keys() {
        assert!(parse_date_key("2025-01-05").is_some());
        assert!(parse_date_key("2025-1-05").is_none());
        assert!(parse_date_key("2025-13-01").is_none());
        assert!(parse_date_key("2025-00-10").is_none());
        assert!(parse_date_key("2025-01-32").is_none());
        assert!(parse_date_key("0000-01-01").is_none());
        assert!(parse_date_key("2025-01-0a").is_none());
        assert!(parse_date_key("+025-01-01").is_none());
        assert!("2025-01".parse::<DateKey>().is_err());
    }

    #[test]
    fn day_overflow_rolls_into_next_month() {
        assert_eq!(
            parse_date_key("2025-02-31"),
            NaiveDate::from_ymd_opt(2025, 3, 3)
        );
        assert_eq!(key("2024-02-30").to_string(), "2024-03-01");
    }

    #[test]
    fn adds_days_across_boundaries() {
        assert_eq!(add_days_to_date_key(&key("2024-12-31"), 1).to_string(), "2025-01-01");
        assert_eq!(add_days_to_date_key(&key("2024-03-01"), -1).to_string(), "2024-02-29");
        assert_eq!(add_days_to_date_key(&key("2025-03-09"), 1).to_string(), "2025-03-10");
        assert_eq!(key("1970-01-01").day_index(), 0);
    }

    #[test]
    fn inclusive_difference_clamps_at_zero() {
        let k = key("2025-06-15");
        assert_eq!(diff_date_keys_inclusive(&k, &k), 1);
        assert_eq!(diff_date_keys_inclusive(&k, &k.add_days(-1)), 0);
        assert_eq!(diff_date_keys_inclusive(&k, &k.add_days(-40)), 0);
        assert_eq!(diff_date_keys_inclusive(&key("2025-01-01"), &key("2025-12-31")), 365);
    }

    #[test]
    fn month_arithmetic_rolls_years() {
        assert_eq!(add_months_to_month_key(&month("2024-12"), 1).to_string(), "2025-01");
        assert_eq!(add_months_to_month_key(&month("2024-01"), -1).to_string(), "2023-12");
        assert_eq!(add_months_to_month_key(&month("2024-05"), -29).to_string(), "2021-12");
        assert_eq!(add_months_to_month_key(&month("2024-05"), 0), month("2024-05"));
    }

    #[test]
    fn month_range_respects_leap_years() {
        let leap = month_range(&month("2024-02"));
        assert_eq!(leap.start_key.to_string(), "2024-02-01");
        assert_eq!(leap.end_key.to_string(), "2024-02-29");
        assert_eq!(month_range(&month("2023-02")).end_key.to_string(), "2023-02-28");
        assert_eq!(month_range(&month("2025-12")).end_key.to_string(), "2025-12-31");
        assert_eq!(month_range(&month("2025-04")).day_count(), 30);
    }

    #[test]
    fn rejects_malformed_month_keys() {
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("2024-1".parse::<MonthKey>().is_err());
        assert!("2024/01".parse::<MonthKey>().is_err());
        assert!("0000-01".parse::<MonthKey>().is_err());
    }

    #[test]
    fn date_from_key_reproduces_the_key() {
        for tz in [
            chrono_tz::UTC,
            chrono_tz::Pacific::Kiritimati,
            chrono_tz::Pacific::Pago_Pago,
            chrono_tz::America::Sao_Paulo,
        ] {
            let dt = date_from_date_key("2025-03-09", tz).expect("valid key");
            assert_eq!(date_key(dt.with_timezone(&Utc), tz).to_string(), "2025-03-09");
        }
        assert!(date_from_date_key("2025-3-09", chrono_tz::UTC).is_none());
    }

    #[test]
    fn date_from_key_survives_a_skipped_day() {
        let apia = chrono_tz::Pacific::Apia;
        let skipped = date_from_date_key("2011-12-30", apia).expect("well-formed key");
        assert_eq!(date_key(skipped.with_timezone(&Utc), apia).to_string(), "2011-12-31");
        for raw in ["2011-12-29", "2011-12-31"] {
            let dt = date_from_date_key(raw, apia).expect("valid key");
            assert_eq!(date_key(dt.with_timezone(&Utc), apia).to_string(), raw);
        }
    }

    #[test]
    fn formats_labels() {
        let k = key("2026-10-16");
        assert_eq!(format_month_day(&k), "October 16");
        assert_eq!(format_weekday(&k), "Friday");
        assert_eq!(month("2024-02").label(), "February 2024");
    }

    #[test]
    fn future_keys_are_relative_to_the_zone() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 3, 0, 0).unwrap();
        let tomorrow_in_la = key("2025-03-01");
        assert!(is_future_date_key(&tomorrow_in_la, chrono_tz::America::Los_Angeles, now));
        assert!(!is_future_date_key(&tomorrow_in_la, chrono_tz::UTC, now));
    }

    #[test]
    fn resolves_time_zone_with_fallbacks() {
        assert_eq!(
            resolve_time_zone(Some("Asia/Tokyo"), Some("Europe/Paris")),
            chrono_tz::Asia::Tokyo
        );
        assert_eq!(
            resolve_time_zone(Some("Mars/Olympus"), Some("Europe/Paris")),
            chrono_tz::Europe::Paris
        );
        assert_eq!(resolve_time_zone(None, None), chrono_tz::UTC);
        assert!(matches!(
            parse_time_zone("Nowhere"),
            Err(DateError::UnknownTimeZone(_))
        ));
    }

    #[test]
    fn keys_serialize_as_text() {
        let json = serde_json::to_string(&key("2025-01-02")).unwrap();
        assert_eq!(json, "\"2025-01-02\"");
        let parsed: MonthKey = serde_json::from_str("\"2025-07\"").unwrap();
        assert_eq!(parsed, month("2025-07"));
        assert!(serde_json::from_str::<DateKey>("\"2025-7-1\"").is_err());
    }

    fn any_key() -> impl Strategy<Value = DateKey> {
        (-200_000i64..200_000).prop_map(DateKey::from_day_index)
    }

    proptest! {
        #[test]
        fn adding_days_round_trips(k in any_key(), n in -100_000i64..100_000) {
            prop_assert_eq!(k.add_days(0), k);
            prop_assert_eq!(k.add_days(n).add_days(-n), k);
        }

        #[test]
        fn key_order_matches_text_and_chronology(a in any_key(), b in any_key()) {
            prop_assert_eq!(compare_date_keys(&a, &b), a.to_string().cmp(&b.to_string()));
            prop_assert_eq!(compare_date_keys(&a, &b), a.day_index().cmp(&b.day_index()));
            prop_assert_eq!(
                compare_month_keys(&a.month_key(), &b.month_key()),
                a.month_key().to_string().cmp(&b.month_key().to_string())
            );
        }

        #[test]
        fn text_form_parses_back(k in any_key()) {
            prop_assert_eq!(k.to_string().parse::<DateKey>().unwrap(), k);
        }
    }
}
