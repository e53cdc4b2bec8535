//! Date rendering for rows and sheet names

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use chrono_tz::Tz;
use serde_json::Value;

/// Rendered in place of a date that could not be understood
pub const INVALID_DATE: &str = "Invalid Date";

/// Standalone short month names, as a Russian calendar prints them
const MONTHS: [&str; 12] = [
    "янв.", "февр.", "март", "апр.", "май", "июнь", "июль", "авг.", "сент.", "окт.", "нояб.", "дек.",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];

/// Local date of a unix timestamp (seconds)
pub fn local_date(ts: i64, tz: Tz) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.with_timezone(&tz).date_naive())
}

/// `dd.mm.yyyy`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// `dd.mm.yyyy` of a unix timestamp, or the placeholder
pub fn format_timestamp(ts: Option<i64>, tz: Tz) -> String {
    ts.and_then(|ts| local_date(ts, tz))
        .map(format_date)
        .unwrap_or_else(|| INVALID_DATE.to_string())
}

/// Render a custom-field date
///
/// Absent values render empty; present but unparseable ones render the
/// placeholder. Accepts unix seconds, ISO dates, `dd.mm.yyyy` and RFC 3339.
pub fn format_field_date(value: Option<&Value>, tz: Tz) -> String {
    let Some(value) = value else {
        return String::new();
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64().and_then(|ts| local_date(ts, tz)),
        Value::String(s) => parse_date_str(s.trim(), tz),
        _ => None,
    };
    parsed.map(format_date).unwrap_or_else(|| INVALID_DATE.to_string())
}

fn parse_date_str(s: &str, tz: Tz) -> Option<NaiveDate> {
    if let Ok(ts) = s.parse::<i64>() {
        return local_date(ts, tz);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&tz).date_naive());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return tz.from_local_datetime(&dt).earliest().map(|d| d.date_naive());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Destination sheet for a lead arriving at `ts`: short month + two-digit year
pub fn sheet_name(ts: Option<i64>, tz: Tz) -> String {
    match ts.and_then(|ts| local_date(ts, tz)) {
        Some(date) => format!("{} {:02}", MONTHS[date.month0() as usize], date.year() % 100),
        None => INVALID_DATE.to_string(),
    }
}
