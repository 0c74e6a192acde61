//! Turns a submission row into the announcement posted to the channel.
//!
//! End dates arrive in one of two encodings depending on how the sheet cell is
//! typed: a spreadsheet day serial (e.g. `45000`) or a `DD/MM/YYYY` string.
//! Both are normalized to a calendar date before formatting. Slash dates are
//! read leniently, the way spreadsheet users type them. A date that
//! cannot be read never fails the message; it is rendered as `Invalid Date`.

use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::sink::Notification;
use crate::snapshot::RawRow;

/// Days between the spreadsheet serial epoch (1899-12-30) and 1970-01-01.
pub const SERIAL_EPOCH_OFFSET_DAYS: f64 = 25_569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;
// Largest magnitude a calendar timestamp may have, in milliseconds.
const MAX_TIME_MILLIS: f64 = 8.64e15;

pub const INVALID_DATE: &str = "Invalid Date";
pub const EMBED_TITLE: &str = "📝 New Sheet Entry";
pub const EMBED_COLOR: u32 = 0x0099ff;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndDateError {
    #[error("end date is empty")]
    Empty,
    #[error("expected DD/MM/YYYY but found {parts} part(s)")]
    PartCount { parts: usize },
    #[error("'{0}' is not an integer")]
    NotAnInteger(String),
    #[error("serial {0} is outside the representable range")]
    SerialOutOfRange(String),
    #[error("{day}/{month}/{year} is not a calendar date")]
    NotACalendarDate { day: i64, month: i64, year: i64 },
}

/// Reads an end date in either accepted encoding.
pub fn parse_end_date(raw: &str) -> Result<NaiveDate, EndDateError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(EndDateError::Empty);
    }

    if let Some(serial) = parse_serial(value) {
        return serial_to_date(serial)
            .ok_or_else(|| EndDateError::SerialOutOfRange(value.to_string()));
    }

    let parts: Vec<&str> = value.split('/').collect();
    if parts.len() != 3 {
        return Err(EndDateError::PartCount { parts: parts.len() });
    }

    let day = parse_part(parts[0])?;
    let month = parse_part(parts[1])?;
    let year = parse_part(parts[2])?;

    rolled_calendar_date(day, month, year)
        .ok_or(EndDateError::NotACalendarDate { day, month, year })
}

/// Builds a date the lenient way a spreadsheet form expects: two-digit years
/// land in the 1900s, and out-of-range days or months carry into the next
/// month or year (`31/02/2025` is 3 March, `0/3/2025` is the last day of February).
fn rolled_calendar_date(day: i64, month: i64, year: i64) -> Option<NaiveDate> {
    let year = if (0..=99).contains(&year) { year + 1900 } else { year };
    let month_offset = month.checked_sub(1)?;
    let year = year.checked_add(month_offset.div_euclid(12))?;
    let month = u32::try_from(month_offset.rem_euclid(12) + 1).ok()?;

    let first_of_month = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, 1)?;
    first_of_month.checked_add_signed(TimeDelta::try_days(day.checked_sub(1)?)?)
}

fn parse_serial(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|serial| serial.is_finite())
}

// Leading integer of a date part: `15th` reads as 15, `th15` does not read.
fn parse_part(part: &str) -> Result<i64, EndDateError> {
    let text = part.trim_start();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());

    digits[..end]
        .parse::<i64>()
        .map(|value| if negative { -value } else { value })
        .map_err(|_| EndDateError::NotAnInteger(part.to_string()))
}

/// Serial days to a UTC calendar date; any time-of-day fraction is dropped.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    let millis = (serial - SERIAL_EPOCH_OFFSET_DAYS) * MILLIS_PER_DAY;
    if !millis.is_finite() || millis.abs() > MAX_TIME_MILLIS {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64).map(|instant| instant.date_naive())
}

/// Renders the plain-text announcement for one row.
pub fn format_row(row: &RawRow) -> String {
    let ends = match parse_end_date(row.end_date()) {
        Ok(date) => date.format("%d/%m/%Y").to_string(),
        Err(err) => {
            error!(
                row = row.row_index,
                end_date = row.end_date(),
                error = %err,
                "invalid end date"
            );
            INVALID_DATE.to_string()
        }
    };

    let mut message = format!(
        "🎉 NEW HACKATHON ALERT! 🎉\n\n🏆 {}\n🌐 Register: {}\n🎯 Type: {}\n📅 Ends: {}",
        row.name(),
        row.link(),
        row.entry_type(),
        ends
    );

    let other_info = row.other_info();
    if !other_info.trim().is_empty() {
        message.push_str("\n\n📌 Additional Information:\n");
        message.push_str(other_info);
    }

    message
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageStyle {
    #[default]
    Text,
    Embed,
}

impl FromStr for MessageStyle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(MessageStyle::Text),
            "embed" => Ok(MessageStyle::Embed),
            other => Err(format!("unknown message style '{other}' (expected text or embed)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Column-by-column card view of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryEmbed {
    pub title: String,
    pub color: u32,
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<EmbedField>,
}

pub fn entry_embed(row: &RawRow, now: DateTime<Utc>) -> EntryEmbed {
    let fields = row
        .fields
        .iter()
        .enumerate()
        .filter(|(_, value)| !value.is_empty())
        .map(|(index, value)| EmbedField {
            name: format!("Column {}", index + 1),
            value: if index == 0 {
                format_submission_timestamp(value)
            } else {
                value.clone()
            },
            inline: true,
        })
        .collect();

    EntryEmbed {
        title: EMBED_TITLE.to_string(),
        color: EMBED_COLOR,
        timestamp: now,
        fields,
    }
}

fn format_submission_timestamp(value: &str) -> String {
    parse_submission_timestamp(value)
        .map(|date| format!("{}/{}/{}", date.day(), date.month(), date.year()))
        .unwrap_or_else(|| value.to_string())
}

fn parse_submission_timestamp(value: &str) -> Option<NaiveDate> {
    if let Some(serial) = parse_serial(value) {
        return serial_to_date(serial);
    }

    let formats = [
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];
    for fmt in formats.iter() {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(stamp.date());
        }
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|stamp| stamp.date_naive())
}

pub fn render(row: &RawRow, style: MessageStyle, now: DateTime<Utc>) -> Notification {
    match style {
        MessageStyle::Text => Notification::Text(format_row(row)),
        MessageStyle::Embed => Notification::Embed(entry_embed(row, now)),
    }
}
