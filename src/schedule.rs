//! Natural-language schedule parsing.
//!
//! Deterministic, chrono-based. Recognizes weekday names, today/tomorrow/
//! next week, clock times, a meeting kind, and "with X" attendee phrases.
//! All computation is relative to a caller-supplied reference time, so the
//! parser is pure and testable.
//!
//! Text with no temporal signal at all is an error rather than a guess;
//! fabricating a default calendar hold is worse than asking the user.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Default meeting start when only a day is given.
const DEFAULT_HOUR: u32 = 10;

/// Default meeting length.
const DEFAULT_DURATION_HOURS: i64 = 1;

static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:next\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues?|wed|thur?s?|fri|sat|sun)\b",
    )
    .unwrap()
});

static RELATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(today|tomorrow|next\s+week)\b").unwrap());

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*(am|pm)?\b|\b(\d{1,2})\s*(am|pm)\b").unwrap()
});

// Bare hour after "at", tried only when TIME_RE finds nothing so that
// "at 2:30pm" keeps its minutes and meridiem.
static AT_HOUR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bat\s+(\d{1,2})\b").unwrap());

static KIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(demo|call|meeting|presentation|review)\b").unwrap());

static WITH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwith\s+(?:the\s+)?([A-Za-z][A-Za-z ]*?)(?:\s+about\b|\s+regarding\b|[,.!?]|$)")
        .unwrap()
});

/// A parsed meeting request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSchedule {
    /// Meeting title, derived from the meeting kind.
    pub title: String,
    /// Start time (UTC).
    pub start: DateTime<Utc>,
    /// End time (UTC), one hour after start.
    pub end: DateTime<Utc>,
    /// Attendee names mentioned with "with ...".
    pub attendees: Vec<String>,
}

/// Parse scheduling text relative to `now`.
pub fn parse_schedule(text: &str, now: DateTime<Utc>) -> Result<ParsedSchedule, ScheduleError> {
    let day = parse_day(text, now);
    let time = parse_time(text)?;

    if day.is_none() && time.is_none() {
        return Err(ScheduleError::NoTemporalSignal);
    }

    let time = time.unwrap_or_else(|| NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0).unwrap());

    let date = match day {
        Some(date) => date,
        None => {
            // Time only: today if still ahead, else tomorrow.
            if time > now.time() {
                now.date_naive()
            } else {
                now.date_naive() + Duration::days(1)
            }
        }
    };

    let start = date.and_time(time).and_utc();
    let end = start + Duration::hours(DEFAULT_DURATION_HOURS);

    Ok(ParsedSchedule {
        title: parse_title(text),
        start,
        end,
        attendees: parse_attendees(text),
    })
}

fn parse_day(text: &str, now: DateTime<Utc>) -> Option<chrono::NaiveDate> {
    if let Some(captures) = WEEKDAY_RE.captures(text) {
        let day = captures[1].to_ascii_lowercase();
        // Full names and abbreviations share their first three letters.
        let target = match &day[..3] {
            "mon" => Weekday::Mon,
            "tue" => Weekday::Tue,
            "wed" => Weekday::Wed,
            "thu" => Weekday::Thu,
            "fri" => Weekday::Fri,
            "sat" => Weekday::Sat,
            _ => Weekday::Sun,
        };
        // Next occurrence strictly after today.
        let today = now.date_naive();
        let mut date = today + Duration::days(1);
        while date.weekday() != target {
            date += Duration::days(1);
        }
        return Some(date);
    }

    if let Some(captures) = RELATIVE_RE.captures(text) {
        let today = now.date_naive();
        let date = match captures[1].to_ascii_lowercase().as_str() {
            "today" => today,
            "tomorrow" => today + Duration::days(1),
            _ => today + Duration::days(7), // "next week"
        };
        return Some(date);
    }

    None
}

fn parse_time(text: &str) -> Result<Option<NaiveTime>, ScheduleError> {
    let Some(captures) = TIME_RE.captures(text) else {
        if let Some(captures) = AT_HOUR_RE.captures(text) {
            let hour_raw = &captures[1];
            let hour: u32 = hour_raw
                .parse()
                .map_err(|_| ScheduleError::InvalidTime(hour_raw.to_string()))?;
            return NaiveTime::from_hms_opt(hour, 0, 0)
                .map(Some)
                .ok_or_else(|| ScheduleError::InvalidTime(format!("{hour}:00")));
        }
        return Ok(None);
    };

    let (hour_raw, minute, meridiem) = if let Some(hour) = captures.get(1) {
        (
            hour.as_str(),
            captures.get(2).map(|m| m.as_str()).unwrap_or("0"),
            captures.get(3).map(|m| m.as_str().to_ascii_lowercase()),
        )
    } else {
        (
            captures.get(4).map(|m| m.as_str()).unwrap_or("0"),
            "0",
            captures.get(5).map(|m| m.as_str().to_ascii_lowercase()),
        )
    };

    let mut hour: u32 = hour_raw
        .parse()
        .map_err(|_| ScheduleError::InvalidTime(hour_raw.to_string()))?;
    let minute: u32 = minute
        .parse()
        .map_err(|_| ScheduleError::InvalidTime(minute.to_string()))?;

    match meridiem.as_deref() {
        Some("pm") if hour > 12 => {
            return Err(ScheduleError::InvalidTime(format!("{hour}pm")));
        }
        Some("pm") if hour != 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
        .map(Some)
        .ok_or_else(|| ScheduleError::InvalidTime(format!("{hour}:{minute:02}")))
}

fn parse_title(text: &str) -> String {
    let kind = KIND_RE
        .captures(text)
        .map(|c| c[1].to_ascii_lowercase())
        .unwrap_or_else(|| "meeting".to_string());
    format!("Business {kind}")
}

fn parse_attendees(text: &str) -> Vec<String> {
    WITH_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    /// Monday 2026-03-02 09:00 UTC.
    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn parses_weekday_and_time() {
        let parsed =
            parse_schedule("Schedule demo next Wednesday at 11am with the technical team",
                monday_morning())
            .unwrap();
        assert_eq!(parsed.title, "Business demo");
        assert_eq!(parsed.start, Utc.with_ymd_and_hms(2026, 3, 4, 11, 0, 0).unwrap());
        assert_eq!(parsed.end, Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap());
        assert_eq!(parsed.attendees, vec!["technical team"]);
    }

    #[test]
    fn weekday_is_strictly_after_reference() {
        // Asking for Monday on a Monday means next week's Monday.
        let parsed = parse_schedule("call monday", monday_morning()).unwrap();
        assert_eq!(parsed.start, Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).unwrap());
        assert_eq!(parsed.title, "Business call");
    }

    #[test]
    fn day_without_time_defaults_to_ten() {
        let parsed = parse_schedule("review tomorrow", monday_morning()).unwrap();
        assert_eq!(parsed.start, Utc.with_ymd_and_hms(2026, 3, 3, 10, 0, 0).unwrap());
    }

    #[test]
    fn time_only_today_if_still_ahead() {
        let parsed = parse_schedule("quick call at 2:30pm", monday_morning()).unwrap();
        assert_eq!(parsed.start, Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap());
    }

    #[test]
    fn time_only_rolls_to_tomorrow_if_past() {
        let parsed = parse_schedule("call at 8am", monday_morning()).unwrap();
        assert_eq!(parsed.start, Utc.with_ymd_and_hms(2026, 3, 3, 8, 0, 0).unwrap());
    }

    #[test]
    fn twenty_four_hour_time() {
        let parsed = parse_schedule("meeting tomorrow 14:30", monday_morning()).unwrap();
        assert_eq!(parsed.start, Utc.with_ymd_and_hms(2026, 3, 3, 14, 30, 0).unwrap());
    }

    #[test]
    fn noon_and_midnight_edge_cases() {
        let parsed = parse_schedule("demo tomorrow at 12pm", monday_morning()).unwrap();
        assert_eq!(parsed.start.time(), NaiveTime::from_hms_opt(12, 0, 0).unwrap());

        let parsed = parse_schedule("demo tomorrow at 12am", monday_morning()).unwrap();
        assert_eq!(parsed.start.time(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn abbreviated_weekday_with_bare_hour() {
        let parsed = parse_schedule("Schedule demo next Wed at 11", monday_morning()).unwrap();
        assert_eq!(parsed.title, "Business demo");
        assert_eq!(parsed.start, Utc.with_ymd_and_hms(2026, 3, 4, 11, 0, 0).unwrap());
        assert_eq!(parsed.end, Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap());
    }

    #[test]
    fn bare_hour_keeps_colon_time_intact() {
        let parsed = parse_schedule("demo tomorrow at 2:30pm", monday_morning()).unwrap();
        assert_eq!(parsed.start.time(), NaiveTime::from_hms_opt(14, 30, 0).unwrap());
    }

    #[test]
    fn no_temporal_signal_is_an_error() {
        assert!(matches!(
            parse_schedule("let's sync up sometime", monday_morning()),
            Err(ScheduleError::NoTemporalSignal)
        ));
    }

    #[test]
    fn next_week_relative() {
        let parsed = parse_schedule("presentation next week", monday_morning()).unwrap();
        assert_eq!(parsed.start, Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).unwrap());
        assert_eq!(parsed.title, "Business presentation");
    }

    #[test]
    fn invalid_pm_hour_rejected() {
        assert!(matches!(
            parse_schedule("meeting tomorrow at 19pm", monday_morning()),
            Err(ScheduleError::InvalidTime(_))
        ));
    }

    #[test]
    fn attendee_phrase_stops_at_about() {
        let parsed =
            parse_schedule("call tomorrow with Jane Doe about pricing", monday_morning()).unwrap();
        assert_eq!(parsed.attendees, vec!["Jane Doe"]);
    }
}
