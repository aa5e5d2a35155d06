//! resv-interval
//!
//! Clock times as minute offsets within a single day, and the half-open
//! overlap test admission control is built on.
//!
//! Deterministic, pure logic. No IO, no wall-clock, no randomness.
//!
//! # Formats
//! - 24-hour input: `"HH:MM"` / `"H:MM"` (what booking forms submit).
//! - 12-hour labels: `"hh:mm AM"` / `"hh:mm PM"` (what older records store in
//!   `startTime` / `endTime` when no minute offsets were persisted).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Minutes in one day. Valid offsets are `0..MINUTES_PER_DAY`.
pub const MINUTES_PER_DAY: u32 = 1440;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    /// The clock time could not be parsed.
    InvalidFormat { input: String },
    /// Offset outside `0..1440`.
    OutOfRange { minutes: u32 },
    /// `end <= start`.
    EmptyWindow { start: u32, end: u32 },
}

impl fmt::Display for IntervalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat { input } => write!(f, "invalid clock time: {input:?}"),
            Self::OutOfRange { minutes } => {
                write!(f, "minute offset {minutes} outside 0..{MINUTES_PER_DAY}")
            }
            Self::EmptyWindow { start, end } => {
                write!(f, "end time ({end}) must be after start time ({start})")
            }
        }
    }
}

impl std::error::Error for IntervalError {}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Map a wall-clock time to minutes since midnight.
///
/// Accepts a 24-hour `"HH:MM"` value or a 12-hour `"hh:mm AM|PM"` label.
/// Malformed input fails with [`IntervalError::InvalidFormat`]; there is no
/// silent zero.
pub fn to_offset_minutes(clock: &str) -> Result<u32, IntervalError> {
    let trimmed = clock.trim();
    let upper = trimmed.to_ascii_uppercase();
    if upper.ends_with("AM") || upper.ends_with("PM") {
        parse_12_hour_label(trimmed)
    } else {
        parse_24_hour(trimmed)
    }
}

/// Parse a strict 24-hour `"HH:MM"` clock time.
pub fn parse_24_hour(clock: &str) -> Result<u32, IntervalError> {
    let invalid = || IntervalError::InvalidFormat {
        input: clock.to_string(),
    };
    let (hour, minute) = split_hour_minute(clock.trim()).ok_or_else(invalid)?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok(hour * 60 + minute)
}

/// Parse a 12-hour label such as `"07:30 PM"` (space before the meridiem is
/// optional, meridiem is case-insensitive).
pub fn parse_12_hour_label(label: &str) -> Result<u32, IntervalError> {
    let invalid = || IntervalError::InvalidFormat {
        input: label.to_string(),
    };
    let trimmed = label.trim();
    if trimmed.len() < 2 || !trimmed.is_char_boundary(trimmed.len() - 2) {
        return Err(invalid());
    }
    let (clock, meridiem) = trimmed.split_at(trimmed.len() - 2);
    let pm = match meridiem.to_ascii_uppercase().as_str() {
        "AM" => false,
        "PM" => true,
        _ => return Err(invalid()),
    };
    let (hour, minute) = split_hour_minute(clock.trim_end()).ok_or_else(invalid)?;
    if !(1..=12).contains(&hour) || minute > 59 {
        return Err(invalid());
    }
    let hour = hour % 12 + if pm { 12 } else { 0 };
    Ok(hour * 60 + minute)
}

fn split_hour_minute(clock: &str) -> Option<(u32, u32)> {
    let (h, m) = clock.split_once(':')?;
    let digits = |s: &str, max_len: usize| {
        !s.is_empty() && s.len() <= max_len && s.bytes().all(|b| b.is_ascii_digit())
    };
    if !digits(h, 2) || m.len() != 2 || !digits(m, 2) {
        return None;
    }
    Some((h.parse().ok()?, m.parse().ok()?))
}

/// Render a minute offset as a zero-padded 12-hour label (`"01:05 PM"`).
pub fn to_12_hour_label(minutes: u32) -> String {
    let minutes = minutes % MINUTES_PER_DAY;
    let hour24 = minutes / 60;
    let minute = minutes % 60;
    let hour = match hour24 % 12 {
        0 => 12,
        h => h,
    };
    let meridiem = if hour24 >= 12 { "PM" } else { "AM" };
    format!("{hour:02}:{minute:02} {meridiem}")
}

/// Render a minute offset as 24-hour `"HH:MM"`.
pub fn to_24_hour(minutes: u32) -> String {
    let minutes = minutes % MINUTES_PER_DAY;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

// ---------------------------------------------------------------------------
// Overlap
// ---------------------------------------------------------------------------

/// Half-open overlap test: `[a_start, a_end)` vs `[b_start, b_end)`.
///
/// Intervals that only touch (`a_end == b_start`) do not overlap.
pub fn overlaps(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start < b_end && b_start < a_end
}

// ---------------------------------------------------------------------------
// TimeWindow
// ---------------------------------------------------------------------------

/// A validated booking window: `start < end`, both inside the day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    start: u32,
    end: u32,
}

impl TimeWindow {
    pub fn new(start: u32, end: u32) -> Result<Self, IntervalError> {
        for minutes in [start, end] {
            if minutes >= MINUTES_PER_DAY {
                return Err(IntervalError::OutOfRange { minutes });
            }
        }
        if end <= start {
            return Err(IntervalError::EmptyWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Build a window from two clock strings (see [`to_offset_minutes`]).
    pub fn from_clock(start: &str, end: &str) -> Result<Self, IntervalError> {
        Self::new(to_offset_minutes(start)?, to_offset_minutes(end)?)
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn duration_minutes(&self) -> u32 {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    /// Overlap against a raw stored pair, which may be degenerate.
    pub fn overlaps_raw(&self, start: u32, end: u32) -> bool {
        overlaps(self.start, self.end, start, end)
    }

    pub fn start_label(&self) -> String {
        to_12_hour_label(self.start)
    }

    pub fn end_label(&self) -> String {
        to_12_hour_label(self.end)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}–{}", to_24_hour(self.start), to_24_hour(self.end))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
