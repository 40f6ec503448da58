/// Human-readable expiration durations.
///
/// Coarse formatting: the largest unit that fits, truncated
/// (90 seconds is "1 minute", never "1 minute 30 seconds").
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

/// Label shown for a disabled timer.
pub const OFF_LABEL: &str = "Off";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl Unit {
    /// Pick the unit and count for `seconds` (must be > 0 for full labels).
    fn ladder(seconds: u64) -> (Unit, u64) {
        if seconds < MINUTE {
            (Unit::Second, seconds)
        } else if seconds < HOUR {
            (Unit::Minute, seconds / MINUTE)
        } else if seconds < DAY {
            (Unit::Hour, seconds / HOUR)
        } else if seconds < WEEK {
            (Unit::Day, seconds / DAY)
        } else {
            (Unit::Week, seconds / WEEK)
        }
    }

    fn singular(self) -> &'static str {
        match self {
            Unit::Second => "second",
            Unit::Minute => "minute",
            Unit::Hour => "hour",
            Unit::Day => "day",
            Unit::Week => "week",
        }
    }

    fn abbreviation(self) -> &'static str {
        match self {
            Unit::Second => "s",
            Unit::Minute => "m",
            Unit::Hour => "h",
            Unit::Day => "d",
            Unit::Week => "w",
        }
    }
}

/// Full label, e.g. `"1 minute"`, `"3 days"`. Zero or negative is `"Off"`.
pub fn expiration_display_value(seconds: i64) -> String {
    if seconds <= 0 {
        return OFF_LABEL.to_string();
    }
    let (unit, count) = Unit::ladder(seconds as u64);
    if count == 1 {
        format!("{count} {}", unit.singular())
    } else {
        format!("{count} {}s", unit.singular())
    }
}

/// [`expiration_display_value`] for a [`Duration`] (whole seconds).
pub fn expiration_display_value_for(duration: Duration) -> String {
    let secs = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
    expiration_display_value(secs)
}

/// Short label, e.g. `"30s"`, `"5m"`, `"2w"`. No pluralization.
pub fn expiration_abbreviated_display_value(seconds: u64) -> String {
    let (unit, count) = Unit::ladder(seconds);
    format!("{count}{}", unit.abbreviation())
}

/// Action phrase: the countdown anchors on send or on read.
pub fn expiration_type_display_value(sent: bool) -> &'static str {
    if sent {
        "send"
    } else {
        "read"
    }
}
