//! Date and date-time detection for string values

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::models::ValueFormat;

// ISO 8601: 2024-01-15, 2024-01-15T10:30:00.123Z, 2024-01-15 10:30+02:00
static ISO_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})(?:[Tt ](?P<H>\d{2}):(?P<M>\d{2})(?::(?P<S>\d{2})(?:[.,](?P<f>\d{1,9}))?)?\s?(?P<tz>Z|z|[+-]\d{2}(?::?\d{2})?)?)?$",
    )
    .unwrap()
});

// RFC 1123: Mon, 15 Jan 2024 10:30:00 GMT
static RFC1123_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:Mon|Tue|Wed|Thu|Fri|Sat|Sun),\s*)?(?P<d>\d{1,2})\s+(?P<mon>Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+(?P<y>\d{4})\s+(?P<H>\d{2}):(?P<M>\d{2})(?::(?P<S>\d{2}))?\s+(?P<tz>GMT|UTC|UT|Z|[+-]\d{4})$",
    )
    .unwrap()
});

// 1/15/2024, 15/01/2024 10:30 PM
static SLASH_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<a>\d{1,2})/(?P<b>\d{1,2})/(?P<y>\d{4})(?:,?\s+(?P<H>\d{1,2}):(?P<M>\d{2})(?::(?P<S>\d{2}))?\s*(?P<ampm>[AaPp][Mm])?)?$",
    )
    .unwrap()
});

// 2024/1/15
static YMD_SLASH_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<y>\d{4})/(?P<m>\d{1,2})/(?P<d>\d{1,2})(?:\s+(?P<H>\d{1,2}):(?P<M>\d{2})(?::(?P<S>\d{2}))?)?$",
    )
    .unwrap()
});

// 15.01.2024, 15.1.2024 10:30:00
static DOT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<d>\d{1,2})\.(?P<m>\d{1,2})\.(?P<y>\d{4})(?:\s+(?P<H>\d{1,2}):(?P<M>\d{2})(?::(?P<S>\d{2}))?)?$",
    )
    .unwrap()
});

// 2024年1月15日, 2024年1月15日 10时30分
static ZH_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<y>\d{4})年(?P<m>\d{1,2})月(?P<d>\d{1,2})日(?:\s*(?P<H>\d{1,2})时(?:(?P<M>\d{1,2})分(?:(?P<S>\d{1,2})秒)?)?)?$",
    )
    .unwrap()
});

/// Parse a string as a date or date-time
///
/// Returns the instant in UTC and whether a time component was present. Values without an
/// explicit offset are taken as UTC. Strings that look like dates but name an impossible
/// calendar day (`2024-02-30`) are rejected.
pub fn parse_date(value: &str) -> Option<(DateTime<Utc>, ValueFormat)> {
    let value = value.trim();
    if value.len() < 6 {
        return None;
    }

    if let Some(caps) = ISO_REGEX.captures(value) {
        return parse_iso(&caps);
    }
    if let Some(caps) = RFC1123_REGEX.captures(value) {
        return parse_rfc1123(&caps);
    }
    if let Some(caps) = SLASH_REGEX.captures(value) {
        let (a, b, y) = (cap(&caps, "a")?, cap(&caps, "b")?, cap_i32(&caps, "y")?);
        // month first, then day first
        let date = NaiveDate::from_ymd_opt(y, a, b).or_else(|| NaiveDate::from_ymd_opt(y, b, a))?;
        return finish_local(date, &caps);
    }
    if let Some(caps) = YMD_SLASH_REGEX.captures(value) {
        let date = ymd(&caps)?;
        return finish_local(date, &caps);
    }
    if let Some(caps) = DOT_REGEX.captures(value) {
        let date = ymd(&caps)?;
        return finish_local(date, &caps);
    }
    if let Some(caps) = ZH_REGEX.captures(value) {
        let date = ymd(&caps)?;
        return finish_local(date, &caps);
    }

    None
}

/// Whether the string is a recognized date, and which format it has
pub fn detect_date_format(value: &str) -> Option<ValueFormat> {
    parse_date(value).map(|(_, format)| format)
}

fn ymd(caps: &Captures<'_>) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(cap_i32(caps, "y")?, cap(caps, "m")?, cap(caps, "d")?)
}

fn cap(caps: &Captures<'_>, name: &str) -> Option<u32> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}

fn cap_i32(caps: &Captures<'_>, name: &str) -> Option<i32> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}

fn parse_iso(caps: &Captures<'_>) -> Option<(DateTime<Utc>, ValueFormat)> {
    let date = NaiveDate::from_ymd_opt(cap_i32(caps, "y")?, cap(caps, "m")?, cap(caps, "d")?)?;

    let Some(hour) = cap(caps, "H") else {
        return Some((to_utc(date.and_time(NaiveTime::MIN), 0)?, ValueFormat::Date));
    };
    let nanos = caps
        .name("f")
        .map(|f| format!("{:0<9}", f.as_str()).parse::<u32>().ok())
        .unwrap_or(Some(0))?;
    let time = NaiveTime::from_hms_nano_opt(
        hour,
        cap(caps, "M")?,
        cap(caps, "S").unwrap_or(0),
        nanos,
    )?;
    let offset = match caps.name("tz") {
        Some(tz) => parse_offset(tz.as_str())?,
        None => 0,
    };
    Some((to_utc(date.and_time(time), offset)?, ValueFormat::DateTime))
}

fn parse_rfc1123(caps: &Captures<'_>) -> Option<(DateTime<Utc>, ValueFormat)> {
    let month = match caps.name("mon")?.as_str() {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    let date = NaiveDate::from_ymd_opt(cap_i32(caps, "y")?, month, cap(caps, "d")?)?;
    let time =
        NaiveTime::from_hms_opt(cap(caps, "H")?, cap(caps, "M")?, cap(caps, "S").unwrap_or(0))?;
    let offset = parse_offset(caps.name("tz")?.as_str())?;
    Some((to_utc(date.and_time(time), offset)?, ValueFormat::DateTime))
}

/// Shared tail for the locale patterns: optional time with optional am/pm, no offset
fn finish_local(date: NaiveDate, caps: &Captures<'_>) -> Option<(DateTime<Utc>, ValueFormat)> {
    let Some(mut hour) = cap(caps, "H") else {
        return Some((to_utc(date.and_time(NaiveTime::MIN), 0)?, ValueFormat::Date));
    };

    if let Some(ampm) = caps.name("ampm") {
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = ampm.as_str().eq_ignore_ascii_case("pm");
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }

    let minute = cap(caps, "M").unwrap_or(0);
    let time = NaiveTime::from_hms_opt(hour, minute, cap(caps, "S").unwrap_or(0))?;
    Some((to_utc(date.and_time(time), 0)?, ValueFormat::DateTime))
}

/// Offset in seconds east of UTC
fn parse_offset(tz: &str) -> Option<i32> {
    match tz {
        "Z" | "z" | "GMT" | "UTC" | "UT" => return Some(0),
        _ => {}
    }

    let sign = match tz.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = tz[1..].chars().filter(|c| *c != ':').collect();
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}

fn to_utc(naive: NaiveDateTime, offset_seconds: i32) -> Option<DateTime<Utc>> {
    let offset = FixedOffset::east_opt(offset_seconds)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|d| d.with_timezone(&Utc))
}
