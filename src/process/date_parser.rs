use crate::process::CellValue;
use chrono::{DateTime, Duration, Local, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

/// Placeholder stored for an empty timestamp cell.
pub const NOT_AVAILABLE: &str = "N/A";

/// `D(D)/M(M)/YYYY[,] H(H):MM:SS`, day first. Not anchored, so surrounding
/// noise (a trailing timezone label, say) is tolerated. ASCII digits only.
static DAY_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{1,2})/([0-9]{1,2})/([0-9]{4}),?\s*([0-9]{1,2}):([0-9]{2}):([0-9]{2})")
        .expect("day-first timestamp pattern should compile")
});

/// Naive layouts tried by the generic fallback, all read as local time.
const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Turn a raw timestamp cell into an instant, or keep it as opaque text.
pub fn normalize_timestamp(raw: &str) -> CellValue {
    if raw.is_empty() {
        return CellValue::Text(NOT_AVAILABLE.to_string());
    }
    match parse_day_first(raw).or_else(|| parse_generic(raw)) {
        Some(dt) => CellValue::Instant(dt),
        None => {
            trace!(raw, "timestamp left as text");
            CellValue::Text(raw.to_string())
        }
    }
}

fn parse_day_first(raw: &str) -> Option<DateTime<Utc>> {
    let caps = DAY_FIRST.captures(raw)?;
    let num = |i: usize| caps[i].parse::<i64>().ok();
    let year: i32 = caps[3].parse().ok()?;
    let month = num(2)?;

    // out-of-range parts carry into the next unit: 31/02 is 2 March,
    // 24:00:00 is the following midnight, month 13 is January next year
    let jan_first = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let month_start = match u32::try_from(month - 1) {
        Ok(ahead) => jan_first.checked_add_months(Months::new(ahead))?,
        Err(_) => jan_first.checked_sub_months(Months::new(1))?,
    };
    let offset = Duration::days(num(1)? - 1)
        + Duration::hours(num(4)?)
        + Duration::minutes(num(5)?)
        + Duration::seconds(num(6)?);
    let naive = month_start.and_hms_opt(0, 0, 0)?.checked_add_signed(offset)?;
    local_to_utc(&naive)
}

fn parse_generic(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return local_to_utc(&naive);
        }
    }
    // a bare date is midnight UTC
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Wall-clock time in the local zone → UTC. A time skipped by a DST jump
/// has no instant and yields `None`.
fn local_to_utc(naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
