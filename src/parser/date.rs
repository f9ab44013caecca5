//! Date parsing for configuration values and MBOX separators.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Formats accepted for configured dates, tried in order.
const CONFIG_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m-%d-%Y"];

/// Parse a configured date: `YYYY-MM-DD` or `MM-DD-YYYY`.
///
/// Slashes are normalized to dashes first, so `07/07/2015` works too.
/// The first format that parses wins.
pub fn parse_config_date(input: &str) -> Option<NaiveDate> {
    let normalized = input.trim().replace('/', "-");
    CONFIG_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
}

/// Midnight (UTC) at the start of `day`.
pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

/// Last representable millisecond (UTC) of `day`.
pub fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&day.and_time(last))
}

/// Parse the date out of an MBOX `From ` separator line.
///
/// `From alice@example.com Thu Jan  4 10:00:00 2024` → 2024-01-04 10:00:00 UTC.
pub fn parse_from_line_date(line: &str) -> Option<DateTime<Utc>> {
    let rest = line.trim_end().strip_prefix("From ")?;
    // Skip the envelope sender; the asctime date follows it.
    let (_, date_part) = rest.split_once(char::is_whitespace)?;
    let collapsed = date_part.split_whitespace().collect::<Vec<_>>().join(" ");

    ["%a %b %d %H:%M:%S %Y", "%a %b %d %H:%M:%S %z %Y", "%a %b %d %H:%M %Y"]
        .iter()
        .find_map(|fmt| {
            DateTime::parse_from_str(&collapsed, fmt)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(&collapsed, fmt)
                        .ok()
                        .map(|ndt| Utc.from_utc_datetime(&ndt))
                })
        })
}

/// Format a date for an IMAP `SINCE`/`BEFORE` search key: `04-Jan-2024`.
pub fn imap_search_date(day: NaiveDate) -> String {
    day.format("%d-%b-%Y").to_string()
}
