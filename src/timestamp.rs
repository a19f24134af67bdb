use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Export long-form, e.g. "Nov 14, 2023, 10:13:20 PM" (abbreviated then full
/// month name).
const LONG_FORMATS: &[&str] = &["%b %d, %Y, %I:%M:%S %p", "%B %d, %Y, %I:%M:%S %p"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Locale variants seen in the wild.
const LOCALE_FORMATS: &[&str] = &["%m/%d/%Y %I:%M:%S %p", "%d/%m/%Y %H:%M:%S"];

/// Normalize a raw timestamp string from any of the supported sources into a
/// single naive instant, or `None` when no known encoding matches ("time
/// unknown", never an error).
///
/// Epoch and `UTC`-suffixed inputs are naive-UTC; everything else stays in
/// the naive-local domain it was authored in. Transit windows are authored
/// in the same naive domain, so the mismatch must not be corrected here.
pub fn normalize(raw: &str) -> Option<NaiveDateTime> {
    // narrow no-break and no-break spaces show up in exported "… PM" strings
    let cleaned: String = raw
        .trim()
        .replace(['\u{202f}', '\u{a0}'], " ")
        .trim()
        .to_string();

    if cleaned.is_empty() {
        return None;
    }

    if cleaned.chars().all(|c| c.is_ascii_digit()) {
        return parse_epoch(&cleaned);
    }

    if cleaned.contains(" UTC") {
        let without_suffix = cleaned.replace(" UTC", "");
        let without_suffix = without_suffix.trim();
        for format in LONG_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(without_suffix, format) {
                return Some(dt);
            }
        }
        return None;
    }

    if cleaned.contains('T') {
        return parse_iso8601(&cleaned);
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    for format in LONG_FORMATS.iter().chain(LOCALE_FORMATS) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, format) {
            return Some(dt);
        }
    }

    None
}

/// All-digit strings are Unix epoch seconds, except 13-digit ones which are
/// epoch milliseconds.
fn parse_epoch(digits: &str) -> Option<NaiveDateTime> {
    let value: i64 = digits.parse().ok()?;
    let timestamp = if digits.len() == 13 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    };
    timestamp.map(|dt| dt.naive_utc())
}

fn parse_iso8601(cleaned: &str) -> Option<NaiveDateTime> {
    // a trailing Z is offset zero
    let with_offset = cleaned.replace('Z', "+00:00");
    if let Ok(dt) = DateTime::parse_from_str(&with_offset, "%Y-%m-%dT%H:%M:%S%.f%:z") {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(&with_offset, "%Y-%m-%dT%H:%M:%S%.f").ok()
}
