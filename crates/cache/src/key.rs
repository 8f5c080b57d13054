//! Day-bucketed cache keys.

use chrono::{DateTime, Utc};

/// Build `{prefix}_{subject}_{YYYY_MM_DD}` for the UTC day containing `now`.
///
/// The subject is slugged (lowercase ASCII alphanumerics joined by `_`), so
/// every write within one day lands on the same key.
pub fn cache_key(prefix: &str, subject: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}_{}", prefix, slug(subject), now.format("%Y_%m_%d"))
}

fn slug(subject: &str) -> String {
    let mut out = String::with_capacity(subject.len());
    for c in subject.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("unknown");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn same_day_same_key() {
        let morning = cache_key("current_weather", "London", at(2024, 6, 1, 0, 0));
        let night = cache_key("current_weather", "London", at(2024, 6, 1, 23, 59));
        assert_eq!(morning, night);
        assert_eq!(morning, "current_weather_london_2024_06_01");
    }

    #[test]
    fn midnight_starts_new_bucket() {
        let before = cache_key("current_weather", "London", at(2024, 6, 1, 23, 59));
        let after = cache_key("current_weather", "London", at(2024, 6, 2, 0, 0));
        assert_ne!(before, after);
        assert!(after.ends_with("2024_06_02"));
    }

    #[test]
    fn bucket_follows_utc_not_local_offset() {
        let local = chrono::FixedOffset::east_opt(10 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 2, 5, 0, 0)
            .unwrap();
        let key = cache_key("current_weather", "Sydney", local.with_timezone(&Utc));
        assert_eq!(key, "current_weather_sydney_2024_06_01");
    }

    #[test]
    fn subject_is_slugged() {
        assert_eq!(slug("New York"), "new_york");
        assert_eq!(slug("  St. Albans! "), "st_albans");
        assert_eq!(slug("São Paulo"), "s_o_paulo");
        assert_eq!(slug("---"), "unknown");
    }
}
