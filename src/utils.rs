/// Utility functions
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Format the model writes time-bucket column labels in
pub const BUCKET_LABEL_FORMAT: &str = "%d/%m/%Y %H:%M UTC";

pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Parse a date-time as written into `user_input_parameters.txt`
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ndt));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ndt| Utc.from_utc_datetime(&ndt));
    }
    None
}

/// Turn a free-form title into something usable as a directory name
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "run".to_string()
    } else {
        cleaned
    }
}

/// Date embedded in an output file name: the first eight digits of the last run of
/// at least eight digits, read as `yyyymmdd`
pub fn date_from_filename(filename: &str) -> Option<NaiveDate> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"[0-9]{8,}").expect("valid date token regex"));

    let token = re.find_iter(filename).last()?.as_str();
    NaiveDate::parse_from_str(&token[..8], "%Y%m%d").ok()
}

/// Number of calendar days from `start` to `end`, both inclusive
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 0;
    }
    ((end - start).num_days() + 1) as u32
}

/// Distinct ISO weeks touched by the inclusive range, restricted to weeks 1..=52
pub fn weeks_in_range(start: NaiveDate, end: NaiveDate) -> u32 {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|d| d.iso_week().week())
        .filter(|w| (1..=52).contains(w))
        .collect::<BTreeSet<_>>()
        .len() as u32
}

/// Distinct calendar months touched by the inclusive range
pub fn months_in_range(start: NaiveDate, end: NaiveDate) -> u32 {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|d| (d.year(), d.month()))
        .collect::<BTreeSet<_>>()
        .len() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_datetime_rfc3339() {
        let dt = parse_datetime("2023-03-01T06:00:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2023-03-01T06:00:00+00:00");
    }

    #[test]
    fn test_parse_datetime_space_separated() {
        assert!(parse_datetime("2023-03-01 00:00:00+00:00").is_some());
        assert!(parse_datetime("2023-03-01 00:00:00").is_some());
        assert!(parse_datetime("2023-03-01").is_some());
    }

    #[test]
    fn test_parse_datetime_invalid() {
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Mace Head/test run"), "Mace_Head_test_run");
        assert_eq!(sanitize_title("   "), "run");
    }

    #[test]
    fn test_date_from_filename_uses_last_digit_run() {
        let d = date_from_filename("Fields_grid1_group1_C1_T1_201502030000.txt");
        assert_eq!(d, Some(date(2015, 2, 3)));
    }

    #[test]
    fn test_date_from_filename_ignores_non_ascii_digits() {
        // Arabic-Indic digits spelling 2023-01-05
        let name = "r_group1_1\u{662}\u{660}\u{662}\u{663}\u{660}\u{661}\u{660}\u{665}.txt";
        assert_eq!(date_from_filename(name), None);
        assert_eq!(
            date_from_filename("r_group1_\u{663}_20230105.txt"),
            Some(date(2023, 1, 5))
        );
    }

    #[test]
    fn test_date_from_filename_without_date() {
        assert_eq!(date_from_filename("run_group1_a.txt"), None);
    }

    #[test]
    fn test_inclusive_days() {
        assert_eq!(inclusive_days(date(2023, 1, 1), date(2023, 1, 1)), 1);
        assert_eq!(inclusive_days(date(2023, 1, 1), date(2023, 1, 31)), 31);
        assert_eq!(inclusive_days(date(2023, 1, 2), date(2023, 1, 1)), 0);
    }

    #[test]
    fn test_weeks_and_months_in_range() {
        // 2023-01-02 is a Monday, the start of ISO week 1
        assert_eq!(weeks_in_range(date(2023, 1, 2), date(2023, 1, 15)), 2);
        assert_eq!(months_in_range(date(2023, 1, 30), date(2023, 3, 1)), 3);
    }
}
