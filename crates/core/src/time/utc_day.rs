use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};

// Calendar dates are UTC days: an article belongs to the date of its `published_at` in UTC.

/// Strict `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date {s:?}; expected YYYY-MM-DD"))
}

/// Explicit argument wins; otherwise today's UTC date.
pub fn resolve_target_date(
    target_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    match target_date_arg {
        Some(s) => parse_date(s),
        None => Ok(now_utc.date_naive()),
    }
}

/// Half-open `[start, end)` instant range covering `date`.
pub fn day_bounds(date: NaiveDate) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .context("invalid start of day")?
        .and_utc();
    let end = start
        .checked_add_signed(Duration::days(1))
        .with_context(|| format!("date {date} has no following day"))?;
    Ok((start, end))
}

/// First date of an N-day window ending on `today` (inclusive).
pub fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today - Duration::days(i64::from(days.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_to_utc_date() {
        // 23:30 UTC is already the next day in most of Asia; the target stays on the UTC date.
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 23, 30, 0).unwrap();
        let d = resolve_target_date(None, now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 2, 16).unwrap());
    }

    #[test]
    fn explicit_date_wins() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 8, 0, 0).unwrap();
        let d = resolve_target_date(Some("2026-01-05"), now).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse_date("2026-13-01").is_err());
        assert!(parse_date("16/02/2026").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn day_bounds_are_half_open_utc() {
        let (start, end) = day_bounds(NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn window_includes_today() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 16).unwrap();
        assert_eq!(window_start(today, 1), today);
        assert_eq!(window_start(today, 30), NaiveDate::from_ymd_opt(2026, 1, 18).unwrap());
    }
}
