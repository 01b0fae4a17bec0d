use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::UTC;

/// Stored identifier if present and a valid IANA zone, otherwise UTC.
pub fn resolve_timezone(stored: Option<&str>) -> Tz {
    stored
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<Tz>().ok())
        .unwrap_or(DEFAULT_TIMEZONE)
}

/// The user's current local calendar date. Recomputed from `now` on every
/// call; the boundary moves at local midnight and with timezone changes.
pub fn local_today(timezone: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&timezone).date_naive()
}

/// 00:00 local today and 00:00 local tomorrow as UTC instants.
pub fn local_day_bounds(timezone: Tz, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = local_today(timezone, now);
    let tomorrow = today.succ_opt().unwrap_or(today);
    (
        start_of_local_day(timezone, today),
        start_of_local_day(timezone, tomorrow),
    )
}

pub fn start_of_local_day(timezone: Tz, date: NaiveDate) -> DateTime<Utc> {
    resolve_local_datetime(timezone, date.and_time(NaiveTime::MIN))
}

/// Maps a local civil datetime to a UTC instant using the offset in effect on
/// that date. Ambiguous wall-clock times (fall-back) take the earliest
/// mapping; times erased by a spring-forward gap shift to the next
/// representable instant.
pub fn resolve_local_datetime(timezone: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match timezone.from_local_datetime(&local) {
        LocalResult::Single(value) => value.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Probe past the gap in quarter-hour steps; tz database gaps are
            // at most a few hours wide.
            let mut probe = local;
            for _ in 0..16 {
                probe += Duration::minutes(15);
                match timezone.from_local_datetime(&probe) {
                    LocalResult::Single(value) => return value.with_timezone(&Utc),
                    LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
                    LocalResult::None => continue,
                }
            }
            Utc.from_utc_datetime(&local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn resolve_timezone_accepts_valid_identifier() {
        assert_eq!(
            resolve_timezone(Some("Asia/Kolkata")),
            chrono_tz::Asia::Kolkata
        );
    }

    #[test]
    fn resolve_timezone_falls_back_to_utc() {
        assert_eq!(resolve_timezone(None), chrono_tz::UTC);
        assert_eq!(resolve_timezone(Some("   ")), chrono_tz::UTC);
        assert_eq!(resolve_timezone(Some("Mars/Olympus_Mons")), chrono_tz::UTC);
    }

    #[test]
    fn local_today_uses_the_zone_not_utc() {
        // 20:00Z on the 12th is already 01:30 on the 13th in Kolkata.
        let now = fixed_time("2025-01-12T20:00:00Z");
        assert_eq!(
            local_today(chrono_tz::Asia::Kolkata, now),
            date("2025-01-13")
        );
        assert_eq!(local_today(chrono_tz::UTC, now), date("2025-01-12"));
    }

    #[test]
    fn local_day_bounds_anchor_midnight_in_the_zone() {
        let now = fixed_time("2025-01-13T10:00:00Z");
        let (start, end) = local_day_bounds(chrono_tz::Asia::Kolkata, now);
        assert_eq!(start, fixed_time("2025-01-12T18:30:00Z"));
        assert_eq!(end, fixed_time("2025-01-13T18:30:00Z"));
    }

    #[test]
    fn resolve_local_datetime_takes_earliest_ambiguous_mapping() {
        // 2025-11-02 01:30 occurs twice in New York; the EDT mapping wins.
        let local = date("2025-11-02").and_hms_opt(1, 30, 0).expect("valid time");
        assert_eq!(
            resolve_local_datetime(chrono_tz::America::New_York, local),
            fixed_time("2025-11-02T05:30:00Z")
        );
    }

    #[test]
    fn resolve_local_datetime_skips_past_spring_forward_gap() {
        // 2025-03-09 02:30 does not exist in New York; 03:00 EDT is next.
        let local = date("2025-03-09").and_hms_opt(2, 30, 0).expect("valid time");
        assert_eq!(
            resolve_local_datetime(chrono_tz::America::New_York, local),
            fixed_time("2025-03-09T07:00:00Z")
        );
    }
}
