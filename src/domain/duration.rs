use crate::infrastructure::error::EngineError;
use chrono::{DateTime, Utc};

/// Elapsed whole minutes between two UTC instants. Both inputs are absolute,
/// so the user's calendar never enters this computation.
pub fn compute_duration(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<u32, EngineError> {
    if end < start {
        return Err(EngineError::Validation(
            "completion time must not be earlier than start time".to_string(),
        ));
    }
    let seconds = (end - start).num_seconds();
    Ok((seconds / 60) as u32)
}

pub fn format_duration(minutes: u32) -> String {
    if minutes < 60 {
        return format!("{minutes}m");
    }
    let hours = minutes / 60;
    let remainder = minutes % 60;
    if remainder == 0 {
        format!("{hours}h")
    } else {
        format!("{hours}h {remainder}m")
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

    #[test]
    fn compute_duration_floors_to_whole_minutes() {
        let start = fixed_time("2025-01-10T09:00:00Z");
        let end = fixed_time("2025-01-10T10:15:45Z");
        assert_eq!(compute_duration(start, end).expect("valid range"), 75);
    }

    #[test]
    fn compute_duration_accepts_zero_elapsed() {
        let instant = fixed_time("2025-01-10T09:00:00Z");
        assert_eq!(compute_duration(instant, instant).expect("valid range"), 0);
    }

    #[test]
    fn compute_duration_rejects_end_before_start() {
        let start = fixed_time("2025-01-10T10:00:00Z");
        let end = fixed_time("2025-01-10T09:59:59Z");
        let result = compute_duration(start, end);
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn format_duration_renders_minutes_below_an_hour() {
        assert_eq!(format_duration(0), "0m");
        assert_eq!(format_duration(45), "45m");
        assert_eq!(format_duration(59), "59m");
    }

    #[test]
    fn format_duration_renders_hours_and_remainder() {
        assert_eq!(format_duration(60), "1h");
        assert_eq!(format_duration(75), "1h 15m");
        assert_eq!(format_duration(135), "2h 15m");
    }
}
