use crate::domain::models::WorkPeriod;
use crate::infrastructure::error::EngineError;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Concrete `[start, end)` instant range for a work period, normalized to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Parses a backend timestamp into a UTC instant.
///
/// Accepts RFC 3339 with any offset (a trailing `Z` means offset zero) and
/// naive `YYYY-MM-DDTHH:MM:SS[.f]` strings, which are assumed to be UTC.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Resolves a work period to a concrete window.
///
/// An ongoing period (no end) gets its end synthesized from the duration
/// hint when present, otherwise from `now`. Two calls for the same open
/// period can therefore yield different windows; open sessions are moving
/// targets and callers tolerate that.
pub fn resolve_window(period: &WorkPeriod, now: DateTime<Utc>) -> Result<TimeWindow, EngineError> {
    let start_str = period
        .start
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| EngineError::InvalidPeriod(format!("period {} has no start", period.id)))?;
    let start = parse_instant(start_str).ok_or_else(|| {
        EngineError::InvalidPeriod(format!(
            "period {} has unparsable start '{start_str}'",
            period.id
        ))
    })?;

    if let Some(end_str) = period
        .end
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let end = parse_instant(end_str).ok_or_else(|| {
            EngineError::InvalidPeriod(format!(
                "period {} has unparsable end '{end_str}'",
                period.id
            ))
        })?;
        return Ok(TimeWindow { start, end });
    }

    let end = match period.duration.as_ref().and_then(|hint| hint.minutes) {
        Some(minutes) => start + Duration::minutes(minutes),
        None => {
            log::debug!(
                "period {} is ongoing without duration hint, closing window at now",
                period.id
            );
            now
        }
    };
    Ok(TimeWindow { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DurationHint;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn period(start: Option<&str>, end: Option<&str>, hint: Option<i64>) -> WorkPeriod {
        WorkPeriod {
            id: "wt-1".to_string(),
            start: start.map(ToOwned::to_owned),
            end: end.map(ToOwned::to_owned),
            break_time_total_minutes: 0,
            duration: hint.map(|minutes| DurationHint {
                minutes: Some(minutes),
            }),
        }
    }

    #[test]
    fn resolve_uses_explicit_end_when_present() {
        let window = resolve_window(
            &period(
                Some("2025-06-15T09:00:00Z"),
                Some("2025-06-15T17:00:00Z"),
                None,
            ),
            fixed_time("2025-06-15T23:00:00Z"),
        )
        .expect("bounded period resolves");
        assert_eq!(window.start, fixed_time("2025-06-15T09:00:00Z"));
        assert_eq!(window.end, fixed_time("2025-06-15T17:00:00Z"));
        assert_eq!(window.minutes(), 480);
    }

    #[test]
    fn resolve_ongoing_period_from_duration_hint() {
        // Scenario: start 09:00Z, no end, 120 minute hint -> window ends 11:00Z.
        let window = resolve_window(
            &period(Some("2025-06-15T09:00:00Z"), None, Some(120)),
            fixed_time("2025-06-15T23:00:00Z"),
        )
        .expect("ongoing period resolves");
        assert_eq!(window.end, fixed_time("2025-06-15T11:00:00Z"));
    }

    #[test]
    fn resolve_ongoing_period_without_hint_falls_back_to_now() {
        let now = fixed_time("2025-06-15T14:30:00Z");
        let window = resolve_window(&period(Some("2025-06-15T09:00:00Z"), None, None), now)
            .expect("ongoing period resolves");
        assert_eq!(window.end, now);
    }

    #[test]
    fn resolve_rejects_missing_start() {
        let error = resolve_window(&period(None, None, None), fixed_time("2025-06-15T14:30:00Z"))
            .expect_err("missing start must fail");
        assert!(matches!(error, EngineError::InvalidPeriod(_)));
    }

    #[test]
    fn resolve_rejects_unparsable_start() {
        let error = resolve_window(
            &period(Some("yesterday morning"), None, None),
            fixed_time("2025-06-15T14:30:00Z"),
        )
        .expect_err("unparsable start must fail");
        assert!(matches!(error, EngineError::InvalidPeriod(_)));
    }

    #[test]
    fn parse_instant_accepts_z_suffix_and_offsets() {
        assert_eq!(
            parse_instant("2025-06-15T09:00:00Z"),
            parse_instant("2025-06-15T09:00:00+00:00")
        );
        assert_eq!(
            parse_instant("2025-06-15T11:00:00+02:00"),
            parse_instant("2025-06-15T09:00:00Z")
        );
    }

    #[test]
    fn parse_instant_assumes_utc_for_naive_timestamps() {
        assert_eq!(
            parse_instant("2025-06-15T09:00:00"),
            parse_instant("2025-06-15T09:00:00Z")
        );
    }

    #[test]
    fn parse_instant_rejects_garbage() {
        assert!(parse_instant("").is_none());
        assert!(parse_instant("not-a-timestamp").is_none());
    }
}
