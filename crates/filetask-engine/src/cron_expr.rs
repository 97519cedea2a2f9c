//! Cron expression parsing.
//!
//! Accepted forms:
//! - 5 fields, `min hour dom mon dow`, with day-of-week `0-7` where both 0 and
//!   7 are Sunday. A `0` seconds field is prepended.
//! - 6 fields, `sec min hour dom mon dow`, passed to the `cron` crate as is.
//! - 7 fields, the 6-field form plus a trailing year.

use std::collections::BTreeSet;
use std::str::FromStr;

use cron::Schedule;

use crate::error::EngineError;

/// Parse `expression` into a schedule.
pub fn parse_cron(expression: &str) -> Result<Schedule, EngineError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.len() {
        0 => return Err(EngineError::invalid_schedule(expression, "empty expression")),
        5 => {
            let dow = unix_day_of_week(fields[4]);
            format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], dow
            )
        }
        6 | 7 => fields.join(" "),
        n => {
            return Err(EngineError::invalid_schedule(
                expression,
                format!("expected 5, 6 or 7 fields, got {}", n),
            ));
        }
    };

    Schedule::from_str(&normalized)
        .map_err(|e| EngineError::invalid_schedule(expression, e.to_string()))
}

/// Check that `expression` parses and has at least one future occurrence.
pub fn validate_cron(expression: &str) -> Result<(), EngineError> {
    let schedule = parse_cron(expression)?;
    if schedule.upcoming(chrono::Utc).next().is_none() {
        return Err(EngineError::invalid_schedule(
            expression,
            "expression never fires again",
        ));
    }
    Ok(())
}

/// Rewrite a numeric unix day-of-week field (Sunday = 0 or 7) into the
/// `cron` crate's numbering (Sunday = 1). Fields using names or other
/// syntax are returned untouched.
fn unix_day_of_week(field: &str) -> String {
    if field == "*" || field == "?" {
        return field.to_string();
    }
    let mut days = BTreeSet::new();
    for item in field.split(',') {
        match expand_day_item(item) {
            Some(expanded) => days.extend(expanded),
            None => return field.to_string(),
        }
    }
    days.iter()
        .map(|d| (d + 1).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn expand_day_item(item: &str) -> Option<Vec<u8>> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, step.parse::<usize>().ok().filter(|s| *s > 0)?),
        None => (item, 1),
    };
    let (start, end) = if range == "*" {
        (0, 6)
    } else if let Some((a, b)) = range.split_once('-') {
        (a.parse::<u8>().ok()?, b.parse::<u8>().ok()?)
    } else {
        let start = range.parse::<u8>().ok()?;
        (start, if item.contains('/') { 6 } else { start })
    };
    if start > 7 || end > 7 || start > end {
        return None;
    }
    Some((start..=end).step_by(step).map(|d| d % 7).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Utc, Weekday};

    #[test]
    fn test_five_field_expression() {
        let schedule = parse_cron("*/15 * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 30).unwrap();
        let next = schedule.after(&start).next().unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (10, 15, 0));
    }

    #[test]
    fn test_six_and_seven_fields() {
        assert!(parse_cron("*/5 * * * * *").is_ok());
        assert!(parse_cron("0 0 12 1 1 * 2099").is_ok());
    }

    #[test]
    fn test_rejects_bad_expressions() {
        for expr in ["", "   ", "* * *", "61 * * * *", "not a cron at all !"] {
            let err = parse_cron(expr).unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidSchedule { .. }),
                "{} -> {:?}",
                expr,
                err
            );
        }
    }

    #[test]
    fn test_unix_sunday_numbering() {
        // 2024-01-01 is a Monday
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for expr in ["0 9 * * 0", "0 9 * * 7"] {
            let next = parse_cron(expr).unwrap().after(&start).next().unwrap();
            assert_eq!(next.weekday(), Weekday::Sun, "{}", expr);
        }
        let next = parse_cron("0 9 * * 1-5").unwrap().after(&start).next().unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn test_day_of_week_rewrite() {
        assert_eq!(unix_day_of_week("*"), "*");
        assert_eq!(unix_day_of_week("0"), "1");
        assert_eq!(unix_day_of_week("1-5"), "2,3,4,5,6");
        assert_eq!(unix_day_of_week("5-7"), "1,6,7");
        assert_eq!(unix_day_of_week("*/2"), "1,3,5,7");
        assert_eq!(unix_day_of_week("MON-FRI"), "MON-FRI");
    }

    #[test]
    fn test_validate_past_only_schedule() {
        assert!(validate_cron("0 0 0 1 1 * 2001").is_err());
        assert!(validate_cron("0 3 * * *").is_ok());
    }
}
