//! Next-run calculation for recurring monitor checks
//!
//! Only computes when the next check is due. Running the checks on that
//! schedule is left to whatever scheduler drives the service.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;

/// Schedule evaluation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The expression does not parse or never fires after the given instant
    #[error("Invalid cron expression: {0}")]
    InvalidExpression(String),
}

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Parse a cron expression
///
/// Five-field expressions are crontab syntax (`min hour dom month dow`, Sunday is
/// 0 or 7) and fire at second zero. Six and seven fields follow the `cron` crate:
/// seconds first, an optional trailing year, Sunday is 1.
pub fn parse_schedule(expression: &str) -> Result<Schedule, ScheduleError> {
    let expression = expression.trim();
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => format!(
            "0 {} {}",
            fields[..4].join(" "),
            crontab_day_of_week(fields[4])
        ),
        6 | 7 => expression.to_string(),
        n => {
            return Err(ScheduleError::InvalidExpression(format!(
                "'{}' has {} fields, expected 5, 6 or 7",
                expression, n
            )));
        }
    };

    Schedule::from_str(&normalized)
        .map_err(|e| ScheduleError::InvalidExpression(format!("'{}': {}", expression, e)))
}

/// Rewrite a crontab day-of-week field with day names
///
/// Numbers 0-7 become names so the `cron` crate's 1-based numbering never sees
/// them. A range ending on 7 is split so it does not wrap past Saturday.
/// Anything that is not a plain number or range passes through untouched.
fn crontab_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|item| {
            let (base, step) = match item.split_once('/') {
                Some((base, step)) => (base, Some(step)),
                None => (item, None),
            };
            let suffix = step.map(|s| format!("/{}", s)).unwrap_or_default();

            let day = |n: &str| n.parse::<usize>().ok().filter(|n| *n <= 7);
            match base.split_once('-') {
                Some((start, end)) => match (day(start), day(end)) {
                    (Some(start), Some(7)) if start > 0 => {
                        let mut days = format!("{}-Sat{}", WEEKDAYS[start], suffix);
                        let step = step.and_then(|s| s.parse::<usize>().ok()).unwrap_or(1);
                        if step > 0 && (7 - start) % step == 0 {
                            days.push_str(",Sun");
                        }
                        days
                    }
                    (Some(_), Some(7)) => format!("Sun-Sat{}", suffix),
                    (Some(start), Some(end)) => {
                        format!("{}-{}{}", WEEKDAYS[start], WEEKDAYS[end], suffix)
                    }
                    _ => item.to_string(),
                },
                None => match day(base) {
                    Some(n) => format!("{}{}", WEEKDAYS[n % 7], suffix),
                    None => item.to_string(),
                },
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// First instant strictly after `now` at which the schedule fires
pub fn next_run_after(expression: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let schedule = parse_schedule(expression)?;
    schedule.after(&now).next().ok_or_else(|| {
        ScheduleError::InvalidExpression(format!("'{}' has no run after {}", expression, now))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Weekday};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_five_field_every_five_minutes() {
        let now = at(2024, 3, 1, 10, 2, 30);
        assert_eq!(
            next_run_after("*/5 * * * *", now).unwrap(),
            at(2024, 3, 1, 10, 5, 0)
        );
    }

    #[test]
    fn test_six_field_with_seconds() {
        let now = at(2024, 3, 1, 10, 0, 0);
        assert_eq!(
            next_run_after("30 0 * * * *", now).unwrap(),
            at(2024, 3, 1, 10, 0, 30)
        );
    }

    #[test]
    fn test_strictly_after_now() {
        let now = at(2024, 3, 1, 0, 0, 0);
        assert_eq!(
            next_run_after("0 0 * * *", now).unwrap(),
            at(2024, 3, 2, 0, 0, 0)
        );
    }

    #[test]
    fn test_crontab_weekdays() {
        // 2024-03-01 is a Friday
        let now = at(2024, 3, 1, 10, 0, 0);
        let next = |expr: &str| next_run_after(expr, now).unwrap();

        assert_eq!(next("0 9 * * 1"), at(2024, 3, 4, 9, 0, 0));
        assert_eq!(next("0 9 * * 1").weekday(), Weekday::Mon);
        assert_eq!(next("0 9 * * 0").weekday(), Weekday::Sun);
        assert_eq!(next("0 9 * * 7").weekday(), Weekday::Sun);
        assert_eq!(next("0 9 * * 6"), at(2024, 3, 2, 9, 0, 0));
        assert_eq!(next("0 9 * * 1-5"), at(2024, 3, 4, 9, 0, 0));
        assert_eq!(next("0 9 * * 5-7"), at(2024, 3, 2, 9, 0, 0));
        assert_eq!(next("0 9 * * 0,3"), at(2024, 3, 3, 9, 0, 0));
        assert_eq!(next("0 9 * * Mon"), at(2024, 3, 4, 9, 0, 0));
    }

    #[test]
    fn test_day_of_week_rewrite() {
        assert_eq!(crontab_day_of_week("*"), "*");
        assert_eq!(crontab_day_of_week("1"), "Mon");
        assert_eq!(crontab_day_of_week("0,7"), "Sun,Sun");
        assert_eq!(crontab_day_of_week("1-5/2"), "Mon-Fri/2");
        assert_eq!(crontab_day_of_week("5-7"), "Fri-Sat,Sun");
        assert_eq!(crontab_day_of_week("0-7"), "Sun-Sat");
        assert_eq!(crontab_day_of_week("8"), "8");
    }

    #[test]
    fn test_invalid_expressions() {
        let now = at(2024, 3, 1, 0, 0, 0);
        for expr in ["", "every day", "* * *", "61 * * * *", "* * * * * * * *"] {
            assert!(
                matches!(
                    next_run_after(expr, now),
                    Err(ScheduleError::InvalidExpression(_))
                ),
                "expected '{}' to be rejected",
                expr
            );
        }
    }

    #[test]
    fn test_expression_in_the_past() {
        let now = at(2024, 3, 1, 0, 0, 0);
        assert!(next_run_after("0 0 0 1 1 * 2020", now).is_err());
    }
}
