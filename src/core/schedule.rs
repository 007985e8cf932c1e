//! Cron expression parsing and next occurrence calculation.
//!
//! Supports standard 5-field cron, 6-field cron with a leading seconds field,
//! 7-field cron with a trailing year, named descriptors (`@daily`, `@hourly`,
//! ...) and fixed intervals (`@every 5m`). Day-of-week numbers follow the
//! classic cron convention (`0` and `7` are Sunday).

use chrono::{DateTime, TimeZone};
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use super::duration::parse_duration;

/// Errors that can occur when parsing a schedule.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid `@every` interval.
    #[error("invalid interval expression: {0}")]
    InvalidInterval(String),
}

/// A parsed cron schedule.
#[derive(Debug, Clone)]
pub struct Schedule {
    expression: String,
    kind: ScheduleKind,
}

#[derive(Debug, Clone)]
enum ScheduleKind {
    Cron(Box<CronSchedule>),
    Every(Duration),
}

impl Schedule {
    /// Parse a cron expression or descriptor.
    pub fn parse(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let trimmed = expression.trim();

        let kind = if trimmed.starts_with('@') {
            Self::parse_descriptor(trimmed)?
        } else {
            Self::parse_cron(trimmed)?
        };

        Ok(Self { expression, kind })
    }

    fn parse_descriptor(expression: &str) -> Result<ScheduleKind, ScheduleError> {
        let lower = expression.to_lowercase();
        match lower.as_str() {
            "@yearly" | "@annually" => Self::parse_cron("0 0 0 1 1 *"),
            "@monthly" => Self::parse_cron("0 0 0 1 * *"),
            "@weekly" => Self::parse_cron("0 0 0 * * SUN"),
            "@daily" | "@midnight" => Self::parse_cron("0 0 0 * * *"),
            "@hourly" => Self::parse_cron("0 0 * * * *"),
            s if s.starts_with("@every ") => {
                let interval = s["@every ".len()..].trim();
                match parse_duration(interval) {
                    Ok(d) if !d.is_zero() => Ok(ScheduleKind::Every(d)),
                    _ => Err(ScheduleError::InvalidInterval(interval.to_string())),
                }
            }
            _ => Err(ScheduleError::InvalidCron(format!(
                "unknown descriptor: {}",
                expression
            ))),
        }
    }

    fn parse_cron(expression: &str) -> Result<ScheduleKind, ScheduleError> {
        let mut fields: Vec<String> = expression.split_whitespace().map(String::from).collect();

        if fields.len() == 5 {
            fields.insert(0, "0".to_string());
        }
        if fields.len() != 6 && fields.len() != 7 {
            return Err(ScheduleError::InvalidCron(format!(
                "expected 5 to 7 fields, got {}",
                fields.len()
            )));
        }
        fields[5] = normalize_day_of_week(&fields[5])?;

        let schedule = CronSchedule::from_str(&fields.join(" "))
            .map_err(|e| ScheduleError::InvalidCron(e.to_string()))?;
        Ok(ScheduleKind::Cron(Box::new(schedule)))
    }

    /// The next occurrence strictly after `after`.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match &self.kind {
            ScheduleKind::Cron(schedule) => schedule.after(after).next(),
            ScheduleKind::Every(interval) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                after.clone().checked_add_signed(step)
            }
        }
    }

    /// Get the original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

/// Rewrite numeric day-of-week values (`0`-`7`, Sunday first) as names so the
/// underlying parser reads them the classic cron way.
fn normalize_day_of_week(field: &str) -> Result<String, ScheduleError> {
    const NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

    let convert = |token: &str| -> Result<String, ScheduleError> {
        match token.parse::<usize>() {
            Ok(n) if n < NAMES.len() => Ok(NAMES[n].to_string()),
            Ok(n) => Err(ScheduleError::InvalidCron(format!(
                "day of week out of range: {}",
                n
            ))),
            Err(_) => Ok(token.to_string()),
        }
    };

    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let range = range
                .split('-')
                .map(convert)
                .collect::<Result<Vec<_>, _>>()?
                .join("-");
            Ok(match step {
                Some(step) => format!("{}/{}", range, step),
                None => range,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|parts| parts.join(","))
}
