//! Six-field cron schedules with second resolution.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use famulus_core::ConfigError;

/// A parsed cron expression: second, minute, hour, day of month, month,
/// day of week.
///
/// Each field accepts `*` and `?` (any value), single numbers, `A-B`
/// ranges, `*/N` and `A-B/N` steps, and comma lists of those elements.
/// Day of week counts Sunday through Saturday as 0 through 6, with 7
/// accepted as an alias for Sunday. When both day fields are restricted,
/// a day matching either one fires.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    seconds: Vec<u32>,
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(invalid(
                expression,
                format!("expected 6 fields, got {}", fields.len()),
            ));
        }
        let seconds = parse_field(fields[0], 0, 59).map_err(|r| invalid(expression, r))?;
        let minutes = parse_field(fields[1], 0, 59).map_err(|r| invalid(expression, r))?;
        let hours = parse_field(fields[2], 0, 23).map_err(|r| invalid(expression, r))?;
        let days_of_month = parse_field(fields[3], 1, 31).map_err(|r| invalid(expression, r))?;
        let months = parse_field(fields[4], 1, 12).map_err(|r| invalid(expression, r))?;
        let mut days_of_week = parse_field(fields[5], 0, 7).map_err(|r| invalid(expression, r))?;
        if days_of_week.contains(&7) {
            days_of_week.retain(|&day| day != 7);
            if !days_of_week.contains(&0) {
                days_of_week.insert(0, 0);
            }
        }
        Ok(Self {
            dom_restricted: is_restricted(fields[3]),
            dow_restricted: is_restricted(fields[5]),
            expression: expression.to_string(),
            seconds,
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `after`.
    ///
    /// Returns `None` when no day within the next four years matches,
    /// which only happens for impossible dates like February 30th.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = (after + Duration::seconds(1)).naive_utc().with_nanosecond(0)?;
        let horizon = start.date() + Duration::days(4 * 366);
        let mut day = start.date();
        while day <= horizon {
            if self.day_matches(day) {
                let floor = if day == start.date() {
                    Some(start.time())
                } else {
                    None
                };
                if let Some(time) = self.first_time_at_or_after(floor) {
                    return Some(DateTime::from_naive_utc_and_offset(day.and_time(time), Utc));
                }
            }
            day = day.succ_opt()?;
        }
        None
    }

    fn day_matches(&self, day: NaiveDate) -> bool {
        if !self.months.contains(&day.month()) {
            return false;
        }
        let dom = self.days_of_month.contains(&day.day());
        let dow = self
            .days_of_week
            .contains(&day.weekday().num_days_from_sunday());
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    /// Smallest configured time of day, or the smallest one at or after
    /// `floor` when scanning the starting day itself.
    fn first_time_at_or_after(&self, floor: Option<NaiveTime>) -> Option<NaiveTime> {
        let Some(floor) = floor else {
            return NaiveTime::from_hms_opt(
                *self.hours.first()?,
                *self.minutes.first()?,
                *self.seconds.first()?,
            );
        };
        for &hour in &self.hours {
            if hour < floor.hour() {
                continue;
            }
            for &minute in &self.minutes {
                if hour == floor.hour() && minute < floor.minute() {
                    continue;
                }
                for &second in &self.seconds {
                    if hour == floor.hour() && minute == floor.minute() && second < floor.second() {
                        continue;
                    }
                    return NaiveTime::from_hms_opt(hour, minute, second);
                }
            }
        }
        None
    }
}

fn is_restricted(field: &str) -> bool {
    field != "*" && field != "?"
}

/// Expand one field into its sorted list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
    let mut values = Vec::new();
    for part in field.split(',') {
        if part.is_empty() {
            return Err(format!("empty element in '{field}'"));
        }
        if part == "*" || part == "?" {
            values.extend(min..=max);
            continue;
        }
        let (range, step) = match part.split_once('/') {
            Some((base, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step in '{part}'"))?;
                if step == 0 {
                    return Err(format!("step must not be zero in '{part}'"));
                }
                (base, step)
            }
            None => (part, 1),
        };
        let (start, end) = if range == "*" || range == "?" {
            (min, max)
        } else if let Some((low, high)) = range.split_once('-') {
            let low = parse_value(low, min, max)?;
            let high = parse_value(high, min, max)?;
            if low > high {
                return Err(format!("descending range '{range}'"));
            }
            (low, high)
        } else {
            let value = parse_value(range, min, max)?;
            // a bare value with a step runs from the value to the maximum
            if step > 1 {
                (value, max)
            } else {
                (value, value)
            }
        };
        values.extend((start..=end).step_by(step as usize));
    }
    values.sort_unstable();
    values.dedup();
    Ok(values)
}

fn parse_value(text: &str, min: u32, max: u32) -> Result<u32, String> {
    let value: u32 = text
        .trim()
        .parse()
        .map_err(|_| format!("invalid value '{text}'"))?;
    if value < min || value > max {
        return Err(format!("value {value} out of range {min}-{max}"));
    }
    Ok(value)
}

fn invalid(expression: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidCron {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}
