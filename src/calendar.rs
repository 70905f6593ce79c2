use chrono::{Datelike, NaiveDate};

use crate::errors::{EngineError, Result};

/// `MM/YYYY` tag of the accounting month a date belongs to
pub fn competencia(date: NaiveDate) -> String {
    format!("{:02}/{:04}", date.month(), date.year())
}

/// parse a `MM/YYYY` tag back into `(month, year)`
pub fn parse_competencia(tag: &str) -> Result<(u32, i32)> {
    let invalid = || EngineError::Validation {
        message: format!("invalid competência '{}', expected MM/YYYY", tag),
    };

    let (month, year) = tag.trim().split_once('/').ok_or_else(invalid)?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let year: i32 = year.parse().map_err(|_| invalid())?;

    if !(1..=12).contains(&month) {
        return Err(invalid());
    }

    Ok((month, year))
}

/// month index used to count months between two dates (`year * 12 + month0`)
pub fn month_index(date: NaiveDate) -> i64 {
    date.year() as i64 * 12 + date.month0() as i64
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

/// date in the given month carrying `day`, clamped to the month's last day.
///
/// This is the single rollover policy for schedules: day 31 in February lands on
/// the 28th (29th in leap years), never in March.
pub fn due_date_in_month(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

/// advance `anchor` by `months` calendar months and force the day of month to `day`
pub fn advance_months_with_day(anchor: NaiveDate, months: u32, day: u32) -> Result<NaiveDate> {
    let target = month_index(anchor) + months as i64;
    let year = target.div_euclid(12);
    let month = target.rem_euclid(12) as u32 + 1;

    i32::try_from(year)
        .ok()
        .and_then(|year| due_date_in_month(year, month, day))
        .ok_or_else(|| EngineError::InvalidDate {
            message: format!("cannot advance {} by {} months", anchor, months),
        })
}

/// whole days elapsed since `due_date`, zero when not yet due
pub fn days_overdue(due_date: NaiveDate, as_of: NaiveDate) -> u32 {
    let days = (as_of - due_date).num_days();
    if days > 0 {
        days as u32
    } else {
        0
    }
}
