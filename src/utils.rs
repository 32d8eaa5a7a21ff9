use crate::error::{Result, SalesEngineError};
use chrono::{Datelike, Days, NaiveDate, Weekday};

pub fn validate_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(SalesEngineError::InvalidMonth(month));
    }
    Ok(())
}

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .checked_sub_days(Days::new(1))
        .unwrap()
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    last_day_of_month(year, month).day()
}

/// Every calendar date of the given month, in order.
pub fn month_dates(year: i32, month: u32) -> Vec<NaiveDate> {
    let last = days_in_month(year, month);
    (1..=last)
        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .collect()
}

pub fn prev_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Parses a calendar date in either "YYYY-MM-DD" or "YYYY/MM/DD" form.
pub fn parse_flexible_date(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y/%m/%d"))
        .map_err(|_| {
            SalesEngineError::Date(format!(
                "invalid date '{}': expected YYYY-MM-DD or YYYY/MM/DD",
                input
            ))
        })
}

/// Single-character Japanese weekday label, as used in the daily sheets.
pub fn weekday_label(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "月",
        Weekday::Tue => "火",
        Weekday::Wed => "水",
        Weekday::Thu => "木",
        Weekday::Fri => "金",
        Weekday::Sat => "土",
        Weekday::Sun => "日",
    }
}
