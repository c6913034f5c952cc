//! Three-week day grid centred on the current week.

use chrono::{Datelike, Local, NaiveDate, Utc};
use serde::Serialize;

use crate::refresh::{Outcome, RefreshState};

/// Days shown: previous, current and next week.
const GRID_DAYS: i64 = 21;

#[derive(Debug, Clone, Serialize)]
pub struct Calendar {
    pub current_day: u32,
    pub current_week_number: u32,
    pub current_month_name: String,
    pub current_year: i32,
    /// Day-of-month numbers, seven per row.
    pub days: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct CalendarWidget {
    start_sunday: bool,
    calendar: Option<Calendar>,
}

impl CalendarWidget {
    pub fn new(start_sunday: bool) -> Self {
        Self {
            start_sunday,
            calendar: None,
        }
    }

    pub fn calendar(&self) -> Option<&Calendar> {
        self.calendar.as_ref()
    }

    pub fn update(&mut self, refresh: &mut RefreshState) {
        let now = Utc::now();
        self.calendar = Some(build_calendar(
            now.with_timezone(&Local).date_naive(),
            self.start_sunday,
        ));
        refresh.report(Outcome::Success, now);
    }

    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(&self.calendar).unwrap_or_default()
    }
}

/// Build the grid for `today`.
pub fn build_calendar(today: NaiveDate, start_sunday: bool) -> Calendar {
    let weekday = if start_sunday {
        today.weekday().num_days_from_sunday()
    } else {
        today.weekday().num_days_from_monday()
    };

    let first = today - chrono::Days::new(u64::from(weekday) + 7);
    let days = (0..GRID_DAYS)
        .filter_map(|offset| first.checked_add_days(chrono::Days::new(offset as u64)))
        .map(|date| date.day())
        .collect();

    Calendar {
        current_day: today.day(),
        current_week_number: today.iso_week().week(),
        current_month_name: month_name(today.month()).to_string(),
        current_year: today.year(),
        days,
    }
}

fn month_name(month: u32) -> &'static str {
    const NAMES: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    NAMES
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("")
}
