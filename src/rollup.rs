use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::debug;

use crate::error::{Result, RollupError};
use crate::models::{Rollup, RollupInput, RollupView, Status, StatusCounts, StudentStats};

pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

pub fn validate_period(month: u32, year: i32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(RollupError::InvalidMonth(month));
    }
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(RollupError::InvalidYear(year));
    }
    Ok(())
}

pub fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    validate_period(month, year)?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(RollupError::InvalidYear(year))
}

pub fn days_in_month(year: i32, month: u32) -> Result<u32> {
    validate_period(month, year)?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .ok_or(RollupError::InvalidYear(year))
}

pub fn effective_start(
    batch_start: NaiveDate,
    join_date: NaiveDate,
    earliest_mark: Option<NaiveDate>,
) -> NaiveDate {
    let first_seen = match earliest_mark {
        Some(marked) => join_date.min(marked),
        None => join_date,
    };
    first_seen.max(batch_start)
}

pub fn resolve_status(explicit: Option<&Status>, is_holiday: bool, date: NaiveDate) -> Status {
    if let Some(status) = explicit {
        return status.clone();
    }
    if is_holiday {
        Status::Holiday
    } else if date.weekday() == Weekday::Sun {
        Status::WeekOff
    } else {
        Status::Present
    }
}

pub fn compute_rollup(input: &RollupInput<'_>) -> Result<Rollup> {
    let month_start = first_of_month(input.year, input.month)?;
    let days = days_in_month(input.year, input.month)?;
    let in_month =
        |date: &NaiveDate| date.year() == input.year && date.month() == input.month;

    let mut explicit: HashMap<&str, HashMap<u32, &Status>> = HashMap::new();
    let mut earliest_mark: HashMap<&str, NaiveDate> = HashMap::new();

    for record in input.records.iter().filter(|record| in_month(&record.date)) {
        let day = record.date.day();
        for mark in record.marks.iter() {
            let student_id = mark.student_id.as_str();
            explicit
                .entry(student_id)
                .or_default()
                .insert(day, &mark.status);
            earliest_mark
                .entry(student_id)
                .and_modify(|earliest| *earliest = (*earliest).min(record.date))
                .or_insert(record.date);
        }
    }

    let holiday_days: HashSet<u32> = input
        .holidays
        .iter()
        .filter(|holiday| in_month(&holiday.date))
        .map(|holiday| holiday.date.day())
        .collect();

    let mut seen = HashSet::new();
    let roster: Vec<(&str, NaiveDate)> = input
        .students
        .iter()
        .filter(|student| seen.insert(student.id.as_str()))
        .map(|student| {
            let start = effective_start(
                input.batch_start,
                student.join_date,
                earliest_mark.get(student.id.as_str()).copied(),
            );
            (student.id.as_str(), start)
        })
        .collect();

    let mut grid: BTreeMap<String, BTreeMap<u32, Status>> = roster
        .iter()
        .map(|(id, _)| (id.to_string(), BTreeMap::new()))
        .collect();
    let mut counts: HashMap<&str, StatusCounts> = HashMap::new();
    let mut daily: BTreeMap<u32, StatusCounts> = BTreeMap::new();

    for day in 1..=days {
        let date = month_start + Duration::days(i64::from(day - 1));
        if date > input.today || date < input.batch_start {
            continue;
        }

        let is_holiday = holiday_days.contains(&day);
        let mut day_counts = StatusCounts::default();

        for (student_id, start) in roster.iter() {
            if date < *start {
                continue;
            }

            let marked = explicit
                .get(student_id)
                .and_then(|days| days.get(&day))
                .copied();
            let status = resolve_status(marked, is_holiday, date);

            counts.entry(*student_id).or_default().record(&status);
            day_counts.record(&status);
            if let Some(row) = grid.get_mut(*student_id) {
                row.insert(day, status);
            }
        }

        daily.insert(day, day_counts);
    }

    debug!(
        month = input.month,
        year = input.year,
        students = roster.len(),
        days_evaluated = daily.len(),
        "attendance rollup computed"
    );

    let stats: BTreeMap<String, StudentStats> = roster
        .iter()
        .map(|(id, _)| {
            let tally = counts.get(id).copied().unwrap_or_default();
            (id.to_string(), StudentStats::from_counts(tally))
        })
        .collect();

    let (monthly_summary, daily_stats) = match input.view {
        RollupView::Internal => (None, None),
        RollupView::Public => {
            let mut summary = StatusCounts::default();
            for day_counts in daily.values() {
                summary.merge(day_counts);
            }
            (Some(summary), Some(daily))
        }
    };

    Ok(Rollup {
        month: input.month,
        year: input.year,
        days_in_month: days,
        grid,
        stats,
        monthly_summary,
        daily_stats,
    })
}
