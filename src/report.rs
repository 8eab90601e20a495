use std::collections::HashSet;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{Rollup, StatusCounts, Student, StudentStats};

pub fn month_label(year: i32, month: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|first| first.format("%B %Y").to_string())
        .unwrap_or_else(|| format!("{year}-{month:02}"))
}

pub fn summary_line(name: &str, stats: &StudentStats) -> String {
    format!(
        "- {} {}% present ({}/{} sessions, {} absent, {} late, {} excused)",
        name,
        stats.percentage,
        stats.counts.present,
        stats.total_sessions,
        stats.counts.absent,
        stats.counts.late,
        stats.counts.excused
    )
}

pub fn lowest_attendance<'a>(
    rollup: &'a Rollup,
    students: &'a [Student],
    limit: usize,
) -> Vec<(&'a Student, &'a StudentStats)> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<(&Student, &StudentStats)> = students
        .iter()
        .filter(|student| seen.insert(student.id.as_str()))
        .filter_map(|student| rollup.stats.get(&student.id).map(|stats| (student, stats)))
        .filter(|(_, stats)| stats.total_sessions > 0)
        .collect();

    ranked.sort_by(|a, b| {
        a.1.percentage
            .cmp(&b.1.percentage)
            .then_with(|| a.0.name.cmp(&b.0.name))
    });
    ranked.truncate(limit);
    ranked
}

fn write_counts(output: &mut String, counts: &StatusCounts) {
    let _ = writeln!(output, "- Present: {}", counts.present);
    let _ = writeln!(output, "- Absent: {}", counts.absent);
    let _ = writeln!(output, "- Late: {}", counts.late);
    let _ = writeln!(output, "- Excused: {}", counts.excused);
    let _ = writeln!(output, "- Holiday: {}", counts.holiday);
    let _ = writeln!(output, "- Week off: {}", counts.week_off);
}

pub fn build_report(batch_name: &str, rollup: &Rollup, students: &[Student]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Register");
    let _ = writeln!(
        output,
        "Generated for {} ({})",
        batch_name,
        month_label(rollup.year, rollup.month)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Register");

    if rollup.grid.is_empty() {
        let _ = writeln!(output, "No students enrolled in this batch.");
    } else {
        let mut header = String::from("| Student |");
        let mut divider = String::from("| --- |");
        for day in 1..=rollup.days_in_month {
            let _ = write!(header, " {day} |");
            divider.push_str(" :-: |");
        }
        header.push_str(" P | A | L | E | H | W | % |");
        divider.push_str(" --: | --: | --: | --: | --: | --: | --: |");
        let _ = writeln!(output, "{header}");
        let _ = writeln!(output, "{divider}");

        let mut seen = HashSet::new();
        for student in students.iter().filter(|s| seen.insert(s.id.as_str())) {
            let (Some(row), Some(stats)) =
                (rollup.grid.get(&student.id), rollup.stats.get(&student.id))
            else {
                continue;
            };

            let mut line = format!("| {} |", student.name);
            for day in 1..=rollup.days_in_month {
                match row.get(&day) {
                    Some(status) => {
                        let _ = write!(line, " {} |", status.code());
                    }
                    None => line.push_str("  |"),
                }
            }
            let counts = &stats.counts;
            let _ = write!(
                line,
                " {} | {} | {} | {} | {} | {} | {}% |",
                counts.present,
                counts.absent,
                counts.late,
                counts.excused,
                counts.holiday,
                counts.week_off,
                stats.percentage
            );
            let _ = writeln!(output, "{line}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Lowest Attendance");

    let lowest = lowest_attendance(rollup, students, 5);
    if lowest.is_empty() {
        let _ = writeln!(output, "No sessions recorded for this month.");
    } else {
        for (student, stats) in lowest {
            let _ = writeln!(output, "{}", summary_line(&student.name, stats));
        }
    }

    if let Some(summary) = &rollup.monthly_summary {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Month Summary");
        write_counts(&mut output, summary);
    }

    if let Some(daily) = &rollup.daily_stats {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Days With Absences");
        let mut any = false;
        for (day, counts) in daily.iter().filter(|(_, counts)| counts.absent > 0) {
            any = true;
            let _ = writeln!(
                output,
                "- Day {}: {} absent, {} late, {} excused",
                day, counts.absent, counts.late, counts.excused
            );
        }
        if !any {
            let _ = writeln!(output, "No absences recorded.");
        }
    }

    output
}
