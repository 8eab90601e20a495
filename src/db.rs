use std::collections::HashMap;

use anyhow::{bail, Context};
use batch_attendance_rollup::{AttendanceRecord, Batch, Holiday, Status, Student, StudentMark};
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("migrations applied");
    Ok(())
}

fn seed_date(year: i32, month: u32, day: u32) -> anyhow::Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).context("invalid date")
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO batch_attendance.batches (id, name, start_date)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name, start_date = EXCLUDED.start_date
        "#,
    )
    .bind("spring-2026")
    .bind("Spring 2026 Weekday Batch")
    .bind(seed_date(2026, 2, 2)?)
    .execute(pool)
    .await?;

    let students = vec![
        ("stu-avery", "Avery Lee", seed_date(2026, 2, 2)?),
        ("stu-jules", "Jules Moreno", seed_date(2026, 2, 2)?),
        ("stu-kiara", "Kiara Patel", seed_date(2026, 2, 16)?),
    ];

    for (id, name, join_date) in students {
        sqlx::query(
            r#"
            INSERT INTO batch_attendance.students (id, batch_id, full_name, join_date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name, join_date = EXCLUDED.join_date
            "#,
        )
        .bind(id)
        .bind("spring-2026")
        .bind(name)
        .bind(join_date)
        .execute(pool)
        .await?;
    }

    let marks = vec![
        ("seed-001", "stu-avery", seed_date(2026, 2, 3)?, "absent"),
        ("seed-002", "stu-avery", seed_date(2026, 2, 4)?, "late"),
        ("seed-003", "stu-jules", seed_date(2026, 2, 5)?, "excused"),
        ("seed-004", "stu-kiara", seed_date(2026, 2, 12)?, "present"),
        ("seed-005", "stu-jules", seed_date(2026, 2, 16)?, "holiday"),
    ];

    for (source_key, student_id, marked_on, status) in marks {
        sqlx::query(
            r#"
            INSERT INTO batch_attendance.attendance_marks
            (id, batch_id, student_id, marked_on, status, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind("spring-2026")
        .bind(student_id)
        .bind(marked_on)
        .bind(status)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let holidays = vec![
        (seed_date(2026, 2, 16)?, "Presidents' Day"),
        (seed_date(2026, 5, 25)?, "Memorial Day"),
    ];

    for (holiday_date, label) in holidays {
        sqlx::query(
            r#"
            INSERT INTO batch_attendance.holidays (holiday_date, label)
            VALUES ($1, $2)
            ON CONFLICT (holiday_date) DO UPDATE SET label = EXCLUDED.label
            "#,
        )
        .bind(holiday_date)
        .bind(label)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn fetch_batch(pool: &PgPool, batch_id: &str) -> anyhow::Result<Batch> {
    let row = sqlx::query(
        "SELECT id, name, start_date FROM batch_attendance.batches WHERE id = $1",
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("batch {batch_id} not found"))?;

    Ok(Batch {
        id: row.get("id"),
        name: row.get("name"),
        start_date: row.get("start_date"),
    })
}

pub async fn fetch_roster(pool: &PgPool, batch_id: &str) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query(
        "SELECT id, full_name, join_date \
         FROM batch_attendance.students \
         WHERE batch_id = $1 \
         ORDER BY join_date, full_name",
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    let mut students = Vec::new();
    for row in rows {
        students.push(Student {
            id: row.get("id"),
            name: row.get("full_name"),
            join_date: row.get("join_date"),
        });
    }

    debug!(batch_id, students = students.len(), "roster loaded");
    Ok(students)
}

pub async fn fetch_records(
    pool: &PgPool,
    batch_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let rows = sqlx::query(
        "SELECT marked_on, student_id, status \
         FROM batch_attendance.attendance_marks \
         WHERE batch_id = $1 AND marked_on >= $2 AND marked_on <= $3 \
         ORDER BY marked_on, recorded_at, source_key",
    )
    .bind(batch_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let marks: Vec<(NaiveDate, String, String)> = rows
        .into_iter()
        .map(|row| -> (NaiveDate, String, String) {
            (row.get("marked_on"), row.get("student_id"), row.get("status"))
        })
        .collect();

    debug!(batch_id, marks = marks.len(), "attendance marks loaded");
    Ok(group_marks(marks))
}

// Row order within a date is kept so later rows win for a repeated student.
pub fn group_marks(rows: Vec<(NaiveDate, String, String)>) -> Vec<AttendanceRecord> {
    let mut records: Vec<AttendanceRecord> = Vec::new();

    for (date, student_id, raw_status) in rows {
        let mark = StudentMark {
            student_id,
            status: Status::parse(&raw_status),
        };
        match records.last_mut() {
            Some(record) if record.date == date => record.marks.push(mark),
            _ => records.push(AttendanceRecord {
                date,
                marks: vec![mark],
            }),
        }
    }

    records
}

pub async fn fetch_holidays(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<Vec<Holiday>> {
    let rows = sqlx::query(
        "SELECT holiday_date FROM batch_attendance.holidays \
         WHERE holiday_date >= $1 AND holiday_date <= $2 \
         ORDER BY holiday_date",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Holiday {
            date: row.get("holiday_date"),
        })
        .collect())
}

#[derive(Debug, serde::Deserialize)]
struct ImportRow {
    batch_id: String,
    student_id: String,
    marked_on: NaiveDate,
    status: String,
    source_key: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
struct PreparedMark {
    batch_id: String,
    student_id: String,
    marked_on: NaiveDate,
    status: String,
    source_key: String,
}

// Keyless rows get a content-derived source key.
fn prepare_import_row(
    row: ImportRow,
    memberships: &HashMap<String, String>,
) -> anyhow::Result<PreparedMark> {
    let student_id = row.student_id.trim().to_string();
    let batch_id = row.batch_id.trim().to_string();
    let status = row.status.trim().to_string();

    if status.is_empty() {
        bail!("missing status for {} on {}", student_id, row.marked_on);
    }

    match memberships.get(&student_id) {
        None => bail!("unknown student {}", student_id),
        Some(enrolled) if *enrolled != batch_id => bail!(
            "student {} belongs to batch {}, not {}",
            student_id,
            enrolled,
            batch_id
        ),
        Some(_) => {}
    }

    if let Status::Unrecognized(raw) = Status::parse(&status) {
        debug!(student_id = %student_id, status = %raw, "importing unrecognized status");
    }

    let source_key = row
        .source_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .unwrap_or_else(|| {
            format!(
                "import-{}-{}-{}-{}",
                batch_id,
                student_id,
                row.marked_on,
                status.to_lowercase()
            )
        });

    Ok(PreparedMark {
        batch_id,
        student_id,
        marked_on: row.marked_on,
        status,
        source_key,
    })
}

async fn fetch_memberships(pool: &PgPool) -> anyhow::Result<HashMap<String, String>> {
    let rows = sqlx::query("SELECT id, batch_id FROM batch_attendance.students")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| -> (String, String) { (row.get("id"), row.get("batch_id")) })
        .collect())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let memberships = fetch_memberships(pool).await?;
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;

    let mut marks = Vec::new();
    for (index, result) in reader.deserialize::<ImportRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("line {line}: malformed row"))?;
        let mark = prepare_import_row(row, &memberships)
            .with_context(|| format!("line {line}: rejected"))?;
        marks.push(mark);
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for mark in marks.iter() {
        let result = sqlx::query(
            r#"
            INSERT INTO batch_attendance.attendance_marks
            (id, batch_id, student_id, marked_on, status, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&mark.batch_id)
        .bind(&mark.student_id)
        .bind(mark.marked_on)
        .bind(&mark.status)
        .bind(&mark.source_key)
        .execute(&mut *tx)
        .await
        .with_context(|| {
            format!(
                "failed to import mark for {} on {}",
                mark.student_id, mark.marked_on
            )
        })?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    tx.commit().await?;

    info!(inserted, rows = marks.len(), path = %csv_path.display(), "csv import finished");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, day).unwrap()
    }

    #[test]
    fn group_marks_collects_rows_per_date() {
        let rows = vec![
            (date(3), "stu-avery".to_string(), "absent".to_string()),
            (date(3), "stu-jules".to_string(), "Present".to_string()),
            (date(4), "stu-avery".to_string(), "Medical".to_string()),
        ];

        let records = group_marks(rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, date(3));
        assert_eq!(records[0].marks.len(), 2);
        assert_eq!(records[0].marks[1].status, Status::Present);
        assert_eq!(
            records[1].marks[0].status,
            Status::Unrecognized("Medical".to_string())
        );
    }

    #[test]
    fn group_marks_handles_no_rows() {
        assert!(group_marks(Vec::new()).is_empty());
    }

    fn memberships() -> HashMap<String, String> {
        HashMap::from([
            ("stu-avery".to_string(), "spring-2026".to_string()),
            ("stu-kiara".to_string(), "fall-2026".to_string()),
        ])
    }

    fn import_row(
        batch_id: &str,
        student_id: &str,
        status: &str,
        key: Option<&str>,
    ) -> ImportRow {
        ImportRow {
            batch_id: batch_id.to_string(),
            student_id: student_id.to_string(),
            marked_on: date(3),
            status: status.to_string(),
            source_key: key.map(str::to_string),
        }
    }

    #[test]
    fn blank_source_key_gets_a_stable_derived_key() {
        let first = prepare_import_row(
            import_row("spring-2026", "stu-avery", " Absent ", Some("   ")),
            &memberships(),
        )
        .unwrap();
        let again = prepare_import_row(
            import_row("spring-2026", "stu-avery", "Absent", None),
            &memberships(),
        )
        .unwrap();

        assert_eq!(first.source_key, "import-spring-2026-stu-avery-2026-02-03-absent");
        assert_eq!(first.source_key, again.source_key);
    }

    #[test]
    fn import_row_trims_status_and_keeps_explicit_key() {
        let mark = prepare_import_row(
            import_row("spring-2026", "stu-avery", "  late ", Some(" row-17 ")),
            &memberships(),
        )
        .unwrap();

        assert_eq!(mark.status, "late");
        assert_eq!(mark.source_key, "row-17");
    }

    #[test]
    fn import_row_from_another_batch_is_rejected() {
        let err = prepare_import_row(
            import_row("spring-2026", "stu-kiara", "present", None),
            &memberships(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("belongs to batch fall-2026"));
    }

    #[test]
    fn import_row_for_unknown_student_or_empty_status_is_rejected() {
        let unknown = prepare_import_row(
            import_row("spring-2026", "stu-nobody", "present", None),
            &memberships(),
        )
        .unwrap_err();
        assert!(unknown.to_string().contains("unknown student stu-nobody"));

        let blank = prepare_import_row(
            import_row("spring-2026", "stu-avery", "  ", None),
            &memberships(),
        );
        assert!(blank.is_err());
    }
}
