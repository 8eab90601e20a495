use std::path::PathBuf;

use anyhow::Context;
use batch_attendance_rollup::rollup::{self, compute_rollup};
use batch_attendance_rollup::{report, Batch, Rollup, RollupInput, RollupView, Student};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod db;

#[derive(Parser)]
#[command(name = "batch-attendance")]
#[command(about = "Monthly attendance rollups for teaching batches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PeriodArgs {
    /// Batch identifier
    #[arg(long)]
    batch: String,
    /// Month number, 1 to 12
    #[arg(long)]
    month: u32,
    #[arg(long)]
    year: i32,
    /// Last day to evaluate (defaults to the current UTC date)
    #[arg(long)]
    today: Option<NaiveDate>,
    /// Include month-wide and per-day totals
    #[arg(long, default_value_t = false)]
    public: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import attendance marks from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print per-student attendance for a month
    Rollup {
        #[command(flatten)]
        period: PeriodArgs,
        /// Print the full rollup as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Write a markdown attendance register
    Report {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long, default_value = "attendance.md")]
        out: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_rollup(
    pool: &PgPool,
    period: &PeriodArgs,
) -> anyhow::Result<(Batch, Vec<Student>, Rollup)> {
    let month_start = rollup::first_of_month(period.year, period.month)?;
    let month_end = month_start + Duration::days(i64::from(
        rollup::days_in_month(period.year, period.month)? - 1,
    ));
    let today = period.today.unwrap_or_else(|| Utc::now().date_naive());

    let batch = db::fetch_batch(pool, &period.batch).await?;
    let students = db::fetch_roster(pool, &batch.id).await?;
    let records = db::fetch_records(pool, &batch.id, month_start, month_end).await?;
    let holidays = db::fetch_holidays(pool, month_start, month_end).await?;

    let rollup = compute_rollup(&RollupInput {
        students: &students,
        records: &records,
        holidays: &holidays,
        batch_start: batch.start_date,
        today,
        month: period.month,
        year: period.year,
        view: if period.public {
            RollupView::Public
        } else {
            RollupView::Internal
        },
    })?;

    info!(
        batch = %batch.id,
        month = period.month,
        year = period.year,
        %today,
        students = students.len(),
        "rollup ready"
    );
    Ok((batch, students, rollup))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} marks from {}.", csv.display());
        }
        Commands::Rollup { period, json } => {
            let (batch, students, rollup) = load_rollup(&pool, &period).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&rollup)?);
                return Ok(());
            }

            if students.is_empty() {
                println!("No students enrolled in {}.", batch.name);
                return Ok(());
            }

            println!(
                "Attendance for {} ({}):",
                batch.name,
                report::month_label(rollup.year, rollup.month)
            );
            for student in students.iter() {
                if let Some(stats) = rollup.stats.get(&student.id) {
                    println!("{}", report::summary_line(&student.name, stats));
                }
            }
            if let Some(summary) = &rollup.monthly_summary {
                println!(
                    "Month totals: {} present, {} absent, {} late, {} excused, \
                     {} holiday, {} week off",
                    summary.present,
                    summary.absent,
                    summary.late,
                    summary.excused,
                    summary.holiday,
                    summary.week_off
                );
            }
        }
        Commands::Report { period, out } => {
            let (batch, students, rollup) = load_rollup(&pool, &period).await?;
            let report = report::build_report(&batch.name, &rollup, &students);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
