use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub join_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMark {
    pub student_id: String,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub marks: Vec<StudentMark>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
}

// Unrecognized keeps a raw status string as-is; it never counts toward a tally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Present,
    Absent,
    Late,
    Excused,
    Holiday,
    WeekOff,
    Unrecognized(String),
}

impl Status {
    pub fn parse(raw: &str) -> Status {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "present" => Status::Present,
            "absent" => Status::Absent,
            "late" => Status::Late,
            "excused" => Status::Excused,
            "holiday" => Status::Holiday,
            "weekoff" => Status::WeekOff,
            _ => Status::Unrecognized(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Present => "present",
            Status::Absent => "absent",
            Status::Late => "late",
            Status::Excused => "excused",
            Status::Holiday => "holiday",
            Status::WeekOff => "week_off",
            Status::Unrecognized(raw) => raw,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Status::Present => "P",
            Status::Absent => "A",
            Status::Late => "L",
            Status::Excused => "E",
            Status::Holiday => "H",
            Status::WeekOff => "W",
            Status::Unrecognized(_) => "?",
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(
            self,
            Status::Present | Status::Absent | Status::Late | Status::Excused
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Status::parse(&raw))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub excused: u32,
    pub holiday: u32,
    pub week_off: u32,
}

impl StatusCounts {
    pub fn record(&mut self, status: &Status) {
        match status {
            Status::Present => self.present += 1,
            Status::Absent => self.absent += 1,
            Status::Late => self.late += 1,
            Status::Excused => self.excused += 1,
            Status::Holiday => self.holiday += 1,
            Status::WeekOff => self.week_off += 1,
            Status::Unrecognized(_) => {}
        }
    }

    pub fn merge(&mut self, other: &StatusCounts) {
        self.present += other.present;
        self.absent += other.absent;
        self.late += other.late;
        self.excused += other.excused;
        self.holiday += other.holiday;
        self.week_off += other.week_off;
    }

    pub fn total_sessions(&self) -> u32 {
        self.present + self.absent + self.late + self.excused
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub total_sessions: u32,
    pub percentage: u32,
}

impl StudentStats {
    pub fn from_counts(counts: StatusCounts) -> Self {
        let total_sessions = counts.total_sessions();
        StudentStats {
            counts,
            total_sessions,
            percentage: attendance_percentage(counts.present, total_sessions),
        }
    }
}

// Halves round up.
pub fn attendance_percentage(present: u32, total_sessions: u32) -> u32 {
    if total_sessions == 0 {
        return 0;
    }
    let present = u64::from(present);
    let total = u64::from(total_sessions);
    ((200 * present + total) / (2 * total)) as u32
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RollupView {
    #[default]
    Internal,
    Public,
}

#[derive(Debug, Clone)]
pub struct RollupInput<'a> {
    pub students: &'a [Student],
    pub records: &'a [AttendanceRecord],
    pub holidays: &'a [Holiday],
    pub batch_start: NaiveDate,
    pub today: NaiveDate,
    pub month: u32,
    pub year: i32,
    pub view: RollupView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollup {
    pub month: u32,
    pub year: i32,
    pub days_in_month: u32,
    pub grid: BTreeMap<String, BTreeMap<u32, Status>>,
    pub stats: BTreeMap<String, StudentStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_summary: Option<StatusCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_stats: Option<BTreeMap<u32, StatusCounts>>,
}
