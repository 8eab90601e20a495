pub mod error;
pub mod models;
pub mod report;
pub mod rollup;

pub use error::RollupError;
pub use models::{
    AttendanceRecord, Batch, Holiday, Rollup, RollupInput, RollupView, Status, StatusCounts,
    Student, StudentMark, StudentStats,
};
pub use rollup::compute_rollup;
