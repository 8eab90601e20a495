use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RollupError {
    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),

    #[error("year must be between 1 and 9999, got {0}")]
    InvalidYear(i32),
}

pub type Result<T> = std::result::Result<T, RollupError>;
