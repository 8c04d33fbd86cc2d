use thiserror::Error;

use crate::series::range::DateRange;

/// Structural failures of the reconciliation core.
///
/// Row-level problems never show up here; the normalizer drops and counts
/// them instead (see `series::normalize::DroppedRows`).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A required series has no rows.
    #[error("{series} series is empty")]
    EmptyInput { series: String },

    /// The primary and reference ranges do not overlap.
    #[error("no overlap between primary {primary} and reference {reference}")]
    EmptyIntersection { primary: DateRange, reference: DateRange },

    /// The overlap is too short to calibrate a ratio.
    #[error(
        "overlap {overlap} spans {overlap_days} day(s), at least {required} required \
         (primary {primary}, reference {reference})"
    )]
    InsufficientOverlap {
        primary: DateRange,
        reference: DateRange,
        overlap: DateRange,
        overlap_days: i64,
        required: u32,
    },

    /// The reference values give nothing to divide by over the overlap.
    #[error(
        "reference values over overlap {overlap} give a zero denominator \
         (primary {primary}, reference {reference})"
    )]
    DivisionByZero {
        primary: DateRange,
        reference: DateRange,
        overlap: DateRange,
    },

    /// Rejected engine parameters.
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub fn empty_input(series: impl Into<String>) -> Self {
        Self::EmptyInput { series: series.into() }
    }
}

/// Application-level error carrying the process exit code.
///
/// - `2`: input/config problems
/// - `3`: not enough data to reconcile
/// - `4`: internal/computation failures
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let exit_code = match err {
            EngineError::InvalidConfig(_) => 2,
            _ => 3,
        };
        Self::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
