//! Error taxonomy shared across the crate.

use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

/// Coarse classification of every fatal error the core can produce.
///
/// The CLI maps these onto distinct exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad caller-supplied parameters. Never retried.
    InvalidInput,
    /// Model output contained no parseable structured data.
    Unparseable,
    /// Structured output that breaks the plan schema or its invariants.
    SchemaViolation,
    /// Transport failure or timeout talking to the provider.
    ProviderUnavailable,
    /// Retry budget spent without a valid plan.
    ExhaustedRetries,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Unparseable => "unparseable",
            Self::SchemaViolation => "schema_violation",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::ExhaustedRetries => "exhausted_retries",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected caller input (prompt composition, builder arguments).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("week count must be at least 1 (got {0})")]
    InvalidWeekCount(u32),

    #[error("project description is empty")]
    EmptyDescription,

    #[error("hours per week must be a positive number (got {0})")]
    InvalidHoursPerWeek(f64),

    #[error("a {weeks}-week plan starting {start} does not fit in years 1 to 9999")]
    DateOutOfRange { start: NaiveDate, weeks: u32 },
}

impl PlanError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}
