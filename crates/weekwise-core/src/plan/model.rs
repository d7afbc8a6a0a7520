//! Typed plan model produced by the schema validator.
//!
//! A [`Plan`] owns its [`Week`]s, and each week owns its [`Task`]s. Values
//! are built once by [`crate::plan::validate`] and never mutated afterwards;
//! exporters only borrow them.

use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// A complete week-by-week schedule for one project description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Project title (never empty).
    pub title: String,
    /// First day of week 1.
    pub start_date: NaiveDate,
    /// Weeks ordered by index, contiguous from 1.
    pub weeks: Vec<Week>,
    /// Assumptions the model stated about scope, skills, or resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumptions: Option<String>,
    /// Non-fatal repairs applied during validation.
    #[serde(skip)]
    pub warnings: Vec<PlanWarning>,
}

/// One week of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Week {
    /// 1-based position of the week within the plan.
    pub index: u32,
    /// Short human-readable label (e.g. "Research").
    pub label: String,
    /// Tasks in the order the model returned them.
    pub tasks: Vec<Task>,
}

/// A single scheduled task. Dates are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    /// Titles of tasks that must finish before this one starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Set when the task's dates fall outside its week's range.
    #[serde(default, skip_serializing_if = "is_false")]
    pub overflow: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Plan {
    /// Date range `(first, last)` covered by week `index`, inclusive.
    pub fn week_range(&self, index: u32) -> (NaiveDate, NaiveDate) {
        week_range(self.start_date, index)
    }

    /// Iterate over every task along with its owning week.
    pub fn tasks(&self) -> impl Iterator<Item = (&Week, &Task)> {
        self.weeks
            .iter()
            .flat_map(|w| w.tasks.iter().map(move |t| (w, t)))
    }

    /// Total number of tasks across all weeks.
    pub fn task_count(&self) -> usize {
        self.weeks.iter().map(|w| w.tasks.len()).sum()
    }

    /// Sum of all known task estimates.
    pub fn total_hours(&self) -> f64 {
        self.tasks().filter_map(|(_, t)| t.estimated_hours).sum()
    }

    /// Last day covered by the plan (end of the final week).
    pub fn end_date(&self) -> NaiveDate {
        match self.weeks.last() {
            Some(w) => self.week_range(w.index).1,
            None => self.start_date,
        }
    }

    /// Serialize to the canonical JSON schema accepted by the validator.
    pub fn to_json(&self) -> String {
        // Plan has no map keys or non-finite floats that could fail here.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Date range for week `index` of a plan starting on `start`.
///
/// Saturates at `NaiveDate::MAX`; plans accepted by the validator always
/// stay inside [`is_supported_date`].
pub fn week_range(start: NaiveDate, index: u32) -> (NaiveDate, NaiveDate) {
    checked_week_range(start, index).unwrap_or((NaiveDate::MAX, NaiveDate::MAX))
}

/// Like [`week_range`], but `None` when the range leaves chrono's calendar.
pub fn checked_week_range(start: NaiveDate, index: u32) -> Option<(NaiveDate, NaiveDate)> {
    let offset = 7 * (u64::from(index.max(1)) - 1);
    let first = start.checked_add_days(Days::new(offset))?;
    Some((first, first.checked_add_days(Days::new(6))?))
}

/// Dates a plan may contain: four-digit years, with a following day that
/// is also four-digit so an exclusive calendar end can be written.
pub fn is_supported_date(date: NaiveDate) -> bool {
    (1..=9999).contains(&date.year()) && date.succ_opt().is_some_and(|next| next.year() <= 9999)
}

/// A repair or discrepancy recorded while validating model output.
///
/// Warnings never abort validation; callers may surface them but export
/// proceeds regardless.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanWarning {
    /// Task end preceded its start; end was set equal to start.
    DateClamped {
        path: String,
        start: NaiveDate,
        original_end: NaiveDate,
    },
    /// Task dates fall outside the owning week's range.
    Overflow { path: String, week: u32 },
    /// The model returned a different number of weeks than requested.
    WeekCountMismatch { expected: u32, actual: u32 },
    /// The model returned a start date other than the requested one.
    StartDateOverridden {
        requested: NaiveDate,
        returned: NaiveDate,
    },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DateClamped {
                path,
                start,
                original_end,
            } => write!(
                f,
                "{path}: end date {original_end} precedes start {start}; clamped to {start}"
            ),
            Self::Overflow { path, week } => {
                write!(f, "{path}: dates fall outside week {week}; flagged as overflow")
            }
            Self::WeekCountMismatch { expected, actual } => {
                write!(f, "requested {expected} weeks but model returned {actual}")
            }
            Self::StartDateOverridden {
                requested,
                returned,
            } => write!(
                f,
                "model returned start date {returned}; using requested {requested}"
            ),
        }
    }
}
