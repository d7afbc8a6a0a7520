//! Plan model, schema validation, and prompt composition.

pub mod model;
pub mod prompt;
pub mod schema;

pub use model::{Plan, PlanWarning, Task, Week, checked_week_range, is_supported_date, week_range};
pub use prompt::{ComposeOptions, FeedbackPolicy, augment_for_retry, compose, compose_with};
pub use schema::{Defect, DefectKind, Expectations, ValidationError, validate, validate_with};
