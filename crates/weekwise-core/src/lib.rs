//! Core library for weekwise: turns a project description into a validated
//! week-by-week plan and exports it.
//!
//! ```text
//! description -> plan::compose -> PlanProvider -> plan::validate -> Plan
//!                                                                   |
//!                               export::{to_calendar, to_table, to_markdown}
//! ```

pub mod builder;
pub mod error;
pub mod export;
pub mod plan;
pub mod provider;

pub use builder::{BuildError, BuilderConfig, PlanBuilder, RetryPolicy};
pub use error::{ErrorKind, PlanError};
pub use plan::{Plan, PlanWarning, Task, ValidationError, Week};
pub use provider::{CommandProvider, GenerationParams, PlanProvider, ProviderError};
