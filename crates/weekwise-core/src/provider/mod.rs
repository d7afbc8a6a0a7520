//! Provider seam for model text generation.
//!
//! The planner never talks to a model API directly. It calls a
//! [`PlanProvider`], which is either the shipped [`CommandProvider`] or a
//! stub injected by tests.

pub mod command;
pub mod trait_def;

pub use command::CommandProvider;
pub use trait_def::{GenerationParams, PlanProvider, ProviderError};
