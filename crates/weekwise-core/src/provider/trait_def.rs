//! The `PlanProvider` trait -- the seam between the planner and whatever
//! produces model text.
//!
//! The trait is object-safe so builders can hold `Arc<dyn PlanProvider>`
//! and tests can substitute scripted stubs.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Optional sampling parameters forwarded to the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Transport-level failure talking to a provider.
///
/// All variants map to [`crate::ErrorKind::ProviderUnavailable`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to start provider command {command:?}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("provider I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("provider exited with status {code:?}: {stderr}")]
    Exited { code: Option<i32>, stderr: String },

    #[error("provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider transport error: {0}")]
    Transport(String),
}

/// Something that turns a prompt into raw model text.
#[async_trait]
pub trait PlanProvider: Send + Sync {
    /// Human-readable name for logs (e.g. the command being run).
    fn name(&self) -> &str;

    /// Send `prompt` to the model and return its raw text response.
    ///
    /// Implementations do not retry; the plan builder owns the retry budget.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, ProviderError>;
}

// Compile-time assertion: PlanProvider must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn PlanProvider) {}
};
