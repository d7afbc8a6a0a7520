//! Plan builder: drives one plan-generation request from prompt to typed
//! [`Plan`].
//!
//! Each call to [`PlanBuilder::build`] runs its own state machine:
//!
//! ```text
//! Composing -> AwaitingResponse -> Validating -> Done
//!                    ^                  |
//!                    |                  v
//!                    +---------- Retrying        (budget left)
//!                                       |
//!                                       v
//!                                    Failed      (budget spent / fatal)
//! ```
//!
//! Validation failures and (by default) provider failures share one retry
//! budget. The provider is called at most `max_retries + 1` times.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, PlanError};
use crate::plan::{
    ComposeOptions, Defect, Expectations, FeedbackPolicy, Plan, ValidationError, augment_for_retry,
    compose_with, validate_with,
};
use crate::provider::{GenerationParams, PlanProvider, ProviderError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How failed attempts are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Spend the retry budget on provider failures too. When `false`, the
    /// first transport error or timeout fails the build immediately.
    pub retry_provider_errors: bool,
    /// How validation defects are fed back into the retry prompt.
    pub feedback: FeedbackPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_provider_errors: true,
            feedback: FeedbackPolicy::default(),
        }
    }
}

/// Static configuration shared by every build on a [`PlanBuilder`].
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Wall-clock limit for a single provider call.
    pub timeout: Duration,
    pub params: GenerationParams,
    pub compose: ComposeOptions,
    pub retry: RetryPolicy,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            params: GenerationParams::default(),
            compose: ComposeOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Terminal failure of a build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] PlanError),

    #[error("provider unavailable after {attempts} attempt(s): {source}")]
    ProviderUnavailable {
        attempts: u32,
        source: ProviderError,
        /// Rejection of the most recent output the provider did return.
        last_error: Option<ValidationError>,
    },

    #[error("no valid plan after {attempts} attempt(s): {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        last_error: ValidationError,
    },
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::ExhaustedRetries { .. } => ErrorKind::ExhaustedRetries,
        }
    }

    /// Number of provider calls made before failing.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::InvalidInput(_) => 0,
            Self::ProviderUnavailable { attempts, .. } | Self::ExhaustedRetries { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Defects from the last rejected output, if any.
    pub fn last_defects(&self) -> &[Defect] {
        match self {
            Self::ExhaustedRetries { last_error, .. } => &last_error.defects,
            Self::ProviderUnavailable {
                last_error: Some(last_error),
                ..
            } => &last_error.defects,
            _ => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Why an attempt did not produce a plan.
#[derive(Debug)]
pub enum AttemptFailure {
    Invalid { error: ValidationError, raw: String },
    Provider(ProviderError),
}

/// States of a single build. `attempt` is the 1-based provider call number.
#[derive(Debug)]
pub enum BuildState {
    Composing,
    AwaitingResponse { attempt: u32, prompt: String },
    Validating { attempt: u32, raw: String },
    Retrying { attempt: u32, failure: AttemptFailure },
    Done(Plan),
    Failed(BuildError),
}

impl BuildState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Composing => "composing",
            Self::AwaitingResponse { .. } => "awaiting_response",
            Self::Validating { .. } => "validating",
            Self::Retrying { .. } => "retrying",
            Self::Done(_) => "done",
            Self::Failed(_) => "failed",
        }
    }
}

/// Inputs and per-build scratch state. Owned by one `build` call.
struct BuildRun<'a> {
    description: &'a str,
    start_date: NaiveDate,
    week_count: u32,
    max_retries: u32,
    /// Prompt produced by `Composing`; retries augment this, never a
    /// previous retry prompt.
    base_prompt: String,
    last_rejection: Option<ValidationError>,
}

impl BuildRun<'_> {
    fn expectations(&self) -> Expectations {
        Expectations {
            start_date: Some(self.start_date),
            week_count: Some(self.week_count),
        }
    }

    /// Retries are available while fewer than `max_retries` have been used.
    fn can_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Turns project descriptions into validated plans via a [`PlanProvider`].
///
/// The builder holds only immutable configuration, so one instance can
/// serve concurrent builds; each build keeps its attempt state on its own
/// stack.
#[derive(Clone)]
pub struct PlanBuilder {
    provider: Arc<dyn PlanProvider>,
    config: BuilderConfig,
}

impl std::fmt::Debug for PlanBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanBuilder")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

impl PlanBuilder {
    pub fn new(provider: Arc<dyn PlanProvider>, config: BuilderConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Generate and validate a plan.
    ///
    /// Returns the plan with any non-fatal warnings attached, or a
    /// [`BuildError`] carrying the error kind, attempt count, and last
    /// defects.
    pub async fn build(
        &self,
        description: &str,
        start_date: NaiveDate,
        week_count: u32,
        max_retries: u32,
    ) -> Result<Plan, BuildError> {
        info!(
            provider = self.provider.name(),
            %start_date,
            week_count,
            max_retries,
            "building plan"
        );

        let mut run = BuildRun {
            description,
            start_date,
            week_count,
            max_retries,
            base_prompt: String::new(),
            last_rejection: None,
        };

        let mut state = BuildState::Composing;
        loop {
            state = match state {
                BuildState::Done(plan) => {
                    for warning in &plan.warnings {
                        warn!(%warning, "plan repaired during validation");
                    }
                    info!(
                        weeks = plan.weeks.len(),
                        tasks = plan.task_count(),
                        warnings = plan.warnings.len(),
                        "plan built"
                    );
                    return Ok(plan);
                }
                BuildState::Failed(err) => {
                    warn!(kind = %err.kind(), attempts = err.attempts(), error = %err, "plan build failed");
                    return Err(err);
                }
                other => {
                    let from = other.name();
                    let next = self.step(other, &mut run).await;
                    debug!(from, to = next.name(), "build state transition");
                    next
                }
            };
        }
    }

    /// Advance one non-terminal state.
    async fn step(&self, state: BuildState, run: &mut BuildRun<'_>) -> BuildState {
        match state {
            BuildState::Composing => {
                match compose_with(run.description, run.start_date, run.week_count, &self.config.compose) {
                    Ok(prompt) => {
                        run.base_prompt = prompt.clone();
                        BuildState::AwaitingResponse { attempt: 1, prompt }
                    }
                    Err(e) => BuildState::Failed(BuildError::InvalidInput(e)),
                }
            }

            BuildState::AwaitingResponse { attempt, prompt } => {
                let call = self.provider.generate(&prompt, &self.config.params);
                let result = match tokio::time::timeout(self.config.timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(self.config.timeout)),
                };
                match result {
                    Ok(raw) => BuildState::Validating { attempt, raw },
                    Err(source) => {
                        warn!(attempt, error = %source, "provider call failed");
                        if self.config.retry.retry_provider_errors && run.can_retry(attempt) {
                            BuildState::Retrying {
                                attempt,
                                failure: AttemptFailure::Provider(source),
                            }
                        } else {
                            BuildState::Failed(BuildError::ProviderUnavailable {
                                attempts: attempt,
                                source,
                                last_error: run.last_rejection.take(),
                            })
                        }
                    }
                }
            }

            BuildState::Validating { attempt, raw } => match validate_with(&raw, &run.expectations()) {
                Ok(plan) => BuildState::Done(plan),
                Err(error) => {
                    warn!(
                        attempt,
                        kind = %error.kind,
                        defects = error.defects.len(),
                        "model output rejected"
                    );
                    if run.can_retry(attempt) {
                        BuildState::Retrying {
                            attempt,
                            failure: AttemptFailure::Invalid { error, raw },
                        }
                    } else {
                        BuildState::Failed(BuildError::ExhaustedRetries {
                            attempts: attempt,
                            last_error: error,
                        })
                    }
                }
            },

            BuildState::Retrying { attempt, failure } => {
                let prompt = match failure {
                    AttemptFailure::Invalid { error, raw } => {
                        let prompt = augment_for_retry(
                            &run.base_prompt,
                            &error,
                            Some(&raw),
                            &self.config.retry.feedback,
                        );
                        run.last_rejection = Some(error);
                        prompt
                    }
                    AttemptFailure::Provider(_) => run.base_prompt.clone(),
                };
                BuildState::AwaitingResponse {
                    attempt: attempt + 1,
                    prompt,
                }
            }

            terminal @ (BuildState::Done(_) | BuildState::Failed(_)) => terminal,
        }
    }
}
