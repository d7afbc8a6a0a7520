//! Shared test utilities for weekwise integration tests.
//!
//! Provides provider stubs that stand in for a real model client, plus JSON
//! fixtures in the schema the validator accepts.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use weekwise_core::provider::{GenerationParams, PlanProvider, ProviderError};

/// A well-formed two-week plan starting on Monday 2025-01-06.
pub const TWO_WEEK_PLAN: &str = r#"{
  "title": "Science Fair Volcano",
  "start_date": "2025-01-06",
  "weeks": [
    {"index": 1, "label": "Research", "tasks": [
      {"title": "Pick a volcano type", "description": "Compare shield, cinder cone, and stratovolcano", "start": "2025-01-06", "end": "2025-01-07", "estimated_hours": 2},
      {"title": "Gather materials", "start": "2025-01-08", "end": "2025-01-10", "estimated_hours": 1.5}
    ]},
    {"index": 2, "label": "Build, test; present", "tasks": [
      {"title": "Build the cone", "description": "Paper-mache over\na bottle", "start": "2025-01-13", "end": "2025-01-15", "estimated_hours": 4},
      {"title": "Rehearse", "start": "2025-01-17", "end": "2025-01-17"}
    ]}
  ]
}"#;

/// Output that contains no JSON at all.
pub const PROSE_ONLY: &str = "I'd be happy to help! Week one: research. Week two: build.";

/// One step of a scripted provider.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    TransportError(String),
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

/// Provider that replays a fixed script of replies.
///
/// Replies are consumed in order; the final reply repeats forever once the
/// script is exhausted. Every prompt received is recorded.
#[derive(Debug)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
    params: Mutex<Vec<GenerationParams>>,
}

impl ScriptedProvider {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    /// A provider that returns `text` on every call.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new([Reply::text(text)])
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("prompts lock poisoned").len()
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock poisoned").clone()
    }

    /// Generation parameters received, in call order.
    pub fn params(&self) -> Vec<GenerationParams> {
        self.params.lock().expect("params lock poisoned").clone()
    }
}

#[async_trait]
impl PlanProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, ProviderError> {
        self.prompts
            .lock()
            .expect("prompts lock poisoned")
            .push(prompt.to_string());
        self.params.lock().expect("params lock poisoned").push(*params);

        let reply = {
            let mut replies = self.replies.lock().expect("replies lock poisoned");
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        };
        match reply {
            Some(Reply::Text(s)) => Ok(s),
            Some(Reply::TransportError(msg)) => Err(ProviderError::Transport(msg)),
            None => Err(ProviderError::Transport("script is empty".to_string())),
        }
    }
}

/// Provider that sleeps before answering, for exercising timeouts.
#[derive(Debug)]
pub struct SlowProvider {
    delay: Duration,
    reply: String,
    calls: AtomicU32,
}

impl SlowProvider {
    pub fn new(delay: Duration, reply: impl Into<String>) -> Self {
        Self {
            delay,
            reply: reply.into(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanProvider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

/// Two-week fixture with week 2 renumbered to 3, leaving a gap.
pub fn plan_with_week_gap() -> String {
    TWO_WEEK_PLAN.replace("\"index\": 2", "\"index\": 3")
}
