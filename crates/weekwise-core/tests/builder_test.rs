//! Integration tests for `PlanBuilder` driven by scripted providers.
//!
//! No model or subprocess is involved: every provider here is a stub from
//! `weekwise-test-utils`.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use weekwise_core::{
    BuildError, BuilderConfig, ErrorKind, GenerationParams, PlanBuilder, PlanError, PlanWarning,
    ProviderError,
};
use weekwise_test_utils::{PROSE_ONLY, Reply, ScriptedProvider, SlowProvider, TWO_WEEK_PLAN, plan_with_week_gap};

fn jan6() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
}

fn builder(provider: Arc<ScriptedProvider>) -> PlanBuilder {
    PlanBuilder::new(provider, BuilderConfig::default())
}

// ===========================================================================
// Happy path
// ===========================================================================

#[tokio::test]
async fn valid_first_response_builds_plan() {
    let provider = Arc::new(ScriptedProvider::always(TWO_WEEK_PLAN));
    let plan = builder(provider.clone())
        .build("Build a volcano for the science fair", jan6(), 2, 2)
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(plan.title, "Science Fair Volcano");
    assert_eq!(plan.weeks.len(), 2);
    assert_eq!(plan.task_count(), 4);
    assert!(plan.warnings.is_empty(), "unexpected warnings: {:?}", plan.warnings);

    let prompt = &provider.prompts()[0];
    assert!(prompt.contains("Build a volcano for the science fair"));
    assert!(prompt.contains("2025-01-06"));
}

#[tokio::test]
async fn generation_params_reach_provider() {
    let provider = Arc::new(ScriptedProvider::always(TWO_WEEK_PLAN));
    let config = BuilderConfig {
        params: GenerationParams {
            temperature: Some(0.2),
            max_tokens: Some(4096),
        },
        ..BuilderConfig::default()
    };
    PlanBuilder::new(provider.clone(), config)
        .build("volcano", jan6(), 2, 0)
        .await
        .unwrap();

    assert_eq!(
        provider.params(),
        vec![GenerationParams {
            temperature: Some(0.2),
            max_tokens: Some(4096),
        }]
    );
}

#[tokio::test]
async fn fewer_weeks_than_requested_is_a_warning() {
    let provider = Arc::new(ScriptedProvider::always(TWO_WEEK_PLAN));
    let plan = builder(provider).build("volcano", jan6(), 3, 0).await.unwrap();

    assert_eq!(plan.weeks.len(), 2);
    assert!(
        plan.warnings.contains(&PlanWarning::WeekCountMismatch {
            expected: 3,
            actual: 2
        }),
        "expected WeekCountMismatch, got: {:?}",
        plan.warnings
    );
}

// ===========================================================================
// Retry behavior
// ===========================================================================

#[tokio::test]
async fn always_malformed_exhausts_retries() {
    let provider = Arc::new(ScriptedProvider::always(PROSE_ONLY));
    let err = builder(provider.clone())
        .build("volcano", jan6(), 2, 2)
        .await
        .unwrap_err();

    assert!(
        matches!(err, BuildError::ExhaustedRetries { attempts: 3, .. }),
        "expected ExhaustedRetries after 3 attempts, got: {err}"
    );
    assert_eq!(err.kind(), ErrorKind::ExhaustedRetries);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn zero_retries_means_one_attempt() {
    let provider = Arc::new(ScriptedProvider::always(PROSE_ONLY));
    let err = builder(provider.clone())
        .build("volcano", jan6(), 2, 0)
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn schema_violation_is_fed_back_then_fixed() {
    let provider = Arc::new(ScriptedProvider::new([
        Reply::text(plan_with_week_gap()),
        Reply::text(TWO_WEEK_PLAN),
    ]));
    let plan = builder(provider.clone())
        .build("volcano", jan6(), 2, 2)
        .await
        .unwrap();

    assert_eq!(plan.weeks.len(), 2);
    assert_eq!(provider.calls(), 2);

    let prompts = provider.prompts();
    assert!(!prompts[0].contains("Correction Required"));
    assert!(prompts[1].contains("Correction Required"));
    assert!(prompts[1].starts_with(&prompts[0]), "retry prompt must extend the original");
}

#[tokio::test]
async fn exhausted_retries_carries_last_defects() {
    let provider = Arc::new(ScriptedProvider::always(plan_with_week_gap()));
    let err = builder(provider).build("volcano", jan6(), 2, 1).await.unwrap_err();

    assert!(matches!(err, BuildError::ExhaustedRetries { attempts: 2, .. }));
    assert!(
        err.last_defects().iter().any(|d| d.path.starts_with("weeks")),
        "expected a weeks defect, got: {:?}",
        err.last_defects()
    );
}

#[tokio::test]
async fn transport_error_is_retried_by_default() {
    let provider = Arc::new(ScriptedProvider::new([
        Reply::TransportError("connection reset".to_string()),
        Reply::text(TWO_WEEK_PLAN),
    ]));
    let plan = builder(provider.clone())
        .build("volcano", jan6(), 2, 1)
        .await
        .unwrap();

    assert_eq!(plan.weeks.len(), 2);
    assert_eq!(provider.calls(), 2);
    // A transport failure has no defects to report, so the prompt is resent as-is.
    let prompts = provider.prompts();
    assert_eq!(prompts[0], prompts[1]);
}

#[tokio::test]
async fn persistent_transport_error_is_provider_unavailable() {
    let provider = Arc::new(ScriptedProvider::new([Reply::TransportError(
        "503".to_string(),
    )]));
    let err = builder(provider.clone())
        .build("volcano", jan6(), 2, 2)
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            BuildError::ProviderUnavailable {
                attempts: 3,
                source: ProviderError::Transport(_),
                last_error: None,
            }
        ),
        "expected ProviderUnavailable, got: {err}"
    );
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn transport_error_after_rejection_keeps_defects() {
    let provider = Arc::new(ScriptedProvider::new([
        Reply::text(plan_with_week_gap()),
        Reply::TransportError("503".to_string()),
    ]));
    let err = builder(provider.clone())
        .build("volcano", jan6(), 2, 1)
        .await
        .unwrap_err();

    assert!(
        matches!(err, BuildError::ProviderUnavailable { attempts: 2, .. }),
        "expected ProviderUnavailable, got: {err}"
    );
    assert!(
        err.last_defects().iter().any(|d| d.path == "weeks"),
        "got: {:?}",
        err.last_defects()
    );
}

#[tokio::test]
async fn transport_error_after_prose_keeps_rejection() {
    let provider = Arc::new(ScriptedProvider::new([
        Reply::text(PROSE_ONLY),
        Reply::TransportError("503".to_string()),
    ]));
    let err = builder(provider)
        .build("volcano", jan6(), 2, 1)
        .await
        .unwrap_err();

    let BuildError::ProviderUnavailable {
        last_error: Some(last_error),
        ..
    } = &err
    else {
        panic!("expected ProviderUnavailable with a rejection, got: {err}");
    };
    assert_eq!(last_error.kind, ErrorKind::Unparseable);
}

#[tokio::test]
async fn transport_error_fails_fast_when_not_retried() {
    let provider = Arc::new(ScriptedProvider::new([
        Reply::TransportError("down".to_string()),
        Reply::text(TWO_WEEK_PLAN),
    ]));
    let mut config = BuilderConfig::default();
    config.retry.retry_provider_errors = false;

    let err = PlanBuilder::new(provider.clone(), config)
        .build("volcano", jan6(), 2, 2)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
    assert_eq!(err.attempts(), 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn slow_provider_times_out() {
    let provider = Arc::new(SlowProvider::new(Duration::from_secs(30), TWO_WEEK_PLAN));
    let config = BuilderConfig {
        timeout: Duration::from_millis(50),
        ..BuilderConfig::default()
    };
    let err = PlanBuilder::new(provider.clone(), config)
        .build("volcano", jan6(), 2, 1)
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            BuildError::ProviderUnavailable {
                attempts: 2,
                source: ProviderError::Timeout(_),
                ..
            }
        ),
        "expected timeout, got: {err}"
    );
    assert_eq!(provider.calls(), 2);
}

// ===========================================================================
// Input validation
// ===========================================================================

#[tokio::test]
async fn invalid_input_never_calls_provider() {
    let provider = Arc::new(ScriptedProvider::always(TWO_WEEK_PLAN));
    let b = builder(provider.clone());

    let err = b.build("   ", jan6(), 2, 2).await.unwrap_err();
    assert!(
        matches!(err, BuildError::InvalidInput(PlanError::EmptyDescription)),
        "expected EmptyDescription, got: {err}"
    );

    let err = b.build("volcano", jan6(), 0, 2).await.unwrap_err();
    assert!(
        matches!(err, BuildError::InvalidInput(PlanError::InvalidWeekCount(0))),
        "expected InvalidWeekCount, got: {err}"
    );

    assert_eq!(provider.calls(), 0);
}

// ===========================================================================
// Concurrency
// ===========================================================================

#[tokio::test]
async fn one_builder_serves_concurrent_builds() {
    let provider = Arc::new(ScriptedProvider::always(TWO_WEEK_PLAN));
    let b = builder(provider.clone());

    let mut handles = Vec::new();
    for i in 0..8 {
        let b = b.clone();
        handles.push(tokio::spawn(async move {
            b.build(&format!("project {i}"), jan6(), 2, 0).await
        }));
    }
    for handle in handles {
        let plan = handle.await.unwrap().unwrap();
        assert_eq!(plan.weeks.len(), 2);
    }
    assert_eq!(provider.calls(), 8);
}
