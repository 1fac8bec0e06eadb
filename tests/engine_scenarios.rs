//! End-to-end engine behavior over mock providers and the in-memory backend.

use serde_json::Map;
use std::sync::Arc;
use std::time::{Duration, Instant};

use convo_engine::adapters::ai::MockProvider;
use convo_engine::adapters::persistence::InMemoryBackend;
use convo_engine::adapters::telemetry::RecordingTelemetry;
use convo_engine::application::{EngineBuilder, OrchestrationEngine};
use convo_engine::config::EngineConfig;
use convo_engine::domain::conversation::{CheckpointKind, ThreadMetadata};
use convo_engine::domain::foundation::{InteractionId, ProviderId};
use convo_engine::ports::{
    AssistantEngine, CheckpointOutcome, EngineError, PersistenceBackend, ProviderAdapter,
    ProviderError, RequestOptions,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.orchestration.timeout_ms = 200;
    config.orchestration.max_retries = 2;
    config.orchestration.retry_base_delay_ms = 1;
    config.orchestration.retry_max_delay_ms = 5;
    config
}

struct Harness {
    engine: OrchestrationEngine,
    backend: Arc<InMemoryBackend>,
    telemetry: Arc<RecordingTelemetry>,
}

async fn harness(config: EngineConfig, providers: Vec<Arc<dyn ProviderAdapter>>) -> Harness {
    let backend = Arc::new(InMemoryBackend::new());
    let telemetry = Arc::new(RecordingTelemetry::new());
    let engine = EngineBuilder::new(config)
        .with_providers(providers)
        .with_backend(backend.clone())
        .with_telemetry(telemetry.clone())
        .build()
        .await
        .expect("engine should build");
    Harness {
        engine,
        backend,
        telemetry,
    }
}

async fn ask(engine: &OrchestrationEngine, prompt: &str) -> InteractionId {
    engine
        .generate_completion(prompt, RequestOptions::default())
        .await
        .expect("completion should succeed")
        .interaction_id
        .expect("real engine assigns interaction ids")
}

// =============================================================================
// Thread lifecycle
// =============================================================================

#[tokio::test]
async fn three_calls_with_interval_two_take_exactly_one_checkpoint() {
    let mut config = fast_config();
    config.orchestration.checkpoint_interval = 2;
    let h = harness(config, vec![Arc::new(MockProvider::new("openai"))]).await;

    let t1 = h
        .engine
        .create_new_thread(ThreadMetadata::new())
        .await
        .unwrap()
        .new_thread_id;
    for prompt in ["first", "second", "third"] {
        ask(&h.engine, prompt).await;
    }

    let checkpoints = h.backend.checkpoint_history(t1).await.unwrap();
    let interval: Vec<_> = checkpoints
        .iter()
        .filter(|c| c.kind == CheckpointKind::Interval)
        .collect();
    assert_eq!(interval.len(), 1);
    assert_eq!(interval[0].interaction_id, InteractionId::new(1));

    assert_eq!(h.engine.list_threads().await.unwrap(), vec![t1]);

    let history = h.engine.conversation_history(10).await.unwrap();
    let prompts: Vec<_> = history.iter().map(|i| i.prompt.as_str()).collect();
    assert_eq!(prompts, vec!["first", "second", "third"]);
    let ids: Vec<_> = history.iter().map(|i| i.id.value()).collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[tokio::test]
async fn switching_away_and_back_restores_metrics() {
    let h = harness(fast_config(), vec![Arc::new(MockProvider::new("openai"))]).await;

    let a = h
        .engine
        .create_new_thread(ThreadMetadata::new())
        .await
        .unwrap()
        .new_thread_id;
    ask(&h.engine, "one").await;
    ask(&h.engine, "two").await;
    ask(&h.engine, "three").await;
    let before = h.engine.debug_info().await.session_metrics;

    let created = h
        .engine
        .create_new_thread(ThreadMetadata::new())
        .await
        .unwrap();
    assert_eq!(created.previous_thread_id, Some(a));
    ask(&h.engine, "elsewhere").await;

    let switched = h.engine.switch_thread(a).await.unwrap();
    assert_eq!(switched.previous_thread, Some(created.new_thread_id));
    assert_eq!(switched.current_thread, a);

    let after = h.engine.debug_info().await.session_metrics;
    assert_eq!(after, before);
    assert_eq!(after.total_interactions, 3);
}

#[tokio::test]
async fn switching_to_an_unknown_thread_is_not_found() {
    let h = harness(fast_config(), vec![Arc::new(MockProvider::new("openai"))]).await;

    let err = h
        .engine
        .switch_thread(convo_engine::domain::foundation::ThreadId::new())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

// =============================================================================
// Time travel
// =============================================================================

#[tokio::test]
async fn time_travel_rewinds_metrics_but_keeps_history() {
    let h = harness(fast_config(), vec![Arc::new(MockProvider::new("openai"))]).await;
    for prompt in ["a", "b", "c", "d"] {
        ask(&h.engine, prompt).await;
    }

    let outcome = h.engine.time_travel(InteractionId::new(1)).await.unwrap();
    assert_eq!(outcome.restored_to, InteractionId::new(1));

    let debug = h.engine.debug_info().await;
    assert_eq!(debug.session_metrics.total_interactions, 2);

    let history = h.engine.conversation_history(10).await.unwrap();
    assert_eq!(history.len(), 4);

    let checkpoints = h.backend.checkpoint_history(outcome.thread_id).await.unwrap();
    assert!(checkpoints
        .iter()
        .any(|c| c.kind == CheckpointKind::BeforeTimeTravel));
}

#[tokio::test]
async fn interactions_after_time_travel_keep_numbering() {
    let h = harness(fast_config(), vec![Arc::new(MockProvider::new("openai"))]).await;
    for prompt in ["a", "b", "c"] {
        ask(&h.engine, prompt).await;
    }

    h.engine.time_travel(InteractionId::new(0)).await.unwrap();
    let next = ask(&h.engine, "d").await;

    assert_eq!(next, InteractionId::new(3));
}

#[tokio::test]
async fn time_travel_to_unknown_interaction_is_not_found() {
    let h = harness(fast_config(), vec![Arc::new(MockProvider::new("openai"))]).await;
    ask(&h.engine, "a").await;

    let err = h.engine.time_travel(InteractionId::new(42)).await.unwrap_err();

    assert!(matches!(err, EngineError::InteractionNotFound { .. }));
}

#[tokio::test]
async fn disabled_persistence_skips_checkpoints_and_time_travel() {
    let mut config = fast_config();
    config.orchestration.enable_persistence = false;
    config.orchestration.checkpoint_interval = 1;
    let h = harness(config, vec![Arc::new(MockProvider::new("openai"))]).await;
    ask(&h.engine, "a").await;

    let checkpoint = h.engine.create_checkpoint(Map::new()).await.unwrap();
    let travel = h.engine.time_travel(InteractionId::new(0)).await;

    assert!(matches!(checkpoint, CheckpointOutcome::Skipped { .. }));
    assert_eq!(travel.unwrap_err(), EngineError::TimeTravelDisabled);
    assert_eq!(h.engine.debug_info().await.session_metrics.checkpoint_count, 0);
    assert_eq!(h.backend.write_count(), 0);
}

#[tokio::test]
async fn manual_checkpoint_counts_toward_metrics() {
    let h = harness(fast_config(), vec![Arc::new(MockProvider::new("openai"))]).await;
    let id = ask(&h.engine, "a").await;

    let outcome = h.engine.create_checkpoint(Map::new()).await.unwrap();

    match outcome {
        CheckpointOutcome::Created { interaction_id, .. } => assert_eq!(interaction_id, id),
        other => panic!("expected a checkpoint, got {:?}", other),
    }
    assert_eq!(h.engine.debug_info().await.session_metrics.checkpoint_count, 1);
}

// =============================================================================
// Retries and fallback
// =============================================================================

#[tokio::test]
async fn retryable_failures_use_the_whole_budget_and_stay_bounded() {
    let config = fast_config();
    let provider = MockProvider::new("openai")
        .with_delay(Duration::from_millis(500))
        .failing_with(ProviderError::network("reset"));
    let h = harness(config.clone(), vec![Arc::new(provider.clone())]).await;

    let started = Instant::now();
    let err = h
        .engine
        .generate_completion("hello", RequestOptions::default())
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, EngineError::Completion { attempts: 3, .. }));
    assert_eq!(provider.call_count(), 3);
    let bound = Duration::from_millis(
        config.orchestration.timeout_ms * u64::from(config.orchestration.max_retries + 1),
    );
    assert!(elapsed < bound + Duration::from_millis(150), "took {:?}", elapsed);
    assert_eq!(h.telemetry.events_of_type("provider_failed").len(), 3);
    assert_eq!(h.engine.debug_info().await.session_metrics.error_count, 1);
}

#[tokio::test]
async fn non_retryable_failure_makes_one_attempt() {
    let provider = MockProvider::new("openai").failing_with(ProviderError::InvalidRequest(
        "context too long".to_string(),
    ));
    let h = harness(fast_config(), vec![Arc::new(provider.clone())]).await;

    let err = h
        .engine
        .generate_completion("hello", RequestOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Completion { attempts: 1, .. }));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn rate_limited_primary_falls_back_to_next_ready_provider() {
    let primary = MockProvider::new("openai").failing_with(ProviderError::rate_limited(0));
    let secondary = MockProvider::new("ollama").with_response("from ollama");
    let h = harness(
        fast_config(),
        vec![Arc::new(primary.clone()), Arc::new(secondary.clone())],
    )
    .await;

    let outcome = h
        .engine
        .generate_completion("hello", RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.completion.content, "from ollama");
    assert_eq!(outcome.completion.provider_id, ProviderId::from_static("ollama"));
    assert_eq!(primary.call_count(), 3);
    assert_eq!(secondary.call_count(), 1);
    assert!(h.telemetry.has_event("provider_fallback"));
}

#[tokio::test]
async fn fallback_shares_the_primary_deadline() {
    let mut config = fast_config();
    config.orchestration.max_retries = 1;
    let slow = |id: &'static str| {
        MockProvider::new(id)
            .with_delay(Duration::from_millis(1_000))
            .with_response("too late")
    };
    let h = harness(
        config.clone(),
        vec![
            Arc::new(slow("openai")),
            Arc::new(slow("anthropic")),
            Arc::new(slow("ollama")),
        ],
    )
    .await;

    let started = Instant::now();
    let err = h
        .engine
        .generate_completion("hello", RequestOptions::default())
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    let bound = Duration::from_millis(
        config.orchestration.timeout_ms * u64::from(config.orchestration.max_retries + 1),
    );
    assert!(elapsed < bound + Duration::from_millis(150), "took {:?}", elapsed);
    match err {
        EngineError::Completion {
            provider,
            attempts,
            fallback_attempts,
            source,
        } => {
            assert_eq!(provider, ProviderId::from_static("openai"));
            assert_eq!(attempts, 2);
            assert_eq!(fallback_attempts, 0);
            assert!(matches!(source, ProviderError::Timeout { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!h.telemetry.has_event("provider_fallback"));
}

#[tokio::test]
async fn no_ready_provider_is_reported() {
    let provider = MockProvider::new("openai")
        .with_init(convo_engine::adapters::ai::MockInit::MissingCredentials);
    let h = harness(fast_config(), vec![Arc::new(provider)]).await;

    let err = h
        .engine
        .generate_completion("hello", RequestOptions::default())
        .await
        .unwrap_err();
    let health = h.engine.health_check().await;

    assert_eq!(err, EngineError::NoActiveProvider);
    assert!(!health.healthy);
}

// =============================================================================
// Persistence degradation
// =============================================================================

#[tokio::test]
async fn backend_outage_after_startup_never_fails_a_completion() {
    let h = harness(fast_config(), vec![Arc::new(MockProvider::new("openai"))]).await;
    ask(&h.engine, "before").await;

    h.backend.set_reachable(false);
    let outcome = h
        .engine
        .generate_completion("during", RequestOptions::default())
        .await
        .unwrap();

    assert!(!outcome.checkpoint_available);
    assert_eq!(outcome.interaction_id, Some(InteractionId::new(1)));
    assert!(outcome.session_metrics.persistence_errors >= 1);
    assert!(h.telemetry.has_event("persistence_degraded"));

    h.backend.set_reachable(true);
    let next = ask(&h.engine, "after").await;
    assert_eq!(next, InteractionId::new(2));
}

#[tokio::test]
async fn health_check_probes_the_active_provider() {
    let provider = MockProvider::new("openai");
    let h = harness(fast_config(), vec![Arc::new(provider.clone())]).await;

    let report = h.engine.health_check().await;

    assert!(report.healthy);
    assert_eq!(report.provider, Some(ProviderId::from_static("openai")));
    assert!(report.latency_ms.is_some());
    assert_eq!(provider.prompts(), vec!["Health check test"]);
    assert!(h.engine.list_threads().await.unwrap().is_empty());
}
