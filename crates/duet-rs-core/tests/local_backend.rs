//! Local adapter tests over a scripted runtime.

use duet_rs_config::LocalConfig;
use duet_rs_core::provider::{LocalBackend, LocalRuntimeError};
use duet_rs_core::{Availability, GenerationError, GenerationProvider, Message};
use duet_rs_test_utils::ScriptedLocalRuntime;
use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn backend(runtime: &ScriptedLocalRuntime) -> LocalBackend {
    LocalBackend::new(Arc::new(runtime.clone()), &LocalConfig::default())
}

async fn collect(backend: &LocalBackend, prompt: &str) -> Vec<Result<String, GenerationError>> {
    let stream = backend.stream(&[], prompt).await.expect("stream");
    stream.collect().await
}

#[tokio::test]
async fn cumulative_snapshots_become_deltas() {
    let runtime = ScriptedLocalRuntime::new(&["Hi", "Hi there", "Hi there!"]);
    let items = collect(&backend(&runtime), "hello").await;
    let deltas: Vec<String> = items.into_iter().map(|item| item.expect("delta")).collect();
    assert_eq!(deltas, vec!["Hi", " there", "!"]);
}

#[tokio::test]
async fn overlapping_and_stale_snapshots_reassemble_to_final_output() {
    let runtime =
        ScriptedLocalRuntime::new(&["The", "The", "The cat", "The", "The cat sat", "The cat sat."]);
    let items = collect(&backend(&runtime), "story").await;
    let text: String = items.into_iter().map(|item| item.expect("delta")).collect();
    assert_eq!(text, "The cat sat.");
}

#[tokio::test]
async fn session_is_destroyed_after_completion() {
    let runtime = ScriptedLocalRuntime::new(&["done"]);
    collect(&backend(&runtime), "hello").await;
    assert_eq!(runtime.created_count(), 1);
    assert_eq!(runtime.destroyed_count(), 1);
}

#[tokio::test]
async fn session_is_destroyed_after_failure() {
    let runtime = ScriptedLocalRuntime::new(&["partial"])
        .failing_after(LocalRuntimeError::Failed("out of memory".to_string()));
    let items = collect(&backend(&runtime), "hello").await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok("partial".to_string()));
    let Err(error) = &items[1] else {
        panic!("expected failure");
    };
    assert!(matches!(error, GenerationError::LocalGeneration { .. }));
    assert!(error.to_string().contains("out of memory"));
    assert_eq!(runtime.destroyed_count(), 1);
}

#[tokio::test]
async fn session_is_destroyed_when_stream_is_abandoned() {
    let runtime = ScriptedLocalRuntime::new(&["first"]).hanging();
    let backend = backend(&runtime);
    let mut stream = backend.stream(&[], "hello").await.expect("stream");
    assert_eq!(stream.next().await, Some(Ok("first".to_string())));
    assert_eq!(runtime.destroyed_count(), 0);
    drop(stream);
    assert_eq!(runtime.destroyed_count(), 1);
}

#[tokio::test]
async fn unavailable_runtime_fails_before_creating_a_session() {
    let runtime = ScriptedLocalRuntime::new(&["x"]).with_availability(Availability::Unavailable);
    let result = backend(&runtime).stream(&[], "hello").await;
    assert!(matches!(result, Err(GenerationError::LocalUnavailable(_))));
    assert_eq!(runtime.created_count(), 0);
}

#[tokio::test]
async fn unsupported_runtime_maps_to_unavailable() {
    let runtime = ScriptedLocalRuntime::new(&["x"])
        .with_availability_error(LocalRuntimeError::Unsupported("no runtime".to_string()));
    let backend = backend(&runtime);
    assert_eq!(backend.probe().await, Availability::Unavailable);
    let result = backend.stream(&[], "hello").await;
    assert!(matches!(result, Err(GenerationError::LocalUnavailable(_))));
}

#[tokio::test]
async fn after_download_is_still_usable() {
    let runtime = ScriptedLocalRuntime::new(&["ok"]).with_availability(Availability::AfterDownload);
    let items = collect(&backend(&runtime), "hello").await;
    assert_eq!(items, vec![Ok("ok".to_string())]);
}

#[tokio::test]
async fn session_creation_failure_is_a_generation_error() {
    let runtime = ScriptedLocalRuntime::new(&["x"])
        .failing_on_create(LocalRuntimeError::Failed("model missing".to_string()));
    let result = backend(&runtime).stream(&[], "hello").await;
    assert!(matches!(result, Err(GenerationError::LocalGeneration { .. })));
    assert_eq!(runtime.destroyed_count(), 0);
}

#[tokio::test]
async fn prompt_includes_context_and_system_prompt() {
    let runtime = ScriptedLocalRuntime::new(&["ok"]);
    let config = LocalConfig::default();
    let backend = LocalBackend::new(Arc::new(runtime.clone()), &config);
    let history = vec![Message::user("What is Rust?")];
    let stream = backend.stream(&history, "And Cargo?").await.expect("stream");
    let _: Vec<_> = stream.collect().await;

    let prompts = runtime.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with(&format!("System: {}", config.preamble)));
    assert!(prompts[0].contains("Context:\nUser: What is Rust?"));
    assert!(prompts[0].ends_with("User: And Cargo?\n\nAssistant:"));
    assert_eq!(runtime.system_prompts(), vec![config.system_prompt.clone()]);
}
