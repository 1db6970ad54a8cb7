//! Tester behavior against a mock OpenAI-compatible upstream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatgate_probe::{CancellationToken, ProbeRunner};
use chatgate_types::ProbeOutcome;

fn completion_body() -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hi"},
            "finish_reason": "stop"
        }]
    })
}

fn runner(server: &MockServer, timeout: Duration) -> ProbeRunner {
    ProbeRunner::new(server.uri(), "test-key", timeout)
}

fn models(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[tokio::test]
async fn successful_probe_sends_minimal_completion_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4",
            "max_tokens": 1,
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(1)
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let run = runner(&server, Duration::from_secs(5))
        .run(&models(&["gpt-4"]), &token, |_, _, _| {})
        .await;

    let result = run.get("gpt-4").expect("result recorded");
    assert_eq!(result.outcome(), ProbeOutcome::Success);
    assert!(!result.timeout);
    assert!(!result.cancelled);
}

#[tokio::test]
async fn http_error_surfaces_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"message": "The model `nope` does not exist", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let run = runner(&server, Duration::from_secs(5))
        .run(&models(&["nope"]), &token, |_, _, _| {})
        .await;

    let result = run.get("nope").unwrap();
    assert_eq!(result.outcome(), ProbeOutcome::Failed);
    assert!(result.message.contains("does not exist"));
    assert!(result.error.is_some(), "raw error payload kept");
}

#[tokio::test]
async fn unresponsive_upstream_times_out_after_bound() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let timeout = Duration::from_millis(300);
    let token = CancellationToken::new();
    let run = runner(&server, timeout)
        .run(&models(&["slow-model"]), &token, |_, _, _| {})
        .await;

    let result = run.get("slow-model").unwrap();
    assert_eq!(result.outcome(), ProbeOutcome::TimedOut);
    assert!(
        result.response_time >= timeout.as_millis() as u64,
        "measured {}ms, bound {}ms",
        result.response_time,
        timeout.as_millis()
    );
}

#[tokio::test]
async fn precancelled_run_probes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(0)
        .mount(&server)
        .await;

    let callbacks = Arc::new(AtomicUsize::new(0));
    let counter = callbacks.clone();

    let token = CancellationToken::new();
    token.cancel();

    let run = runner(&server, Duration::from_secs(5))
        .run(&models(&["gpt-4", "claude-3"]), &token, move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    assert!(run.is_empty());
    assert_eq!(callbacks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_between_probes_keeps_partial_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(1)
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let cancel_after_first = token.clone();

    let run = runner(&server, Duration::from_secs(5))
        .run(&models(&["first", "second"]), &token, move |_, _, _| {
            cancel_after_first.cancel();
        })
        .await;

    assert_eq!(run.len(), 1);
    assert!(run.get("first").is_some());
    assert!(run.get("second").is_none());
}

#[tokio::test]
async fn midflight_cancel_records_cancelled_without_callback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let callbacks = Arc::new(AtomicUsize::new(0));
    let counter = callbacks.clone();

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let run = runner(&server, Duration::from_secs(10))
        .run(
            &models(&["stuck-model", "never-reached"]),
            &token,
            move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

    assert_eq!(run.len(), 1, "probe after the cancel never starts");
    let result = run.get("stuck-model").unwrap();
    assert_eq!(result.outcome(), ProbeOutcome::Cancelled);
    assert!(
        result.response_time < 10_000,
        "aborted at the signal, not the probe timeout ({}ms)",
        result.response_time
    );
    assert_eq!(callbacks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn duplicate_model_is_probed_twice_but_replaces_entry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .expect(2)
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let run = runner(&server, Duration::from_secs(5))
        .run(&models(&["gpt-4", "gpt-4"]), &token, |_, _, _| {})
        .await;

    assert_eq!(run.len(), 1, "second probe replaces, never appends");
    assert!(run.get("gpt-4").unwrap().success);
}

#[tokio::test]
async fn stream_yields_results_in_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let probe_runner = runner(&server, Duration::from_secs(5));
    let model_list = models(&["b-model", "a-model"]);

    let yielded: Vec<String> = probe_runner
        .stream(&model_list, &token)
        .map(|(model, _)| model)
        .collect()
        .await;

    assert_eq!(yielded, vec!["b-model", "a-model"]);
}

#[tokio::test]
async fn callback_sees_accumulated_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
        .mount(&server)
        .await;

    let seen = Arc::new(AtomicUsize::new(0));
    let sizes = seen.clone();

    let token = CancellationToken::new();
    runner(&server, Duration::from_secs(5))
        .run(&models(&["one", "two"]), &token, move |model, result, all| {
            assert!(result.success);
            assert!(all.get(model).is_some(), "callback run includes own entry");
            sizes.store(all.len(), Ordering::SeqCst);
        })
        .await;

    assert_eq!(seen.load(Ordering::SeqCst), 2);
}
