use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{json, Value};

use chatgate_types::ProbeResult;

use crate::cancel::CancellationToken;

/// One bounded-time availability check. Immutable once built.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl ProbeTarget {
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }
}

struct ProbeFailure {
    message: String,
    raw: Option<Value>,
}

/// Send a minimal completion request and classify the outcome.
///
/// Outcome priority when several conditions race: cancelled, then timed out,
/// then the request's own result. Response time is measured on every path,
/// timeouts and cancellations included.
pub async fn probe_model(
    client: &Client,
    target: &ProbeTarget,
    token: &CancellationToken,
) -> ProbeResult {
    let started = Instant::now();
    let request = send_probe(client, target);
    tokio::pin!(request);

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => ProbeResult::cancelled(elapsed_ms(started)),
        _ = tokio::time::sleep(target.timeout) => ProbeResult::timed_out(elapsed_ms(started)),
        outcome = &mut request => match outcome {
            Ok(()) => ProbeResult::success(elapsed_ms(started)),
            Err(failure) => ProbeResult::failure(elapsed_ms(started), failure.message, failure.raw),
        },
    };

    tracing::debug!(
        model = %target.model,
        success = result.success,
        timeout = result.timeout,
        cancelled = result.cancelled,
        response_time_ms = result.response_time,
        "probe finished"
    );
    result
}

async fn send_probe(client: &Client, target: &ProbeTarget) -> Result<(), ProbeFailure> {
    let body = json!({
        "model": target.model,
        "messages": [{"role": "user", "content": "Hello!"}],
        "max_tokens": 1,
        "stream": false,
    });

    let response = client
        .post(target.url())
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", target.api_key))
        .json(&body)
        .send()
        .await
        .map_err(|e| ProbeFailure {
            message: format!("request error: {e}"),
            raw: None,
        })?;

    let status = response.status();
    if !status.is_success() {
        let payload = response.json::<Value>().await.ok();
        let message = payload
            .as_ref()
            .and_then(|v| v["error"]["message"].as_str())
            .map(|msg| msg.to_string())
            .unwrap_or_else(|| status.to_string());
        return Err(ProbeFailure {
            message: format!("test failed: {message}"),
            raw: payload,
        });
    }

    // A 2xx with an unparseable body is still a failure; availability means
    // the model answered with a well-formed completion.
    response.json::<Value>().await.map_err(|e| ProbeFailure {
        message: format!("malformed response: {e}"),
        raw: None,
    })?;

    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
