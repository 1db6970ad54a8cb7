use std::time::Duration;

use futures::stream::{self, Stream};
use reqwest::Client;

use chatgate_types::{ProbeResult, TestRun};

use crate::cancel::CancellationToken;
use crate::probe::{probe_model, ProbeTarget};

/// Settle delay between consecutive probes, so callers consuming incremental
/// results can apply state before the next one lands.
pub const INTER_PROBE_DELAY: Duration = Duration::from_millis(10);

/// Sequential multi-model availability tester.
///
/// Probes strictly one at a time in input order. Sequential on purpose:
/// it keeps provider rate limits calm and makes cancellation take effect at
/// a probe boundary instead of tearing down many in-flight requests.
pub struct ProbeRunner {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl ProbeRunner {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    fn target(&self, model: &str) -> ProbeTarget {
        ProbeTarget::new(model, &self.base_url, &self.api_key, self.timeout)
    }

    /// Probe each model in order, invoking `on_result` as each outcome lands.
    ///
    /// Cancellation is polled before each probe: a token fired between probes
    /// stops the loop and returns the partial results collected so far. A
    /// token fired mid-probe aborts that probe, which is recorded as
    /// cancelled; no callback fires for it. Duplicate ids are probed again
    /// and replace their earlier entry.
    pub async fn run<F>(
        &self,
        models: &[String],
        token: &CancellationToken,
        mut on_result: F,
    ) -> TestRun
    where
        F: FnMut(&str, &ProbeResult, &TestRun),
    {
        let mut run = TestRun::new();

        for model in models {
            if token.is_cancelled() {
                break;
            }

            let result = probe_model(&self.client, &self.target(model), token).await;
            run.insert(model.clone(), result.clone());

            if !token.is_cancelled() {
                on_result(model, &result, &run);
                tokio::time::sleep(INTER_PROBE_DELAY).await;
            }
        }

        run
    }

    /// Lazy variant of [`run`](Self::run): an ordered, finite stream of
    /// `(model, result)` pairs. Not restartable; a new run starts from the
    /// beginning with a fresh stream.
    pub fn stream<'a>(
        &'a self,
        models: &'a [String],
        token: &'a CancellationToken,
    ) -> impl Stream<Item = (String, ProbeResult)> + 'a {
        stream::unfold(0usize, move |index| async move {
            if index > 0 {
                tokio::time::sleep(INTER_PROBE_DELAY).await;
            }
            if token.is_cancelled() {
                return None;
            }
            let model = models.get(index)?;
            let result = probe_model(&self.client, &self.target(model), token).await;
            Some(((model.clone(), result), index + 1))
        })
    }
}
