use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Terminal outcome of a single availability probe.
///
/// The wire format mirrors the browser client's `ModelTestResult` JSON:
/// boolean flags rather than a tagged enum, camelCase field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub success: bool,
    pub message: String,
    pub response_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub timeout: bool,
    #[serde(default)]
    pub cancelled: bool,
}

/// Classified view over a [`ProbeResult`]'s flags. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    Failed,
    TimedOut,
    Cancelled,
}

impl ProbeResult {
    pub fn success(response_time: u64) -> Self {
        Self {
            success: true,
            message: format!("ok in {:.2}s", response_time as f64 / 1000.0),
            response_time,
            error: None,
            timeout: false,
            cancelled: false,
        }
    }

    pub fn failure(
        response_time: u64,
        message: impl Into<String>,
        error: Option<serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            response_time,
            error,
            timeout: false,
            cancelled: false,
        }
    }

    pub fn timed_out(response_time: u64) -> Self {
        Self {
            success: false,
            message: "request timed out".to_string(),
            response_time,
            error: None,
            timeout: true,
            cancelled: false,
        }
    }

    pub fn cancelled(response_time: u64) -> Self {
        Self {
            success: false,
            message: "test cancelled".to_string(),
            response_time,
            error: None,
            timeout: false,
            cancelled: true,
        }
    }

    /// Flag priority: cancelled > timed out > failed > success.
    pub fn outcome(&self) -> ProbeOutcome {
        if self.cancelled {
            ProbeOutcome::Cancelled
        } else if self.timeout {
            ProbeOutcome::TimedOut
        } else if self.success {
            ProbeOutcome::Success
        } else {
            ProbeOutcome::Failed
        }
    }
}

/// Ordered results of one test run, keyed by model id.
///
/// Insertion order is test order. Re-inserting a model replaces its entry in
/// place instead of appending, so one run never holds two results for the
/// same model.
#[derive(Debug, Clone, Default)]
pub struct TestRun {
    entries: Vec<(String, ProbeResult)>,
}

impl TestRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: impl Into<String>, result: ProbeResult) {
        let model = model.into();
        match self.entries.iter_mut().find(|(id, _)| *id == model) {
            Some((_, existing)) => *existing = result,
            None => self.entries.push((model, result)),
        }
    }

    pub fn get(&self, model: &str) -> Option<&ProbeResult> {
        self.entries
            .iter()
            .find(|(id, _)| id == model)
            .map(|(_, result)| result)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProbeResult)> {
        self.entries
            .iter()
            .map(|(id, result)| (id.as_str(), result))
    }
}

impl Serialize for TestRun {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (model, result) in &self.entries {
            map.serialize_entry(model, result)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TestRun {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RunVisitor;

        impl<'de> Visitor<'de> for RunVisitor {
            type Value = TestRun;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of model id to probe result")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut run = TestRun::new();
                while let Some((model, result)) = access.next_entry::<String, ProbeResult>()? {
                    run.insert(model, result);
                }
                Ok(run)
            }
        }

        deserializer.deserialize_map(RunVisitor)
    }
}

/// Request body for the server-side batch tester endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelTestRequest {
    pub models: Vec<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTestResponse {
    pub results: TestRun,
}
