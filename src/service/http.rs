use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use ureq::Agent;

use crate::error::ServiceError;
use crate::model::Dataset;

use super::{
    InferenceRequest, InferenceService, ReductionRequest, ReductionResponse, ReductionService,
};

pub const MAX_TEXT_CHARS: usize = 10_000;
const MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;

fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Accepts either a bare payload or a `{success, data, error}` envelope.
fn unwrap_envelope<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ServiceError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Some(success) = value.get("success").and_then(Value::as_bool) else {
        return Ok(serde_json::from_value(value)?);
    };

    if !success {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(ServiceError::Rejected(message.to_owned()));
    }

    let data = value
        .get("data")
        .cloned()
        .ok_or_else(|| ServiceError::Decode("envelope without data".into()))?;
    Ok(serde_json::from_value(data)?)
}

fn post_json<Req, Resp>(agent: &Agent, url: &str, body: &Req) -> Result<Resp, ServiceError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let body_bytes = serde_json::to_vec(body)?;
    let mut response = agent
        .post(url)
        .header("Content-Type", "application/json")
        .send(&body_bytes)?;

    let status = response.status().as_u16();
    let response_bytes = response
        .body_mut()
        .with_config()
        .limit(MAX_BODY_BYTES)
        .read_to_vec()?;
    debug!(url, status, bytes = response_bytes.len(), "service responded");

    let decoded = unwrap_envelope(&response_bytes);
    if !(200..300).contains(&status) {
        return Err(match decoded {
            Err(ServiceError::Rejected(message)) => ServiceError::Rejected(message),
            _ => ServiceError::Status(status),
        });
    }
    decoded
}

pub struct HttpInferenceClient {
    agent: Agent,
    url: String,
}

impl HttpInferenceClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            url: url.into(),
        }
    }
}

impl InferenceService for HttpInferenceClient {
    fn infer(&self, request: &InferenceRequest) -> Result<Dataset, ServiceError> {
        if request.text.trim().is_empty() {
            return Err(ServiceError::Rejected("no text provided".into()));
        }
        if request.text.chars().count() > MAX_TEXT_CHARS {
            return Err(ServiceError::Rejected(format!(
                "text too long (max {MAX_TEXT_CHARS} characters)"
            )));
        }

        let dataset: Dataset = post_json(&self.agent, &self.url, request)?;
        info!(
            model = dataset.model_name(),
            tokens = dataset.token_count(),
            "inference completed"
        );
        Ok(dataset)
    }
}

pub struct HttpReductionClient {
    agent: Agent,
    url: String,
}

impl HttpReductionClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            url: url.into(),
        }
    }
}

impl ReductionService for HttpReductionClient {
    fn reduce(&self, request: &ReductionRequest) -> Result<ReductionResponse, ServiceError> {
        post_json(&self.agent, &self.url, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_payload_passes_through() {
        let response: ReductionResponse =
            unwrap_envelope(br#"{"coordinates": [[1.0, 2.0]]}"#).expect("decode");
        assert_eq!(response.coordinates, vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn envelope_is_unwrapped() {
        let response: ReductionResponse =
            unwrap_envelope(br#"{"success": true, "data": {"coordinates": []}}"#).expect("decode");
        assert!(response.coordinates.is_empty());
    }

    #[test]
    fn reduction_stats_are_decoded_when_present() {
        let response: ReductionResponse = unwrap_envelope(
            br#"{"success": true, "data": {
                "coordinates": [[0.1, 0.2, 0.3]],
                "method": "pca",
                "original_dim": 768,
                "stats": {"distance_correlation": 0.5, "n_tokens": 1, "original_dim": 768, "reduced_dim": 3}
            }}"#,
        )
        .expect("decode");
        assert_eq!(response.original_dim, Some(768));
        let stats = response.stats.expect("stats");
        assert_eq!(stats.distance_correlation, Some(0.5));
        assert_eq!(stats.reduced_dim, Some(3));
    }

    #[test]
    fn failed_envelope_is_rejected() {
        let error = unwrap_envelope::<ReductionResponse>(
            br#"{"success": false, "error": "model not loaded"}"#,
        )
        .expect_err("rejected");
        assert!(matches!(error, ServiceError::Rejected(message) if message == "model not loaded"));

        let error = unwrap_envelope::<ReductionResponse>(b"not json").expect_err("decode error");
        assert!(matches!(error, ServiceError::Decode(_)));
    }
}
