use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::errors::BridgeError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a hosted detection endpoint.
///
/// The endpoint takes the base64 image as a form-encoded POST body at
/// `{base_url}/{model_id}`, keyed by an `api_key` query parameter, and
/// answers with a JSON object holding a `predictions` list.
pub struct RemoteDetector {
    http: Client,
    base_url: String,
    model_id: String,
    api_key: String,
}

impl RemoteDetector {
    pub fn new(
        base_url: impl Into<String>,
        model_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, BridgeError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(BridgeError::ClientBuild)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            base_url,
            model_id: model_id.into(),
            api_key: api_key.into(),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Sends one encoded image and returns the prediction list.
    ///
    /// The raw image bytes go out, not the decoded pixels: the remote
    /// service runs its own pipeline on the original file.
    #[tracing::instrument(skip(self, image_bytes), fields(model = %self.model_id))]
    pub async fn detect(&self, image_bytes: &[u8]) -> Result<Value, BridgeError> {
        let url = format!("{}/{}", self.base_url, self.model_id);
        let body = B64.encode(image_bytes);

        let response = self
            .http
            .post(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(BridgeError::Unreachable)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BridgeError::Unauthorized);
        }
        if !status.is_success() {
            return Err(BridgeError::Status(status));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(BridgeError::MalformedResponse)?;
        let predictions = payload
            .get("predictions")
            .cloned()
            .ok_or(BridgeError::MissingPredictions)?;

        tracing::debug!(
            predictions = predictions.as_array().map(Vec::len).unwrap_or(0),
            "remote detection complete"
        );

        Ok(predictions)
    }
}
