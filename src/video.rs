//! Video stream registry client
//!
//! Thin HTTP wrapper around the backend's `/video/*` endpoints. Stateless:
//! no caching, no retries.

use std::time::Duration;

use reqwest::{Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Header carrying the device API key
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Error, Debug)]
pub enum VideoError {
    /// Backend unreachable, failing, or answering with an unexpected body
    #[error("video backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No stream registered for the requested device
    #[error("no stream registered for {0}")]
    NotFound(String),

    /// Client could not be set up (bad base URL, TLS backend failure)
    #[error("video client setup failed: {0}")]
    Setup(String),
}

impl From<reqwest::Error> for VideoError {
    fn from(err: reqwest::Error) -> Self {
        VideoError::BackendUnavailable(err.to_string())
    }
}

/// Stream record as listed by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub device_id: String,
    pub stream_url: String,
    pub stream_type: String,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    device_id: &'a str,
    stream_url: &'a str,
    stream_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    stream_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUrlResponse {
    stream_url: String,
}

#[derive(Debug, Clone)]
pub struct VideoStreamClient {
    base_url: String,
    base: Url,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl VideoStreamClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, VideoError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| VideoError::Setup(format!("HTTP client: {e}")))?;

        Self::with_http_client(base_url, api_key, http)
    }

    pub fn with_http_client(
        base_url: impl Into<String>,
        api_key: Option<String>,
        http: reqwest::Client,
    ) -> Result<Self, VideoError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| VideoError::Setup(format!("invalid base URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(VideoError::Setup(format!("base URL '{base_url}' cannot carry a path")));
        }

        Ok(Self {
            base_url,
            base,
            api_key,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register a stream for a device and return its registry id
    ///
    /// Backends that do not assign ids key streams by device, so the device
    /// id is returned in that case.
    pub async fn register_stream(
        &self,
        device_id: &str,
        stream_url: &str,
        stream_type: &str,
    ) -> Result<String, VideoError> {
        let request = RegisterRequest {
            device_id,
            stream_url,
            stream_type,
        };
        let response = self
            .authorized(self.http.post(self.endpoint(&["video", "register"])))
            .json(&request)
            .send()
            .await?;

        let body: RegisterResponse = decode(check(response, device_id)?).await?;
        let stream_id = body.stream_id.unwrap_or_else(|| device_id.to_string());
        debug!(device_id, stream_id = %stream_id, "Registered video stream");
        Ok(stream_id)
    }

    pub async fn list_streams(&self) -> Result<Vec<StreamDescriptor>, VideoError> {
        let response = self
            .authorized(self.http.get(self.endpoint(&["video", "streams"])))
            .send()
            .await?;

        decode(check(response, "streams")?).await
    }

    /// Resolve the playable URL registered for a device
    pub async fn get_stream_url(&self, device_id: &str) -> Result<String, VideoError> {
        let url = self.endpoint(&["video", "stream-proxy", device_id]);
        let response = self.authorized(self.http.get(url)).send().await?;

        let body: StreamUrlResponse = decode(check(response, device_id)?).await?;
        Ok(body.stream_url)
    }

    /// Base URL extended by `segments`, each percent-encoded as one segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

fn check(response: Response, subject: &str) -> Result<Response, VideoError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(VideoError::NotFound(subject.to_string())),
        status => Err(VideoError::BackendUnavailable(format!(
            "{} returned {}",
            response.url().path(),
            status
        ))),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, VideoError> {
    response
        .json::<T>()
        .await
        .map_err(|e| VideoError::BackendUnavailable(format!("invalid response body: {e}")))
}
