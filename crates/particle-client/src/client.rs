//! Particle cloud HTTP client implementation

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{ParticleError, Result};
use crate::streaming::SubscriptionHandle;
use crate::types::*;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Particle cloud REST API client
///
/// Every request carries the device's bearer token when one is configured.
/// The underlying `reqwest::Client` has only a connect timeout; the request
/// timeout is applied per call so event streams can stay open indefinitely.
#[derive(Debug, Clone)]
pub struct ParticleClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl ParticleClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - API base URL (e.g., "https://api.particle.io/v1")
    /// * `access_token` - Bearer token, if the device has one
    pub fn new(base_url: &str, access_token: Option<&str>) -> Result<Self> {
        Self::with_config(base_url, access_token, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a new client with custom timeouts
    pub fn with_config(
        base_url: &str,
        access_token: Option<&str>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = access_token {
            let mut header_value =
                reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ParticleError::Parse(format!("Invalid auth token: {}", e)))?;
            header_value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, header_value);
        }

        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .default_headers(headers)
            .build()?;

        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ParticleError::InvalidUrl(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get a reference to the underlying HTTP client.
    ///
    /// Useful for making custom requests while reusing the client's
    /// connection pool and default headers (e.g., bearer token).
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Build `{base}/{segments...}`, percent-encoding each segment
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ParticleError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// Fetch details of a device
    #[instrument(skip(self))]
    pub async fn get_device_info(&self, device_id: &str) -> Result<DeviceInfo> {
        let url = self.endpoint(&["devices", device_id])?;
        debug!("Fetching device info from {}", url);

        let response = self.client.get(url).timeout(self.timeout).send().await?;
        self.handle_response(response).await.map(DeviceInfo::new)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// URL that publishes go to for the given strategy
    pub fn publish_url(&self, endpoint: PublishEndpoint, product_id: Option<&str>) -> Result<Url> {
        match (endpoint, product_id) {
            (PublishEndpoint::Device, _) | (PublishEndpoint::Auto, None) => {
                self.endpoint(&["devices", "events"])
            }
            (PublishEndpoint::Product, Some(product)) | (PublishEndpoint::Auto, Some(product)) => {
                self.endpoint(&["products", product, "events"])
            }
            (PublishEndpoint::Product, None) => Err(ParticleError::MissingProductId),
        }
    }

    /// Publish an event and return the server's response body unchanged
    #[instrument(skip(self, request), fields(event = %request.name, ttl = request.ttl))]
    pub async fn publish_event(&self, url: Url, request: &PublishRequest) -> Result<Value> {
        debug!("Publishing event to {}", url);

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .form(request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// URL of the event stream for `event_name`
    pub fn stream_url(&self, event_name: &str) -> Result<Url> {
        self.endpoint(&["devices", "events", event_name])
    }

    /// Open the event stream for `event_name` and deliver events to `handler`
    ///
    /// Returns once the connection is established; see [`SubscriptionHandle`].
    #[instrument(skip(self, handler))]
    pub async fn subscribe<F>(&self, event_name: &str, handler: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(Value) + Send + 'static,
    {
        let url = self.stream_url(event_name)?;
        debug!("Connecting to event stream: {}", url);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/x-ndjson, text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.extract_error_from_status(response, status).await);
        }

        Ok(SubscriptionHandle::spawn(
            event_name,
            response.bytes_stream(),
            handler,
        ))
    }

    // =========================================================================
    // Helper Methods
    // =========================================================================

    /// Handle response and deserialize JSON
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ParticleError::Parse(e.to_string()))
        } else {
            Err(self.extract_error_from_status(response, status).await)
        }
    }

    async fn extract_error_from_status(
        &self,
        response: reqwest::Response,
        status: StatusCode,
    ) -> ParticleError {
        // Try to parse error response body
        let message = response
            .json::<ErrorResponse>()
            .await
            .ok()
            .and_then(|body| body.message())
            .unwrap_or_else(|| format!("HTTP {}", status));

        ParticleError::server_error(status.as_u16(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ParticleClient::new("https://api.particle.io/v1", Some("tok"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_url() {
        assert!(ParticleClient::new("not a url", None).is_err());
        assert!(ParticleClient::new("mailto:dev@example.com", None).is_err());
    }

    #[test]
    fn test_invalid_token_rejected() {
        let result = ParticleClient::new("https://api.particle.io/v1", Some("bad\ntoken"));
        assert!(matches!(result, Err(ParticleError::Parse(_))));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = ParticleClient::new("https://api.particle.io/v1", None).unwrap();
        assert_eq!(
            client.endpoint(&["devices", "abc"]).unwrap().as_str(),
            "https://api.particle.io/v1/devices/abc"
        );

        let slashed = ParticleClient::new("https://api.particle.io/v1/", None).unwrap();
        assert_eq!(
            slashed.endpoint(&["devices", "abc"]).unwrap().as_str(),
            "https://api.particle.io/v1/devices/abc"
        );
    }

    #[test]
    fn test_stream_url_encodes_event_name() {
        let client = ParticleClient::new("http://localhost:9080/v1", None).unwrap();
        let url = client.stream_url("sensor/temp 1").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9080/v1/devices/events/sensor%2Ftemp%201"
        );
    }

    #[test]
    fn test_publish_url_strategies() {
        let client = ParticleClient::new("http://localhost:9080/v1", None).unwrap();

        assert_eq!(
            client
                .publish_url(PublishEndpoint::Auto, Some("1234"))
                .unwrap()
                .path(),
            "/v1/products/1234/events"
        );
        assert_eq!(
            client.publish_url(PublishEndpoint::Auto, None).unwrap().path(),
            "/v1/devices/events"
        );
        assert_eq!(
            client
                .publish_url(PublishEndpoint::Device, Some("1234"))
                .unwrap()
                .path(),
            "/v1/devices/events"
        );
        assert!(matches!(
            client.publish_url(PublishEndpoint::Product, None),
            Err(ParticleError::MissingProductId)
        ));
    }
}
