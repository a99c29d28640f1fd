//! Test utilities for particle-client
//!
//! Provides a throwaway HTTP server and a recording mock of the Particle
//! cloud endpoints the SDK talks to.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::config::{DeviceConfig, DistroVersions, LoadedConfig};
use crate::error::Result;
use crate::sdk::{ParticleSdk, SdkOptions};

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve `router` on an ephemeral local port
    ///
    /// # Example
    ///
    /// ```ignore
    /// use particle_client::testing::{MockCloud, TestServer};
    ///
    /// let cloud = MockCloud::new().with_stream("temp", &["{\"v\":1}\n"]);
    /// let server = TestServer::start(cloud.router()).await?;
    /// let sdk = server.sdk(server.device_config(Some("dev1"), None))?;
    /// ```
    pub async fn start(router: Router) -> Result<Self> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        // Spawn the server
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// API base URL as it would appear in a device config file
    pub fn api_base_url(&self) -> String {
        format!("{}/v1", self.base_url())
    }

    /// A device config pointing at this server
    pub fn device_config(&self, device_id: Option<&str>, product_id: Option<&str>) -> DeviceConfig {
        DeviceConfig {
            access_token: Some(MockCloud::ACCESS_TOKEN.to_string()),
            username: "test@particle.io".to_string(),
            device_id: device_id.map(String::from),
            product_id: product_id.map(String::from),
            api_base_url: self.api_base_url(),
        }
    }

    /// An SDK in live mode talking to this server
    pub fn sdk(&self, device: DeviceConfig) -> Result<ParticleSdk> {
        self.sdk_with(device, DistroVersions::empty(), false)
    }

    /// An SDK with explicit distro document and emulation flag
    pub fn sdk_with(
        &self,
        device: DeviceConfig,
        distro: DistroVersions,
        emulated: bool,
    ) -> Result<ParticleSdk> {
        ParticleSdk::from_config(
            LoadedConfig {
                device,
                distro,
                emulated,
            },
            SdkOptions::default(),
        )
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal if not already done
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Abort the task if still running
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// A request the mock cloud received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    /// Raw (percent-encoded) request path
    pub path: String,
    pub authorization: Option<String>,
    /// Decoded form body, for publishes
    pub form: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct StreamScript {
    chunks: Vec<Bytes>,
    hold_open: bool,
}

#[derive(Debug, Default)]
struct MockCloudState {
    requests: Mutex<Vec<RecordedRequest>>,
    devices: Mutex<HashMap<String, Value>>,
    streams: Mutex<HashMap<String, StreamScript>>,
    publish_response: Mutex<Option<Value>>,
}

/// Recording mock of the Particle cloud API, mounted under `/v1`
#[derive(Debug, Clone, Default)]
pub struct MockCloud {
    state: Arc<MockCloudState>,
}

impl MockCloud {
    /// Token handed out by [`TestServer::device_config`]
    pub const ACCESS_TOKEN: &'static str = "test_access_token";

    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `info` for `GET /devices/{device_id}`
    pub fn with_device(self, device_id: &str, info: Value) -> Self {
        self.state.devices.lock().insert(device_id.to_string(), info);
        self
    }

    /// Stream `chunks` for `event_name`, then close the connection
    pub fn with_stream(self, event_name: &str, chunks: &[&str]) -> Self {
        self.add_stream(event_name, chunks, false)
    }

    /// Stream `chunks` for `event_name`, then keep the connection open
    pub fn with_open_stream(self, event_name: &str, chunks: &[&str]) -> Self {
        self.add_stream(event_name, chunks, true)
    }

    /// Body returned for publishes (defaults to `{"ok": true}`)
    pub fn with_publish_response(self, body: Value) -> Self {
        *self.state.publish_response.lock() = Some(body);
        self
    }

    fn add_stream(self, event_name: &str, chunks: &[&str], hold_open: bool) -> Self {
        let script = StreamScript {
            chunks: chunks
                .iter()
                .map(|c| Bytes::copy_from_slice(c.as_bytes()))
                .collect(),
            hold_open,
        };
        self.state
            .streams
            .lock()
            .insert(event_name.to_string(), script);
        self
    }

    /// All requests received so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().len()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/devices/{device_id}", get(device_info))
            .route("/v1/devices/events", post(publish))
            .route("/v1/devices/events/{event_name}", get(event_stream))
            .route("/v1/products/{product_id}/events", post(publish))
            .with_state(self.clone())
    }

    fn record(&self, method: &Method, uri: &Uri, headers: &HeaderMap, form: HashMap<String, String>) {
        let authorization = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        self.state.requests.lock().push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            authorization,
            form,
        });
    }
}

async fn device_info(
    State(cloud): State<MockCloud>,
    Path(device_id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    cloud.record(&method, &uri, &headers, HashMap::new());

    match cloud.state.devices.lock().get(&device_id) {
        Some(info) => Json(info.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": "Permission Denied", "info": "I didn't recognize that device name or ID"})),
        )
            .into_response(),
    }
}

async fn publish(
    State(cloud): State<MockCloud>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    cloud.record(&method, &uri, &headers, form);

    let body = cloud
        .state
        .publish_response
        .lock()
        .clone()
        .unwrap_or_else(|| json!({"ok": true}));
    Json(body).into_response()
}

async fn event_stream(
    State(cloud): State<MockCloud>,
    Path(event_name): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    cloud.record(&method, &uri, &headers, HashMap::new());

    let Some(script) = cloud.state.streams.lock().get(&event_name).cloned() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": "No such event stream"})),
        )
            .into_response();
    };

    let chunks = stream::iter(script.chunks.into_iter().map(Ok::<_, Infallible>));
    let body = if script.hold_open {
        Body::from_stream(chunks.chain(stream::pending()))
    } else {
        Body::from_stream(chunks)
    };

    Response::builder()
        .header(axum::http::header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_base_url_reaches_server() {
        let cloud = MockCloud::new().with_device("dev1", json!({"id": "dev1"}));
        let server = TestServer::start(cloud.router()).await.unwrap();

        let base_url = server.base_url();
        assert_eq!(base_url, format!("http://127.0.0.1:{}", server.addr.port()));

        let body: Value = reqwest::get(format!("{}/v1/devices/dev1", base_url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"id": "dev1"}));
        assert_eq!(cloud.request_count(), 1);
    }

    #[tokio::test]
    async fn test_device_config_points_at_server() {
        let server = TestServer::start(MockCloud::new().router()).await.unwrap();
        let config = server.device_config(Some("dev1"), Some("42"));

        assert_eq!(config.api_base_url, format!("http://{}/v1", server.addr));
        assert_eq!(config.access_token.as_deref(), Some(MockCloud::ACCESS_TOKEN));
        server.shutdown().await;
    }
}
