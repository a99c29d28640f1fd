//! Device SDK facade
//!
//! Ties configuration, the REST client and event subscriptions together and
//! applies emulation mode: when the device files are missing, publishes and
//! subscriptions are logged and dropped instead of reaching the network.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{instrument, warn};

use crate::client::{ParticleClient, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT};
use crate::config::{self, ConfigPaths, DeviceConfig, DistroVersions, LoadedConfig};
use crate::error::{ParticleError, Result};
use crate::streaming::SubscriptionHandle;
use crate::types::{DeviceInfo, PublishEndpoint, PublishOutcome, PublishRequest, VersionDetails};

/// Default time-to-live for published events, in seconds
pub const DEFAULT_EVENT_TTL: u32 = 60;

/// Options fixed at construction
#[derive(Debug, Clone)]
pub struct SdkOptions {
    /// Where published events are sent
    pub publish_endpoint: PublishEndpoint,
    /// Timeout for request/response calls (not event streams)
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for SdkOptions {
    fn default() -> Self {
        Self {
            publish_endpoint: PublishEndpoint::default(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Entry point for applications running on a Particle Linux device
///
/// Cheap to clone; configuration is shared read-only.
#[derive(Debug, Clone)]
pub struct ParticleSdk {
    device: Arc<DeviceConfig>,
    distro: Arc<DistroVersions>,
    emulated: bool,
    client: ParticleClient,
    options: SdkOptions,
}

impl ParticleSdk {
    /// Load configuration from `CONFIG_PATH`/`DISTRO_VERSIONS_PATH` or the
    /// default locations
    pub fn load() -> Result<Self> {
        Self::load_from(&ConfigPaths::from_env(), SdkOptions::default())
    }

    /// Load configuration from explicit paths
    pub fn load_from(paths: &ConfigPaths, options: SdkOptions) -> Result<Self> {
        let loaded = config::load(paths)?;
        Self::from_config(loaded, options)
    }

    /// Build the SDK from already-resolved configuration
    pub fn from_config(loaded: LoadedConfig, options: SdkOptions) -> Result<Self> {
        let LoadedConfig {
            device,
            distro,
            emulated,
        } = loaded;

        let client = ParticleClient::with_config(
            &device.api_base_url,
            device.access_token.as_deref(),
            options.timeout,
            options.connect_timeout,
        )?;

        Ok(Self {
            device: Arc::new(device),
            distro: Arc::new(distro),
            emulated,
            client,
            options,
        })
    }

    /// Whether publishes and subscriptions are being dropped
    pub fn is_emulated(&self) -> bool {
        self.emulated
    }

    /// The configured user's email
    pub fn username(&self) -> &str {
        &self.device.username
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device.device_id.as_deref()
    }

    pub fn product_id(&self) -> Option<&str> {
        self.device.product_id.as_deref()
    }

    pub fn device_config(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn distro_versions(&self) -> &DistroVersions {
        &self.distro
    }

    pub fn client(&self) -> &ParticleClient {
        &self.client
    }

    /// Fetch details of this device from the cloud
    ///
    /// In emulation mode there is no real device to look up, so this fails
    /// with [`ParticleError::MissingDeviceId`] without sending a request.
    pub async fn get_device_info(&self) -> Result<DeviceInfo> {
        if self.emulated {
            warn!("Skipping device info lookup in emulation mode");
            return Err(ParticleError::MissingDeviceId);
        }

        let device_id = self.device_id().ok_or(ParticleError::MissingDeviceId)?;
        self.client.get_device_info(device_id).await
    }

    /// Firmware and OS versions from the cloud and the local distro file
    pub async fn get_version_details(&self) -> Result<VersionDetails> {
        let device_info = self.get_device_info().await?;
        Ok(VersionDetails::merge(&device_info, &self.distro))
    }

    /// Publish a private event with the default TTL
    pub async fn publish_event(
        &self,
        event_name: &str,
        data: impl Into<String>,
    ) -> Result<PublishOutcome> {
        self.publish_event_with_ttl(event_name, data, DEFAULT_EVENT_TTL)
            .await
    }

    /// Publish a private event
    ///
    /// In emulation mode nothing is sent and [`PublishOutcome::Dropped`] is
    /// returned.
    #[instrument(skip(self, data))]
    pub async fn publish_event_with_ttl(
        &self,
        event_name: &str,
        data: impl Into<String>,
        ttl: u32,
    ) -> Result<PublishOutcome> {
        let data = data.into();

        if self.emulated {
            warn!(event = %event_name, %data, "Dropping event publish in emulation mode");
            return Ok(PublishOutcome::Dropped);
        }

        let url = self
            .client
            .publish_url(self.options.publish_endpoint, self.product_id())?;
        let request = PublishRequest {
            name: event_name.to_string(),
            data,
            as_device_id: self.device.device_id.clone(),
            private: true,
            ttl,
        };

        self.client
            .publish_event(url, &request)
            .await
            .map(PublishOutcome::Sent)
    }

    /// Subscribe to an event stream
    ///
    /// Waits only for the connection; `handler` then runs on a background task
    /// for each event, in order. In emulation mode an inert handle is returned
    /// and no connection is made.
    pub async fn subscribe<F>(&self, event_name: &str, handler: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(Value) + Send + 'static,
    {
        if self.emulated {
            warn!(event = %event_name, "Dropping event subscription in emulation mode");
            return Ok(SubscriptionHandle::inert(event_name));
        }

        self.client.subscribe(event_name, handler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_config(device_id: Option<&str>) -> LoadedConfig {
        LoadedConfig {
            device: DeviceConfig {
                access_token: Some("tok".into()),
                username: "dev@example.com".into(),
                device_id: device_id.map(String::from),
                product_id: None,
                api_base_url: "http://127.0.0.1:9/v1".into(),
            },
            distro: DistroVersions::empty(),
            emulated: false,
        }
    }

    #[test]
    fn test_accessors() {
        let sdk = ParticleSdk::from_config(live_config(Some("abc")), SdkOptions::default()).unwrap();
        assert_eq!(sdk.username(), "dev@example.com");
        assert_eq!(sdk.device_id(), Some("abc"));
        assert_eq!(sdk.product_id(), None);
        assert!(!sdk.is_emulated());
    }

    #[tokio::test]
    async fn test_missing_device_id_fails_before_any_request() {
        let sdk = ParticleSdk::from_config(live_config(None), SdkOptions::default()).unwrap();

        assert!(matches!(
            sdk.get_device_info().await,
            Err(ParticleError::MissingDeviceId)
        ));
        assert!(matches!(
            sdk.get_version_details().await,
            Err(ParticleError::MissingDeviceId)
        ));
    }

    #[tokio::test]
    async fn test_emulated_sdk_drops_outbound_calls() {
        let sdk = ParticleSdk::from_config(LoadedConfig::emulated(), SdkOptions::default()).unwrap();
        assert!(sdk.is_emulated());
        assert_eq!(sdk.username(), "emulated_user@particle.io");

        let outcome = sdk.publish_event("test_event", "hello").await.unwrap();
        assert!(outcome.is_dropped());

        let handle = sdk.subscribe("test_event", |_| {}).await.unwrap();
        assert!(!handle.is_live());

        // mock_device_id must never reach the cloud
        assert_eq!(sdk.device_id(), Some("mock_device_id"));
        assert!(matches!(
            sdk.get_device_info().await,
            Err(ParticleError::MissingDeviceId)
        ));
    }
}
