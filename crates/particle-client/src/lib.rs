//! Particle Linux Device SDK
//!
//! Loads the device's identity from the files written at provisioning time,
//! talks to the Particle cloud API on its behalf, publishes events and
//! delivers subscribed events to a handler on a background task.
//!
//! # Example
//!
//! ```rust,no_run
//! use particle_client::ParticleSdk;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sdk = ParticleSdk::load()?;
//!
//!     println!("User: {}", sdk.username());
//!     println!("Versions: {:?}", sdk.get_version_details().await?);
//!
//!     // Publish a private event (dropped in emulation mode)
//!     sdk.publish_event("temperature", "21.5").await?;
//!
//!     // Handle incoming events on a background task
//!     let subscription = sdk
//!         .subscribe("temperature", |event| println!("event: {}", event))
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     subscription.cancel();
//!     Ok(())
//! }
//! ```
//!
//! # Emulation Mode
//!
//! If either the device config file or the distro versions file is missing,
//! the SDK substitutes fixed mock values and turns every publish and
//! subscribe into a logged no-op, so applications can be developed off
//! device.
//!
//! # Testing
//!
//! The `testing` module provides a recording mock of the cloud API:
//!
//! ```rust,ignore
//! use particle_client::testing::{MockCloud, TestServer};
//!
//! let cloud = MockCloud::new().with_stream("temp", &["{\"v\":1}\n"]);
//! let server = TestServer::start(cloud.router()).await?;
//! let sdk = server.sdk(server.device_config(Some("dev1"), None))?;
//! ```

mod client;
pub mod config;
mod error;
mod sdk;
pub mod streaming;
pub mod testing;
mod types;

pub use client::{ParticleClient, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT};
pub use config::{ConfigPaths, DeviceConfig, DistroVersions, LoadedConfig};
pub use error::{ParticleError, Result};
pub use sdk::{ParticleSdk, SdkOptions, DEFAULT_EVENT_TTL};
pub use types::*;

// Re-export streaming types for convenience
pub use streaming::{
    DeliveryError, DeliveryStats, SubscriptionCanceller, SubscriptionEnd, SubscriptionHandle,
};
