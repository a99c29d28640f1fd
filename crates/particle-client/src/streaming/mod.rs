//! Event stream subscriptions
//!
//! A subscription holds one streaming `GET /devices/events/{name}` open and
//! hands every newline-delimited JSON event to a handler on a background
//! task.
//!
//! # Example
//!
//! ```no_run
//! use particle_client::ParticleSdk;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sdk = ParticleSdk::load()?;
//!
//! let mut subscription = sdk
//!     .subscribe("temperature", |event| println!("received: {}", event))
//!     .await?;
//!
//! // Malformed lines and handler panics show up here instead of killing delivery
//! if let Some(mut errors) = subscription.take_errors() {
//!     tokio::spawn(async move {
//!         while let Some(e) = errors.recv().await {
//!             eprintln!("delivery error: {}", e);
//!         }
//!     });
//! }
//!
//! // Explicit stop; dropping the handle would leave delivery running
//! subscription.cancel();
//! let end = subscription.closed().await;
//! println!("subscription ended: {:?}", end);
//! # Ok(())
//! # }
//! ```

mod parser;
mod subscription;
mod types;

pub use parser::LineParser;
pub use subscription::{SubscriptionCanceller, SubscriptionHandle};
pub use types::{DeliveryError, DeliveryStats, SubscriptionEnd};
