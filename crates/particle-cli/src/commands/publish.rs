//! Publish command

use anyhow::Result;
use particle_client::{ParticleSdk, PublishOutcome};

use crate::output::OutputContext;

/// Publish a private event
pub async fn publish(
    sdk: &ParticleSdk,
    name: &str,
    data: &str,
    ttl: u32,
    ctx: &OutputContext,
) -> Result<()> {
    match sdk.publish_event_with_ttl(name, data, ttl).await? {
        PublishOutcome::Sent(response) => {
            ctx.success(&format!("Published '{}'", name));
            ctx.print_json(&response);
        }
        PublishOutcome::Dropped => {
            ctx.warn(&format!("Emulation mode: '{}' was not sent", name));
        }
    }
    Ok(())
}
