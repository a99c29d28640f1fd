//! Subscribe command - print events until Ctrl+C

use anyhow::Result;
use particle_client::{ParticleSdk, SubscriptionEnd};

use crate::output::{OutputContext, OutputFormat};

/// Print every event received on `name` until interrupted or the stream ends
pub async fn subscribe(sdk: &ParticleSdk, name: &str, ctx: &OutputContext) -> Result<()> {
    let format = ctx.format;
    let mut subscription = sdk
        .subscribe(name, move |event| match format {
            OutputFormat::Json => println!("{}", event),
            OutputFormat::Table => println!("Received event: {}", event),
        })
        .await?;

    if !subscription.is_live() {
        ctx.warn(&format!("Emulation mode: not subscribed to '{}'", name));
        return Ok(());
    }

    ctx.info(&format!("Subscribed to '{}'", name));
    ctx.info("Press Ctrl+C to stop");

    let mut errors = subscription.take_errors();
    let canceller = subscription.canceller();
    let mut closed = Box::pin(subscription.closed());
    let mut interrupted = false;

    let end = loop {
        tokio::select! {
            end = &mut closed => break end,
            Some(e) = async { errors.as_mut()?.recv().await } => {
                ctx.error(&format!("Delivery error: {}", e));
            }
            result = tokio::signal::ctrl_c(), if !interrupted => {
                result?;
                interrupted = true;
                ctx.info("\nStopping subscription...");
                canceller.cancel();
            }
        }
    };

    match end {
        SubscriptionEnd::Cancelled => ctx.success("Subscription cancelled"),
        SubscriptionEnd::StreamEnded => ctx.info("Stream ended"),
        SubscriptionEnd::Failed(e) => ctx.error(&format!("Stream error: {}", e)),
        SubscriptionEnd::Aborted(reason) => ctx.error(&format!("Subscription aborted: {}", reason)),
        SubscriptionEnd::Inert => {}
    }
    Ok(())
}
