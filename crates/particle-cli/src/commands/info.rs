//! Identity and device detail commands

use anyhow::Result;
use particle_client::ParticleSdk;

use crate::output::OutputContext;

/// Show the configured user and device identity
pub fn whoami(sdk: &ParticleSdk, ctx: &OutputContext) -> Result<()> {
    let mode = if sdk.is_emulated() { "emulated" } else { "live" };

    ctx.print_kv(&[
        ("Username", sdk.username()),
        ("Device ID", sdk.device_id().unwrap_or("-")),
        ("Product ID", sdk.product_id().unwrap_or("-")),
        ("API", sdk.client().base_url().as_str()),
        ("Mode", mode),
    ]);
    Ok(())
}

/// Show the device record from the cloud
pub async fn info(sdk: &ParticleSdk, ctx: &OutputContext) -> Result<()> {
    let device = sdk.get_device_info().await?;
    ctx.print_json(device.as_value());
    Ok(())
}

/// Show firmware and OS versions
pub async fn versions(sdk: &ParticleSdk, ctx: &OutputContext) -> Result<()> {
    let details = sdk.get_version_details().await?;
    ctx.print_kv(&details.fields());
    Ok(())
}
