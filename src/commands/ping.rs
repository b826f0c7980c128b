//! `loago instruct --config <file> ping`

use std::path::Path;

use anyhow::Context;

use crate::instructor::InstructorConfig;

use super::build_client;

/// Connects to every worker, pings each in turn, then disconnects. Returns an
/// error on the first worker that fails to respond.
pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let cfg = InstructorConfig::load(config_path).context("cannot load instructor config")?;
    let mut client = build_client(&cfg)?;

    client.connect(std::time::Duration::from_secs(5)).await?;
    let result = client.ping().await;
    client.disconnect();

    result.context("cannot ping every worker")?;
    Ok(())
}
