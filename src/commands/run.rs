//! `loago instruct --config <file> run [--result <path>]`

use std::{path::Path, time::Duration};

use anyhow::Context;

use crate::{
    backend::FileDataBackend,
    instructor::{controller, InstructorConfig},
    service::Endpoint,
};

use super::build_client;

pub async fn run(config_path: &Path, result_override: Option<&Path>) -> anyhow::Result<()> {
    let cfg = InstructorConfig::load(config_path).context("cannot load instructor config")?;
    let mut client = build_client(&cfg)?;

    let result_path = result_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(&cfg.resultfile).to_path_buf());
    let mut backend = FileDataBackend::new(&result_path)
        .with_context(|| format!("cannot open result file '{}'", result_path.display()))?;

    let endpoints: Vec<Endpoint> = cfg
        .endpoints
        .iter()
        .map(|e| Endpoint { url: e.url.clone(), weight: e.weight })
        .collect();

    controller::run_to_completion(
        &mut client,
        endpoints,
        cfg.amount,
        Duration::from_millis(cfg.minwait),
        Duration::from_millis(cfg.maxwait),
        &mut backend,
    )
    .await
    .context("run failed")?;

    Ok(())
}
