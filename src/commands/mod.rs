//! Command dispatch: translates parsed CLI arguments into calls against the
//! instructor and worker building blocks.

pub mod ping;
pub mod run;
pub mod serve;

use anyhow::Context;

use crate::instructor::{Client, InstructorConfig, WorkerDescriptor};

/// Builds a [`Client`] with every worker from `cfg` registered, reading each
/// worker's certificate file (if configured) up front.
pub(crate) fn build_client(cfg: &InstructorConfig) -> anyhow::Result<Client> {
    let mut client = Client::new();

    for worker in &cfg.workers {
        let certificate_pem = worker
            .certificate
            .as_ref()
            .map(std::fs::read)
            .transpose()
            .with_context(|| format!("cannot read certificate for worker '{}'", worker.alias))?;

        client
            .add_worker(WorkerDescriptor {
                alias: worker.alias.clone(),
                adress: worker.adress.clone(),
                port: worker.port,
                certificate_pem,
                secret: worker.secret.clone(),
            })
            .with_context(|| format!("cannot decode certificate for worker '{}'", worker.alias))?;
    }

    Ok(client)
}
