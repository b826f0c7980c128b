//! `loago serve --adress <addr> --port <port> [--secret <t>] [--cert <p> --key <p>]`

use std::path::Path;

use anyhow::Context;

use crate::worker::{TlsConfig, WorkerGrpcServer};

pub async fn run(
    adress: &str,
    port: u16,
    secret: Option<String>,
    cert: Option<&Path>,
    key: Option<&Path>,
) -> anyhow::Result<()> {
    let addr = format!("{adress}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address '{adress}:{port}'"))?;

    let tls = match (cert, key) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_pem: std::fs::read(cert).context("cannot read tls certificate")?,
            key_pem: std::fs::read(key).context("cannot read tls key")?,
        }),
        _ => None,
    };

    tracing::info!(component = "cmd_serve", listen_adress = %addr, "start serving");

    let mut server = WorkerGrpcServer::new(addr, secret, tls);
    server.serve().await.context("error on serving")?;

    Ok(())
}
