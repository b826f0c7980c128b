//! Command-line surface: `loago instruct ...` and `loago serve ...`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "loago", about = "A distributed loadtest utility for web apps", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Instructor mode: configure and drive a loadtest across workers.
    Instruct(InstructArgs),
    /// Worker mode: accept loadtest requests and run them.
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct InstructArgs {
    /// Path to the instructor config file (YAML, TOML, or JSON).
    #[arg(long, env = "LOAGO_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub action: InstructAction,
}

#[derive(Debug, Subcommand)]
pub enum InstructAction {
    /// Connect, serially ping each worker, disconnect.
    Ping,
    /// Connect, start a loadtest, persist results, stop on SIGINT/SIGTERM.
    Run {
        /// Path to the file results are appended to.
        #[arg(long)]
        result: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0", env = "LOAGO_ADRESS")]
    pub adress: String,

    /// TCP port to listen on.
    #[arg(long, default_value_t = 50051, env = "LOAGO_PORT")]
    pub port: u16,

    /// Shared secret required from instructors, via `authorization: basic
    /// <secret>`. Unset means no authentication is required.
    #[arg(long, env = "LOAGO_SECRET")]
    pub secret: Option<String>,

    /// PEM-encoded TLS certificate. Requires `--key`. Unset means plaintext.
    #[arg(long, requires = "key")]
    pub cert: Option<PathBuf>,

    /// PEM-encoded TLS private key. Requires `--cert`.
    #[arg(long, requires = "cert")]
    pub key: Option<PathBuf>,
}
