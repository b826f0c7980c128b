use clap::Parser;
use loago::cli::{Cli, Command, InstructAction};
use loago::{commands, tracing_setup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_setup::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Instruct(args) => match args.action {
            InstructAction::Ping => commands::ping::run(&args.config).await,
            InstructAction::Run { result } => {
                commands::run::run(&args.config, result.as_deref()).await
            }
        },
        Command::Serve(args) => {
            commands::serve::run(
                &args.adress,
                args.port,
                args.secret,
                args.cert.as_deref(),
                args.key.as_deref(),
            )
            .await
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "loago exited with an error");
    }

    result
}
