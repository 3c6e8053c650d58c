use crate::app::App;
use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use hashbank_config::Config;
use std::io::Write;
use std::process::ExitCode;

mod app;
mod cli;
mod error;
mod logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "hashbank failed");
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let app = App::open(&config).await?;
    let result = execute(&app, cli.command).await;
    app.close().await;
    let output = result?;
    if !output.is_empty() {
        writeln!(std::io::stdout().lock(), "{output}").or_raise(|| ErrorKind::Output)?;
    }
    Ok(())
}

/// Run a command, returning what should be printed on stdout.
async fn execute(app: &App, command: Command) -> Result<String> {
    let output = match command {
        Command::Compare { file1, file2 } => {
            let record = app.compare(&file1, &file2).await?;
            serde_json::to_string_pretty(&record).or_raise(|| ErrorKind::Output)?
        },
        Command::History { limit } => {
            serde_json::to_string_pretty(&app.history(limit).await?).or_raise(|| ErrorKind::Output)?
        },
        Command::Seed => serde_json::to_string_pretty(&app.seed().await?).or_raise(|| ErrorKind::Output)?,
        Command::Schema => app.schema().await?.join("\n"),
        Command::Orphans => {
            let orphans = app.orphans().await?;
            orphans.iter().map(|path| path.display().to_string()).collect::<Vec<_>>().join("\n")
        },
    };
    Ok(output)
}
