//! svctl - operator CLI for the building savings predictor

use anyhow::Result;
use clap::Parser;
use savings_cli::cli::{Cli, Commands, TrainCommands};
use savings_cli::client::ApiClient;
use savings_cli::commands::{predict, status, train};
use savings_cli::output::print_error;
use std::time::Duration;

async fn run(cli: Cli) -> Result<()> {
    let client = ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Predict(args) => predict::predict(&client, &args, cli.format).await?,
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Reload => status::reload(&client, cli.format).await?,
        Commands::Train(train_cmd) => match train_cmd {
            TrainCommands::Start {
                mode,
                k,
                wait,
                interval,
            } => {
                train::start(
                    &client,
                    mode.as_str(),
                    k,
                    wait,
                    Duration::from_secs(interval.max(1)),
                    cli.format,
                )
                .await?;
            }
            TrainCommands::Status { job_id } => train::status(&client, &job_id, cli.format).await?,
            TrainCommands::List => train::list(&client, cli.format).await?,
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
