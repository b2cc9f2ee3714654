//! Curator: retires or relocates partitioned data according to a
//! declarative plan.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use common::cli::{utils, CommonArgs, CommonCommands};
use common::config::Configuration;
use sweeper::execution;
use sweeper::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(
    name = "curator",
    about = "Retires or relocates data in partitioned storage according to a declarative plan",
    version
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<CommonCommands>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_deref())?;

    match cli.command.unwrap_or_default() {
        CommonCommands::Config { json } => utils::display_config(&config, json)?,
        CommonCommands::Validate => {
            Runtime::build(&config, false).context("Configuration validation failed")?;
            info!("configuration is valid");
        }
        CommonCommands::Run => run(&config, cli.common.armed).await?,
    }

    Ok(())
}

async fn run(config: &Configuration, armed: bool) -> Result<()> {
    info!("runtime config setup");
    let runtime = Runtime::build(config, armed).context("Failed to build runtime")?;

    info!("partition collection");
    execution::collect_partitions(&runtime).await?;

    info!("execution locks");
    execution::create_execution_locks(&runtime).await?;

    info!("filter partitions");
    execution::filter_kept_partitions(&runtime).await?;

    info!("check targets");
    execution::check_operation_targets(&runtime).await?;

    info!("execute actions");
    execution::execute_armed_actions(&runtime).await?;

    info!("finished");
    Ok(())
}
