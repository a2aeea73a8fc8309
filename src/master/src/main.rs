use clap::{Parser, Subcommand};

use common::telemetry::init_telemetry;

use master::command::inspect::{InspectArgs, files, nodes};
use master::command::serve::{ServeArgs, serve};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
enum Cmd {
    /// Run the master tracker
    Serve(ServeArgs),
    /// List cluster members
    Nodes(InspectArgs),
    /// Dump the file index
    Files(InspectArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("master");

    let args = Args::parse();

    match args.cmd {
        Cmd::Serve(serve_args) => {
            serve(serve_args).await?;
        }
        Cmd::Nodes(inspect_args) => {
            nodes(inspect_args).await?;
        }
        Cmd::Files(inspect_args) => {
            files(inspect_args).await?;
        }
    }

    Ok(())
}
