use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::time::Duration;

use common::key_utils::FileName;
use common::rpc::RpcClient;
use common::telemetry::init_telemetry;
use common::url_utils::sanitize_addr;

use client::callback::CallbackServer;
use client::download::download;
use client::upload::{UploadOptions, upload};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a local file to the cluster
    Upload(UploadArgs),
    /// Download a file from any alive holder
    Download(DownloadArgs),
}

#[derive(Args, Debug)]
struct UploadArgs {
    #[arg(long, env = "MASTER_ADDR")]
    master: String,
    /// Local file to upload
    #[arg(long)]
    file: PathBuf,
    /// Name in the cluster, defaults to the file name
    #[arg(long)]
    name: Option<String>,
    /// Where the master reports success, a specific interface address
    #[arg(long, env = "CLIENT_CALLBACK_ADDR", default_value = "127.0.0.1:0")]
    callback_listen: String,
    /// How long to wait for the master's confirmation
    #[arg(long, default_value_t = 60)]
    wait_secs: u64,
    #[arg(long, env = "RPC_TIMEOUT_SECS", default_value_t = 5)]
    rpc_timeout_secs: u64,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    #[arg(long, env = "MASTER_ADDR")]
    master: String,
    #[arg(long)]
    name: String,
    /// Output directory
    #[arg(long, default_value = ".")]
    out: PathBuf,
    /// Data-plane address keepers stream into, a specific interface address
    #[arg(long, env = "CLIENT_DATA_ADDR", default_value = "127.0.0.1:0")]
    data_listen: String,
    #[arg(long, env = "RPC_TIMEOUT_SECS", default_value_t = 5)]
    rpc_timeout_secs: u64,
    #[arg(long, env = "TRANSFER_TIMEOUT_SECS", default_value_t = 300)]
    transfer_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("client");

    match Cli::parse().command {
        Command::Upload(args) => {
            let name = match args.name {
                Some(n) => n,
                None => args
                    .file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .context("cannot derive a name from the path, pass --name")?,
            };
            let name = FileName::parse(&name)?;
            let master = sanitize_addr(&args.master)?;
            let timeout = Duration::from_secs(args.rpc_timeout_secs);
            let rpc = RpcClient::new(timeout, timeout)?;

            let mut callback = CallbackServer::start(&args.callback_listen).await?;
            let opts = UploadOptions {
                confirm_wait: Duration::from_secs(args.wait_secs),
                ..UploadOptions::default()
            };
            let res = upload(&rpc, &master, &mut callback, &args.file, &name, &opts).await;
            callback.shutdown().await;

            let target = res?;
            println!("uploaded {} to node {}", name, target.node_id);
        }
        Command::Download(args) => {
            let name = FileName::parse(&args.name)?;
            let master = sanitize_addr(&args.master)?;
            let rpc = RpcClient::new(
                Duration::from_secs(args.rpc_timeout_secs),
                Duration::from_secs(args.transfer_timeout_secs),
            )?;

            let path = download(&rpc, &master, &name, &args.out, &args.data_listen).await?;
            println!("saved {}", path.display());
        }
    }

    Ok(())
}
