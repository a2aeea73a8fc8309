use anyhow::Context;
use clap::Parser;
use std::time::Duration;

use common::url_utils::{control_url, sanitize_addr};

use crate::core::index::FileRecord;
use crate::core::node::NodeInfo;

#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    /// Master control address
    #[arg(long, env = "MASTER_ADDR", default_value = "127.0.0.1:8080")]
    pub master: String,
}

async fn fetch<T: serde::de::DeserializeOwned>(master: &str, path: &str) -> anyhow::Result<T> {
    let master = sanitize_addr(master)?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let resp = http
        .get(control_url(&master, path))
        .send()
        .await
        .with_context(|| format!("querying master at {}", master))?
        .error_for_status()?;

    Ok(resp.json().await?)
}

pub async fn nodes(args: InspectArgs) -> anyhow::Result<()> {
    let nodes: Vec<NodeInfo> = fetch(&args.master, "/admin/nodes").await?;

    println!("{:>6}  {:<6}  {:<22}  {:<22}", "ID", "STATUS", "DATA", "CONTROL");
    for n in nodes {
        println!(
            "{:>6}  {:<6}  {:<22}  {:<22}",
            n.node_id,
            format!("{:?}", n.status),
            n.data_address,
            n.control_address
        );
    }

    Ok(())
}

pub async fn files(args: InspectArgs) -> anyhow::Result<()> {
    let records: Vec<FileRecord> = fetch(&args.master, "/admin/files").await?;

    println!("{:<32}  {:>6}  {:>12}  PATH", "FILE", "NODE", "SIZE");
    for r in records {
        println!(
            "{:<32}  {:>6}  {:>12}  {}",
            r.file_name, r.node_id, r.size, r.local_path
        );
    }

    Ok(())
}
