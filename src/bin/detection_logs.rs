//! detection_logs - print the latest consolidated logs for one subject

use anyhow::{anyhow, Result};
use clap::Parser;

use iva_kernel::{DetectionLogStore, IvaConfig, SqliteDetectionLogStore};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Subject whose logs to list.
    #[arg(long)]
    subject: String,
    /// Maximum number of logs, newest first.
    #[arg(long, default_value_t = 15)]
    limit: usize,
    /// Override the configured database path.
    #[arg(long, env = "IVA_DB_PATH")]
    db_path: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.subject.trim().is_empty() {
        return Err(anyhow!("--subject must not be empty"));
    }
    let db_path = match args.db_path {
        Some(path) => path,
        None => IvaConfig::load()?.db_path,
    };

    let mut store = SqliteDetectionLogStore::open(&db_path)?;
    let logs = store.latest_for_subject(&args.subject, args.limit)?;
    println!("{}", serde_json::to_string_pretty(&logs)?);
    Ok(())
}
