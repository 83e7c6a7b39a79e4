use std::io::Write;

use anyhow::Result;
use clap::Parser;
use stratus_cli::{Output, StratusCli, load_config, run};
use stratus_s3::{Client, Credentials};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
pub async fn main() -> Result<()> {
    let cli = StratusCli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli).await?;
    let credentials = Credentials::new(&cli.access_key_id, &cli.secret_access_key);
    let client = Client::new(credentials, config)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, canceling");
            interrupt.cancel();
        }
    });

    match run(&client, cli.bucket.as_deref(), cli.command, &cancel).await? {
        Output::Text(text) => {
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        Output::Bytes(bytes) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
