//! The `stratus` command-line front end.
//!
//! Parsing lives in [`cli`]; [`run`] executes one command against a
//! [`Client`] and hands back what should be printed, so the binary only
//! wires up logging, credentials and Ctrl-C.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use stratus_s3::{Bucket, Client, Config, Listing, VersioningStatus};
use tokio_util::sync::CancellationToken;
use tracing::info;

mod cli;
pub use cli::*;

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Human-readable lines
    Text(String),
    /// Raw object bytes, for stdout
    Bytes(Bytes),
}

/// Build the client configuration from defaults, the optional JSON file and
/// the command-line overrides, in that order.
pub async fn load_config(cli: &StratusCli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => read_config(path).await?,
        None => Config::default(),
    };

    if let Some(host) = &cli.service_host {
        config.service_host = host.clone();
    }
    if cli.http {
        config.scheme = "http".into();
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.max_attempts = max_attempts;
    }

    config.validate()?;
    Ok(config)
}

async fn read_config(path: &Path) -> Result<Config> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("Invalid configuration in {}", path.display()))
}

async fn open(
    client: &Client,
    bucket: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Bucket> {
    let name = bucket.context("This command needs a bucket (--bucket or STRATUS_BUCKET)")?;
    Ok(client.open(name, cancel).await?)
}

/// Execute `command`.
pub async fn run(
    client: &Client,
    bucket: Option<&str>,
    command: Command,
    cancel: &CancellationToken,
) -> Result<Output> {
    let output = match command {
        Command::Buckets => {
            let buckets = client.list_buckets(cancel).await?;
            Output::Text(
                buckets
                    .iter()
                    .map(|bucket| format!("{}\t{}", bucket.creation_date, bucket.name))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        }
        Command::Ls { prefix } => {
            let bucket = open(client, bucket, cancel).await?;
            match bucket.list(prefix.as_deref().unwrap_or(""), cancel).await? {
                Listing::NoObjectsFound => Output::Text("No objects found".into()),
                Listing::Found(objects) => Output::Text(
                    objects
                        .iter()
                        .map(|object| {
                            format!("{:>12}\t{}\t{}", object.size, object.last_modified, object.key)
                        })
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
            }
        }
        Command::Get { key, out, version } => {
            let bucket = open(client, bucket, cancel).await?;
            let object = match version {
                Some(version) => bucket.get_version(&key, &version, cancel).await?,
                None => bucket.get(&key, cancel).await?,
            };
            match out {
                Some(path) => {
                    tokio::fs::write(&path, &object.body)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    Output::Text(format!("{} bytes written to {}", object.body.len(), path.display()))
                }
                None => Output::Bytes(object.body),
            }
        }
        Command::Put {
            key,
            file,
            content_type,
        } => {
            let body = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let bucket = open(client, bucket, cancel).await?;
            let size = body.len();
            let outcome = bucket
                .put(&key, body, content_type.as_deref(), cancel)
                .await?;
            info!(key = %key, size, "Uploaded");
            let etag = outcome.etag.unwrap_or_default();
            Output::Text(match outcome.version_id {
                Some(version_id) => format!("{}\t{}\tversion {}", key, etag, version_id),
                None => format!("{}\t{}", key, etag),
            })
        }
        Command::Rm { key } => {
            let bucket = open(client, bucket, cancel).await?;
            bucket.delete(&key, cancel).await?;
            Output::Text(format!("Deleted {}", key))
        }
        Command::Versioning { state } => {
            let bucket = open(client, bucket, cancel).await?;
            if let Some(state) = state {
                bucket.set_versioning(state == Toggle::On, cancel).await?;
            }
            let status = match bucket.versioning(cancel).await? {
                VersioningStatus::Unversioned => "unversioned",
                VersioningStatus::Enabled => "enabled",
                VersioningStatus::Suspended => "suspended",
            };
            Output::Text(format!("Versioning is {}", status))
        }
        Command::Presign { key, expires } => {
            let bucket = open(client, bucket, cancel).await?;
            let url = bucket.presign_get(&key, Duration::from_secs(expires))?;
            Output::Text(url.to_string())
        }
    };

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use stratus_s3::helpers::{ScriptedTransport, list_page, ok, test_credentials};

    fn parse(args: &[&str]) -> Result<StratusCli> {
        let mut argv = vec![
            "stratus",
            "--access-key-id",
            "AKID",
            "--secret-access-key",
            "secret",
        ];
        argv.extend_from_slice(args);
        Ok(StratusCli::try_parse_from(argv)?)
    }

    fn client(transport: &ScriptedTransport) -> Result<Client> {
        Ok(Client::with_transport(
            test_credentials(),
            Config::default(),
            Arc::new(transport.clone()),
        )?)
    }

    #[test]
    fn it_parses_subcommands() -> Result<()> {
        let cli = parse(&["--bucket", "photos", "get", "cat.jpg", "out.jpg"])?;
        assert_eq!(cli.bucket.as_deref(), Some("photos"));
        assert_eq!(
            cli.command,
            Command::Get {
                key: "cat.jpg".into(),
                out: Some("out.jpg".into()),
                version: None,
            }
        );

        let cli = parse(&["versioning", "on"])?;
        assert_eq!(
            cli.command,
            Command::Versioning {
                state: Some(Toggle::On)
            }
        );
        Ok(())
    }

    #[test]
    fn it_documents_every_flag() {
        use clap::CommandFactory;

        let command = StratusCli::command();
        let bare: Vec<_> = command
            .get_arguments()
            .filter(|arg| !arg.is_positional() && arg.get_help().is_none())
            .map(|arg| arg.get_id().to_string())
            .collect();
        assert!(bare.is_empty(), "flags without help: {bare:?}");
    }

    #[tokio::test]
    async fn it_applies_flags_over_defaults() -> Result<()> {
        let cli = parse(&["--service-host", "localhost:9000", "--http", "buckets"])?;
        let config = load_config(&cli).await?;
        assert_eq!(config.service_host, "localhost:9000");
        assert_eq!(config.scheme, "http");
        assert_eq!(config.part_size, Config::default().part_size);
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_an_invalid_attempt_cap() -> Result<()> {
        let cli = parse(&["--max-attempts", "0", "buckets"])?;
        assert!(load_config(&cli).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn it_lists_a_bucket() -> Result<()> {
        let transport = ScriptedTransport::new();
        transport.push(ok("<LocationConstraint/>"));
        transport.push(list_page(&["a.txt", "b.txt"], false));

        let output = run(
            &client(&transport)?,
            Some("photos"),
            Command::Ls { prefix: None },
            &CancellationToken::new(),
        )
        .await?;

        let Output::Text(text) = output else {
            anyhow::bail!("expected text output");
        };
        let keys: Vec<&str> = text
            .lines()
            .filter_map(|line| line.rsplit('\t').next())
            .collect();
        assert_eq!(keys, vec!["a.txt", "b.txt"]);
        Ok(())
    }

    #[tokio::test]
    async fn it_reports_an_empty_listing() -> Result<()> {
        let transport = ScriptedTransport::new();
        transport.push(ok("<LocationConstraint/>"));
        transport.push(list_page(&[], false));

        let output = run(
            &client(&transport)?,
            Some("photos"),
            Command::Ls {
                prefix: Some("missing/".into()),
            },
            &CancellationToken::new(),
        )
        .await?;

        assert_eq!(output, Output::Text("No objects found".into()));
        Ok(())
    }

    #[tokio::test]
    async fn it_requires_a_bucket_for_object_commands() -> Result<()> {
        let transport = ScriptedTransport::new();
        let result = run(
            &client(&transport)?,
            None,
            Command::Rm { key: "a".into() },
            &CancellationToken::new(),
        )
        .await;

        assert!(result.is_err());
        assert!(transport.requests().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn it_streams_objects_to_stdout() -> Result<()> {
        let transport = ScriptedTransport::new();
        transport.push(ok("<LocationConstraint/>"));
        transport.push(ok("meow"));

        let output = run(
            &client(&transport)?,
            Some("photos"),
            Command::Get {
                key: "cat.txt".into(),
                out: None,
                version: None,
            },
            &CancellationToken::new(),
        )
        .await?;

        assert_eq!(output, Output::Bytes(Bytes::from("meow")));
        Ok(())
    }
}
