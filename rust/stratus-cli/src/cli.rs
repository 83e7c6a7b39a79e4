use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "stratus")]
#[command(bin_name = "stratus")]
#[command(about = "Talk to an S3-compatible object store", long_about = None)]
pub struct StratusCli {
    /// Bucket the command works on
    #[arg(short, long, env = "STRATUS_BUCKET")]
    pub bucket: Option<String>,

    /// Access key id used to sign requests
    #[arg(long, env = "STRATUS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: String,

    /// Secret access key paired with the access key id
    #[arg(long, env = "STRATUS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: String,

    /// JSON file with client settings; flags take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Service host, e.g. `s3.amazonaws.com`
    #[arg(long)]
    pub service_host: Option<String>,

    /// Use plain HTTP
    #[arg(long)]
    pub http: bool,

    /// Attempts per operation, the first one included
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Log at debug level unless `RUST_LOG` says otherwise
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List objects
    Ls { prefix: Option<String> },

    /// Download an object to a file, or to stdout
    Get {
        key: String,
        out: Option<PathBuf>,
        #[arg(long)]
        version: Option<String>,
    },

    /// Upload a file
    Put {
        key: String,
        file: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Delete an object
    Rm { key: String },

    /// Show or change the versioning state
    Versioning { state: Option<Toggle> },

    /// List the account's buckets
    Buckets,

    /// Print a time-limited download URL
    Presign {
        key: String,
        /// Lifetime of the URL in seconds
        #[arg(long, default_value_t = 3600)]
        expires: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}
