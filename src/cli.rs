use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kubedeck",
    version,
    about = "Multi-cluster Kubernetes management service for the kubedeck dashboard."
)]
pub struct CliArgs {
    /// Cluster store file
    #[arg(long, env = "KUBEDECK_CLUSTERS", default_value = ".clusters.yaml", global = true)]
    pub clusters_file: PathBuf,

    /// Key used to seal SSH passwords in the cluster store
    #[arg(long, env = "KUBEDECK_KEY_FILE", default_value = ".crypto.key", global = true)]
    pub key_file: PathBuf,

    /// tracing filter (for example: info,kubedeck=debug)
    #[arg(long, default_value = "info", global = true)]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve(ServeArgs),
    /// Encrypt plaintext SSH passwords in the cluster store, keeping a .bak copy
    EncryptConfig,
    /// Print stored SSH credentials with passwords decrypted
    ShowConfig,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Built front-end directory served for non-API paths
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Upper bound for a single cluster call, in seconds
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Extra attempts for read-only cluster calls after a transient failure
    #[arg(long, default_value_t = 2)]
    pub read_retries: u32,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 5000)),
            static_dir: None,
            request_timeout_secs: 30,
            read_retries: 2,
        }
    }
}
