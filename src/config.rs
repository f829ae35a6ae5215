//! CLI configuration and argument parsing.

use clap::{Parser, Subcommand, ValueEnum};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Authenticate to an EKS cluster with ambient AWS credentials.
#[derive(Parser, Debug, Clone)]
#[command(name = "eksauth")]
#[command(about = "Authenticate to EKS clusters with ambient AWS credentials")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    /// EKS cluster name
    #[arg(long, global = true, env = "CLUSTER_NAME")]
    pub cluster_name: Option<String>,

    /// AWS region [default: from the AWS credential chain]
    #[arg(long, global = true, env = "AWS_REGION")]
    pub region: Option<String>,

    /// IAM role to assume before talking to EKS and STS
    #[arg(long, global = true, env = "ASSUME_ROLE_ARN")]
    pub assume_role_arn: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List pod names as a JSON array
    Pods {
        /// Only list pods in this namespace [default: all namespaces]
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Print an ExecCredential for kubectl
    #[command(after_help = r#"Example kubeconfig user entry:
  exec:
    apiVersion: client.authentication.k8s.io/v1beta1
    command: eksauth
    args: ["token", "--cluster-name", "<CLUSTER>"]"#)]
    Token,
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    pub cluster_name: String,
    pub region: Option<String>,
    pub assume_role_arn: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub command: Command,
}

impl Config {
    /// Create config from CLI arguments. Blank optional values count as unset.
    pub fn from_args(args: Args) -> Self {
        Self {
            cluster_name: args.cluster_name.unwrap_or_default().trim().to_string(),
            region: non_empty(args.region),
            assume_role_arn: non_empty(args.assume_role_arn),
            log_level: args.log_level,
            log_format: args.log_format,
            command: args.command,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
