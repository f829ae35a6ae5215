//! eksauth - authenticate to EKS clusters with ambient AWS credentials.
//!
//! Lists pods through a freshly authenticated client, or prints the minted
//! token as a kubectl exec credential.

mod config;

use anyhow::Result;
use clap::Parser;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::ListParams;
use tracing::{debug, error, info};

use config::{Args, BUILD_DATE, COMMIT, Command, Config, LogFormat, VERSION};
use eksauth::{AwsClients, ClusterError, StsTokenMinter, TokenMinter};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::from_args(args);

    if let Err(e) = init_tracing(&config.log_level, config.log_format) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    debug!(
        "Starting eksauth v{} (commit: {}, build: {})",
        VERSION, COMMIT, BUILD_DATE
    );

    if let Err(e) = run(&config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing subscriber. Logs go to stderr so stdout stays parseable.
fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {e}"))?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(())
}

async fn run(config: &Config) -> Result<()> {
    let region = config.region.as_deref();
    let role_arn = config.assume_role_arn.as_deref();
    let clients = AwsClients::new(region, role_arn).await;

    match &config.command {
        Command::Pods { namespace } => run_pods(config, &clients, namespace.as_deref()).await,
        Command::Token => run_token(config, &clients).await,
    }
}

/// List pod names and print them as a JSON array.
async fn run_pods(config: &Config, clients: &AwsClients, namespace: Option<&str>) -> Result<()> {
    let handle = eksauth::new_auth_client(&config.cluster_name, clients).await?;

    let api: Api<Pod> = match namespace {
        Some(ns) => Api::namespaced(handle.into_client(), ns),
        None => Api::all(handle.into_client()),
    };

    let pods = api.list(&ListParams::default()).await?;
    let names: Vec<String> = pods
        .items
        .into_iter()
        .filter_map(|pod| pod.metadata.name)
        .collect();

    for (i, name) in names.iter().enumerate() {
        info!("[{}] {}", i, name);
    }

    println!("{}", serde_json::to_string(&names)?);
    Ok(())
}

/// Mint a token and print it as an `ExecCredential`.
async fn run_token(config: &Config, clients: &AwsClients) -> Result<()> {
    if config.cluster_name.trim().is_empty() {
        return Err(ClusterError::InvalidName.into());
    }

    let minter = StsTokenMinter::from_sdk_config(clients.sdk_config())?;
    let token = minter.mint(&config.cluster_name).await?;

    println!("{}", serde_json::to_string(&token.to_exec_credential())?);
    Ok(())
}
