//! End-to-end construction of an authenticated EKS client.

use tracing::info;

use crate::aws::AwsClients;
use crate::cluster::{DescribeCluster, load_descriptor};
use crate::error::Error;
use crate::identity::{CallerIdentity, resolve_identity};
use crate::kubeconfig::{AuthenticatedClient, build_skeleton};
use crate::token::TokenMinter;

/// Build an authenticated client for `cluster_name` from the AWS clients'
/// shared credentials.
///
/// The signing credentials and region are only consulted once the cluster
/// has been resolved.
pub async fn new_auth_client(
    cluster_name: &str,
    clients: &AwsClients,
) -> Result<AuthenticatedClient, Error> {
    let minter = clients.sdk_config();
    connect(cluster_name, &clients.sts, &clients.eks, minter).await
}

/// Resolve the caller and the cluster concurrently, then assemble and
/// authenticate the client configuration.
///
/// All or nothing: any failure aborts the whole construction.
pub async fn connect<I, D, M>(
    cluster_name: &str,
    identity: &I,
    clusters: &D,
    minter: &M,
) -> Result<AuthenticatedClient, Error>
where
    I: CallerIdentity + ?Sized,
    D: DescribeCluster + ?Sized,
    M: TokenMinter + ?Sized,
{
    let (principal, descriptor) = tokio::try_join!(
        async {
            let principal = resolve_identity(identity).await?;
            Ok::<_, Error>(principal)
        },
        async {
            let descriptor = load_descriptor(cluster_name, clusters).await?;
            Ok::<_, Error>(descriptor)
        },
    )?;

    info!(
        cluster = descriptor.name(),
        principal = principal.display_name(),
        "Resolved identity and cluster"
    );

    let session = build_skeleton(&descriptor, &principal)?;
    session.materialize(minter).await
}
