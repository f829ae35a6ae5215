//! eksauth - authenticated Kubernetes clients for EKS clusters.
//!
//! Bridges ambient AWS credentials into a short-lived EKS bearer token and a
//! ready-to-use `kube::Client`, without any pre-shared Kubernetes secret.

pub mod auth;
pub mod aws;
pub mod cluster;
pub mod error;
pub mod identity;
pub mod kubeconfig;
pub mod token;

pub use auth::{connect, new_auth_client};
pub use aws::AwsClients;
pub use cluster::{ClusterDescriptor, DescribeCluster, load_descriptor};
pub use error::{AuthError, ClusterError, ConfigError, Error, ErrorKind};
pub use identity::{CallerIdentity, Principal, resolve_identity};
pub use kubeconfig::{AuthenticatedClient, ClientConfig, ClientSession, build_skeleton};
pub use token::{BearerToken, StsTokenMinter, TokenMinter};
