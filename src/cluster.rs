//! EKS cluster descriptor loading.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, error, info};

use crate::error::ClusterError;

/// Raw `describe_cluster` fields this crate cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterDescription {
    pub endpoint: Option<String>,
    /// Base64 encoded PEM bundle, as EKS returns it.
    pub ca_data: Option<String>,
}

/// Anything that can describe an EKS cluster by name.
#[async_trait]
pub trait DescribeCluster: Send + Sync {
    async fn describe_cluster(&self, name: &str) -> Result<ClusterDescription, ClusterError>;
}

#[async_trait]
impl DescribeCluster for aws_sdk_eks::Client {
    async fn describe_cluster(&self, name: &str) -> Result<ClusterDescription, ClusterError> {
        let response = self
            .describe_cluster()
            .name(name)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(err) if err.is_resource_not_found_exception() => {
                    ClusterError::NotFound(name.to_string())
                }
                _ => ClusterError::remote(name, e),
            })?;

        let cluster = response
            .cluster()
            .ok_or_else(|| ClusterError::NotFound(name.to_string()))?;

        Ok(ClusterDescription {
            endpoint: cluster.endpoint().map(ToString::to_string),
            ca_data: cluster
                .certificate_authority()
                .and_then(|ca| ca.data())
                .map(ToString::to_string),
        })
    }
}

/// Endpoint and trust anchor of one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDescriptor {
    name: String,
    endpoint: Option<String>,
    trust_anchor: Vec<u8>,
}

impl ClusterDescriptor {
    pub fn new(name: impl Into<String>, endpoint: Option<String>, trust_anchor: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.filter(|e| !e.is_empty()),
            trust_anchor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Decoded CA bundle (PEM bytes).
    pub fn trust_anchor(&self) -> &[u8] {
        &self.trust_anchor
    }
}

impl std::fmt::Display for ClusterDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let endpoint = self.endpoint().unwrap_or("no endpoint");
        write!(f, "{} ({endpoint})", self.name)
    }
}

/// Look up a cluster's endpoint and CA bundle.
///
/// An empty name fails before any remote call is made.
pub async fn load_descriptor<D: DescribeCluster + ?Sized>(
    name: &str,
    clusters: &D,
) -> Result<ClusterDescriptor, ClusterError> {
    if name.trim().is_empty() {
        return Err(ClusterError::InvalidName);
    }

    info!(cluster = name, "Looking up EKS cluster");

    let description = clusters
        .describe_cluster(name)
        .await
        .inspect_err(|e| error!(cluster = name, "{e}"))?;

    info!(cluster = name, "Found cluster");
    debug!(cluster = name, endpoint = ?description.endpoint, "Cluster details");

    let malformed = |reason: String| ClusterError::MalformedResponse {
        cluster: name.to_string(),
        field: "certificateAuthority.data",
        reason,
    };

    let ca_data = description
        .ca_data
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed("is missing".to_string()))?;

    let trust_anchor = STANDARD
        .decode(ca_data)
        .map_err(|e| malformed(format!("is not valid base64: {e}")))?;

    Ok(ClusterDescriptor::new(
        name,
        description.endpoint,
        trust_anchor,
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use aws_sdk_eks::operation::describe_cluster::{DescribeClusterError, DescribeClusterOutput};
    use aws_sdk_eks::types::error::{ResourceNotFoundException, ServerException};
    use aws_sdk_eks::types::{Certificate, Cluster};
    use aws_smithy_mocks::{mock, mock_client};

    use super::*;
    use crate::error::ErrorKind;

    struct StubClusters {
        response: Result<ClusterDescription, fn(&str) -> ClusterError>,
        calls: AtomicUsize,
    }

    impl StubClusters {
        fn returning(endpoint: Option<&str>, ca_data: Option<&str>) -> Self {
            Self {
                response: Ok(ClusterDescription {
                    endpoint: endpoint.map(ToString::to_string),
                    ca_data: ca_data.map(ToString::to_string),
                }),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(f: fn(&str) -> ClusterError) -> Self {
            Self {
                response: Err(f),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DescribeCluster for StubClusters {
        async fn describe_cluster(&self, name: &str) -> Result<ClusterDescription, ClusterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(d) => Ok(d.clone()),
                Err(f) => Err(f(name)),
            }
        }
    }

    #[tokio::test]
    async fn test_load_descriptor_decodes_ca() {
        let stub = StubClusters::returning(
            Some("https://ABCD.gr7.ap-northeast-2.eks.amazonaws.com"),
            Some("SGVsbG8gV29ybGQ="),
        );
        let descriptor = load_descriptor("prod-eks", &stub).await.unwrap();
        assert_eq!(descriptor.name(), "prod-eks");
        assert_eq!(
            descriptor.endpoint(),
            Some("https://ABCD.gr7.ap-northeast-2.eks.amazonaws.com")
        );
        assert_eq!(descriptor.trust_anchor(), b"Hello World");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_descriptor_empty_name_makes_no_call() {
        let stub = StubClusters::returning(Some("https://x"), Some("SGVsbG8="));
        let err = load_descriptor("", &stub).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName);

        let err = load_descriptor("   ", &stub).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_load_descriptor_not_found_propagates() {
        let stub = StubClusters::failing(|name| ClusterError::NotFound(name.to_string()));
        let err = load_descriptor("missing", &stub).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Cluster not found: missing");
    }

    #[tokio::test]
    async fn test_load_descriptor_remote_failure_propagates() {
        let stub = StubClusters::failing(|name| ClusterError::remote(name, "Rate exceeded"));
        let err = load_descriptor("prod-eks", &stub).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);
        assert!(err.to_string().contains("Rate exceeded"));
    }

    #[tokio::test]
    async fn test_load_descriptor_missing_ca() {
        let stub = StubClusters::returning(Some("https://x"), None);
        let err = load_descriptor("prod-eks", &stub).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_load_descriptor_invalid_base64_ca() {
        let stub = StubClusters::returning(Some("https://x"), Some("not base64!"));
        let err = load_descriptor("prod-eks", &stub).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(err.to_string().contains("not valid base64"));
    }

    #[tokio::test]
    async fn test_load_descriptor_keeps_missing_endpoint() {
        let stub = StubClusters::returning(None, Some("SGVsbG8="));
        let descriptor = load_descriptor("prod-eks", &stub).await.unwrap();
        assert_eq!(descriptor.endpoint(), None);
    }

    #[test]
    fn test_descriptor_empty_endpoint_is_none() {
        let d = ClusterDescriptor::new("c", Some(String::new()), b"x".to_vec());
        assert_eq!(d.endpoint(), None);
        assert_eq!(d.to_string(), "c (no endpoint)");
    }


    fn not_found() -> DescribeClusterError {
        let source = ResourceNotFoundException::builder()
            .message("No cluster found for name: missing.")
            .build();
        DescribeClusterError::ResourceNotFoundException(source)
    }

    fn server_error() -> DescribeClusterError {
        let source = ServerException::builder()
            .message("Internal service failure")
            .build();
        DescribeClusterError::ServerException(source)
    }

    fn described() -> DescribeClusterOutput {
        let cluster = Cluster::builder()
            .name("prod-eks")
            .endpoint("https://abcd.gr7.us-east-1.eks.amazonaws.com")
            .certificate_authority(Certificate::builder().data("SGVsbG8=").build())
            .build();
        DescribeClusterOutput::builder().cluster(cluster).build()
    }

    #[tokio::test]
    async fn test_sdk_resource_not_found_is_not_found() {
        let rule = mock!(aws_sdk_eks::Client::describe_cluster)
            .then_error(not_found);
        let client = mock_client!(aws_sdk_eks, [&rule]);

        let err = load_descriptor("missing", &client).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Cluster not found: missing");
    }

    #[tokio::test]
    async fn test_sdk_other_service_error_is_remote_failure() {
        let rule = mock!(aws_sdk_eks::Client::describe_cluster)
            .then_error(server_error);
        let client = mock_client!(aws_sdk_eks, [&rule]);

        let err = load_descriptor("prod-eks", &client).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);
        let message = err.to_string();
        assert!(message.starts_with("[eks::describe_cluster] prod-eks"));
    }

    #[tokio::test]
    async fn test_sdk_empty_output_is_not_found() {
        let rule = mock!(aws_sdk_eks::Client::describe_cluster)
            .then_output(|| DescribeClusterOutput::builder().build());
        let client = mock_client!(aws_sdk_eks, [&rule]);

        let err = load_descriptor("prod-eks", &client).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_sdk_cluster_fields_are_read() {
        let rule = mock!(aws_sdk_eks::Client::describe_cluster)
            .then_output(described);
        let client = mock_client!(aws_sdk_eks, [&rule]);

        let descriptor = load_descriptor("prod-eks", &client).await.unwrap();
        assert_eq!(
            descriptor.endpoint(),
            Some("https://abcd.gr7.us-east-1.eks.amazonaws.com")
        );
        assert_eq!(descriptor.trust_anchor(), b"Hello");
    }
}
