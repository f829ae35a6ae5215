//! In-memory client configuration for a single EKS cluster context.
//!
//! A [`ClientSession`] holds the unauthenticated skeleton: one cluster entry,
//! one context and one empty auth entry. [`ClientSession::materialize`] mints a
//! token, produces a new [`ClientConfig`] carrying it, and builds the
//! `kube::Client` from the current context.

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::cluster::ClusterDescriptor;
use crate::error::{ConfigError, Error};
use crate::identity::Principal;
use crate::token::TokenMinter;

/// Server endpoint and CA bundle of a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEntry {
    pub server: String,
    /// PEM bytes.
    pub certificate_authority_data: Vec<u8>,
}

/// Binds a cluster entry to an auth entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub cluster: String,
    pub auth_info: String,
}

/// Credentials for one context. Empty until a token is added.
#[derive(Debug, Clone, Default)]
pub struct AuthEntry {
    token: Option<SecretString>,
}

impl AuthEntry {
    pub const fn is_empty(&self) -> bool {
        self.token.is_none()
    }

    pub fn expose_token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret())
    }
}

/// Kubeconfig-shaped configuration: named clusters, contexts and auth entries.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    clusters: BTreeMap<String, ClusterEntry>,
    contexts: BTreeMap<String, ContextEntry>,
    auth_infos: BTreeMap<String, AuthEntry>,
    current_context: String,
}

impl ClientConfig {
    pub fn clusters(&self) -> &BTreeMap<String, ClusterEntry> {
        &self.clusters
    }

    pub fn contexts(&self) -> &BTreeMap<String, ContextEntry> {
        &self.contexts
    }

    pub fn auth_infos(&self) -> &BTreeMap<String, AuthEntry> {
        &self.auth_infos
    }

    pub fn current_context(&self) -> &str {
        &self.current_context
    }

    pub fn auth_info(&self, name: &str) -> Option<&AuthEntry> {
        self.auth_infos.get(name)
    }

    /// Return a copy whose auth entry `auth_info` holds `token`.
    #[must_use]
    pub fn with_token(&self, auth_info: &str, token: &str) -> Self {
        let mut next = self.clone();
        next.auth_infos.insert(
            auth_info.to_string(),
            AuthEntry {
                token: Some(SecretString::from(token.to_string())),
            },
        );
        next
    }

    /// Resolve the current context into a `kube::Config`.
    pub fn to_kube_config(&self) -> Result<kube::Config, ConfigError> {
        let context_name = self.current_context.as_str();
        let failed = |detail: String| ConfigError::ClientConstructionFailed {
            context: context_name.to_string(),
            detail,
        };

        let context = self
            .contexts
            .get(context_name)
            .ok_or_else(|| failed("context not found".to_string()))?;
        let cluster = self
            .clusters
            .get(&context.cluster)
            .ok_or_else(|| failed(format!("cluster {} not found", context.cluster)))?;
        let auth = self
            .auth_infos
            .get(&context.auth_info)
            .ok_or_else(|| failed(format!("auth entry {} not found", context.auth_info)))?;

        let root_certs = pem_certificates(&cluster.certificate_authority_data)
            .map_err(|e| failed(format!("invalid certificate authority data: {e}")))?;
        if root_certs.is_empty() {
            return Err(failed(
                "no certificates found in certificate authority data".to_string(),
            ));
        }

        let mut config = kube::Config::new(
            cluster
                .server
                .parse()
                .map_err(|e| failed(format!("invalid endpoint {}: {e}", cluster.server)))?,
        );
        config.default_namespace = "default".to_string();
        config.root_cert = Some(root_certs);
        config.auth_info = kube::config::AuthInfo {
            token: auth
                .expose_token()
                .map(|t| SecretString::from(t.to_string())),
            ..Default::default()
        };

        Ok(config)
    }
}

/// DER bytes of every `CERTIFICATE` block in a PEM bundle.
fn pem_certificates(pem_data: &[u8]) -> Result<Vec<Vec<u8>>, pem::PemError> {
    Ok(pem::parse_many(pem_data)?
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .map(pem::Pem::into_contents)
        .collect())
}

/// `<display name>@<cluster name>`.
pub fn context_name(principal: &Principal, descriptor: &ClusterDescriptor) -> String {
    format!("{}@{}", principal.display_name(), descriptor.name())
}

/// Unauthenticated configuration for one cluster, ready to be materialized.
#[derive(Debug)]
pub struct ClientSession<'a> {
    descriptor: &'a ClusterDescriptor,
    context_name: String,
    config: ClientConfig,
}

impl ClientSession<'_> {
    pub fn descriptor(&self) -> &ClusterDescriptor {
        self.descriptor
    }

    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Mint a token, embed it, and build the API client.
    ///
    /// Consumes the session; a session is materialized at most once.
    pub async fn materialize<M: TokenMinter + ?Sized>(
        self,
        minter: &M,
    ) -> Result<AuthenticatedClient, Error> {
        let token = minter.mint(self.descriptor.name()).await?;
        let config = self.config.with_token(&self.context_name, token.expose());

        let failed = |e: kube::Error| ConfigError::ClientConstructionFailed {
            context: self.context_name.clone(),
            detail: e.to_string(),
        };
        let kube_config = config.to_kube_config()?;
        let client = kube::Client::try_from(kube_config).map_err(failed)?;

        info!(context = %self.context_name, "Created authenticated Kubernetes client");

        Ok(AuthenticatedClient {
            client,
            config,
            context_name: self.context_name,
            expires_at: token.expires_at(),
        })
    }
}

/// Build the skeleton configuration for `descriptor` as `principal`.
pub fn build_skeleton<'a>(
    descriptor: &'a ClusterDescriptor,
    principal: &Principal,
) -> Result<ClientSession<'a>, ConfigError> {
    let incomplete = |field| ConfigError::IncompleteDescriptor {
        cluster: descriptor.name().to_string(),
        field,
    };

    let Some(endpoint) = descriptor.endpoint() else {
        return Err(incomplete("endpoint"));
    };
    if descriptor.trust_anchor().is_empty() {
        return Err(incomplete("trust anchor"));
    }

    let context_name = context_name(principal, descriptor);
    info!(context = %context_name, "Creating Kubernetes client config");

    let cluster_name = descriptor.name().to_string();
    let config = ClientConfig {
        clusters: BTreeMap::from([(
            cluster_name.clone(),
            ClusterEntry {
                server: endpoint.to_string(),
                certificate_authority_data: descriptor.trust_anchor().to_vec(),
            },
        )]),
        contexts: BTreeMap::from([(
            context_name.clone(),
            ContextEntry {
                cluster: cluster_name,
                auth_info: context_name.clone(),
            },
        )]),
        auth_infos: BTreeMap::from([(context_name.clone(), AuthEntry::default())]),
        current_context: context_name.clone(),
    };

    Ok(ClientSession {
        descriptor,
        context_name,
        config,
    })
}

/// A ready-to-use client and the configuration it was built from.
#[derive(Clone)]
pub struct AuthenticatedClient {
    client: kube::Client,
    config: ClientConfig,
    context_name: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

impl AuthenticatedClient {
    pub const fn client(&self) -> &kube::Client {
        &self.client
    }

    pub fn into_client(self) -> kube::Client {
        self.client
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    /// When the embedded token should be considered stale.
    pub const fn expires_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.expires_at
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("context_name", &self.context_name)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
