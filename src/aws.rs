//! AWS client factory with optional `AssumeRole` support.

use std::time::Duration;

use aws_config::sts::AssumeRoleProvider;
use aws_sdk_eks::Client as EksClient;
use aws_sdk_sts::Client as StsClient;
use tracing::{debug, info};

const SESSION_NAME: &str = "eksauth";

/// Lifetime requested for assumed role sessions.
const SESSION_LENGTH: Duration = Duration::from_secs(30 * 60);

/// STS and EKS clients sharing one SDK config, and therefore one identity.
#[derive(Clone, Debug)]
pub struct AwsClients {
    pub eks: EksClient,
    pub sts: StsClient,
    config: aws_config::SdkConfig,
}

impl AwsClients {
    /// Create AWS clients from the default credential chain (env vars, shared
    /// profile, IRSA, EKS Pod Identity, instance or task role).
    ///
    /// `region` overrides the chain's region. If `assume_role_arn` is given,
    /// the chain's credentials are used to assume that role.
    pub async fn new(region: Option<&str>, assume_role_arn: Option<&str>) -> Self {
        let base_config = Self::load_defaults(region, None).await;

        let config = if let Some(role_arn) = assume_role_arn {
            info!("Assuming role {} for EKS access", role_arn);
            let provider = assume_role_provider(role_arn, &base_config).await;
            debug!("Credentials for {} resolve on first API call", role_arn);
            Self::load_defaults(region, Some(provider)).await
        } else {
            base_config
        };

        debug!(
            "Created AWS clients for region: {}",
            config.region().map_or("unset", |r| r.as_ref())
        );

        Self {
            eks: EksClient::new(&config),
            sts: StsClient::new(&config),
            config,
        }
    }

    async fn load_defaults(
        region: Option<&str>,
        provider: Option<AssumeRoleProvider>,
    ) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        if let Some(provider) = provider {
            loader = loader.credentials_provider(provider);
        }
        loader.load().await
    }

    /// The underlying SDK config (includes assumed role credentials if applicable).
    pub const fn sdk_config(&self) -> &aws_config::SdkConfig {
        &self.config
    }
}

/// Credentials for `role_arn`, assumed with the base config's identity.
async fn assume_role_provider(
    role_arn: &str,
    base_config: &aws_config::SdkConfig,
) -> AssumeRoleProvider {
    let mut builder = AssumeRoleProvider::builder(role_arn)
        .configure(base_config)
        .session_name(SESSION_NAME)
        .session_length(SESSION_LENGTH);
    if let Some(region) = base_config.region() {
        builder = builder.region(region.clone());
    }
    builder.build().await
}
