//! EKS bearer tokens from STS `GetCallerIdentity` presigned URLs.
//!
//! Token format: `k8s-aws-v1.` + base64url(presigned URL), no padding. The
//! cluster's authenticator replays the URL against STS to learn the caller, so
//! the token itself carries no server-side state.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{
    SignableBody, SignableRequest, SignatureLocation, SigningParams, SigningSettings, sign,
};
use aws_smithy_runtime_api::client::identity::Identity;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::AuthError;

/// Scheme tag recognized by the EKS authentication webhook.
pub const TOKEN_PREFIX: &str = "k8s-aws-v1.";

/// Signed header naming the target cluster.
pub const CLUSTER_ID_HEADER: &str = "x-k8s-aws-id";

/// Validity window of the presigned request (`X-Amz-Expires`).
pub const PRESIGN_EXPIRY: Duration = Duration::from_secs(60);

const STS_QUERY: &str = "Action=GetCallerIdentity&Version=2011-06-15";

/// A minted token. `Debug` never shows the value.
#[derive(Debug)]
pub struct BearerToken {
    value: SecretString,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl BearerToken {
    pub fn new(value: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        let window = chrono::Duration::from_std(PRESIGN_EXPIRY)
            .unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            value: SecretString::from(value.into()),
            issued_at,
            expires_at: issued_at + window,
        }
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Local bookkeeping only; the URL's own `X-Amz-Expires` is authoritative.
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Decode the presigned URL back out of the token.
    pub fn presigned_url(&self) -> Option<String> {
        decode_token(self.expose())
    }

    /// Render as a `client.authentication.k8s.io/v1beta1` exec credential.
    pub fn to_exec_credential(&self) -> ExecCredential<'_> {
        ExecCredential {
            kind: "ExecCredential",
            api_version: "client.authentication.k8s.io/v1beta1",
            spec: ExecCredentialSpec {},
            status: ExecCredentialStatus {
                expiration_timestamp: self.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                token: self.expose(),
            },
        }
    }
}

/// Decode a `k8s-aws-v1.` token into its presigned URL.
///
/// Returns `None` unless the prefix is present and the rest is unpadded
/// base64url of valid UTF-8.
pub fn decode_token(token: &str) -> Option<String> {
    let encoded = token.strip_prefix(TOKEN_PREFIX)?;
    if encoded.is_empty() || encoded.contains('=') {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredential<'a> {
    kind: &'static str,
    api_version: &'static str,
    spec: ExecCredentialSpec,
    status: ExecCredentialStatus<'a>,
}

#[derive(Debug, Serialize)]
struct ExecCredentialSpec {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecCredentialStatus<'a> {
    expiration_timestamp: String,
    token: &'a str,
}

/// Anything that can mint a bearer token for a named cluster.
#[async_trait]
pub trait TokenMinter: Send + Sync {
    async fn mint(&self, cluster_name: &str) -> Result<BearerToken, AuthError>;
}

/// Mints tokens by presigning STS requests with the SDK's credentials.
#[derive(Debug, Clone)]
pub struct StsTokenMinter {
    credentials: SharedCredentialsProvider,
    region: String,
}

impl StsTokenMinter {
    pub fn new(credentials: SharedCredentialsProvider, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Reuse the credentials and region of an SDK config (including an
    /// assumed role, if one was configured).
    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Result<Self, AuthError> {
        let credentials = config
            .credentials_provider()
            .ok_or_else(|| AuthError::SigningFailure {
                operation: "token::mint",
                detail: "no credentials provider available".to_string(),
            })?;
        let region = config.region().ok_or_else(|| AuthError::SigningFailure {
            operation: "token::mint",
            detail: "AWS region not configured".to_string(),
        })?;

        Ok(Self::new(credentials, region.to_string()))
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl TokenMinter for StsTokenMinter {
    async fn mint(&self, cluster_name: &str) -> Result<BearerToken, AuthError> {
        info!(cluster = cluster_name, "Generating token");

        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|e| AuthError::signing("token::provide_credentials", e))?;

        let token = presign_token(cluster_name, &credentials, &self.region, SystemTime::now())?;

        debug!(
            cluster = cluster_name,
            expires_at = %token.expires_at(),
            "Successfully generated token"
        );
        Ok(token)
    }
}

/// Mint with whatever credentials and region the SDK config resolves to.
#[async_trait]
impl TokenMinter for aws_config::SdkConfig {
    async fn mint(&self, cluster_name: &str) -> Result<BearerToken, AuthError> {
        let minter = StsTokenMinter::from_sdk_config(self)?;
        minter.mint(cluster_name).await
    }
}

fn sts_host(region: &str) -> String {
    let suffix = if region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    };
    format!("sts.{region}.{suffix}")
}

/// Presign `GetCallerIdentity` for `cluster_name` at `issued_at`.
pub fn presign_token(
    cluster_name: &str,
    credentials: &Credentials,
    region: &str,
    issued_at: SystemTime,
) -> Result<BearerToken, AuthError> {
    const OP: &str = "token::presign";

    if cluster_name.is_empty() {
        return Err(AuthError::SigningFailure {
            operation: OP,
            detail: "cluster name is empty".to_string(),
        });
    }
    if region.is_empty() {
        return Err(AuthError::SigningFailure {
            operation: OP,
            detail: "AWS region not configured".to_string(),
        });
    }

    let mut settings = SigningSettings::default();
    settings.signature_location = SignatureLocation::QueryParams;
    settings.expires_in = Some(PRESIGN_EXPIRY);

    let identity = Identity::from(credentials.clone());
    let params = aws_sigv4::sign::v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name("sts")
        .time(issued_at)
        .settings(settings)
        .build()
        .map_err(|e| AuthError::signing(OP, e))?;

    let url = format!("https://{}/?{STS_QUERY}", sts_host(region));
    let request = SignableRequest::new(
        "GET",
        url.as_str(),
        std::iter::once((CLUSTER_ID_HEADER, cluster_name)),
        SignableBody::Bytes(&[]),
    )
    .map_err(|e| AuthError::signing(OP, e))?;

    let (instructions, _signature) = sign(request, &SigningParams::V4(params))
        .map_err(|e| AuthError::signing(OP, e))?
        .into_parts();

    let mut presigned = http::Request::builder()
        .method("GET")
        .uri(url.as_str())
        .body(())
        .map_err(|e| AuthError::signing(OP, e))?;
    instructions.apply_to_request_http1x(&mut presigned);

    let encoded = URL_SAFE_NO_PAD.encode(presigned.uri().to_string());
    Ok(BearerToken::new(
        format!("{TOKEN_PREFIX}{encoded}"),
        DateTime::<Utc>::from(issued_at),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn test_credentials(session_token: Option<&str>) -> Credentials {
        Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            session_token.map(ToString::to_string),
            None,
            "test",
        )
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_token_shape() {
        let token = presign_token(
            "prod-eks",
            &test_credentials(None),
            "us-east-1",
            at(1_700_000_000),
        )
        .unwrap();
        let value = token.expose();

        assert!(value.starts_with(TOKEN_PREFIX));
        let encoded = &value[TOKEN_PREFIX.len()..];
        assert!(!encoded.contains('='));
        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert!(token.presigned_url().is_some());
    }

    #[test]
    fn test_presigned_url_contents() {
        let token = presign_token(
            "prod-eks",
            &test_credentials(Some("session/token+value=")),
            "ap-northeast-2",
            at(1_700_000_000),
        )
        .unwrap();
        let url = token.presigned_url().unwrap();
        let (endpoint, query) = url.split_once('?').unwrap();

        assert_eq!(endpoint, "https://sts.ap-northeast-2.amazonaws.com/");
        assert!(query.contains("Action=GetCallerIdentity"));
        assert!(query.contains("Version=2011-06-15"));
        assert!(query.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(query.contains("X-Amz-Expires=60"));
        assert!(query.contains("X-Amz-Date=20231114T221320Z"));
        assert!(query.contains("x-k8s-aws-id"));
        assert!(query.contains("X-Amz-Security-Token="));
        assert!(query.contains("X-Amz-Signature="));
    }

    #[test]
    fn test_china_partition_host() {
        assert_eq!(sts_host("cn-north-1"), "sts.cn-north-1.amazonaws.com.cn");
        assert_eq!(sts_host("eu-west-1"), "sts.eu-west-1.amazonaws.com");
    }

    #[test]
    fn test_tokens_differ_across_instants() {
        let creds = test_credentials(None);
        let first = presign_token("prod-eks", &creds, "us-east-1", at(1_700_000_000));
        let second = presign_token("prod-eks", &creds, "us-east-1", at(1_700_000_001));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_ne!(first.expose(), second.expose());
        assert!(decode_token(first.expose()).is_some());
        assert!(decode_token(second.expose()).is_some());
    }

    #[test]
    fn test_same_instant_is_deterministic() {
        let creds = test_credentials(None);
        let first = presign_token("prod-eks", &creds, "us-east-1", at(1_700_000_000));
        let second = presign_token("prod-eks", &creds, "us-east-1", at(1_700_000_000));
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.expose(), second.expose());
    }

    #[test]
    fn test_empty_cluster_name_is_signing_failure() {
        let creds = test_credentials(None);
        let result = presign_token("", &creds, "us-east-1", at(1_700_000_000));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::SigningFailure);
    }

    #[test]
    fn test_expiry_bookkeeping() {
        let issued = DateTime::<Utc>::from(at(1_700_000_000));
        let token = BearerToken::new("k8s-aws-v1.ABCD", issued);
        let window = token.expires_at() - token.issued_at();
        assert_eq!(window, chrono::Duration::seconds(60));
        assert!(!token.is_expired_at(issued + chrono::Duration::seconds(59)));
        assert!(token.is_expired_at(issued + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_debug_redacts_value() {
        let token = BearerToken::new("k8s-aws-v1.SECRETVALUE", Utc::now());
        assert!(!format!("{token:?}").contains("SECRETVALUE"));
    }

    #[test]
    fn test_decode_token_rejects_malformed() {
        assert_eq!(decode_token("ABCD"), None);
        assert_eq!(decode_token("k8s-aws-v1."), None);
        assert_eq!(decode_token("k8s-aws-v1.aGk="), None);
        assert_eq!(decode_token("k8s-aws-v1.aGk").as_deref(), Some("hi"));
    }

    #[test]
    fn test_exec_credential_json() {
        let issued = DateTime::<Utc>::from(at(1_700_000_000));
        let token = BearerToken::new("k8s-aws-v1.ABCD", issued);
        let json = serde_json::to_value(token.to_exec_credential()).unwrap();

        assert_eq!(json["kind"], "ExecCredential");
        assert_eq!(json["apiVersion"], "client.authentication.k8s.io/v1beta1");
        assert_eq!(json["spec"], serde_json::json!({}));
        let status = &json["status"];
        assert_eq!(status["token"], "k8s-aws-v1.ABCD");
        assert_eq!(status["expirationTimestamp"], "2023-11-14T22:14:20Z");
    }

    #[tokio::test]
    async fn test_sts_minter_with_static_credentials() {
        let minter = StsTokenMinter::new(
            SharedCredentialsProvider::new(test_credentials(None)),
            "us-west-2",
        );
        assert_eq!(minter.region(), "us-west-2");

        let token = minter.mint("prod-eks").await.unwrap();
        let url = token.presigned_url().unwrap();
        assert!(url.starts_with("https://sts.us-west-2.amazonaws.com/?"));
    }

    #[test]
    fn test_from_sdk_config_without_credentials() {
        let config = aws_config::SdkConfig::builder()
            .region(aws_config::Region::new("us-east-1"))
            .build();
        let err = StsTokenMinter::from_sdk_config(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SigningFailure);
    }

    #[tokio::test]
    async fn test_sdk_config_mints_with_its_credentials() {
        let credentials = SharedCredentialsProvider::new(test_credentials(None));
        let config = aws_config::SdkConfig::builder()
            .region(aws_config::Region::new("eu-west-1"))
            .credentials_provider(credentials)
            .build();

        let token = config.mint("prod-eks").await.unwrap();
        let url = token.presigned_url().unwrap();
        assert!(url.starts_with("https://sts.eu-west-1.amazonaws.com/?"));
    }
}
