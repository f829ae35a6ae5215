//! Caller identity resolution via STS `GetCallerIdentity`.

use async_trait::async_trait;
use tracing::debug;

use crate::error::AuthError;

/// Display name used when the ARN carries no path segment (account root).
pub const ROOT_DISPLAY_NAME: &str = "iam-root-account";

/// Anything that can answer "who am I" with a role or user ARN.
#[async_trait]
pub trait CallerIdentity: Send + Sync {
    async fn caller_arn(&self) -> Result<String, AuthError>;
}

#[async_trait]
impl CallerIdentity for aws_sdk_sts::Client {
    async fn caller_arn(&self) -> Result<String, AuthError> {
        let resp = self
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| AuthError::identity("sts::get_caller_identity", e))?;

        debug!(
            "STS identity verified: account={}",
            resp.account().unwrap_or("unknown")
        );

        resp.arn()
            .map(ToString::to_string)
            .ok_or_else(|| AuthError::IdentityUnavailable {
                operation: "sts::get_caller_identity",
                detail: "response carried no ARN".to_string(),
            })
    }
}

/// The resolved caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    arn: String,
    display_name: String,
}

impl Principal {
    pub fn from_arn(arn: impl Into<String>) -> Self {
        let arn = arn.into();
        let display_name = display_name(&arn).to_string();
        Self { arn, display_name }
    }

    pub fn arn(&self) -> &str {
        &self.arn
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Last `/` segment of an ARN, e.g. the session name of an assumed role.
///
/// An ARN without any `/` is the account root. A trailing `/` yields an empty
/// segment, which is kept as is.
fn display_name(arn: &str) -> &str {
    match arn.rsplit_once('/') {
        Some((_, last)) => last,
        None => ROOT_DISPLAY_NAME,
    }
}

/// Confirm the caller's identity and derive its principal.
pub async fn resolve_identity<I: CallerIdentity + ?Sized>(
    identity: &I,
) -> Result<Principal, AuthError> {
    let arn = identity.caller_arn().await?;
    debug!("Role ARN for the current session is {}", arn);
    Ok(Principal::from_arn(arn))
}
