/// External collaborator clients
///
/// Each collaborator is an opaque remote service behind a trait so the core
/// stays testable with in-process doubles. The HTTP implementations share
/// one reqwest client built at startup with a bounded request timeout; an
/// unreachable collaborator surfaces as `ServiceUnavailable` and the caller
/// decides whether a fallback exists.
use crate::{
    config::ExternalConfig,
    error::{AppError, AppResult},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Kinds of human-readable ids the generator can mint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    User,
    Device,
}

impl IdKind {
    pub fn id_name(&self) -> &'static str {
        match self {
            IdKind::User => "user.id",
            IdKind::Device => "device.id",
        }
    }

    pub fn format(&self) -> &'static str {
        match self {
            IdKind::User => "USER-[fy:yyyy]-[SEQ_USER_ID]",
            IdKind::Device => "DEV-[fy:yyyy]-[SEQ_DEVICE_ID]",
        }
    }

    /// Prefix used when falling back to a locally generated id
    pub fn local_prefix(&self) -> &'static str {
        match self {
            IdKind::User => "USER",
            IdKind::Device => "DEV",
        }
    }
}

/// Role definition from the role registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDef {
    pub code: String,
    pub name: String,
}

/// Password signing authority. `Err` means unavailable.
#[async_trait]
pub trait SigningAuthority: Send + Sync {
    async fn sign(&self, plaintext: &str) -> AppResult<String>;
    async fn verify(&self, plaintext: &str, signature: &str) -> AppResult<bool>;
}

/// Tenant role registry. `Err` means unavailable.
#[async_trait]
pub trait RoleRegistry: Send + Sync {
    async fn list_roles(&self, tenant_id: &str) -> AppResult<Vec<RoleDef>>;
}

/// Sequence/id generation service. `Err` means unavailable.
#[async_trait]
pub trait IdGenerator: Send + Sync {
    async fn generate(&self, tenant_id: &str, kind: IdKind) -> AppResult<String>;
}

/// Build the shared outbound HTTP client
pub fn build_client(config: &ExternalConfig) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

fn host_or_unavailable(host: &Option<String>, what: &str) -> AppResult<String> {
    host.clone()
        .ok_or_else(|| AppError::ServiceUnavailable(format!("{} not configured", what)))
}

fn unavailable(what: &str, e: reqwest::Error) -> AppError {
    tracing::warn!("{} request failed: {}", what, e);
    AppError::ServiceUnavailable(format!("{} unreachable", what))
}

/// HTTP client for the crypto signing service
pub struct HttpSigningAuthority {
    client: reqwest::Client,
    host: Option<String>,
    tenant_id: String,
}

impl HttpSigningAuthority {
    pub fn new(client: reqwest::Client, host: Option<String>, tenant_id: String) -> Self {
        Self {
            client,
            host,
            tenant_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signatures: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    verified: Vec<bool>,
}

#[async_trait]
impl SigningAuthority for HttpSigningAuthority {
    async fn sign(&self, plaintext: &str) -> AppResult<String> {
        let host = host_or_unavailable(&self.host, "signing authority")?;
        let url = format!("{}/crypto/v1/_sign", host);

        let response: SignResponse = self
            .client
            .post(&url)
            .json(&json!({
                "signRequest": [plaintext],
                "tenantId": self.tenant_id,
            }))
            .send()
            .await
            .map_err(|e| unavailable("signing authority", e))?
            .error_for_status()
            .map_err(|e| unavailable("signing authority", e))?
            .json()
            .await
            .map_err(|e| unavailable("signing authority", e))?;

        response
            .signatures
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ServiceUnavailable("signing authority returned no signature".to_string()))
    }

    async fn verify(&self, plaintext: &str, signature: &str) -> AppResult<bool> {
        let host = host_or_unavailable(&self.host, "signing authority")?;
        let url = format!("{}/crypto/v1/_verify", host);

        let response: VerifyResponse = self
            .client
            .post(&url)
            .json(&json!({
                "verifyRequest": [{ "claim": plaintext, "signature": signature }],
                "tenantId": self.tenant_id,
            }))
            .send()
            .await
            .map_err(|e| unavailable("signing authority", e))?
            .error_for_status()
            .map_err(|e| unavailable("signing authority", e))?
            .json()
            .await
            .map_err(|e| unavailable("signing authority", e))?;

        Ok(response.verified.first().copied().unwrap_or(false))
    }
}

/// HTTP client for the role registry
pub struct HttpRoleRegistry {
    client: reqwest::Client,
    host: Option<String>,
}

impl HttpRoleRegistry {
    pub fn new(client: reqwest::Client, host: Option<String>) -> Self {
        Self { client, host }
    }
}

#[derive(Debug, Deserialize)]
struct RolesResponse {
    roles: Vec<RoleDef>,
}

#[async_trait]
impl RoleRegistry for HttpRoleRegistry {
    async fn list_roles(&self, tenant_id: &str) -> AppResult<Vec<RoleDef>> {
        let host = host_or_unavailable(&self.host, "role registry")?;
        let url = format!("{}/roles/v1/_search", host);

        let response: RolesResponse = self
            .client
            .post(&url)
            .json(&json!({ "tenantId": tenant_id }))
            .send()
            .await
            .map_err(|e| unavailable("role registry", e))?
            .error_for_status()
            .map_err(|e| unavailable("role registry", e))?
            .json()
            .await
            .map_err(|e| unavailable("role registry", e))?;

        Ok(response.roles)
    }
}

/// HTTP client for the sequence/id generation service
pub struct HttpIdGenerator {
    client: reqwest::Client,
    host: Option<String>,
}

impl HttpIdGenerator {
    pub fn new(client: reqwest::Client, host: Option<String>) -> Self {
        Self { client, host }
    }
}

#[derive(Debug, Deserialize)]
struct IdResponseEntry {
    id: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IdGenResponse {
    #[serde(rename = "idResponses")]
    id_responses: Vec<IdResponseEntry>,
}

#[async_trait]
impl IdGenerator for HttpIdGenerator {
    async fn generate(&self, tenant_id: &str, kind: IdKind) -> AppResult<String> {
        let host = host_or_unavailable(&self.host, "id generator")?;
        let url = format!("{}/id/_generate", host);

        let response: IdGenResponse = self
            .client
            .post(&url)
            .json(&json!({
                "idRequests": [{
                    "tenantId": tenant_id,
                    "idName": kind.id_name(),
                    "format": kind.format(),
                    "count": 1,
                }]
            }))
            .send()
            .await
            .map_err(|e| unavailable("id generator", e))?
            .error_for_status()
            .map_err(|e| unavailable("id generator", e))?
            .json()
            .await
            .map_err(|e| unavailable("id generator", e))?;

        response
            .id_responses
            .into_iter()
            .next()
            .and_then(|entry| entry.id.into_iter().next())
            .ok_or_else(|| AppError::ServiceUnavailable("id generator returned no id".to_string()))
    }
}

/// Locally generated fallback id, used when the generator is unreachable
pub fn local_fallback_id(kind: IdKind) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("{}-{}", kind.local_prefix(), suffix)
}

/// Default role set used when the role registry is unreachable
pub fn default_roles() -> Vec<RoleDef> {
    vec![
        RoleDef {
            code: "admin".to_string(),
            name: "Administrator".to_string(),
        },
        RoleDef {
            code: "user".to_string(),
            name: "Regular User".to_string(),
        },
        RoleDef {
            code: "secondary_user".to_string(),
            name: "Secondary User".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_fallback_id_carries_kind_prefix() {
        let id = local_fallback_id(IdKind::User);
        assert!(id.starts_with("USER-"));
        assert_eq!(id.len(), "USER-".len() + 8);

        let id = local_fallback_id(IdKind::Device);
        assert!(id.starts_with("DEV-"));
    }

    #[tokio::test]
    async fn unconfigured_collaborators_report_unavailable() {
        let client = reqwest::Client::new();
        let signer = HttpSigningAuthority::new(client.clone(), None, "aq".to_string());
        let registry = HttpRoleRegistry::new(client.clone(), None);
        let idgen = HttpIdGenerator::new(client, None);

        assert!(matches!(
            signer.sign("pw").await,
            Err(crate::error::AppError::ServiceUnavailable(_))
        ));
        assert!(matches!(
            registry.list_roles("aq").await,
            Err(crate::error::AppError::ServiceUnavailable(_))
        ));
        assert!(matches!(
            idgen.generate("aq", IdKind::User).await,
            Err(crate::error::AppError::ServiceUnavailable(_))
        ));
    }
}
