use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientAccountId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngagementId(pub String);

/// The (client account, engagement) pair scoping every operation.
///
/// Construction is the only way to obtain one, so a populated tenant
/// context is guaranteed wherever the type appears.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub client_account_id: ClientAccountId,
    pub engagement_id: EngagementId,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("missing tenant context: `{field}` is required")]
pub struct MissingTenantContext {
    pub field: &'static str,
}

impl TenantContext {
    pub fn new(
        client_account_id: impl Into<String>,
        engagement_id: impl Into<String>,
    ) -> Result<Self, MissingTenantContext> {
        let context = Self {
            client_account_id: ClientAccountId(client_account_id.into()),
            engagement_id: EngagementId(engagement_id.into()),
        };
        context.validate()?;
        Ok(context)
    }

    /// Re-check a context whose fields may have been assembled directly.
    pub fn validate(&self) -> Result<(), MissingTenantContext> {
        if self.client_account_id.0.trim().is_empty() {
            return Err(MissingTenantContext { field: "client_account_id" });
        }
        if self.engagement_id.0.trim().is_empty() {
            return Err(MissingTenantContext { field: "engagement_id" });
        }
        Ok(())
    }
}
