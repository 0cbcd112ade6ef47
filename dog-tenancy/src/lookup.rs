//! Principal → tenant lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use dog_core::Principal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Tenant;
use crate::error::TenancyError;
use crate::options::TenantDimension;

/// Resolves the tenant a principal belongs to in one dimension.
///
/// Implementations must be plain reads: they run before the filter for
/// the current operation is active and must not write.
#[async_trait]
pub trait TenantLookup: Send + Sync {
    /// `Ok(None)`: the principal exists but has no tenant in `dimension`.
    /// `Err(PrincipalNotFound)`: no user record for the principal.
    async fn tenant_of(
        &self,
        principal: &Principal,
        dimension: &TenantDimension,
    ) -> Result<Option<Tenant>, TenancyError>;
}

/// One user of a [`StaticTenantLookup`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub login: String,
    /// Dimension name → tenant field value (`"acme"`, `10`, `{ "id": 10 }`).
    #[serde(default)]
    pub tenants: HashMap<String, Value>,
}

/// Fixed user directory, loaded from code or JSON.
#[derive(Clone, Debug, Default)]
pub struct StaticTenantLookup {
    users: HashMap<String, HashMap<String, Tenant>>,
}

impl StaticTenantLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with no tenants.
    pub fn user(mut self, login: impl Into<String>) -> Self {
        self.users.entry(login.into()).or_default();
        self
    }

    /// Add (or extend) a user with a tenant in `dimension`.
    pub fn assign(
        mut self,
        login: impl Into<String>,
        dimension: impl Into<String>,
        tenant: impl Into<Tenant>,
    ) -> Self {
        self.users
            .entry(login.into())
            .or_default()
            .insert(dimension.into(), tenant.into());
        self
    }

    pub fn from_entries(entries: impl IntoIterator<Item = DirectoryEntry>) -> Self {
        Self {
            users: entries
                .into_iter()
                .map(|e| {
                    let tenants: HashMap<String, Tenant> = e
                        .tenants
                        .into_iter()
                        .filter_map(|(dim, value)| Some((dim, Tenant::from_value(value)?)))
                        .collect();
                    (e.login, tenants)
                })
                .collect(),
        }
    }

    /// `[{ "login": "alice", "tenants": { "company": "acme" } }, ...]`
    pub fn from_json_str(json: &str) -> Result<Self, TenancyError> {
        let entries: Vec<DirectoryEntry> = serde_json::from_str(json)
            .map_err(|e| TenancyError::invalid_config(format!("user directory: {e}")))?;
        Ok(Self::from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl TenantLookup for StaticTenantLookup {
    async fn tenant_of(
        &self,
        principal: &Principal,
        dimension: &TenantDimension,
    ) -> Result<Option<Tenant>, TenancyError> {
        let tenants = self
            .users
            .get(&principal.login)
            .ok_or_else(|| TenancyError::PrincipalNotFound(principal.login.clone()))?;
        Ok(tenants.get(&dimension.name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_lookup_resolves_per_dimension() {
        let lookup = StaticTenantLookup::new()
            .assign("alice", "company", "acme")
            .assign("alice", "region", "eu")
            .user("root");
        let company = TenantDimension::new("company");
        let region = TenantDimension::new("region");

        assert_eq!(
            lookup.tenant_of(&Principal::new("alice"), &company).await.unwrap(),
            Some(Tenant::from("acme"))
        );
        assert_eq!(
            lookup.tenant_of(&Principal::new("alice"), &region).await.unwrap(),
            Some(Tenant::from("eu"))
        );
        assert_eq!(lookup.tenant_of(&Principal::new("root"), &company).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_login_is_principal_not_found() {
        let lookup = StaticTenantLookup::new();
        let err = lookup
            .tenant_of(&Principal::new("ghost"), &TenantDimension::new("company"))
            .await
            .unwrap_err();
        assert_eq!(err, TenancyError::PrincipalNotFound("ghost".into()));
    }

    #[tokio::test]
    async fn directory_loads_from_json() {
        let lookup = StaticTenantLookup::from_json_str(
            r#"[
                { "login": "alice", "tenants": { "company": { "id": 10, "name": "Acme" } } },
                { "login": "root", "tenants": { "company": null } }
            ]"#,
        )
        .unwrap();
        let company = TenantDimension::new("company");

        assert_eq!(lookup.len(), 2);
        let alice = lookup.tenant_of(&Principal::new("alice"), &company).await.unwrap().unwrap();
        assert_eq!(alice.id().as_str(), "10");
        assert_eq!(alice.value(), &serde_json::json!({ "id": 10, "name": "Acme" }));
        assert_eq!(lookup.tenant_of(&Principal::new("root"), &company).await.unwrap(), None);
        assert!(StaticTenantLookup::from_json_str("{").is_err());
    }
}
