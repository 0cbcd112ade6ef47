// Tenant lookup against a user table.

use std::sync::Arc;

use async_trait::async_trait;
use dog_core::Principal;
use dog_tenancy::{TenancyError, Tenant, TenantDimension, TenantLookup, TenantOwned};

use crate::store::MemoryStore;

/// Reads the principal's user row straight from the store, outside any
/// session, and takes the tenant from the dimension's entity field, keeping
/// its JSON form.
pub struct UserStoreLookup {
    store: Arc<MemoryStore>,
    table: String,
    login_field: String,
}

impl UserStoreLookup {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            table: "users".to_string(),
            login_field: "login".to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_login_field(mut self, field: impl Into<String>) -> Self {
        self.login_field = field.into();
        self
    }
}

#[async_trait]
impl TenantLookup for UserStoreLookup {
    async fn tenant_of(
        &self,
        principal: &Principal,
        dimension: &TenantDimension,
    ) -> Result<Option<Tenant>, TenancyError> {
        let user = self
            .store
            .find_by(&self.table, &self.login_field, &principal.login)
            .ok_or_else(|| TenancyError::PrincipalNotFound(principal.login.clone()))?;
        Ok(user.tenant_value(&dimension.entity_field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reads_tenant_from_user_row() {
        let store = Arc::new(MemoryStore::new());
        store
            .seed(
                "users",
                vec![
                    json!({ "login": "alice", "company": { "id": 10, "name": "Acme" } }),
                    json!({ "login": "root", "company": null }),
                ],
            )
            .unwrap();
        let lookup = UserStoreLookup::new(store);
        let company = TenantDimension::new("company");

        let alice = lookup.tenant_of(&Principal::new("alice"), &company).await.unwrap().unwrap();
        assert_eq!(alice.id().as_str(), "10");
        assert_eq!(alice.value(), &json!({ "id": 10, "name": "Acme" }));
        assert_eq!(lookup.tenant_of(&Principal::new("root"), &company).await.unwrap(), None);
        assert_eq!(
            lookup.tenant_of(&Principal::new("ghost"), &company).await.unwrap_err(),
            TenancyError::PrincipalNotFound("ghost".into())
        );
    }
}
