//! Principal and tenant resolution shared by the tenancy hooks.

use std::sync::Arc;

use dog_core::{CallContext, Principal};

use crate::entity::Tenant;
use crate::error::TenancyError;
use crate::identity::IdentityResolver;
use crate::lookup::TenantLookup;
use crate::options::TenantDimension;

/// Outcome of resolving the caller's tenant in one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No principal: anonymous or system call.
    Anonymous,
    /// Known principal without a tenant in this dimension.
    Unassigned(Principal),
    Tenant(Principal, Tenant),
}

impl Resolution {
    pub fn tenant(&self) -> Option<&Tenant> {
        match self {
            Resolution::Tenant(_, t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct TenantResolver {
    identity: Arc<dyn IdentityResolver>,
    lookup: Arc<dyn TenantLookup>,
}

impl TenantResolver {
    pub fn new(identity: Arc<dyn IdentityResolver>, lookup: Arc<dyn TenantLookup>) -> Self {
        Self { identity, lookup }
    }

    pub async fn resolve(
        &self,
        call: &CallContext,
        dimension: &TenantDimension,
    ) -> Result<Resolution, TenancyError> {
        let Some(principal) = self.identity.current_principal(call) else {
            return Ok(Resolution::Anonymous);
        };
        match self.lookup.tenant_of(&principal, dimension).await? {
            Some(tenant) => Ok(Resolution::Tenant(principal, tenant)),
            None => Ok(Resolution::Unassigned(principal)),
        }
    }
}
