// Tenant filter activation hook.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dog_core::hooks::DogBeforeHook;
use dog_core::{FilterScope, HookContext, SessionError};
use tracing::debug;

use crate::dispatch::{OperationKind, Pointcuts};
use crate::error::TenancyError;
use crate::options::TenantDimension;
use crate::resolver::{Resolution, TenantResolver};

/// Before hook for read operations and for writes to existing rows.
///
/// Enables the dimension's filter on the call's session, bound to the
/// principal's tenant. The scope is held by the context and released when
/// the pipeline run ends, whether the operation succeeded or not. If the
/// filter cannot be activated the operation does not run.
///
/// Under the filter an `update` or `patch` only finds rows of the caller's
/// tenant, so a write never lands on another tenant's row.
pub struct TenantFilterActivator {
    dimension: Arc<TenantDimension>,
    pointcuts: Arc<Pointcuts>,
    resolver: TenantResolver,
    deny_without_tenant: bool,
}

impl TenantFilterActivator {
    pub fn new(
        dimension: Arc<TenantDimension>,
        pointcuts: Arc<Pointcuts>,
        resolver: TenantResolver,
        deny_without_tenant: bool,
    ) -> Self {
        Self {
            dimension,
            pointcuts,
            resolver,
            deny_without_tenant,
        }
    }

    pub fn dimension(&self) -> &TenantDimension {
        &self.dimension
    }
}

#[async_trait]
impl<R, P> DogBeforeHook<R, P> for TenantFilterActivator
where
    R: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()> {
        if !self.pointcuts.filtered(&ctx.service, &ctx.method) {
            return Ok(());
        }
        let reading = self.pointcuts.matches(OperationKind::Read, &ctx.service, &ctx.method);
        let dim = &self.dimension;

        let tenant = match self
            .resolver
            .resolve(&ctx.call, dim)
            .await
            .map_err(TenancyError::into_anyhow)?
        {
            Resolution::Tenant(_, tenant) => tenant,
            Resolution::Anonymous => {
                debug!(operation = %ctx.operation(), dimension = %dim.name, "anonymous call, filter skipped");
                return Ok(());
            }
            Resolution::Unassigned(principal) => {
                if self.deny_without_tenant && reading {
                    return Err(TenancyError::TenantRequired {
                        login: principal.login,
                        dimension: dim.name.clone(),
                    }
                    .into_anyhow());
                }
                debug!(
                    operation = %ctx.operation(),
                    dimension = %dim.name,
                    principal = %principal,
                    "principal has no tenant, filter skipped"
                );
                return Ok(());
            }
        };

        let activation_failed = |source: SessionError| {
            TenancyError::FilterActivation {
                filter: dim.filter_name.clone(),
                source,
            }
            .into_anyhow()
        };

        let session = ctx
            .session()
            .cloned()
            .ok_or_else(|| activation_failed(SessionError::NotEnlisted))?;
        let scope = FilterScope::activate(&session, &dim.filter_name, &dim.param_name, tenant.id())
            .map_err(activation_failed)?;

        debug!(
            operation = %ctx.operation(),
            dimension = %dim.name,
            tenant = %tenant,
            session = session.id(),
            "tenant filter active"
        );
        ctx.hold_scope(scope);
        Ok(())
    }
}
