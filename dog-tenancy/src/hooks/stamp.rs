// Tenant stamping hook.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dog_core::hooks::{DogAfterHook, DogBeforeHook};
use dog_core::{HookContext, ServiceMethodKind};
use tracing::{debug, warn};

use crate::dispatch::{OperationKind, Pointcuts};
use crate::entity::{Tenant, TenantOwned};
use crate::error::TenancyError;
use crate::options::TenantDimension;
use crate::resolver::{Resolution, TenantResolver};

/// Stamps the principal's tenant on create-or-update operations.
///
/// As an after hook it stamps every returned entity whose tenant is unset,
/// falling back to the tenant carried by the input when the principal has
/// none. An entity that already has a tenant is never overwritten.
///
/// As a before hook (dimensions with `stamp_input`) it writes the
/// principal's tenant into the input so the persisted row carries it. On
/// `create` the principal's tenant replaces a caller-supplied one; other
/// writes only get a tenant where the input has none. Those writes run
/// under the tenant filter, so the row they reach already has the
/// caller's tenant.
///
/// Tenants are written in the form the lookup returned them, so a
/// `{ "id": 10, "name": "Acme" }` reference is copied as is.
pub struct TenantStamper {
    dimension: Arc<TenantDimension>,
    pointcuts: Arc<Pointcuts>,
    resolver: TenantResolver,
}

impl TenantStamper {
    pub fn new(dimension: Arc<TenantDimension>, pointcuts: Arc<Pointcuts>, resolver: TenantResolver) -> Self {
        Self {
            dimension,
            pointcuts,
            resolver,
        }
    }

    pub fn dimension(&self) -> &TenantDimension {
        &self.dimension
    }

    fn applies<R, P>(&self, ctx: &HookContext<R, P>) -> bool {
        self.pointcuts
            .matches(OperationKind::CreateOrUpdate, &ctx.service, &ctx.method)
    }

    fn stamp_entity<R: TenantOwned>(&self, entity: &mut R, tenant: &Tenant, operation: &str) {
        let field = &self.dimension.entity_field;
        match entity.tenant(field) {
            None => {
                if !entity.set_tenant(field, tenant) {
                    debug!(operation, field = %field, "result cannot carry a tenant");
                }
            }
            Some(existing) if existing == *tenant.id() => {}
            Some(existing) => warn!(
                operation,
                dimension = %self.dimension.name,
                existing = %existing,
                tenant = %tenant,
                "entity already belongs to another tenant, left as is"
            ),
        }
    }
}

#[async_trait]
impl<R, P> DogBeforeHook<R, P> for TenantStamper
where
    R: TenantOwned + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()> {
        if !self.applies(ctx) || ctx.data.is_none() {
            return Ok(());
        }

        let resolution = self
            .resolver
            .resolve(&ctx.call, &self.dimension)
            .await
            .map_err(TenancyError::into_anyhow)?;
        let Some(tenant) = resolution.tenant() else {
            return Ok(());
        };

        // new entities take the principal's tenant; other writes only fill a gap
        let creating = ctx.method == ServiceMethodKind::Create;
        let field = &self.dimension.entity_field;
        if let Some(data) = ctx.data.as_mut() {
            for record in data.records_mut() {
                match record.tenant(field) {
                    None => {
                        record.set_tenant(field, tenant);
                    }
                    Some(given) if given != *tenant.id() && creating => {
                        debug!(given = %given, tenant = %tenant, "input tenant replaced by principal's");
                        record.set_tenant(field, tenant);
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<R, P> DogAfterHook<R, P> for TenantStamper
where
    R: TenantOwned + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()> {
        if !self.applies(ctx) || ctx.result.is_none() {
            return Ok(());
        }

        let resolution = self
            .resolver
            .resolve(&ctx.call, &self.dimension)
            .await
            .map_err(TenancyError::into_anyhow)?;

        let tenant = match resolution {
            Resolution::Anonymous => return Ok(()),
            Resolution::Tenant(_, tenant) => Some(tenant),
            Resolution::Unassigned(_) => ctx.data.as_ref().and_then(|input| {
                input
                    .records()
                    .into_iter()
                    .find_map(|record| record.tenant_value(&self.dimension.entity_field))
            }),
        };
        let Some(tenant) = tenant else {
            debug!(operation = %ctx.operation(), dimension = %self.dimension.name, "no tenant to stamp");
            return Ok(());
        };

        let operation = ctx.operation();
        if let Some(result) = ctx.result.as_mut() {
            for entity in result.iter_mut() {
                self.stamp_entity(entity, &tenant, &operation);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ContextIdentity;
    use crate::lookup::StaticTenantLookup;
    use dog_core::{CallContext, DogConfigSnapshot, HookResult};
    use serde_json::{json, Value};
    use tracing_test::traced_test;

    fn stamper() -> TenantStamper {
        stamper_with(
            StaticTenantLookup::new()
                .assign("alice", "company", "acme")
                .user("root"),
        )
    }

    fn stamper_with(lookup: StaticTenantLookup) -> TenantStamper {
        let dim = TenantDimension::new("company").stamp_on(["users.create", "users.update"]);
        let pointcuts = Pointcuts::from_dimension(&dim).unwrap();
        TenantStamper::new(
            Arc::new(dim),
            Arc::new(pointcuts),
            TenantResolver::new(Arc::new(ContextIdentity), Arc::new(lookup)),
        )
    }

    fn ctx(login: Option<&str>, method: ServiceMethodKind, data: Option<Value>) -> HookContext<Value, ()> {
        let call = login.map(CallContext::for_login).unwrap_or_default();
        let mut ctx = HookContext::new(call, "users", method, (), DogConfigSnapshot::default());
        ctx.data = data;
        ctx
    }

    async fn after(stamper: &TenantStamper, ctx: &mut HookContext<Value, ()>) -> Result<()> {
        DogAfterHook::run(stamper, ctx).await
    }

    #[tokio::test]
    async fn stamps_unset_results() {
        let stamper = stamper();
        let mut ctx = ctx(Some("alice"), ServiceMethodKind::Create, Some(json!({ "login": "bob" })));
        ctx.result = Some(HookResult::One(json!({ "login": "bob" })));

        after(&stamper, &mut ctx).await.unwrap();

        assert_eq!(ctx.result, Some(HookResult::One(json!({ "login": "bob", "company": "acme" }))));
    }

    #[tokio::test]
    async fn stamps_every_entity_of_a_list() {
        let stamper = stamper();
        let mut ctx = ctx(Some("alice"), ServiceMethodKind::Update, None);
        ctx.result = Some(HookResult::Many(vec![json!({ "id": 1 }), json!({ "id": 2, "company": null })]));

        after(&stamper, &mut ctx).await.unwrap();

        let result = ctx.result.unwrap();
        assert!(result.iter().all(|e| e["company"] == json!("acme")));
    }

    #[tokio::test]
    #[traced_test]
    async fn never_overwrites_an_existing_tenant() {
        let stamper = stamper();
        let mut ctx = ctx(Some("alice"), ServiceMethodKind::Create, None);
        ctx.result = Some(HookResult::One(json!({ "company": { "id": "globex" } })));

        after(&stamper, &mut ctx).await.unwrap();

        assert_eq!(ctx.result, Some(HookResult::One(json!({ "company": { "id": "globex" } }))));
        assert!(logs_contain("entity already belongs to another tenant"));
    }

    #[tokio::test]
    async fn unassigned_principal_falls_back_to_input_tenant() {
        let stamper = stamper();
        let mut ctx = ctx(Some("root"), ServiceMethodKind::Create, Some(json!({ "company": "initech" })));
        ctx.result = Some(HookResult::One(json!({ "id": 9 })));

        after(&stamper, &mut ctx).await.unwrap();

        assert_eq!(ctx.result, Some(HookResult::One(json!({ "id": 9, "company": "initech" }))));
    }

    #[tokio::test]
    async fn anonymous_and_unmatched_calls_are_left_alone() {
        let stamper = stamper();

        let mut anonymous = ctx(None, ServiceMethodKind::Create, Some(json!({ "company": "initech" })));
        anonymous.result = Some(HookResult::One(json!({ "id": 1 })));
        after(&stamper, &mut anonymous).await.unwrap();
        assert_eq!(anonymous.result, Some(HookResult::One(json!({ "id": 1 }))));

        let mut find = ctx(Some("alice"), ServiceMethodKind::Find, None);
        find.result = Some(HookResult::Many(vec![json!({ "id": 1 })]));
        after(&stamper, &mut find).await.unwrap();
        assert_eq!(find.result, Some(HookResult::Many(vec![json!({ "id": 1 })])));
    }

    #[tokio::test]
    async fn input_gets_the_principal_tenant_before_persisting() {
        let stamper = stamper();
        let mut ctx = ctx(Some("alice"), ServiceMethodKind::Create, Some(json!({ "login": "bob", "company": "globex" })));

        DogBeforeHook::run(&stamper, &mut ctx).await.unwrap();

        assert_eq!(ctx.data, Some(json!({ "login": "bob", "company": "acme" })));
    }

    #[tokio::test]
    async fn updates_keep_a_caller_supplied_tenant() {
        let stamper = stamper();
        let mut ctx = ctx(Some("alice"), ServiceMethodKind::Update, Some(json!({ "company": "globex" })));

        DogBeforeHook::run(&stamper, &mut ctx).await.unwrap();

        assert_eq!(ctx.data, Some(json!({ "company": "globex" })));
    }

    #[tokio::test]
    async fn tenants_keep_the_form_the_lookup_gave() {
        let stamper = stamper_with(StaticTenantLookup::new().assign("carl", "company", 7_i64));
        let mut ctx = ctx(Some("carl"), ServiceMethodKind::Create, Some(json!({ "company": { "id": "7" } })));

        DogBeforeHook::run(&stamper, &mut ctx).await.unwrap();
        // same id in another form is left alone
        assert_eq!(ctx.data, Some(json!({ "company": { "id": "7" } })));

        ctx.data = Some(json!({ "login": "dan" }));
        DogBeforeHook::run(&stamper, &mut ctx).await.unwrap();
        assert_eq!(ctx.data, Some(json!({ "login": "dan", "company": 7 })));
    }

    #[tokio::test]
    async fn input_reference_is_copied_whole_for_unassigned_principals() {
        let stamper = stamper();
        let reference = json!({ "id": 3, "name": "Initech" });
        let mut ctx = ctx(Some("root"), ServiceMethodKind::Create, Some(json!({ "company": reference.clone() })));
        ctx.result = Some(HookResult::One(json!({ "id": 9 })));

        after(&stamper, &mut ctx).await.unwrap();

        assert_eq!(ctx.result, Some(HookResult::One(json!({ "id": 9, "company": reference }))));
    }

    #[tokio::test]
    async fn batch_input_is_stamped_item_by_item() {
        let stamper = stamper();
        let mut ctx = ctx(
            Some("alice"),
            ServiceMethodKind::Create,
            Some(json!([{ "login": "a" }, { "login": "b", "company": "globex" }])),
        );

        DogBeforeHook::run(&stamper, &mut ctx).await.unwrap();

        let data = ctx.data.unwrap();
        assert!(data.records().iter().all(|r| r["company"] == json!("acme")));
    }

    #[tokio::test]
    async fn unknown_principal_fails_the_call() {
        let stamper = stamper();
        let mut ctx = ctx(Some("ghost"), ServiceMethodKind::Create, Some(json!({})));
        ctx.result = Some(HookResult::One(json!({})));

        let err = after(&stamper, &mut ctx).await.unwrap_err();
        assert_eq!(
            TenancyError::from_anyhow(&err),
            Some(&TenancyError::PrincipalNotFound("ghost".into()))
        );
    }
}
