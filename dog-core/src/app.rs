use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::errors::DogError;
use crate::hooks::{collect_method_hooks, HookFut};
use crate::session::{SessionLease, SessionProvider};
use crate::{
    CallContext, DogConfig, DogService, DogServiceRegistry, HookContext, HookResult, Next,
    ServiceHooks, ServiceMethodKind,
};

struct DogAppInner<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    registry: RwLock<DogServiceRegistry<R, P>>,
    global_hooks: RwLock<ServiceHooks<R, P>>,
    service_hooks: RwLock<HashMap<String, ServiceHooks<R, P>>>,
    config: RwLock<DogConfig>,
    sessions: RwLock<Option<Arc<dyn SessionProvider>>>,
}

/// DogApp is the central application container for DogRS.
///
/// Framework-agnostic. Holds:
/// - service registry
/// - app hooks
/// - per-service hooks
/// - config
/// - the session provider every call leases its data-access session from
pub struct DogApp<R, P = ()>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    inner: Arc<DogAppInner<R, P>>,
}

type HooksForMethod<R, P> = (
    Vec<Arc<dyn crate::DogAroundHook<R, P>>>,
    Vec<Arc<dyn crate::DogBeforeHook<R, P>>>,
    Vec<Arc<dyn crate::DogAfterHook<R, P>>>,
    Vec<Arc<dyn crate::DogErrorHook<R, P>>>,
);

type ServiceCall<R, P> = Arc<
    dyn for<'a> Fn(Arc<dyn DogService<R, P>>, &'a mut HookContext<R, P>) -> HookFut<'a>
        + Send
        + Sync,
>;

fn service_call<R, P, F>(f: F) -> ServiceCall<R, P>
where
    F: for<'a> Fn(Arc<dyn DogService<R, P>>, &'a mut HookContext<R, P>) -> HookFut<'a>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

impl<R, P> Default for DogApp<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, P> Clone for DogApp<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, P> DogApp<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DogAppInner {
                registry: RwLock::new(DogServiceRegistry::new()),
                global_hooks: RwLock::new(ServiceHooks::new()),
                service_hooks: RwLock::new(HashMap::new()),
                config: RwLock::new(DogConfig::new()),
                sessions: RwLock::new(None),
            }),
        }
    }

    pub fn register_service<S>(&self, name: S, service: Arc<dyn DogService<R, P>>)
    where
        S: Into<String>,
    {
        let name = name.into();
        debug!(service = %name, "service registered");
        self.inner.registry.write().register(name, service);
    }

    pub fn service_names(&self) -> Vec<String> {
        self.inner.registry.read().names()
    }

    /// Feathers: `app.hooks({ ... })`
    pub fn hooks<F>(&self, f: F)
    where
        F: FnOnce(&mut ServiceHooks<R, P>),
    {
        let mut g = self.inner.global_hooks.write();
        f(&mut g);
    }

    /// Feathers: `app.service("x").hooks({ ... })`
    pub(crate) fn configure_service_hooks<F>(&self, service_name: &str, f: F)
    where
        F: FnOnce(&mut ServiceHooks<R, P>),
    {
        let mut map = self.inner.service_hooks.write();
        let hooks = map.entry(service_name.to_string()).or_default();
        f(hooks);
    }

    /// Feathers: `app.service("name")`
    pub fn service(&self, name: &str) -> Result<ServiceHandle<R, P>> {
        let svc = self
            .inner
            .registry
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DogError::not_found(format!("DogService not found: {name}")).into_anyhow())?;

        Ok(ServiceHandle {
            app: self.clone(),
            name: name.to_string(),
            service: svc,
        })
    }

    /// Every call leases a session from `provider` unless the caller already
    /// put one in its `CallContext`.
    pub fn use_sessions(&self, provider: Arc<dyn SessionProvider>) {
        *self.inner.sessions.write() = Some(provider);
    }

    pub fn session_provider(&self) -> Option<Arc<dyn SessionProvider>> {
        self.inner.sessions.read().clone()
    }

    /// Feathers: `app.set(key, value)`
    pub fn set<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.inner.config.write().set(key, value);
    }

    /// Feathers: `app.get(key)`
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.config.read().get(key).map(|v| v.to_string())
    }

    pub fn configure<F>(&self, f: F)
    where
        F: FnOnce(&mut DogConfig),
    {
        let mut cfg = self.inner.config.write();
        f(&mut cfg);
    }

    pub fn config_snapshot(&self) -> crate::DogConfigSnapshot {
        self.inner.config.read().snapshot()
    }
}

pub struct ServiceHandle<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    app: DogApp<R, P>,
    name: String,
    service: Arc<dyn DogService<R, P>>,
}

impl<R, P> ServiceHandle<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    pub fn hooks<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut ServiceHooks<R, P>),
    {
        self.app.configure_service_hooks(&self.name, f);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inner(&self) -> &Arc<dyn DogService<R, P>> {
        &self.service
    }
}

// ──────────────────────────────────────────────────────────────
// Pipeline
// ──────────────────────────────────────────────────────────────

impl<R, P> ServiceHandle<R, P>
where
    R: Send + Clone + 'static,
    P: Send + Clone + 'static,
{
    /// Collect hooks in Feathers order: global first, then service.
    fn collect_hooks_for_method(&self, method: &ServiceMethodKind) -> HooksForMethod<R, P> {
        let g = self.app.inner.global_hooks.read();
        let map = self.app.inner.service_hooks.read();

        let mut around = collect_method_hooks(&g.around_all, &g.around_by_method, method);
        let mut before = collect_method_hooks(&g.before_all, &g.before_by_method, method);
        let mut after = collect_method_hooks(&g.after_all, &g.after_by_method, method);
        let mut error = collect_method_hooks(&g.error_all, &g.error_by_method, method);

        if let Some(h) = map.get(&self.name) {
            around.extend(collect_method_hooks(&h.around_all, &h.around_by_method, method));
            before.extend(collect_method_hooks(&h.before_all, &h.before_by_method, method));
            after.extend(collect_method_hooks(&h.after_all, &h.after_by_method, method));
            error.extend(collect_method_hooks(&h.error_all, &h.error_by_method, method));
        }

        (around, before, after, error)
    }

    /// around → before → service_call → after → error
    ///
    /// Methods outside the service's capabilities are refused before any
    /// hook runs. The data-access session is leased before the first hook runs. Filter
    /// scopes held by the context are released before the session goes back
    /// to its provider, on success and on error alike.
    async fn run_pipeline(
        &self,
        method: ServiceMethodKind,
        mut call: CallContext,
        params: P,
        data: Option<R>,
        service_call: ServiceCall<R, P>,
    ) -> Result<HookContext<R, P>> {
        if !self.service.capabilities().allows(&method) {
            return Err(DogError::method_not_allowed(format!(
                "Method '{method}' is not allowed on service '{}'",
                self.name
            ))
            .into_anyhow());
        }

        let (around, before, after, error) = self.collect_hooks_for_method(&method);

        let provider = if call.session.is_none() {
            self.app.session_provider()
        } else {
            None
        };

        let lease = match provider {
            Some(provider) => {
                let lease = SessionLease::acquire(&provider)
                    .await
                    .map_err(|e| DogError::unavailable(e.to_string()).with_source(e.into()).into_anyhow())?;
                call.session = Some(lease.session());
                Some(lease)
            }
            None => None,
        };

        let mut ctx = HookContext::new(call, self.name.clone(), method, params, self.app.config_snapshot());
        ctx.data = data;

        debug!(
            operation = %ctx.operation(),
            principal = ?ctx.principal().map(|p| p.login.as_str()),
            "dispatch"
        );

        let svc = self.service.clone();

        // Inner: BEFORE -> service_call -> AFTER
        let mut next: Next<R, P> = Next::new(move |ctx| {
            Box::pin(async move {
                for h in &before {
                    h.run(ctx).await?;
                }

                // sets ctx.result
                (service_call)(svc, ctx).await?;

                for h in after.iter().rev() {
                    h.run(ctx).await?;
                }

                Ok(())
            })
        });

        // AROUND chain: first hook is outermost
        for h in around.iter().rev() {
            let hook = h.clone();
            let prev = next;
            next = Next::new(move |ctx| {
                Box::pin(async move { hook.run(ctx, prev).await })
            });
        }

        let res = match next.run(&mut ctx).await {
            Ok(()) => Ok(()),
            Err(e) => {
                ctx.error = Some(e);

                for h in &error {
                    if let Err(hook_err) = h.run(&mut ctx).await {
                        warn!(operation = %ctx.operation(), error = %hook_err, "error hook failed");
                    }
                }

                // an error hook may recover by taking the error
                match ctx.error.take() {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
        };

        let released = ctx.release_scopes();
        if lease.is_some() {
            ctx.call.session = None;
        }
        drop(lease);

        debug!(operation = %ctx.operation(), released, ok = res.is_ok(), "call finished");

        res.map(|()| ctx)
    }

    pub async fn find(&self, call: CallContext, params: P) -> Result<Vec<R>> {
        let ctx = self
            .run_pipeline(
                ServiceMethodKind::Find,
                call,
                params,
                None,
                service_call::<R, P, _>(|svc, ctx| {
                    Box::pin(async move {
                        let records = svc.find(&ctx.call, ctx.params.clone()).await?;
                        ctx.result = Some(HookResult::Many(records));
                        Ok(())
                    })
                }),
            )
            .await?;

        match ctx.result {
            Some(HookResult::Many(v)) => Ok(v),
            Some(HookResult::One(_)) => Err(anyhow::anyhow!("find() produced HookResult::One unexpectedly")),
            None => Ok(vec![]),
        }
    }

    pub async fn get(&self, call: CallContext, id: &str, params: P) -> Result<R> {
        let id = id.to_string();

        let ctx = self
            .run_pipeline(
                ServiceMethodKind::Get,
                call,
                params,
                None,
                service_call::<R, P, _>(move |svc, ctx| {
                    let id = id.clone();
                    Box::pin(async move {
                        let record = svc.get(&ctx.call, &id, ctx.params.clone()).await?;
                        ctx.result = Some(HookResult::One(record));
                        Ok(())
                    })
                }),
            )
            .await?;

        expect_one(ctx, "get")
    }

    pub async fn create(&self, call: CallContext, data: R, params: P) -> Result<R> {
        let ctx = self
            .run_pipeline(
                ServiceMethodKind::Create,
                call,
                params,
                Some(data),
                service_call::<R, P, _>(|svc, ctx| {
                    Box::pin(async move {
                        let data = ctx
                            .data
                            .clone()
                            .ok_or_else(|| anyhow::anyhow!("create() requires ctx.data"))?;

                        let created = svc.create(&ctx.call, data, ctx.params.clone()).await?;
                        ctx.result = Some(HookResult::One(created));
                        Ok(())
                    })
                }),
            )
            .await?;

        expect_one(ctx, "create")
    }

    pub async fn update(&self, call: CallContext, id: &str, data: R, params: P) -> Result<R> {
        let id = id.to_string();

        let ctx = self
            .run_pipeline(
                ServiceMethodKind::Update,
                call,
                params,
                Some(data),
                service_call::<R, P, _>(move |svc, ctx| {
                    let id = id.clone();
                    Box::pin(async move {
                        let data = ctx
                            .data
                            .clone()
                            .ok_or_else(|| anyhow::anyhow!("update() requires ctx.data"))?;

                        let updated = svc.update(&ctx.call, &id, data, ctx.params.clone()).await?;
                        ctx.result = Some(HookResult::One(updated));
                        Ok(())
                    })
                }),
            )
            .await?;

        expect_one(ctx, "update")
    }

    pub async fn patch(&self, call: CallContext, id: Option<&str>, data: R, params: P) -> Result<R> {
        let id: Option<String> = id.map(|s| s.to_string());

        let ctx = self
            .run_pipeline(
                ServiceMethodKind::Patch,
                call,
                params,
                Some(data),
                service_call::<R, P, _>(move |svc, ctx| {
                    let id = id.clone();
                    Box::pin(async move {
                        let data = ctx
                            .data
                            .clone()
                            .ok_or_else(|| anyhow::anyhow!("patch() requires ctx.data"))?;

                        let patched = svc
                            .patch(&ctx.call, id.as_deref(), data, ctx.params.clone())
                            .await?;
                        ctx.result = Some(HookResult::One(patched));
                        Ok(())
                    })
                }),
            )
            .await?;

        expect_one(ctx, "patch")
    }

    pub async fn remove(&self, call: CallContext, id: Option<&str>, params: P) -> Result<R> {
        let id: Option<String> = id.map(|s| s.to_string());

        let ctx = self
            .run_pipeline(
                ServiceMethodKind::Remove,
                call,
                params,
                None,
                service_call::<R, P, _>(move |svc, ctx| {
                    let id = id.clone();
                    Box::pin(async move {
                        let removed = svc.remove(&ctx.call, id.as_deref(), ctx.params.clone()).await?;
                        ctx.result = Some(HookResult::One(removed));
                        Ok(())
                    })
                }),
            )
            .await?;

        expect_one(ctx, "remove")
    }

    /// Run a custom method such as `users.invite` through the pipeline.
    pub async fn custom(
        &self,
        call: CallContext,
        method: &'static str,
        data: Option<R>,
        params: P,
    ) -> Result<R> {
        let ctx = self
            .run_pipeline(
                ServiceMethodKind::Custom(method),
                call,
                params,
                data,
                service_call::<R, P, _>(move |svc, ctx| {
                    Box::pin(async move {
                        let data = ctx.data.clone();
                        let out = svc.custom(&ctx.call, method, data, ctx.params.clone()).await?;
                        ctx.result = Some(HookResult::One(out));
                        Ok(())
                    })
                }),
            )
            .await?;

        expect_one(ctx, method)
    }
}

fn expect_one<R, P>(ctx: HookContext<R, P>, method: &str) -> Result<R> {
    match ctx.result {
        Some(HookResult::One(v)) => Ok(v),
        Some(HookResult::Many(_)) => Err(anyhow::anyhow!(
            "{method}() produced HookResult::Many unexpectedly"
        )),
        None => Err(anyhow::anyhow!("{method}() produced no result")),
    }
}
