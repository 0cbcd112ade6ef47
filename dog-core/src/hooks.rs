//! # Hooks
//!
//! Feathers-style hooks run around a service call:
//!
//! `around → before → service call → after`, and `error` hooks when any
//! of those fail. Hooks registered app-wide run before hooks registered on
//! a single service.
//!
//! Hooks get the whole [`HookContext`]: the call context (principal and
//! enlisted data-access session), the operation being run, its input and,
//! for `after` hooks, its result.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::DogConfigSnapshot;
use crate::context::{CallContext, Principal};
use crate::session::{DataSession, FilterScope};
use crate::ServiceMethodKind;

pub type HookFut<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Output of a service call as seen by `after` hooks.
#[derive(Debug, Clone, PartialEq)]
pub enum HookResult<R> {
    One(R),
    Many(Vec<R>),
}

impl<R> HookResult<R> {
    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        match self {
            HookResult::One(r) => std::slice::from_ref(r).iter(),
            HookResult::Many(rs) => rs.iter(),
        }
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, R> {
        match self {
            HookResult::One(r) => std::slice::from_mut(r).iter_mut(),
            HookResult::Many(rs) => rs.iter_mut(),
        }
    }
}

/// Context passed to hooks.
///
/// R = record type
/// P = params type (filters, query options, etc.)
pub struct HookContext<R, P> {
    pub call: CallContext,
    pub service: String,
    pub method: ServiceMethodKind,
    pub params: P,
    /// Input payload (create/update/patch/custom). Stays available to
    /// `after` hooks.
    pub data: Option<R>,
    pub result: Option<HookResult<R>>,
    pub error: Option<anyhow::Error>,
    pub config: DogConfigSnapshot,
    scopes: Vec<FilterScope>,
}

impl<R, P> HookContext<R, P> {
    pub fn new(
        call: CallContext,
        service: impl Into<String>,
        method: ServiceMethodKind,
        params: P,
        config: DogConfigSnapshot,
    ) -> Self {
        Self {
            call,
            service: service.into(),
            method,
            params,
            data: None,
            result: None,
            error: None,
            config,
            scopes: Vec::new(),
        }
    }

    /// `"<service>.<method>"`, e.g. `"users.find"`.
    pub fn operation(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.call.principal()
    }

    pub fn session(&self) -> Option<&Arc<dyn DataSession>> {
        self.call.session()
    }

    /// Keep `scope` active until the pipeline run ends.
    pub fn hold_scope(&mut self, scope: FilterScope) {
        self.scopes.push(scope);
    }

    pub fn held_scopes(&self) -> &[FilterScope] {
        &self.scopes
    }

    /// Drop every held scope, most recent first. Returns how many were held.
    pub fn release_scopes(&mut self) -> usize {
        let n = self.scopes.len();
        while let Some(scope) = self.scopes.pop() {
            drop(scope);
        }
        n
    }
}

impl<R, P> fmt::Debug for HookContext<R, P>
where
    R: fmt::Debug,
    P: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("call", &self.call)
            .field("service", &self.service)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("data", &self.data)
            .field("result", &self.result)
            .field("error", &self.error)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[async_trait]
pub trait DogBeforeHook<R, P>: Send + Sync {
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()>;
}

#[async_trait]
pub trait DogAfterHook<R, P>: Send + Sync {
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()>;
}

/// Runs when the call failed. Clearing `ctx.error` recovers the call.
#[async_trait]
pub trait DogErrorHook<R, P>: Send + Sync {
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()>;
}

#[async_trait]
pub trait DogAroundHook<R, P>: Send + Sync {
    async fn run(&self, ctx: &mut HookContext<R, P>, next: Next<R, P>) -> Result<()>;
}

type NextFn<R, P> = Box<dyn for<'a> FnOnce(&'a mut HookContext<R, P>) -> HookFut<'a> + Send>;

/// The rest of the pipeline, handed to `around` hooks.
pub struct Next<R, P> {
    call: NextFn<R, P>,
}

impl<R, P> Next<R, P> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> FnOnce(&'a mut HookContext<R, P>) -> HookFut<'a> + Send + 'static,
    {
        Self { call: Box::new(f) }
    }

    pub async fn run(self, ctx: &mut HookContext<R, P>) -> Result<()> {
        (self.call)(ctx).await
    }
}

/// Hook registrations for the app or one service.
pub struct ServiceHooks<R, P> {
    pub around_all: Vec<Arc<dyn DogAroundHook<R, P>>>,
    pub around_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn DogAroundHook<R, P>>>>,
    pub before_all: Vec<Arc<dyn DogBeforeHook<R, P>>>,
    pub before_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn DogBeforeHook<R, P>>>>,
    pub after_all: Vec<Arc<dyn DogAfterHook<R, P>>>,
    pub after_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn DogAfterHook<R, P>>>>,
    pub error_all: Vec<Arc<dyn DogErrorHook<R, P>>>,
    pub error_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn DogErrorHook<R, P>>>>,
}

impl<R, P> Default for ServiceHooks<R, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, P> ServiceHooks<R, P> {
    pub fn new() -> Self {
        Self {
            around_all: Vec::new(),
            around_by_method: HashMap::new(),
            before_all: Vec::new(),
            before_by_method: HashMap::new(),
            after_all: Vec::new(),
            after_by_method: HashMap::new(),
            error_all: Vec::new(),
            error_by_method: HashMap::new(),
        }
    }

    pub fn around_all(&mut self, hook: Arc<dyn DogAroundHook<R, P>>) -> &mut Self {
        self.around_all.push(hook);
        self
    }

    pub fn around(&mut self, method: ServiceMethodKind, hook: Arc<dyn DogAroundHook<R, P>>) -> &mut Self {
        self.around_by_method.entry(method).or_default().push(hook);
        self
    }

    pub fn before_all(&mut self, hook: Arc<dyn DogBeforeHook<R, P>>) -> &mut Self {
        self.before_all.push(hook);
        self
    }

    pub fn before(&mut self, method: ServiceMethodKind, hook: Arc<dyn DogBeforeHook<R, P>>) -> &mut Self {
        self.before_by_method.entry(method).or_default().push(hook);
        self
    }

    pub fn before_find(&mut self, hook: Arc<dyn DogBeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Find, hook)
    }

    pub fn before_get(&mut self, hook: Arc<dyn DogBeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Get, hook)
    }

    pub fn before_create(&mut self, hook: Arc<dyn DogBeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Create, hook)
    }

    pub fn before_update(&mut self, hook: Arc<dyn DogBeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Update, hook)
    }

    pub fn before_patch(&mut self, hook: Arc<dyn DogBeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Patch, hook)
    }

    pub fn before_remove(&mut self, hook: Arc<dyn DogBeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Remove, hook)
    }

    pub fn after_all(&mut self, hook: Arc<dyn DogAfterHook<R, P>>) -> &mut Self {
        self.after_all.push(hook);
        self
    }

    pub fn after(&mut self, method: ServiceMethodKind, hook: Arc<dyn DogAfterHook<R, P>>) -> &mut Self {
        self.after_by_method.entry(method).or_default().push(hook);
        self
    }

    pub fn after_find(&mut self, hook: Arc<dyn DogAfterHook<R, P>>) -> &mut Self {
        self.after(ServiceMethodKind::Find, hook)
    }

    pub fn after_get(&mut self, hook: Arc<dyn DogAfterHook<R, P>>) -> &mut Self {
        self.after(ServiceMethodKind::Get, hook)
    }

    pub fn after_create(&mut self, hook: Arc<dyn DogAfterHook<R, P>>) -> &mut Self {
        self.after(ServiceMethodKind::Create, hook)
    }

    pub fn after_update(&mut self, hook: Arc<dyn DogAfterHook<R, P>>) -> &mut Self {
        self.after(ServiceMethodKind::Update, hook)
    }

    pub fn after_patch(&mut self, hook: Arc<dyn DogAfterHook<R, P>>) -> &mut Self {
        self.after(ServiceMethodKind::Patch, hook)
    }

    pub fn after_remove(&mut self, hook: Arc<dyn DogAfterHook<R, P>>) -> &mut Self {
        self.after(ServiceMethodKind::Remove, hook)
    }

    pub fn error_all(&mut self, hook: Arc<dyn DogErrorHook<R, P>>) -> &mut Self {
        self.error_all.push(hook);
        self
    }

    pub fn error(&mut self, method: ServiceMethodKind, hook: Arc<dyn DogErrorHook<R, P>>) -> &mut Self {
        self.error_by_method.entry(method).or_default().push(hook);
        self
    }
}

/// `*_all` hooks first, then the ones registered for `method`.
pub(crate) fn collect_method_hooks<H: ?Sized>(
    all: &[Arc<H>],
    by_method: &HashMap<ServiceMethodKind, Vec<Arc<H>>>,
    method: &ServiceMethodKind,
) -> Vec<Arc<H>> {
    let mut out: Vec<Arc<H>> = all.to_vec();
    if let Some(hooks) = by_method.get(method) {
        out.extend(hooks.iter().cloned());
    }
    out
}
