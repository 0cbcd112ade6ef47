use std::fmt;

use async_trait::async_trait;
use anyhow::{anyhow, Result};

use crate::context::CallContext;

/// Standard service methods, similar to Feathers:
/// find, get, create, update, patch, remove.
///
/// Custom methods are declared via `Custom("methodName")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceMethodKind {
    Find,
    Get,
    Create,
    Update,
    Patch,
    Remove,
    Custom(&'static str),
}

impl ServiceMethodKind {
    /// Method name as used in operation identifiers (`"users.find"`).
    pub fn name(&self) -> &'static str {
        match self {
            ServiceMethodKind::Find => "find",
            ServiceMethodKind::Get => "get",
            ServiceMethodKind::Create => "create",
            ServiceMethodKind::Update => "update",
            ServiceMethodKind::Patch => "patch",
            ServiceMethodKind::Remove => "remove",
            ServiceMethodKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for ServiceMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capabilities describe which methods a service wants to expose
/// to the outside world (HTTP, WebSockets, P2P, etc.).
#[derive(Debug, Clone)]
pub struct ServiceCapabilities {
    pub allowed_methods: Vec<ServiceMethodKind>,
}

impl ServiceCapabilities {
    /// Full CRUD, equivalent to Feathers default:
    /// ['find', 'get', 'create', 'patch', 'update', 'remove']
    pub fn standard_crud() -> Self {
        use ServiceMethodKind::*;
        Self {
            allowed_methods: vec![Find, Get, Create, Update, Patch, Remove],
        }
    }

    /// Read-only services: `find` and `get`.
    pub fn read_only() -> Self {
        use ServiceMethodKind::*;
        Self {
            allowed_methods: vec![Find, Get],
        }
    }

    pub fn from_methods(methods: Vec<ServiceMethodKind>) -> Self {
        Self {
            allowed_methods: methods,
        }
    }

    pub fn allows(&self, method: &ServiceMethodKind) -> bool {
        self.allowed_methods.contains(method)
    }
}

/// Core DogRS service trait, inspired by FeathersJS:
///
/// - `find`   → list/query many
/// - `get`    → fetch one by id
/// - `create` → create one
/// - `update` → full replace
/// - `patch`  → partial update
/// - `remove` → delete one or many
/// - `custom` → named business operation
///
/// Every method receives the [`CallContext`] of the call, including the
/// data-access session the pipeline enlisted for it. Reads must go through
/// that session so filters activated by hooks apply.
///
/// All methods have default implementations that return
/// "Method not implemented", so a service can override only
/// what it actually supports.
#[async_trait]
pub trait DogService<R, P = ()>: Send + Sync
where
    R: Send + 'static,
    P: Send + 'static,
{
    /// Describe which methods this service wants to expose.
    fn capabilities(&self) -> ServiceCapabilities {
        ServiceCapabilities::standard_crud()
    }

    /// Find many records (optionally filtered by params).
    async fn find(&self, _ctx: &CallContext, _params: P) -> Result<Vec<R>> {
        Err(anyhow!("Method not implemented: find"))
    }

    /// Get a single record by id.
    async fn get(&self, _ctx: &CallContext, _id: &str, _params: P) -> Result<R> {
        Err(anyhow!("Method not implemented: get"))
    }

    /// Create a new record.
    async fn create(&self, _ctx: &CallContext, _data: R, _params: P) -> Result<R> {
        Err(anyhow!("Method not implemented: create"))
    }

    /// Fully replace an existing record.
    async fn update(&self, _ctx: &CallContext, _id: &str, _data: R, _params: P) -> Result<R> {
        Err(anyhow!("Method not implemented: update"))
    }

    /// Partially update an existing record.
    ///
    /// `id` can be `None` to indicate "multi" semantics if
    /// an implementation supports it.
    async fn patch(
        &self,
        _ctx: &CallContext,
        _id: Option<&str>,
        _data: R,
        _params: P,
    ) -> Result<R> {
        Err(anyhow!("Method not implemented: patch"))
    }

    /// Remove an existing record.
    async fn remove(&self, _ctx: &CallContext, _id: Option<&str>, _params: P) -> Result<R> {
        Err(anyhow!("Method not implemented: remove"))
    }

    /// Run a named custom method (`ServiceMethodKind::Custom`).
    async fn custom(
        &self,
        _ctx: &CallContext,
        method: &str,
        _data: Option<R>,
        _params: P,
    ) -> Result<R> {
        Err(anyhow!("Method not implemented: {method}"))
    }
}
