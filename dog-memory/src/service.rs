// DogService over one table of the store.

use anyhow::Result;
use async_trait::async_trait;
use dog_core::{CallContext, DogError, DogService, ServiceCapabilities};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::session::MemorySession;

/// JSON service for one table. Params follow Feathers: `{ "query": { ... } }`
/// narrows `find` by field equality.
///
/// All access goes through the [`MemorySession`] enlisted in the call, so
/// filters activated by hooks apply.
#[derive(Clone)]
pub struct MemoryService {
    table: String,
    capabilities: ServiceCapabilities,
}

impl MemoryService {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            capabilities: ServiceCapabilities::standard_crud(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ServiceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

fn session(ctx: &CallContext) -> Result<&MemorySession> {
    ctx.session()
        .and_then(|s| s.as_any().downcast_ref::<MemorySession>())
        .ok_or_else(|| DogError::unavailable("No in-memory session enlisted in this call").into_anyhow())
}

fn required<'a>(id: Option<&'a str>, method: &str) -> Result<&'a str> {
    id.ok_or_else(|| DogError::bad_request(format!("{method} requires an id")).into_anyhow())
}

#[async_trait]
impl DogService<Value, Value> for MemoryService {
    fn capabilities(&self) -> ServiceCapabilities {
        self.capabilities.clone()
    }

    async fn find(&self, ctx: &CallContext, params: Value) -> Result<Vec<Value>> {
        let query = params
            .get("query")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(Map::new);
        Ok(session(ctx)?.find(&self.table, &query))
    }

    async fn get(&self, ctx: &CallContext, id: &str, _params: Value) -> Result<Value> {
        session(ctx)?.get(&self.table, id).map_err(StoreError::into_anyhow)
    }

    async fn create(&self, ctx: &CallContext, data: Value, _params: Value) -> Result<Value> {
        session(ctx)?.insert(&self.table, data).map_err(StoreError::into_anyhow)
    }

    async fn update(&self, ctx: &CallContext, id: &str, data: Value, _params: Value) -> Result<Value> {
        session(ctx)?
            .replace(&self.table, id, data)
            .map_err(StoreError::into_anyhow)
    }

    async fn patch(&self, ctx: &CallContext, id: Option<&str>, data: Value, _params: Value) -> Result<Value> {
        let id = required(id, "patch")?;
        session(ctx)?
            .merge(&self.table, id, data)
            .map_err(StoreError::into_anyhow)
    }

    async fn remove(&self, ctx: &CallContext, id: Option<&str>, _params: Value) -> Result<Value> {
        let id = required(id, "remove")?;
        session(ctx)?.remove(&self.table, id).map_err(StoreError::into_anyhow)
    }
}
