//! Sessions over a [`MemoryStore`] and the pool the app leases them from.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dog_core::{
    ActiveFilter, DataSession, FilterActivation, FilterTable, SessionError, SessionProvider, TenantId,
};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::store::MemoryStore;

/// Unit of work over the store. Every row lookup goes through the filters
/// currently enabled on the session.
pub struct MemorySession {
    id: String,
    store: Arc<MemoryStore>,
    filters: FilterTable,
}

impl MemorySession {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            store,
            filters: FilterTable::new(),
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Visible rows matching every `field = value` pair of `query`.
    pub fn find(&self, table: &str, query: &Map<String, Value>) -> Vec<Value> {
        let active = self.active_filters();
        self.store
            .select(table, &active)
            .into_iter()
            .filter(|row| query.iter().all(|(k, v)| row.get(k) == Some(v)))
            .collect()
    }

    pub fn get(&self, table: &str, id: &str) -> StoreResult<Value> {
        self.store.select_one(table, id, &self.active_filters())
    }

    pub fn insert(&self, table: &str, row: Value) -> StoreResult<Value> {
        self.store.insert(table, row)
    }

    pub fn replace(&self, table: &str, id: &str, row: Value) -> StoreResult<Value> {
        self.store
            .modify(table, id, &self.active_filters(), move |current| *current = row)
    }

    /// Shallow merge of `patch` into the row.
    pub fn merge(&self, table: &str, id: &str, patch: Value) -> StoreResult<Value> {
        self.store.modify(table, id, &self.active_filters(), move |current| {
            if let (Some(target), Value::Object(fields)) = (current.as_object_mut(), patch) {
                target.extend(fields);
            }
        })
    }

    pub fn remove(&self, table: &str, id: &str) -> StoreResult<Value> {
        self.store.delete(table, id, &self.active_filters())
    }
}

impl DataSession for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn enable_filter(
        &self,
        filter: &str,
        param: &str,
        value: &TenantId,
    ) -> Result<FilterActivation, SessionError> {
        let def = self
            .store
            .filter_def(filter)
            .ok_or_else(|| SessionError::UnknownFilter(filter.to_string()))?;
        if def.param != param {
            return Err(SessionError::UnknownParameter {
                filter: filter.to_string(),
                param: param.to_string(),
            });
        }

        self.filters.enable(&def.name, &def.param, value)
    }

    fn disable_filter(&self, activation: FilterActivation) -> bool {
        self.filters.disable(activation)
    }

    fn active_filters(&self) -> Vec<ActiveFilter> {
        self.filters.active()
    }

    fn reset(&self) {
        self.filters.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Reuses sessions across calls. Sessions are reset before they go back
/// to the idle list.
pub struct MemorySessionPool {
    store: Arc<MemoryStore>,
    idle: Mutex<Vec<Arc<dyn DataSession>>>,
    max_idle: usize,
    opened: AtomicUsize,
}

impl MemorySessionPool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self::with_max_idle(store, 8)
    }

    pub fn with_max_idle(store: Arc<MemoryStore>, max_idle: usize) -> Self {
        Self {
            store,
            idle: Mutex::new(Vec::new()),
            max_idle,
            opened: AtomicUsize::new(0),
        }
    }

    /// Sessions opened since the pool was created.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Filters still active on idle sessions. Always empty after release.
    pub fn idle_filters(&self) -> Vec<ActiveFilter> {
        self.idle.lock().iter().flat_map(|s| s.active_filters()).collect()
    }
}

#[async_trait]
impl SessionProvider for MemorySessionPool {
    async fn acquire(&self) -> Result<Arc<dyn DataSession>, SessionError> {
        if let Some(session) = self.idle.lock().pop() {
            debug!(session = session.id(), "session reused");
            return Ok(session);
        }
        let session: Arc<dyn DataSession> = Arc::new(MemorySession::new(Arc::clone(&self.store)));
        self.opened.fetch_add(1, Ordering::Relaxed);
        debug!(session = session.id(), "session opened");
        Ok(session)
    }

    fn release(&self, session: Arc<dyn DataSession>) {
        let leftover = session.active_filters();
        if !leftover.is_empty() {
            warn!(
                session = session.id(),
                filters = leftover.len(),
                "session released with active filters"
            );
        }
        session.reset();

        let ours = session
            .as_any()
            .downcast_ref::<MemorySession>()
            .is_some_and(|s| Arc::ptr_eq(&s.store, &self.store));
        let mut idle = self.idle.lock();
        if ours && idle.len() < self.max_idle {
            idle.push(session);
        }
    }
}
