//! # Data-access sessions
//!
//! A [`DataSession`] is the unit of work a service reads and writes through.
//! Sessions can carry named row filters (the WHERE-clause the data layer adds
//! to every read). Filters are switched on through a [`FilterScope`], which
//! switches its own activation off again when it is dropped, on every exit
//! path of the operation.
//!
//! Sessions come from a [`SessionProvider`]. `DogApp` leases one session per
//! pipeline run and returns it when the run is over; providers that pool
//! sessions must `reset()` them on release so no filter outlives the
//! operation that activated it.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::context::TenantId;

static ACTIVATION_ID: AtomicU64 = AtomicU64::new(1);

/// Token identifying one filter activation on one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterActivation(u64);

impl FilterActivation {
    pub fn next() -> Self {
        Self(ACTIVATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A filter currently enabled on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFilter {
    pub name: String,
    pub param: String,
    pub value: TenantId,
    pub activation: FilterActivation,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("Filter '{filter}' has no parameter '{param}'")]
    UnknownParameter { filter: String, param: String },

    #[error("Filter '{filter}' is already bound to '{bound}', cannot bind '{requested}'")]
    FilterConflict {
        filter: String,
        bound: TenantId,
        requested: TenantId,
    },

    #[error("No data-access session is enlisted in this call")]
    NotEnlisted,

    #[error("Session unavailable: {0}")]
    Unavailable(String),
}

/// Session filter contract consumed by the tenancy hooks.
///
/// Implementations keep their filter table behind interior mutability;
/// sessions are shared as `Arc<dyn DataSession>`.
pub trait DataSession: Send + Sync {
    fn id(&self) -> &str;

    /// Enable `filter`, binding `param` to `value`.
    ///
    /// Enabling a filter that is already active with the same value adds an
    /// activation; the filter stays on until every activation is disabled.
    /// A different value fails with [`SessionError::FilterConflict`] and
    /// leaves the current binding alone.
    fn enable_filter(
        &self,
        filter: &str,
        param: &str,
        value: &TenantId,
    ) -> Result<FilterActivation, SessionError>;

    /// Disable the filter enabled by `activation`.
    ///
    /// Returns `false` if that activation is no longer current.
    fn disable_filter(&self, activation: FilterActivation) -> bool;

    fn active_filters(&self) -> Vec<ActiveFilter>;

    /// Drop every active filter.
    fn reset(&self);

    /// Lets a data layer get its concrete session back from the context.
    fn as_any(&self) -> &dyn Any;
}

/// Filter bookkeeping for [`DataSession`] implementations, with the
/// activation rules of [`DataSession::enable_filter`].
#[derive(Debug, Default)]
pub struct FilterTable {
    activations: Mutex<Vec<ActiveFilter>>,
}

impl FilterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(
        &self,
        filter: &str,
        param: &str,
        value: &TenantId,
    ) -> Result<FilterActivation, SessionError> {
        let mut activations = self.activations.lock();
        if let Some(bound) = activations.iter().find(|f| f.name == filter && f.value != *value) {
            return Err(SessionError::FilterConflict {
                filter: filter.to_string(),
                bound: bound.value.clone(),
                requested: value.clone(),
            });
        }
        let activation = FilterActivation::next();
        activations.push(ActiveFilter {
            name: filter.to_string(),
            param: param.to_string(),
            value: value.clone(),
            activation,
        });
        Ok(activation)
    }

    pub fn disable(&self, activation: FilterActivation) -> bool {
        let mut activations = self.activations.lock();
        let before = activations.len();
        activations.retain(|f| f.activation != activation);
        activations.len() != before
    }

    /// One entry per active filter, carrying its oldest activation.
    pub fn active(&self) -> Vec<ActiveFilter> {
        let activations = self.activations.lock();
        let mut active: Vec<ActiveFilter> = Vec::with_capacity(activations.len());
        for f in activations.iter() {
            if !active.iter().any(|a| a.name == f.name) {
                active.push(f.clone());
            }
        }
        active
    }

    pub fn clear(&self) {
        self.activations.lock().clear();
    }
}

/// RAII guard for one filter activation.
#[must_use = "dropping a FilterScope deactivates its filter"]
pub struct FilterScope {
    session: Arc<dyn DataSession>,
    activation: FilterActivation,
    filter: String,
}

impl FilterScope {
    pub fn activate(
        session: &Arc<dyn DataSession>,
        filter: &str,
        param: &str,
        value: &TenantId,
    ) -> Result<Self, SessionError> {
        let activation = session.enable_filter(filter, param, value)?;
        debug!(
            session = session.id(),
            filter,
            param,
            tenant = %value,
            "filter activated"
        );
        Ok(Self {
            session: Arc::clone(session),
            activation,
            filter: filter.to_string(),
        })
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn activation(&self) -> FilterActivation {
        self.activation
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }
}

impl Drop for FilterScope {
    fn drop(&mut self) {
        if self.session.disable_filter(self.activation) {
            debug!(session = self.session.id(), filter = %self.filter, "filter released");
        }
    }
}

impl fmt::Debug for FilterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterScope")
            .field("session", &self.session.id())
            .field("filter", &self.filter)
            .field("activation", &self.activation)
            .finish()
    }
}

/// Source of data-access sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn DataSession>, SessionError>;

    /// Take a session back. Pooling providers must reset it first.
    fn release(&self, session: Arc<dyn DataSession>);
}

/// A session checked out from a provider for one pipeline run.
pub struct SessionLease {
    provider: Arc<dyn SessionProvider>,
    session: Arc<dyn DataSession>,
}

impl SessionLease {
    pub async fn acquire(provider: &Arc<dyn SessionProvider>) -> Result<Self, SessionError> {
        let session = provider.acquire().await?;
        Ok(Self {
            provider: Arc::clone(provider),
            session,
        })
    }

    pub fn session(&self) -> Arc<dyn DataSession> {
        Arc::clone(&self.session)
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.provider.release(Arc::clone(&self.session));
    }
}
