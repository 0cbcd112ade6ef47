//! Call context threaded through every DogRS operation.
//!
//! DogRS does not read identity from thread-locals or globals. The transport
//! (HTTP, CLI, jobs, tests) builds a [`CallContext`] with the authenticated
//! [`Principal`] and hands it to the service handle. The pipeline then enlists
//! a data-access session in the same context before any hook runs.

use std::fmt;
use std::sync::Arc;

use crate::session::DataSession;

/// The authenticated identity performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Principal {
    pub login: String,
}

impl Principal {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.login)
    }
}

/// Opaque tenant identifier.
///
/// Integer and UUID identifiers are carried in their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for TenantId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

/// Context carried with every DogRS operation.
///
/// Passed to services and exposed to hooks through `HookContext::call`.
#[derive(Clone, Default)]
pub struct CallContext {
    /// `None` for anonymous / system calls.
    pub principal: Option<Principal>,
    /// Set by the pipeline while an operation is in flight.
    pub session: Option<Arc<dyn DataSession>>,
}

impl CallContext {
    /// Anonymous call, no principal.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Call made on behalf of `login`.
    pub fn for_login(login: impl Into<String>) -> Self {
        Self {
            principal: Some(Principal::new(login)),
            session: None,
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_session(mut self, session: Arc<dyn DataSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn session(&self) -> Option<&Arc<dyn DataSession>> {
        self.session.as_ref()
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("principal", &self.principal)
            .field("session", &self.session.as_ref().map(|s| s.id().to_string()))
            .finish()
    }
}
