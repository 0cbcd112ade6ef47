//! Entities that belong to a tenant.

use std::fmt;

use dog_core::TenantId;
use serde_json::Value;

/// A tenant as records carry it.
///
/// `id` is what filters bind to. `value` is the field content the tenant
/// came from (`"acme"`, `10`, `{ "id": 10, "name": "Acme" }`) and is what
/// gets written when an entity is stamped, unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    id: TenantId,
    value: Value,
}

impl Tenant {
    /// `None` when the value carries no id (null, empty, no `id` key).
    pub fn from_value(value: Value) -> Option<Self> {
        let id = tenant_id_of(&value)?;
        Some(Self { id, value })
    }

    pub fn id(&self) -> &TenantId {
        &self.id
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

impl From<TenantId> for Tenant {
    fn from(id: TenantId) -> Self {
        let value = Value::String(id.0.clone());
        Self { id, value }
    }
}

impl From<&str> for Tenant {
    fn from(s: &str) -> Self {
        TenantId::from(s).into()
    }
}

impl From<String> for Tenant {
    fn from(s: String) -> Self {
        TenantId::from(s).into()
    }
}

impl From<i64> for Tenant {
    fn from(n: i64) -> Self {
        Self {
            id: TenantId::from(n),
            value: Value::from(n),
        }
    }
}

/// A record with a tenant field named by the dimension.
pub trait TenantOwned {
    /// Current tenant id, `None` when the field is missing or null.
    fn tenant(&self, field: &str) -> Option<TenantId>;

    /// Current tenant with the field content it was read from.
    fn tenant_value(&self, field: &str) -> Option<Tenant>;

    /// Set the tenant. Returns `false` if the record cannot carry one.
    fn set_tenant(&mut self, field: &str, tenant: &Tenant) -> bool;

    /// Records of an input payload. A batch payload yields each item.
    fn records(&self) -> Vec<&Self> {
        vec![self]
    }

    fn records_mut(&mut self) -> Vec<&mut Self> {
        vec![self]
    }
}

/// The field holds either the tenant id (`"acme"`, `7`) or a reference
/// object with an `id` (`{ "id": 7, "name": "Acme" }`).
impl TenantOwned for Value {
    fn tenant(&self, field: &str) -> Option<TenantId> {
        tenant_id_of(self.get(field)?)
    }

    fn tenant_value(&self, field: &str) -> Option<Tenant> {
        Tenant::from_value(self.get(field)?.clone())
    }

    fn set_tenant(&mut self, field: &str, tenant: &Tenant) -> bool {
        let Some(map) = self.as_object_mut() else {
            return false;
        };
        map.insert(field.to_string(), tenant.value().clone());
        true
    }

    fn records(&self) -> Vec<&Self> {
        match self {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    fn records_mut(&mut self) -> Vec<&mut Self> {
        match self {
            Value::Array(items) => items.iter_mut().collect(),
            other => vec![other],
        }
    }
}

fn tenant_id_of(v: &Value) -> Option<TenantId> {
    match v {
        Value::Object(reference) => reference.get("id").and_then(scalar_id),
        other => scalar_id(other),
    }
}

fn scalar_id(v: &Value) -> Option<TenantId> {
    match v {
        Value::String(s) if !s.is_empty() => Some(TenantId::new(s.clone())),
        Value::Number(n) => Some(TenantId::new(n.to_string())),
        _ => None,
    }
}
