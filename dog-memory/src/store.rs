//! Row store.
//!
//! Tables are lists of JSON objects keyed by an `id` field. Named filters are
//! defined on the store once; sessions switch them on per operation and the
//! store applies every active filter while it locates rows, the way a SQL
//! layer adds a WHERE clause. Filtered-out rows never leave the store.

use std::collections::HashMap;

use dog_core::ActiveFilter;
use dog_tenancy::TenantOwned;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// A named row filter: `<column> = :<param>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDef {
    pub name: String,
    pub param: String,
    pub column: String,
    /// Tables the filter applies to. Empty means every table.
    pub tables: Vec<String>,
}

impl FilterDef {
    pub fn new(name: impl Into<String>, param: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param: param.into(),
            column: column.into(),
            tables: Vec::new(),
        }
    }

    pub fn on_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables.extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn applies_to(&self, table: &str) -> bool {
        self.tables.is_empty() || self.tables.iter().any(|t| t == table)
    }
}

pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    filters: RwLock<HashMap<String, FilterDef>>,
    id_field: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            filters: RwLock::new(HashMap::new()),
            id_field: "id".to_string(),
        }
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn define_filter(&self, def: FilterDef) {
        debug!(filter = %def.name, param = %def.param, column = %def.column, "filter defined");
        self.filters.write().insert(def.name.clone(), def);
    }

    pub fn filter_def(&self, name: &str) -> Option<FilterDef> {
        self.filters.read().get(name).cloned()
    }

    /// Insert a row, assigning a v4 UUID when it has no id.
    pub fn insert(&self, table: &str, mut row: Value) -> StoreResult<Value> {
        let id_field = self.id_field.clone();
        let map = row.as_object_mut().ok_or(StoreError::NotAnObject)?;
        let id = match map.get(&id_field).and_then(scalar) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                map.insert(id_field, Value::String(id.clone()));
                id
            }
        };

        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.iter().any(|r| self.row_id(r).as_deref() == Some(id.as_str())) {
            return Err(StoreError::Conflict {
                table: table.to_string(),
                id,
            });
        }
        rows.push(row.clone());
        Ok(row)
    }

    /// Insert rows without going through a session.
    pub fn seed<I>(&self, table: &str, rows: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut n = 0;
        for row in rows {
            self.insert(table, row)?;
            n += 1;
        }
        Ok(n)
    }

    /// Rows of `table` that pass every active filter.
    pub fn select(&self, table: &str, active: &[ActiveFilter]) -> Vec<Value> {
        let predicate = self.predicate(table, active);
        self.tables
            .read()
            .get(table)
            .map(|rows| rows.iter().filter(|r| predicate.admits(r)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn select_one(&self, table: &str, id: &str, active: &[ActiveFilter]) -> StoreResult<Value> {
        let predicate = self.predicate(table, active);
        self.tables
            .read()
            .get(table)
            .and_then(|rows| {
                rows.iter()
                    .find(|r| self.row_id(r).as_deref() == Some(id) && predicate.admits(r))
                    .cloned()
            })
            .ok_or_else(|| not_found(table, id))
    }

    /// Apply `change` to the visible row `id` and return the new row.
    pub fn modify<F>(&self, table: &str, id: &str, active: &[ActiveFilter], change: F) -> StoreResult<Value>
    where
        F: FnOnce(&mut Value),
    {
        let predicate = self.predicate(table, active);
        let mut tables = self.tables.write();
        let row = tables
            .get_mut(table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| self.row_id(r).as_deref() == Some(id) && predicate.admits(r))
            })
            .ok_or_else(|| not_found(table, id))?;

        let original_id = row.get(&self.id_field).cloned();
        change(row);
        if let (Some(map), Some(original_id)) = (row.as_object_mut(), original_id) {
            // the id is not updatable
            map.insert(self.id_field.clone(), original_id);
        }
        Ok(row.clone())
    }

    pub fn delete(&self, table: &str, id: &str, active: &[ActiveFilter]) -> StoreResult<Value> {
        let predicate = self.predicate(table, active);
        let mut tables = self.tables.write();
        let rows = tables.get_mut(table).ok_or_else(|| not_found(table, id))?;
        let pos = rows
            .iter()
            .position(|r| self.row_id(r).as_deref() == Some(id) && predicate.admits(r))
            .ok_or_else(|| not_found(table, id))?;
        Ok(rows.remove(pos))
    }

    /// First row whose `field` equals `value`, ignoring filters.
    pub fn find_by(&self, table: &str, field: &str, value: &str) -> Option<Value> {
        self.tables
            .read()
            .get(table)?
            .iter()
            .find(|r| r.get(field).and_then(scalar).as_deref() == Some(value))
            .cloned()
    }

    /// Row count, ignoring filters.
    pub fn count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    fn row_id(&self, row: &Value) -> Option<String> {
        row.get(&self.id_field).and_then(scalar)
    }

    fn predicate(&self, table: &str, active: &[ActiveFilter]) -> Predicate {
        let defs = self.filters.read();
        let clauses = active
            .iter()
            .filter_map(|f| {
                let def = defs.get(&f.name)?;
                def.applies_to(table)
                    .then(|| (def.column.clone(), f.value.as_str().to_string()))
            })
            .collect();
        Predicate { clauses }
    }
}

/// Conjunction of `column = value` clauses.
struct Predicate {
    clauses: Vec<(String, String)>,
}

impl Predicate {
    /// A row without the column never matches, like SQL NULL.
    fn admits(&self, row: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(column, value)| row.tenant(column).is_some_and(|t| t.as_str() == value))
    }
}

fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn not_found(table: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        table: table.to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dog_core::FilterActivation;
    use serde_json::json;

    fn company(value: &str) -> ActiveFilter {
        ActiveFilter {
            name: "COMPANY_FILTER".into(),
            param: "companyId".into(),
            value: value.into(),
            activation: FilterActivation::next(),
        }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.define_filter(FilterDef::new("COMPANY_FILTER", "companyId", "company").on_tables(["users"]));
        store
            .seed(
                "users",
                vec![
                    json!({ "id": 1, "login": "a1", "company": "a" }),
                    json!({ "id": 2, "login": "b1", "company": { "id": "b" } }),
                    json!({ "id": 3, "login": "nobody" }),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn active_filter_restricts_rows() {
        let store = store();
        assert_eq!(store.select("users", &[]).len(), 3);

        let rows = store.select("users", &[company("a")]);
        assert_eq!(rows, vec![json!({ "id": 1, "login": "a1", "company": "a" })]);

        let rows = store.select("users", &[company("b")]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["login"], json!("b1"));
    }

    #[test]
    fn filter_applies_only_to_its_tables() {
        let store = store();
        store.seed("audit", vec![json!({ "event": "x" })]).unwrap();
        assert_eq!(store.select("audit", &[company("a")]).len(), 1);
    }

    #[test]
    fn hidden_rows_cannot_be_touched() {
        let store = store();
        let err = store.select_one("users", "2", &[company("a")]).unwrap_err();
        assert_eq!(err, StoreError::NotFound { table: "users".into(), id: "2".into() });
        assert!(store.modify("users", "2", &[company("a")], |_| {}).is_err());
        assert!(store.delete("users", "2", &[company("a")]).is_err());
        assert_eq!(store.count("users"), 3);
    }

    #[test]
    fn insert_assigns_ids_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let row = store.insert("users", json!({ "login": "x" })).unwrap();
        assert!(row["id"].is_string());

        let err = store.insert("users", json!({ "id": row["id"].clone() })).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.insert("users", json!(5)).unwrap_err(), StoreError::NotAnObject);
    }

    #[test]
    fn modify_keeps_the_id() {
        let store = store();
        let row = store
            .modify("users", "1", &[], |row| *row = json!({ "id": 99, "login": "renamed" }))
            .unwrap();
        assert_eq!(row, json!({ "id": 1, "login": "renamed" }));
        assert_eq!(store.find_by("users", "login", "renamed").unwrap()["id"], json!(1));
    }
}
