// Tenancy options and configuration.

use std::collections::HashSet;

use dog_core::DogApp;
use serde::{Deserialize, Serialize};

use crate::dispatch::OperationPattern;
use crate::error::TenancyError;

/// Config key holding the JSON-encoded [`TenancyOptions`].
pub const TENANCY_KEY: &str = "tenancy";
/// Config key overriding [`TenancyOptions::deny_without_tenant`].
pub const DENY_WITHOUT_TENANT_KEY: &str = "tenancy.deny_without_tenant";

/// One isolation dimension (company, business unit, ...).
///
/// Filter, parameter and entity field names default from `name`:
/// `"company"` gives `COMPANY_FILTER`, `companyId` and `company`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "DimensionRecord", rename_all = "camelCase")]
pub struct TenantDimension {
    pub name: String,
    /// Named filter the data layer knows for this dimension.
    pub filter_name: String,
    /// The filter's single parameter.
    pub param_name: String,
    /// Field on owned entities that carries the tenant.
    pub entity_field: String,
    /// Also stamp the input payload before it is persisted.
    pub stamp_input: bool,
    /// Operations whose results get stamped (`"users.create"`, `"users.*"`).
    pub create_or_update: Vec<String>,
    /// Operations whose reads get filtered.
    pub read: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DimensionRecord {
    #[serde(alias = "dimensionName")]
    name: String,
    filter_name: Option<String>,
    param_name: Option<String>,
    entity_field: Option<String>,
    #[serde(default = "default_true")]
    stamp_input: bool,
    #[serde(default)]
    create_or_update: Vec<String>,
    #[serde(default)]
    read: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl From<DimensionRecord> for TenantDimension {
    fn from(r: DimensionRecord) -> Self {
        let mut dim = TenantDimension::new(r.name);
        if let Some(filter) = r.filter_name {
            dim.filter_name = filter;
        }
        if let Some(param) = r.param_name {
            dim.param_name = param;
        }
        if let Some(field) = r.entity_field {
            dim.entity_field = field;
        }
        dim.stamp_input = r.stamp_input;
        dim.create_or_update = r.create_or_update;
        dim.read = r.read;
        dim
    }
}

impl TenantDimension {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let camel = camel_case(&name);
        Self {
            filter_name: format!("{}_FILTER", camel.to_uppercase()),
            param_name: format!("{camel}Id"),
            entity_field: camel,
            name,
            stamp_input: true,
            create_or_update: Vec::new(),
            read: Vec::new(),
        }
    }

    pub fn with_filter_name(mut self, filter: impl Into<String>) -> Self {
        self.filter_name = filter.into();
        self
    }

    pub fn with_param_name(mut self, param: impl Into<String>) -> Self {
        self.param_name = param.into();
        self
    }

    pub fn with_entity_field(mut self, field: impl Into<String>) -> Self {
        self.entity_field = field.into();
        self
    }

    pub fn stamp_input(mut self, enabled: bool) -> Self {
        self.stamp_input = enabled;
        self
    }

    /// Add create-or-update operation patterns.
    pub fn stamp_on<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.create_or_update.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Add read operation patterns.
    pub fn filter_on<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn validate(&self) -> Result<(), TenancyError> {
        if self.name.trim().is_empty() {
            return Err(TenancyError::invalid_config("dimension name must not be empty"));
        }
        for (what, value) in [
            ("filter name", &self.filter_name),
            ("parameter name", &self.param_name),
            ("entity field", &self.entity_field),
        ] {
            if value.trim().is_empty() {
                return Err(TenancyError::invalid_config(format!(
                    "dimension '{}': {what} must not be empty",
                    self.name
                )));
            }
        }
        for pattern in self.create_or_update.iter().chain(&self.read) {
            OperationPattern::parse(pattern).map_err(|e| {
                TenancyError::invalid_config(format!("dimension '{}': {e}", self.name))
            })?;
        }
        Ok(())
    }
}

/// `"business-unit"` / `"business_unit"` / `"businessUnit"` → `"businessUnit"`.
fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.trim().chars() {
        if c == '-' || c == '_' || c.is_whitespace() {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else if out.is_empty() {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Main tenancy configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TenancyOptions {
    #[serde(default)]
    pub dimensions: Vec<TenantDimension>,
    /// Refuse filtered reads for principals without a tenant instead of
    /// running them unfiltered.
    #[serde(default)]
    pub deny_without_tenant: bool,
}

impl TenancyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(mut self, dimension: TenantDimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn deny_without_tenant(mut self, deny: bool) -> Self {
        self.deny_without_tenant = deny;
        self
    }

    pub fn validate(&self) -> Result<(), TenancyError> {
        let mut names = HashSet::new();
        let mut filters = HashSet::new();
        for dim in &self.dimensions {
            dim.validate()?;
            if !names.insert(dim.name.as_str()) {
                return Err(TenancyError::invalid_config(format!(
                    "duplicate dimension '{}'",
                    dim.name
                )));
            }
            if !filters.insert(dim.filter_name.as_str()) {
                return Err(TenancyError::invalid_config(format!(
                    "filter '{}' is used by more than one dimension",
                    dim.filter_name
                )));
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, TenancyError> {
        let options: TenancyOptions = serde_json::from_str(json)
            .map_err(|e| TenancyError::invalid_config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Read options from app config (`tenancy`, `tenancy.deny_without_tenant`).
    ///
    /// `Ok(None)` when neither key is set.
    pub fn from_app<R, P>(app: &DogApp<R, P>) -> Result<Option<Self>, TenancyError>
    where
        R: Send + 'static,
        P: Send + Clone + 'static,
    {
        let config = app.config_snapshot();
        let mut options = match config.get_json::<TenancyOptions>(TENANCY_KEY) {
            Some(parsed) => parsed.map_err(|e| TenancyError::invalid_config(e.to_string()))?,
            None if config.get(DENY_WITHOUT_TENANT_KEY).is_some() => TenancyOptions::default(),
            None => return Ok(None),
        };

        if let Some(raw) = config.get(DENY_WITHOUT_TENANT_KEY) {
            options.deny_without_tenant = config.get_bool(DENY_WITHOUT_TENANT_KEY).ok_or_else(|| {
                TenancyError::invalid_config(format!(
                    "{DENY_WITHOUT_TENANT_KEY} must be true or false, got '{raw}'"
                ))
            })?;
        }

        options.validate()?;
        Ok(Some(options))
    }
}
