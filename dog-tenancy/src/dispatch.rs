// Operation patterns and hook installation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dog_core::{DogApp, ServiceMethodKind};
use tracing::{debug, info};

use crate::entity::TenantOwned;
use crate::error::TenancyError;
use crate::hooks::{TenantFilterActivator, TenantStamper};
use crate::identity::IdentityResolver;
use crate::lookup::TenantLookup;
use crate::options::{TenancyOptions, TenantDimension};
use crate::resolver::TenantResolver;

/// Pattern list an operation can match. One operation may match both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Stamp the tenant on results (and input).
    CreateOrUpdate,
    /// Activate the tenant filter around the read.
    Read,
}

/// `"<service>.<method>"`, either side may be `*`. A bare `*` matches
/// every operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationPattern {
    service: Option<String>,
    method: Option<String>,
}

impl OperationPattern {
    pub fn parse(raw: &str) -> Result<Self, TenancyError> {
        let raw = raw.trim();
        if raw == "*" {
            return Ok(Self {
                service: None,
                method: None,
            });
        }

        let invalid = |why: &str| {
            TenancyError::invalid_config(format!("invalid operation pattern '{raw}': {why}"))
        };

        let (service, method) = raw
            .split_once('.')
            .ok_or_else(|| invalid("expected <service>.<method>"))?;
        if method.contains('.') {
            return Err(invalid("more than one '.'"));
        }

        Ok(Self {
            service: segment(service).map_err(|why| invalid(why))?,
            method: segment(method).map_err(|why| invalid(why))?,
        })
    }

    pub fn matches(&self, service: &str, method: &ServiceMethodKind) -> bool {
        self.service.as_deref().map_or(true, |s| s == service)
            && self.method.as_deref().map_or(true, |m| m == method.name())
    }
}

fn segment(s: &str) -> Result<Option<String>, &'static str> {
    match s {
        "" => Err("empty segment"),
        "*" => Ok(None),
        s if s.contains('*') => Err("'*' must stand alone"),
        s if s.chars().any(char::is_whitespace) => Err("whitespace in segment"),
        s => Ok(Some(s.to_string())),
    }
}

impl FromStr for OperationPattern {
    type Err = TenancyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for OperationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.service, &self.method) {
            (None, None) => f.write_str("*"),
            (s, m) => write!(
                f,
                "{}.{}",
                s.as_deref().unwrap_or("*"),
                m.as_deref().unwrap_or("*")
            ),
        }
    }
}

/// Parsed pattern table of one dimension.
#[derive(Debug, Clone, Default)]
pub struct Pointcuts {
    create_or_update: Vec<OperationPattern>,
    read: Vec<OperationPattern>,
}

impl Pointcuts {
    pub fn from_dimension(dim: &TenantDimension) -> Result<Self, TenancyError> {
        let parse_all = |patterns: &[String]| -> Result<Vec<OperationPattern>, TenancyError> {
            patterns.iter().map(|p| OperationPattern::parse(p)).collect()
        };
        Ok(Self {
            create_or_update: parse_all(&dim.create_or_update)?,
            read: parse_all(&dim.read)?,
        })
    }

    pub fn matches(&self, kind: OperationKind, service: &str, method: &ServiceMethodKind) -> bool {
        let patterns = match kind {
            OperationKind::CreateOrUpdate => &self.create_or_update,
            OperationKind::Read => &self.read,
        };
        patterns.iter().any(|p| p.matches(service, method))
    }

    /// Operations that run under the tenant filter: reads, and writes that
    /// locate an existing row. A create-or-update operation other than
    /// `create` only reaches rows the caller's tenant can see.
    pub fn filtered(&self, service: &str, method: &ServiceMethodKind) -> bool {
        self.matches(OperationKind::Read, service, method)
            || (*method != ServiceMethodKind::Create
                && self.matches(OperationKind::CreateOrUpdate, service, method))
    }

    /// `(pattern, kind)` pairs in evaluation order.
    pub fn entries(&self) -> impl Iterator<Item = (&OperationPattern, OperationKind)> {
        self.create_or_update
            .iter()
            .map(|p| (p, OperationKind::CreateOrUpdate))
            .chain(self.read.iter().map(|p| (p, OperationKind::Read)))
    }
}

/// Install the tenancy hooks app-wide, one filter activator and one
/// stamper per dimension.
pub fn configure<R, P>(
    app: &DogApp<R, P>,
    options: &TenancyOptions,
    identity: Arc<dyn IdentityResolver>,
    lookup: Arc<dyn TenantLookup>,
) -> Result<(), TenancyError>
where
    R: TenantOwned + Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    options.validate()?;
    let resolver = TenantResolver::new(identity, lookup);

    let mut installs = Vec::with_capacity(options.dimensions.len());
    for dim in &options.dimensions {
        let pointcuts = Arc::new(Pointcuts::from_dimension(dim)?);
        let dim = Arc::new(dim.clone());

        for (pattern, kind) in pointcuts.entries() {
            debug!(dimension = %dim.name, %pattern, ?kind, "pointcut");
        }

        let activator = Arc::new(TenantFilterActivator::new(
            Arc::clone(&dim),
            Arc::clone(&pointcuts),
            resolver.clone(),
            options.deny_without_tenant,
        ));
        let stamper = Arc::new(TenantStamper::new(
            Arc::clone(&dim),
            Arc::clone(&pointcuts),
            resolver.clone(),
        ));
        installs.push((dim, activator, stamper));
    }

    app.hooks(|h| {
        for (dim, activator, stamper) in &installs {
            h.before_all(activator.clone());
            if dim.stamp_input {
                h.before_all(stamper.clone());
            }
            h.after_all(stamper.clone());
        }
    });

    for (dim, _, _) in &installs {
        info!(
            dimension = %dim.name,
            filter = %dim.filter_name,
            create_or_update = dim.create_or_update.len(),
            read = dim.read.len(),
            "tenant dimension configured"
        );
    }
    Ok(())
}

/// [`configure`] with options read from app config.
///
/// Returns `false` when the app has no `tenancy` config.
pub fn configure_from_app<R, P>(
    app: &DogApp<R, P>,
    identity: Arc<dyn IdentityResolver>,
    lookup: Arc<dyn TenantLookup>,
) -> Result<bool, TenancyError>
where
    R: TenantOwned + Send + Sync + 'static,
    P: Send + Sync + Clone + 'static,
{
    match TenancyOptions::from_app(app)? {
        Some(options) => {
            configure(app, &options, identity, lookup)?;
            Ok(true)
        }
        None => {
            debug!("no tenancy config, hooks not installed");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ServiceMethodKind::*;

    fn pattern(s: &str) -> OperationPattern {
        OperationPattern::parse(s).unwrap()
    }

    #[test]
    fn patterns_match_services_and_methods() {
        assert!(pattern("users.find").matches("users", &Find));
        assert!(!pattern("users.find").matches("users", &Get));
        assert!(!pattern("users.find").matches("orders", &Find));
        assert!(pattern("users.*").matches("users", &Remove));
        assert!(pattern("*.find").matches("orders", &Find));
        assert!(pattern("*.*").matches("orders", &Custom("invite")));
        assert!(pattern("*").matches("anything", &Patch));
        assert!(pattern("users.invite").matches("users", &Custom("invite")));
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        for bad in ["users", "users.", ".find", "users.find.x", "us*rs.find", "users.fi nd", ""] {
            assert!(OperationPattern::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn patterns_display_canonically() {
        assert_eq!(pattern(" users.* ").to_string(), "users.*");
        assert_eq!(pattern("*").to_string(), "*");
        assert_eq!(pattern("*.*").to_string(), "*");
        assert_eq!(pattern("*.find").to_string(), "*.find");
    }

    #[test]
    fn overlapping_lists_both_apply() {
        let dim = TenantDimension::new("company")
            .stamp_on(["users.create", "users.update"])
            .filter_on(["users.*"]);
        let pointcuts = Pointcuts::from_dimension(&dim).unwrap();

        assert!(pointcuts.matches(OperationKind::CreateOrUpdate, "users", &Update));
        assert!(pointcuts.matches(OperationKind::Read, "users", &Update));
        assert!(pointcuts.matches(OperationKind::Read, "users", &Find));
        assert!(!pointcuts.matches(OperationKind::CreateOrUpdate, "users", &Find));
        assert!(!pointcuts.matches(OperationKind::Read, "orders", &Find));
        assert_eq!(pointcuts.entries().count(), 3);
    }

    #[test]
    fn writes_to_existing_rows_are_filtered() {
        let dim = TenantDimension::new("company")
            .stamp_on(["users.create", "users.update", "users.patch"])
            .filter_on(["users.find"]);
        let pointcuts = Pointcuts::from_dimension(&dim).unwrap();

        assert!(pointcuts.filtered("users", &Find));
        assert!(pointcuts.filtered("users", &Update));
        assert!(pointcuts.filtered("users", &Patch));
        assert!(!pointcuts.filtered("users", &Create));
        assert!(!pointcuts.filtered("users", &Get));
    }
}
