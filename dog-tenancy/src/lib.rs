//! dog-tenancy: tenant-scoped data isolation for DogRS.
//!
//! Each isolation dimension (company, business unit, ...) installs two
//! app-wide hooks:
//!
//! - a filter activator before read operations, which enables the
//!   dimension's named filter on the call's data-access session, bound to
//!   the caller's tenant, for the duration of the call;
//! - a stamper on create-or-update operations, which makes sure persisted
//!   entities carry the caller's tenant.
//!
//! Which operations are reads and which are writes is declared per
//! dimension with `"<service>.<method>"` patterns.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use dog_core::DogApp;
//! use dog_tenancy::{configure, ContextIdentity, StaticTenantLookup, TenancyOptions, TenantDimension};
//! use serde_json::Value;
//!
//! let app: DogApp<Value, ()> = DogApp::new();
//! let options = TenancyOptions::new().dimension(
//!     TenantDimension::new("company")
//!         .stamp_on(["users.create", "users.update"])
//!         .filter_on(["users.find", "users.get"]),
//! );
//! let lookup = StaticTenantLookup::new().assign("alice", "company", "acme");
//!
//! configure(&app, &options, Arc::new(ContextIdentity), Arc::new(lookup)).unwrap();
//! ```

pub mod dispatch;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod lookup;
pub mod options;
pub mod resolver;

pub use dispatch::*;
pub use entity::*;
pub use error::*;
pub use hooks::*;
pub use identity::*;
pub use lookup::*;
pub use options::*;
pub use resolver::*;
