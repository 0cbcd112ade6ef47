//! dog-core: framework-agnostic core for DogRS.
//!
//! Services, the Feathers-style hook pipeline, the explicit call context and
//! the data-access session contract that tenant filters attach to.

pub mod app;
pub mod config;
pub mod context;
pub mod errors;
pub mod hooks;
pub mod registry;
pub mod service;
pub mod session;

pub use app::{DogApp, ServiceHandle};
pub use config::{DogConfig, DogConfigSnapshot};
pub use context::{CallContext, Principal, TenantId};
pub use errors::{DogError, ErrorKind};
pub use hooks::{
    DogAfterHook, DogAroundHook, DogBeforeHook, DogErrorHook, HookContext, HookFut, HookResult, Next,
    ServiceHooks,
};
pub use registry::DogServiceRegistry;
pub use service::{DogService, ServiceCapabilities, ServiceMethodKind};
pub use session::{
    ActiveFilter, DataSession, FilterActivation, FilterScope, FilterTable, SessionError, SessionLease,
    SessionProvider,
};
