//! dog-memory: in-memory data access for DogRS.
//!
//! A [`MemoryStore`] holds JSON rows and named row filters. Services read and
//! write through a [`MemorySession`], and the store applies the filters
//! enabled on that session whenever it locates rows. [`MemorySessionPool`]
//! plugs into `DogApp::use_sessions` so every call gets its own session,
//! reset before it is reused.

pub mod error;
pub mod lookup;
pub mod service;
pub mod session;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use lookup::UserStoreLookup;
pub use service::MemoryService;
pub use session::{MemorySession, MemorySessionPool};
pub use store::{FilterDef, MemoryStore};
