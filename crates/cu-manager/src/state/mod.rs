//! Durable controller -> rooms assignment state
//!
//! [`StateStore`] is the reconciler's record of which controller serves which
//! rooms. It is written through a [`StateBackend`] after every change; the
//! backend is a JSON file in production and memory in tests.

mod file;
mod memory;
mod store;
mod traits;

pub use file::FileStateBackend;
pub use memory::InMemoryStateBackend;
pub use store::StateStore;
pub use traits::StateBackend;
