//! Control-unit manager library
//!
//! The manager keeps a fleet of controller containers in step with the rooms
//! listed by the catalog:
//! - Partitioning of rooms into fixed-size batches
//! - Reconciliation loop pairing batches with controllers
//! - Container lifecycle through a pluggable runtime
//! - Durable assignment state with startup recovery
//! - Service registration of every controller
//! - Status API and event stream for observability

pub mod api;
pub mod backoff;
pub mod catalog;
pub mod config;
pub mod controller_api;
pub mod error;
pub mod events;
pub mod partition;
pub mod ports;
pub mod registrar;
pub mod runtime;
pub mod scheduler;
pub mod server;
pub mod state;

pub use config::ManagerConfig;
pub use error::{ApiError, ManagerError, ManagerResult};
pub use scheduler::{PassReport, Reconciler, RecoveryReport};
pub use server::Server;
