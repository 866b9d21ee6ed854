//! Container runtime layer
//!
//! The manager only needs a handful of container operations; they are
//! expressed by [`ContainerRuntime`] so the reconciler can run against the
//! docker CLI in production and an in-memory runtime in tests.

mod docker;
mod memory;
mod traits;

pub use docker::DockerCli;
pub use memory::{InMemoryRuntime, RuntimeCall};
pub use traits::{ContainerInfo, ContainerRuntime, ContainerSpec, ContainerStatus, PortMapping};
