//! yadwh-runtime: container runtime client.
//!
//! Defines the [`ContainerRuntime`] contract the update orchestrator drives
//! and two implementations:
//!
//! - **`docker`**: [`DockerRuntime`], backed by the Docker Engine API via bollard
//! - **`memory`**: [`MemoryRuntime`], an in-process runtime with fault
//!   injection and a call log
//!
//! Both are `Clone + Send + Sync` and safe to share between concurrent
//! webhook invocations.

pub mod docker;
pub mod error;
pub mod memory;
pub mod runtime;

pub use docker::DockerRuntime;
pub use error::{RuntimeError, RuntimeResult};
pub use memory::{MemoryRuntime, Operation};
pub use runtime::{ContainerRuntime, RuntimeFuture};
