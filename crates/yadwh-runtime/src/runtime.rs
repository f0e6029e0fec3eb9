//! The container runtime contract.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use yadwh_core::{ContainerDescriptor, ContainerId, ContainerSnapshot, RegistryAuth};

use crate::error::RuntimeResult;

/// Boxed future returned by every runtime operation.
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = RuntimeResult<T>> + Send + 'a>>;

/// Operations the update orchestrator needs from a container runtime.
///
/// Implementations hold no per-invocation state; one client is shared by
/// all webhook calls.
pub trait ContainerRuntime: Send + Sync {
    /// Running containers that carry `label_key`, whatever its value.
    fn list_by_label_key<'a>(&'a self, label_key: &'a str)
    -> RuntimeFuture<'a, Vec<ContainerDescriptor>>;

    /// Capture everything needed to recreate the container.
    fn inspect<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ContainerSnapshot>;

    /// Pull `image`, returning the progress log.
    fn pull<'a>(
        &'a self,
        image: &'a str,
        auth: Option<&'a RegistryAuth>,
    ) -> RuntimeFuture<'a, String>;

    /// Stop gracefully, killing after `grace`.
    fn stop<'a>(&'a self, id: &'a str, grace: Duration) -> RuntimeFuture<'a, ()>;

    fn remove<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ()>;

    /// Create a container from a snapshot; `name: None` creates it anonymous.
    fn create<'a>(
        &'a self,
        snapshot: &'a ContainerSnapshot,
        name: Option<&'a str>,
    ) -> RuntimeFuture<'a, ContainerId>;

    fn start<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ()>;

    /// Current descriptor of a single container.
    fn describe<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ContainerDescriptor>;

    fn remove_image<'a>(&'a self, image_id: &'a str) -> RuntimeFuture<'a, ()>;
}

impl<R: ContainerRuntime + ?Sized> ContainerRuntime for Arc<R> {
    fn list_by_label_key<'a>(
        &'a self,
        label_key: &'a str,
    ) -> RuntimeFuture<'a, Vec<ContainerDescriptor>> {
        (**self).list_by_label_key(label_key)
    }

    fn inspect<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ContainerSnapshot> {
        (**self).inspect(id)
    }

    fn pull<'a>(
        &'a self,
        image: &'a str,
        auth: Option<&'a RegistryAuth>,
    ) -> RuntimeFuture<'a, String> {
        (**self).pull(image, auth)
    }

    fn stop<'a>(&'a self, id: &'a str, grace: Duration) -> RuntimeFuture<'a, ()> {
        (**self).stop(id, grace)
    }

    fn remove<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ()> {
        (**self).remove(id)
    }

    fn create<'a>(
        &'a self,
        snapshot: &'a ContainerSnapshot,
        name: Option<&'a str>,
    ) -> RuntimeFuture<'a, ContainerId> {
        (**self).create(snapshot, name)
    }

    fn start<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ()> {
        (**self).start(id)
    }

    fn describe<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ContainerDescriptor> {
        (**self).describe(id)
    }

    fn remove_image<'a>(&'a self, image_id: &'a str) -> RuntimeFuture<'a, ()> {
        (**self).remove_image(image_id)
    }
}
