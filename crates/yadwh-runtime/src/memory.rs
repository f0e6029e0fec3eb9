//! In-process container runtime.
//!
//! `MemoryRuntime` models the parts of a container engine the update
//! pipeline touches: a registry that maps image references to image ids,
//! locally pulled images, and containers with labels, names and an
//! auto-remove flag. Operations can be made to fail per target, and every
//! call is recorded, which makes it the injected runtime for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::json;

use yadwh_core::{ContainerDescriptor, ContainerId, ContainerSnapshot, ImageId, RegistryAuth};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{ContainerRuntime, RuntimeFuture};

/// A runtime operation, used for fault injection and the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Inspect,
    Pull,
    Stop,
    Remove,
    Create,
    Start,
    Describe,
    RemoveImage,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Inspect => "inspect",
            Operation::Pull => "pull",
            Operation::Stop => "stop",
            Operation::Remove => "remove",
            Operation::Create => "create",
            Operation::Start => "start",
            Operation::Describe => "describe",
            Operation::RemoveImage => "remove_image",
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryContainer {
    id: ContainerId,
    name: Option<String>,
    image: String,
    image_id: ImageId,
    labels: HashMap<String, String>,
    running: bool,
    auto_remove: bool,
}

impl MemoryContainer {
    fn descriptor(&self) -> ContainerDescriptor {
        ContainerDescriptor {
            id: self.id.clone(),
            image: self.image.clone(),
            image_id: self.image_id.clone(),
            labels: self.labels.clone(),
            names: self.name.iter().map(|n| format!("/{n}")).collect(),
            state: Some((if self.running { "running" } else { "exited" }).to_string()),
            status: None,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Insertion order is listing order.
    containers: Vec<MemoryContainer>,
    /// What the registry serves for each reference.
    registry: HashMap<String, ImageId>,
    /// Locally tagged references.
    tags: HashMap<String, ImageId>,
    images: HashSet<ImageId>,
    /// `(operation, target)`; a `None` target fails every call.
    faults: HashSet<(Operation, Option<String>)>,
    calls: Vec<(Operation, String)>,
    pulled_with_auth: Vec<String>,
    /// Grace period of every stop call, in call order.
    stop_graces: Vec<Duration>,
    next_id: u64,
}

impl MemoryState {
    fn record(&mut self, op: Operation, target: &str) {
        self.calls.push((op, target.to_string()));
    }

    fn check_fault(&self, op: Operation, targets: &[&str]) -> RuntimeResult<()> {
        let blanket = self.faults.contains(&(op, None));
        let targeted = targets
            .iter()
            .any(|t| self.faults.contains(&(op, Some(t.to_string()))));
        if blanket || targeted {
            return Err(RuntimeError::Injected {
                operation: op.as_str(),
                target: targets.first().copied().unwrap_or_default().to_string(),
            });
        }
        Ok(())
    }

    /// Find by id or name.
    fn position(&self, key: &str) -> RuntimeResult<usize> {
        let key = key.trim_start_matches('/');
        self.containers
            .iter()
            .position(|c| c.id == key || c.name.as_deref() == Some(key))
            .ok_or_else(|| RuntimeError::ContainerNotFound(key.to_string()))
    }

    fn fresh_id(&mut self) -> ContainerId {
        self.next_id += 1;
        format!("{:064x}", 0xc0de_0000_u64 + self.next_id)
    }
}

/// In-memory [`ContainerRuntime`].
#[derive(Debug, Clone, Default)]
pub struct MemoryRuntime {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the registry serve `image_id` for `reference`.
    pub fn publish(&self, reference: &str, image_id: &str) {
        self.lock()
            .registry
            .insert(reference.to_string(), image_id.to_string());
    }

    /// Start a container from `reference`, pulling it locally first.
    ///
    /// The reference must have been published.
    pub fn run(&self, name: &str, reference: &str, labels: &[(&str, &str)]) -> ContainerId {
        let mut state = self.lock();
        let image_id = state
            .registry
            .get(reference)
            .cloned()
            .unwrap_or_else(|| format!("sha256:{reference}"));
        state.tags.insert(reference.to_string(), image_id.clone());
        state.images.insert(image_id.clone());
        let id = state.fresh_id();
        state.containers.push(MemoryContainer {
            id: id.clone(),
            name: (!name.is_empty()).then(|| name.to_string()),
            image: reference.to_string(),
            image_id,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            running: true,
            auto_remove: false,
        });
        id
    }

    /// Set whether the runtime deletes the container once it stops.
    pub fn set_auto_remove(&self, id: &str, auto_remove: bool) {
        let mut state = self.lock();
        if let Ok(pos) = state.position(id) {
            state.containers[pos].auto_remove = auto_remove;
        }
    }

    /// Fail `op` whenever it targets `target` (container id or name,
    /// image reference or image id).
    pub fn fail(&self, op: Operation, target: &str) {
        self.lock().faults.insert((op, Some(target.to_string())));
    }

    /// Fail every call of `op`.
    pub fn fail_all(&self, op: Operation) {
        self.lock().faults.insert((op, None));
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<(Operation, String)> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Number of calls of `op`.
    pub fn calls_of(&self, op: Operation) -> usize {
        self.lock().calls.iter().filter(|(o, _)| *o == op).count()
    }

    /// References pulled with registry credentials, as `user@reference`.
    pub fn authenticated_pulls(&self) -> Vec<String> {
        self.lock().pulled_with_auth.clone()
    }

    /// Grace periods passed to `stop`, in call order.
    pub fn stop_graces(&self) -> Vec<Duration> {
        self.lock().stop_graces.clone()
    }

    /// Look up a container by id or name.
    pub fn container(&self, key: &str) -> Option<ContainerDescriptor> {
        let state = self.lock();
        state
            .position(key)
            .ok()
            .map(|pos| state.containers[pos].descriptor())
    }

    /// Every container, running or not.
    pub fn containers(&self) -> Vec<ContainerDescriptor> {
        self.lock()
            .containers
            .iter()
            .map(MemoryContainer::descriptor)
            .collect()
    }

    pub fn has_image(&self, image_id: &str) -> bool {
        self.lock().images.contains(image_id)
    }
}

impl ContainerRuntime for MemoryRuntime {
    fn list_by_label_key<'a>(
        &'a self,
        label_key: &'a str,
    ) -> RuntimeFuture<'a, Vec<ContainerDescriptor>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(Operation::List, label_key);
            state.check_fault(Operation::List, &[label_key])?;
            Ok(state
                .containers
                .iter()
                .filter(|c| c.running && c.labels.contains_key(label_key))
                .map(MemoryContainer::descriptor)
                .collect())
        })
    }

    fn inspect<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ContainerSnapshot> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(Operation::Inspect, id);
            let pos = state.position(id)?;
            let c = state.containers[pos].clone();
            state.check_fault(Operation::Inspect, &[c.id.as_str(), c.name.as_deref().unwrap_or_default()])?;
            Ok(ContainerSnapshot {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                image_id: c.image_id.clone(),
                auto_remove: c.auto_remove,
                config: json!({ "Image": c.image, "Labels": c.labels }),
                host_config: json!({ "AutoRemove": c.auto_remove }),
                endpoints: json!({ "bridge": {} }),
            })
        })
    }

    fn pull<'a>(
        &'a self,
        image: &'a str,
        auth: Option<&'a RegistryAuth>,
    ) -> RuntimeFuture<'a, String> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(Operation::Pull, image);
            state.check_fault(Operation::Pull, &[image])?;
            let image_id = state
                .registry
                .get(image)
                .cloned()
                .ok_or_else(|| RuntimeError::ImageNotFound(image.to_string()))?;
            if let Some(auth) = auth {
                state.pulled_with_auth.push(format!("{}@{image}", auth.username));
            }

            let previous = state.tags.insert(image.to_string(), image_id.clone());
            state.images.insert(image_id.clone());
            let log = if previous.as_deref() == Some(image_id.as_str()) {
                format!(
                    "{{\"status\":\"Digest: {image_id}\"}}\n\
                     {{\"status\":\"Status: Image is up to date for {image}\"}}\n"
                )
            } else {
                format!(
                    "{{\"status\":\"Pulling from {image}\"}}\n\
                     {{\"status\":\"Digest: {image_id}\"}}\n\
                     {{\"status\":\"Status: Downloaded newer image for {image}\"}}\n"
                )
            };
            Ok(log)
        })
    }

    fn stop<'a>(&'a self, id: &'a str, grace: Duration) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(Operation::Stop, id);
            state.stop_graces.push(grace);
            let pos = state.position(id)?;
            let c = state.containers[pos].clone();
            state.check_fault(Operation::Stop, &[c.id.as_str(), c.name.as_deref().unwrap_or_default()])?;
            if c.auto_remove {
                state.containers.remove(pos);
            } else {
                state.containers[pos].running = false;
            }
            Ok(())
        })
    }

    fn remove<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(Operation::Remove, id);
            let pos = state.position(id)?;
            let c = state.containers[pos].clone();
            state.check_fault(Operation::Remove, &[c.id.as_str(), c.name.as_deref().unwrap_or_default()])?;
            if c.running {
                return Err(RuntimeError::Conflict(format!(
                    "cannot remove running container {}",
                    c.id
                )));
            }
            state.containers.remove(pos);
            Ok(())
        })
    }

    fn create<'a>(
        &'a self,
        snapshot: &'a ContainerSnapshot,
        name: Option<&'a str>,
    ) -> RuntimeFuture<'a, ContainerId> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(Operation::Create, name.unwrap_or(&snapshot.id));
            state.check_fault(
                Operation::Create,
                &[snapshot.id.as_str(), name.unwrap_or_default(), snapshot.image.as_str()],
            )?;

            let name = name.map(|n| n.trim_start_matches('/').to_string());
            if let Some(n) = &name {
                if state.containers.iter().any(|c| c.name.as_ref() == Some(n)) {
                    return Err(RuntimeError::Conflict(format!(
                        "container name \"/{n}\" is already in use"
                    )));
                }
            }
            let image_id = state
                .tags
                .get(&snapshot.image)
                .cloned()
                .ok_or_else(|| RuntimeError::ImageNotFound(snapshot.image.clone()))?;
            let labels: HashMap<String, String> = snapshot
                .config
                .get("Labels")
                .cloned()
                .and_then(|l| serde_json::from_value(l).ok())
                .unwrap_or_default();
            let auto_remove = snapshot
                .host_config
                .get("AutoRemove")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            let id = state.fresh_id();
            state.containers.push(MemoryContainer {
                id: id.clone(),
                name,
                image: snapshot.image.clone(),
                image_id,
                labels,
                running: false,
                auto_remove,
            });
            Ok(id)
        })
    }

    fn start<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(Operation::Start, id);
            let pos = state.position(id)?;
            let c = state.containers[pos].clone();
            state.check_fault(Operation::Start, &[c.id.as_str(), c.name.as_deref().unwrap_or_default()])?;
            state.containers[pos].running = true;
            Ok(())
        })
    }

    fn describe<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ContainerDescriptor> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(Operation::Describe, id);
            let pos = state.position(id)?;
            let c = state.containers[pos].clone();
            state.check_fault(Operation::Describe, &[c.id.as_str(), c.name.as_deref().unwrap_or_default()])?;
            Ok(c.descriptor())
        })
    }

    fn remove_image<'a>(&'a self, image_id: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(Operation::RemoveImage, image_id);
            state.check_fault(Operation::RemoveImage, &[image_id])?;
            if !state.images.contains(image_id) {
                return Err(RuntimeError::ImageNotFound(image_id.to_string()));
            }
            if let Some(user) = state.containers.iter().find(|c| c.image_id == image_id) {
                return Err(RuntimeError::Conflict(format!(
                    "image {image_id} is being used by container {}",
                    user.id
                )));
            }
            state.images.remove(image_id);
            state.tags.retain(|_, id| id != image_id);
            Ok(())
        })
    }
}
