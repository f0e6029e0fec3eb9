//! Docker Engine adapter.
//!
//! Snapshots keep bollard's inspect documents as JSON. The Engine API uses
//! the same field names for a container's inspected config and for the
//! create request, so recreation deserializes them straight back into
//! bollard's request types.

use std::collections::HashMap;
use std::time::Duration;

use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    NetworkingConfig, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use bollard::models::{ContainerInspectResponse, ContainerSummary, EndpointSettings, HostConfig};
use futures_util::StreamExt;
use tracing::{debug, info};

use yadwh_core::{ContainerDescriptor, ContainerId, ContainerSnapshot, RegistryAuth};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{ContainerRuntime, RuntimeFuture};

/// Seconds bollard waits on a single API request.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Docker Engine API client.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform default socket.
    pub fn connect_with_defaults() -> RuntimeResult<Self> {
        Ok(Self {
            docker: Docker::connect_with_defaults()?,
        })
    }

    /// Connect to a unix socket, e.g. `unix:///var/run/docker.sock`.
    pub fn connect_with_socket(path: &str) -> RuntimeResult<Self> {
        let docker = Docker::connect_with_socket(
            path.trim_start_matches("unix://"),
            REQUEST_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )?;
        Ok(Self { docker })
    }

    /// Downgrade the client API version to what the daemon supports.
    pub async fn negotiate_version(self) -> RuntimeResult<Self> {
        debug!("negotiating API version for docker client");
        Ok(Self {
            docker: self.docker.negotiate_version().await?,
        })
    }

    /// Fail unless the daemon answers.
    pub async fn ping(&self) -> RuntimeResult<()> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn inspect_raw(&self, id: &str) -> RuntimeResult<ContainerInspectResponse> {
        Ok(self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?)
    }
}

impl ContainerRuntime for DockerRuntime {
    fn list_by_label_key<'a>(
        &'a self,
        label_key: &'a str,
    ) -> RuntimeFuture<'a, Vec<ContainerDescriptor>> {
        Box::pin(async move {
            let mut filters = HashMap::new();
            filters.insert("label".to_string(), vec![label_key.to_string()]);
            let options = ListContainersOptions::<String> {
                filters,
                ..Default::default()
            };
            let summaries = self.docker.list_containers(Some(options)).await?;
            Ok(summaries.into_iter().map(descriptor_from_summary).collect())
        })
    }

    fn inspect<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ContainerSnapshot> {
        Box::pin(async move {
            let inspect = self.inspect_raw(id).await?;
            snapshot_from_inspect(id, inspect)
        })
    }

    fn pull<'a>(
        &'a self,
        image: &'a str,
        auth: Option<&'a RegistryAuth>,
    ) -> RuntimeFuture<'a, String> {
        Box::pin(async move {
            let (from_image, tag) = split_reference(image);
            let options = CreateImageOptions::<String> {
                from_image,
                tag: tag.unwrap_or_default(),
                ..Default::default()
            };
            let credentials = auth.map(|a| DockerCredentials {
                username: Some(a.username.clone()),
                password: Some(a.password.clone()),
                ..Default::default()
            });

            let mut stream = self.docker.create_image(Some(options), None, credentials);
            let mut log = String::new();
            while let Some(progress) = stream.next().await {
                let progress = progress?;
                if let Ok(line) = serde_json::to_string(&progress) {
                    log.push_str(&line);
                    log.push('\n');
                }
            }
            info!(image, bytes = log.len(), "image pulled");
            Ok(log)
        })
    }

    fn stop<'a>(&'a self, id: &'a str, grace: Duration) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            let options = StopContainerOptions {
                t: i64::try_from(grace.as_secs()).unwrap_or(i64::MAX),
            };
            self.docker.stop_container(id, Some(options)).await?;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            self.docker
                .remove_container(id, None::<RemoveContainerOptions>)
                .await?;
            Ok(())
        })
    }

    fn create<'a>(
        &'a self,
        snapshot: &'a ContainerSnapshot,
        name: Option<&'a str>,
    ) -> RuntimeFuture<'a, ContainerId> {
        Box::pin(async move {
            let config = create_config(snapshot)?;
            let options = name.map(|name| CreateContainerOptions {
                name: name.to_string(),
                platform: None,
            });
            let created = self.docker.create_container(options, config).await?;
            for warning in &created.warnings {
                debug!(container = %created.id, warning = %warning, "create warning");
            }
            Ok(created.id)
        })
    }

    fn start<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            self.docker
                .start_container(id, None::<StartContainerOptions<String>>)
                .await?;
            Ok(())
        })
    }

    fn describe<'a>(&'a self, id: &'a str) -> RuntimeFuture<'a, ContainerDescriptor> {
        Box::pin(async move {
            let inspect = self.inspect_raw(id).await?;
            Ok(descriptor_from_inspect(id, inspect))
        })
    }

    fn remove_image<'a>(&'a self, image_id: &'a str) -> RuntimeFuture<'a, ()> {
        Box::pin(async move {
            self.docker
                .remove_image(image_id, None::<RemoveImageOptions>, None)
                .await?;
            Ok(())
        })
    }
}

// ── Conversions ────────────────────────────────────────────────────

/// Split an image reference into repository and tag.
///
/// Digest references are passed through whole. A reference without a tag
/// pulls `latest`; the Engine API would otherwise pull every tag.
pub fn split_reference(image: &str) -> (String, Option<String>) {
    if image.contains('@') {
        return (image.to_string(), None);
    }
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (image[..split].to_string(), Some(image[split + 1..].to_string()))
        }
        None => (image.to_string(), Some("latest".to_string())),
    }
}

fn descriptor_from_summary(summary: ContainerSummary) -> ContainerDescriptor {
    ContainerDescriptor {
        id: summary.id.unwrap_or_default(),
        image: summary.image.unwrap_or_default(),
        image_id: summary.image_id.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
        names: summary.names.unwrap_or_default(),
        state: summary.state,
        status: summary.status,
    }
}

fn descriptor_from_inspect(id: &str, inspect: ContainerInspectResponse) -> ContainerDescriptor {
    let config = inspect.config.unwrap_or_default();
    let state = inspect.state.unwrap_or_default();
    ContainerDescriptor {
        id: inspect.id.unwrap_or_else(|| id.to_string()),
        image: config.image.unwrap_or_default(),
        image_id: inspect.image.unwrap_or_default(),
        labels: config.labels.unwrap_or_default(),
        names: inspect.name.into_iter().collect(),
        state: state.status.map(|s| s.to_string()),
        status: None,
    }
}

fn snapshot_error(id: &str, reason: impl ToString) -> RuntimeError {
    RuntimeError::Snapshot {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

fn snapshot_from_inspect(
    id: &str,
    inspect: ContainerInspectResponse,
) -> RuntimeResult<ContainerSnapshot> {
    let config = inspect
        .config
        .ok_or_else(|| snapshot_error(id, "inspect returned no config"))?;
    let host_config = inspect.host_config.unwrap_or_default();
    let endpoints: HashMap<String, EndpointSettings> = inspect
        .network_settings
        .and_then(|n| n.networks)
        .unwrap_or_default();

    Ok(ContainerSnapshot {
        id: inspect.id.unwrap_or_else(|| id.to_string()),
        name: inspect
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .filter(|n| !n.is_empty()),
        image: config.image.clone().unwrap_or_default(),
        image_id: inspect.image.unwrap_or_default(),
        auto_remove: host_config.auto_remove.unwrap_or(false),
        config: serde_json::to_value(&config).map_err(|e| snapshot_error(id, e))?,
        host_config: serde_json::to_value(&host_config).map_err(|e| snapshot_error(id, e))?,
        endpoints: serde_json::to_value(&endpoints).map_err(|e| snapshot_error(id, e))?,
    })
}

fn create_config(snapshot: &ContainerSnapshot) -> RuntimeResult<Config<String>> {
    let id = snapshot.id.as_str();
    let mut config: Config<String> =
        serde_json::from_value(snapshot.config.clone()).map_err(|e| snapshot_error(id, e))?;
    let host_config: HostConfig = if snapshot.host_config.is_null() {
        HostConfig::default()
    } else {
        serde_json::from_value(snapshot.host_config.clone()).map_err(|e| snapshot_error(id, e))?
    };
    let endpoints_config: HashMap<String, EndpointSettings> = if snapshot.endpoints.is_null() {
        HashMap::new()
    } else {
        serde_json::from_value(snapshot.endpoints.clone()).map_err(|e| snapshot_error(id, e))?
    };

    config.host_config = Some(host_config);
    config.networking_config = Some(NetworkingConfig { endpoints_config });
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, NetworkSettings};

    #[test]
    fn split_reference_variants() {
        assert_eq!(
            split_reference("nginx"),
            ("nginx".to_string(), Some("latest".to_string()))
        );
        assert_eq!(
            split_reference("nginx:1.27"),
            ("nginx".to_string(), Some("1.27".to_string()))
        );
        assert_eq!(
            split_reference("registry.local:5000/team/api"),
            ("registry.local:5000/team/api".to_string(), Some("latest".to_string()))
        );
        assert_eq!(
            split_reference("registry.local:5000/team/api:v2"),
            ("registry.local:5000/team/api".to_string(), Some("v2".to_string()))
        );
        assert_eq!(
            split_reference("nginx@sha256:abc"),
            ("nginx@sha256:abc".to_string(), None)
        );
    }

    fn sample_inspect() -> ContainerInspectResponse {
        let mut labels = HashMap::new();
        labels.insert("io.d2a.yadwh.ug".to_string(), "web".to_string());
        let mut networks = HashMap::new();
        networks.insert(
            "frontend".to_string(),
            EndpointSettings {
                aliases: Some(vec!["api".to_string()]),
                ..Default::default()
            },
        );
        ContainerInspectResponse {
            id: Some("abc123".to_string()),
            name: Some("/api".to_string()),
            image: Some("sha256:old".to_string()),
            config: Some(ContainerConfig {
                image: Some("team/api:latest".to_string()),
                env: Some(vec!["MODE=prod".to_string()]),
                labels: Some(labels),
                ..Default::default()
            }),
            host_config: Some(HostConfig {
                auto_remove: Some(true),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                networks: Some(networks),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn snapshot_captures_recreate_inputs() {
        let snapshot = snapshot_from_inspect("abc123", sample_inspect()).unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("api"));
        assert_eq!(snapshot.image, "team/api:latest");
        assert_eq!(snapshot.image_id, "sha256:old");
        assert!(snapshot.auto_remove);
        assert_eq!(snapshot.config["Env"][0], "MODE=prod");
        assert_eq!(snapshot.endpoints["frontend"]["Aliases"][0], "api");
    }

    #[test]
    fn snapshot_requires_config() {
        let inspect = ContainerInspectResponse {
            config: None,
            ..sample_inspect()
        };
        assert!(matches!(
            snapshot_from_inspect("abc123", inspect),
            Err(RuntimeError::Snapshot { .. })
        ));
    }

    #[test]
    fn create_config_restores_host_and_network() {
        let snapshot = snapshot_from_inspect("abc123", sample_inspect()).unwrap();
        let config = create_config(&snapshot).unwrap();
        assert_eq!(config.image.as_deref(), Some("team/api:latest"));
        assert_eq!(config.env, Some(vec!["MODE=prod".to_string()]));
        assert_eq!(config.host_config.unwrap().auto_remove, Some(true));
        let endpoints = config.networking_config.unwrap().endpoints_config;
        assert!(endpoints.contains_key("frontend"));
    }

    #[test]
    fn summary_maps_to_descriptor() {
        let summary = ContainerSummary {
            id: Some("c1".to_string()),
            names: Some(vec!["/web".to_string()]),
            image: Some("nginx:latest".to_string()),
            image_id: Some("sha256:n1".to_string()),
            state: Some("running".to_string()),
            ..Default::default()
        };
        let d = descriptor_from_summary(summary);
        assert_eq!(d.id, "c1");
        assert_eq!(d.first_name(), Some("web"));
        assert_eq!(d.image_id, "sha256:n1");
        assert!(d.labels.is_empty());
    }
}
