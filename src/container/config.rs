//! Container configuration

use crate::error::{DbdockError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Container status as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container is created but not running
    Created,
    /// Container is running
    Running,
    /// Container is paused
    Paused,
    /// Container is restarting
    Restarting,
    /// Container is being removed
    Removing,
    /// Container has exited
    Exited,
    /// Container is in an error state
    Dead,
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running | ContainerStatus::Restarting)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Created => write!(f, "created"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Paused => write!(f, "paused"),
            ContainerStatus::Restarting => write!(f, "restarting"),
            ContainerStatus::Removing => write!(f, "removing"),
            ContainerStatus::Exited => write!(f, "exited"),
            ContainerStatus::Dead => write!(f, "dead"),
        }
    }
}

/// Port mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

impl PortMapping {
    pub fn tcp(host_port: u16, container_port: u16) -> Self {
        Self {
            host_port,
            container_port,
            protocol: Protocol::Tcp,
        }
    }
}

/// Network protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Port the database server listens on inside the container
pub const DEFAULT_CONTAINER_PORT: u16 = 1433;

/// Parameters for [`Controller::run`](super::Controller::run)
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Image reference
    pub image: String,
    /// Environment variables in `KEY=VALUE` form
    pub env: Vec<String>,
    /// Host port to publish; 0 publishes nothing
    pub host_port: u16,
    /// Port inside the container that `host_port` maps to
    pub container_port: u16,
    /// Container name; generated when empty
    pub name: String,
    /// Bind mount in `host:container` form; empty for none
    pub mount: String,
    /// Command to run
    pub command: Vec<String>,
    /// Pull even when the image is present locally
    pub always_pull: bool,
}

impl RunOptions {
    /// Create run options for an image
    pub fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
            env: Vec::new(),
            host_port: 0,
            container_port: DEFAULT_CONTAINER_PORT,
            name: String::new(),
            mount: String::new(),
            command: Vec::new(),
            always_pull: false,
        }
    }

    /// Add environment variable
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push(format!("{}={}", key, value));
        self
    }

    /// Publish `container_port` on `host_port`
    pub fn port(mut self, host_port: u16, container_port: u16) -> Self {
        self.host_port = host_port;
        self.container_port = container_port;
        self
    }

    /// Set container name
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set bind mount
    pub fn mount(mut self, mount: &str) -> Self {
        self.mount = mount.to_string();
        self
    }

    /// Set command to run
    pub fn cmd<S: Into<String>>(mut self, cmd: impl IntoIterator<Item = S>) -> Self {
        self.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn always_pull(mut self, always_pull: bool) -> Self {
        self.always_pull = always_pull;
        self
    }

    /// Name to create the container under
    pub(crate) fn container_name(&self) -> String {
        if self.name.is_empty() {
            format!("dbdock-{}", &Uuid::new_v4().simple().to_string()[..8])
        } else {
            self.name.clone()
        }
    }

    /// Published ports
    pub(crate) fn ports(&self) -> Vec<PortMapping> {
        if self.host_port == 0 {
            Vec::new()
        } else {
            vec![PortMapping::tcp(self.host_port, self.container_port)]
        }
    }

    /// Bind mounts, validated
    pub(crate) fn binds(&self) -> Result<Vec<String>> {
        if self.mount.is_empty() {
            return Ok(Vec::new());
        }

        match self.mount.split_once(':') {
            Some((host, container)) if !host.is_empty() && container.starts_with('/') => {
                Ok(vec![self.mount.clone()])
            }
            _ => Err(DbdockError::InvalidArgument(format!(
                "mount '{}' must be host:/container/path",
                self.mount
            ))),
        }
    }
}

/// Parse a `host[:container]` port mapping; the container side defaults to
/// [`DEFAULT_CONTAINER_PORT`]
pub fn parse_port_mapping(value: &str) -> Result<(u16, u16)> {
    let parse = |part: &str| {
        part.trim().parse::<u16>().map_err(|_| {
            DbdockError::InvalidArgument(format!("invalid port '{}' in '{}'", part, value))
        })
    };

    match value.split_once(':') {
        Some((host, container)) => Ok((parse(host)?, parse(container)?)),
        None => Ok((parse(value)?, DEFAULT_CONTAINER_PORT)),
    }
}

/// Controller tuning
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Delay between log polls
    pub poll_interval: Duration,
    /// Log polls before giving up
    pub poll_attempts: u32,
    /// Grace period the engine gives a container before killing it on stop
    pub stop_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            poll_attempts: 240,
            stop_timeout: Duration::from_secs(10),
        }
    }
}

impl ControllerSettings {
    /// Total time a log wait may take
    pub fn wait_budget(&self) -> Duration {
        self.poll_interval * self.poll_attempts
    }
}
