//! Container engine client
//!
//! Everything dbdock does to a container goes through the [`ContainerEngine`]
//! trait. [`DockerEngine`] talks to the local Docker daemon; unit tests use an
//! in-memory fake.

pub mod docker;
#[cfg(test)]
pub(crate) mod fake;

use crate::container::config::{ContainerStatus, PortMapping};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use docker::DockerEngine;

/// Everything the engine needs to create a container
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    /// Fully qualified image reference
    pub image: String,
    /// Container name (engine generates one when absent)
    pub name: Option<String>,
    /// Environment in `KEY=VALUE` form
    pub env: Vec<String>,
    /// Command override
    pub cmd: Vec<String>,
    /// Published ports
    pub ports: Vec<PortMapping>,
    /// Bind mounts in `host:container[:mode]` form
    pub binds: Vec<String>,
}

/// Captured result of a command executed inside a container
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Operations dbdock needs from a container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check that the engine answers
    async fn ping(&self) -> Result<()>;

    /// Whether the image is present locally
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull an image, waiting for the pull to finish
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create a container and return its engine-assigned ID
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Current status as reported by the engine
    async fn container_status(&self, id: &str) -> Result<ContainerStatus>;

    /// Whether the engine knows the container at all
    async fn container_exists(&self, id: &str) -> Result<bool>;

    /// All stdout and stderr output produced so far
    async fn container_logs(&self, id: &str) -> Result<String>;

    /// Run a command inside a running container
    async fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput>;

    /// Extract a tar archive into `dir` inside the container
    async fn upload_archive(&self, id: &str, dir: &str, archive: Vec<u8>) -> Result<()>;
}
