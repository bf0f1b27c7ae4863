//! Docker Engine API client backed by bollard

use super::{ContainerEngine, ContainerSpec, ExecOutput};
use crate::container::config::ContainerStatus;
use crate::error::{DbdockError, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    UploadToContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerStateStatusEnum, HostConfig, PortBinding};
use bollard::Docker;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Connection to the local Docker daemon
///
/// The connection is released when the value is dropped.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using the platform defaults (`DOCKER_HOST` or the local socket)
    /// and make sure the daemon answers
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DbdockError::EngineUnavailable(e.to_string()))?;

        let engine = Self { docker };
        engine.ping().await?;
        debug!("Connected to container engine");

        Ok(engine)
    }

    /// Wrap an already configured bollard client
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn map_container_error(err: DockerError, id: &str) -> DbdockError {
    if is_not_found(&err) {
        DbdockError::ContainerNotFound(id.to_string())
    } else {
        DbdockError::Engine(format!("{}: {}", id, err))
    }
}

fn map_pull_error(err: DockerError, image: &str) -> DbdockError {
    if is_not_found(&err) {
        DbdockError::ImageNotFound(image.to_string())
    } else {
        DbdockError::ImagePull(format!("{}: {}", image, err))
    }
}

fn map_create_error(err: DockerError, image: &str) -> DbdockError {
    if is_not_found(&err) {
        DbdockError::ImageNotFound(image.to_string())
    } else {
        DbdockError::Engine(format!("failed to create container from {}: {}", image, err))
    }
}

fn log_text(output: LogOutput) -> String {
    let message = match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::StdIn { message }
        | LogOutput::Console { message } => message,
    };
    String::from_utf8_lossy(&message).to_string()
}

impl From<ContainerStateStatusEnum> for ContainerStatus {
    fn from(status: ContainerStateStatusEnum) -> Self {
        match status {
            ContainerStateStatusEnum::CREATED => ContainerStatus::Created,
            ContainerStateStatusEnum::RUNNING => ContainerStatus::Running,
            ContainerStateStatusEnum::PAUSED => ContainerStatus::Paused,
            ContainerStateStatusEnum::RESTARTING => ContainerStatus::Restarting,
            ContainerStateStatusEnum::REMOVING => ContainerStatus::Removing,
            ContainerStateStatusEnum::EXITED => ContainerStatus::Exited,
            ContainerStateStatusEnum::DEAD | ContainerStateStatusEnum::EMPTY => {
                ContainerStatus::Dead
            }
        }
    }
}

/// Translate a spec into the bollard create-container body
fn container_config(spec: &ContainerSpec) -> Config<String> {
    let mut exposed_ports = HashMap::new();
    let mut port_bindings = HashMap::new();

    for port in &spec.ports {
        let key = format!("{}/{}", port.container_port, port.protocol);
        exposed_ports.insert(key.clone(), HashMap::new());
        port_bindings.insert(
            key,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(port.host_port.to_string()),
            }]),
        );
    }

    let host_config = HostConfig {
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        env: (!spec.env.is_empty()).then(|| spec.env.clone()),
        cmd: (!spec.cmd.is_empty()).then(|| spec.cmd.clone()),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| DbdockError::EngineUnavailable(e.to_string()))
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(DbdockError::Engine(format!("{}: {}", image, e))),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(info) = progress.next().await {
            let info = info.map_err(|e| map_pull_error(e, image))?;
            if let Some(status) = info.status {
                debug!("pull {}: {}", image, status);
            }
        }

        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let options = spec.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, container_config(spec))
            .await
            .map_err(|e| map_create_error(e, &spec.image))?;

        for warning in &response.warnings {
            tracing::warn!("create {}: {}", response.id, warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_container_error(e, id))
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: timeout.as_secs() as i64,
        };

        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|e| map_container_error(e, id))
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| map_container_error(e, id))
    }

    async fn container_status(&self, id: &str) -> Result<ContainerStatus> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_container_error(e, id))?;

        response
            .state
            .and_then(|state| state.status)
            .map(ContainerStatus::from)
            .ok_or_else(|| DbdockError::Engine(format!("{}: engine reported no state", id)))
    }

    async fn container_exists(&self, id: &str) -> Result<bool> {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(map_container_error(e, id)),
        }
    }

    async fn container_logs(&self, id: &str) -> Result<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut logs = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_container_error(e, id))?;
            logs.push_str(&log_text(chunk));
        }

        Ok(logs)
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput> {
        debug!("exec in {}: {:?}", id, cmd);

        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| map_container_error(e, id))?;

        let mut output = ExecOutput::default();

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| map_container_error(e, id))?;

        if let StartExecResults::Attached { output: mut stream, .. } = started {
            while let Some(chunk) = stream.next().await {
                match chunk.map_err(|e| map_container_error(e, id))? {
                    LogOutput::StdErr { message } => {
                        output.stderr.push_str(&String::from_utf8_lossy(&message))
                    }
                    other => output.stdout.push_str(&log_text(other)),
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| map_container_error(e, id))?;
        output.exit_code = inspect.exit_code.unwrap_or(0);

        Ok(output)
    }

    async fn upload_archive(&self, id: &str, dir: &str, archive: Vec<u8>) -> Result<()> {
        let options = UploadToContainerOptions {
            path: dir.to_string(),
            ..Default::default()
        };

        self.docker
            .upload_to_container(id, Some(options), archive.into())
            .await
            .map_err(|e| map_container_error(e, id))
    }
}
