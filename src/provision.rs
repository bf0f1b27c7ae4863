//! Database server provisioning
//!
//! Pulls the server image, runs it with a generated `sa` password, waits for
//! the server to finish recovery and records the credential.

use crate::config::{secret, CredentialRegistry, UserCredential};
use crate::container::{ContainerHandle, Controller, RunOptions, DEFAULT_CONTAINER_PORT};
use crate::engine::ContainerEngine;
use crate::error::{DbdockError, Result};
use tracing::info;

/// Image provisioned when none is given
pub const DEFAULT_IMAGE: &str = "mcr.microsoft.com/mssql/server:2022-latest";
/// Log line the server prints once it accepts connections
pub const READY_LOG_LINE: &str = "Recovery is complete";
/// Administrator login created by the image
pub const ADMIN_LOGIN: &str = "sa";
/// Default host port
pub const DEFAULT_HOST_PORT: u16 = 1433;

const PASSWORD_LENGTH: usize = 16;

/// What to provision
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub image: String,
    pub host_port: u16,
    /// Container name; generated when empty
    pub container_name: String,
    /// Base name for the recorded credential
    pub user_name: String,
    /// The image's licence must be accepted explicitly
    pub accept_eula: bool,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            host_port: DEFAULT_HOST_PORT,
            container_name: String::new(),
            user_name: ADMIN_LOGIN.to_string(),
            accept_eula: false,
        }
    }
}

impl ProvisionOptions {
    /// Reject options that can never provision a server
    pub fn check(&self) -> Result<()> {
        if !self.accept_eula {
            return Err(DbdockError::InvalidArgument(
                "the server image licence must be accepted (--accept-eula)".to_string(),
            ));
        }
        Ok(())
    }
}

/// A running, ready server
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub container: ContainerHandle,
    /// Name the credential was recorded under
    pub user_name: String,
    pub host_port: u16,
}

/// Provision a server and record its credential in `registry`
pub async fn provision<E: ContainerEngine>(
    controller: &Controller<E>,
    registry: &mut CredentialRegistry,
    options: &ProvisionOptions,
) -> Result<Provisioned> {
    options.check()?;

    let user_name = registry.find_unique_user_name(&options.user_name)?;
    let password = secret::generate_password(PASSWORD_LENGTH)?;

    controller.ensure_image(&options.image).await?;

    let run = RunOptions::new(&options.image)
        .env("ACCEPT_EULA", "Y")
        .env("MSSQL_SA_PASSWORD", &password)
        .port(options.host_port, DEFAULT_CONTAINER_PORT)
        .name(&options.container_name);
    let container = controller.run(&run).await?;

    // The generated password is lost with any failure, so the server goes too
    let ready = async {
        info!("Waiting for {} to become ready", container.short());
        controller
            .wait_for_log_entry(container.as_str(), READY_LOG_LINE)
            .await?;

        let stored = secret::encode(&password, false)?;
        registry.add_user(UserCredential::basic(&user_name, ADMIN_LOGIN, &stored, false))
    }
    .await;
    controller.discard_on_error(&container, ready).await?;

    info!(
        "Server ready on port {}, credentials saved as '{}'",
        options.host_port, user_name
    );

    Ok(Provisioned {
        container,
        user_name,
        host_port: options.host_port,
    })
}
