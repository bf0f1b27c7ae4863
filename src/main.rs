//! dbdock - local database-server containers
//!
//! This is the main CLI entry point for dbdock.

use clap::{Parser, Subcommand};
use dbdock::config::{
    default_config_path, secret, AuthenticationType, CredentialRegistry, UserCredential,
};
use dbdock::container::{parse_port_mapping, Controller, ControllerSettings, RunOptions};
use dbdock::engine::DockerEngine;
use dbdock::error::{DbdockError, Result};
use dbdock::image::{ImageReference, RegistryClient};
use dbdock::provision::{self, ProvisionOptions, DEFAULT_HOST_PORT, DEFAULT_IMAGE};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// dbdock - local database-server containers
#[derive(Parser)]
#[command(name = "dbdock")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Provision and manage local database-server containers", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Config file (default: ~/.dbdock/config.yaml)
    #[arg(long, global = true, env = "DBDOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Delay between log polls, in milliseconds
    #[arg(long, global = true, default_value = "500")]
    poll_interval_ms: u64,

    /// Log polls before giving up
    #[arg(long, global = true, default_value = "240")]
    poll_attempts: u32,

    /// Seconds a container gets to shut down before it is killed
    #[arg(long, global = true, default_value = "10")]
    stop_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Make sure an image is present locally
    Pull {
        /// Image reference
        image: String,
        /// Pull even if the image is present
        #[arg(long)]
        always: bool,
    },

    /// Run a container
    Run {
        /// Image to run
        image: String,
        /// Container name
        #[arg(long)]
        name: Option<String>,
        /// Port mapping (host[:container])
        #[arg(short, long)]
        publish: Option<String>,
        /// Environment variable (KEY=VALUE)
        #[arg(short, long)]
        env: Vec<String>,
        /// Bind mount (host:container)
        #[arg(short, long)]
        volume: Option<String>,
        /// Pull even if the image is present
        #[arg(long)]
        always_pull: bool,
        /// Wait until this text appears in the logs
        #[arg(long)]
        wait_for: Option<String>,
        /// Command to run
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Wait until a log line appears
    WaitLog {
        /// Container ID
        container: String,
        /// Text to wait for
        text: String,
    },

    /// Show container status
    Status {
        /// Container ID
        container: String,
    },

    /// Find files in a container
    Files {
        /// Container ID
        container: String,
        /// Case-insensitive name pattern
        pattern: String,
    },

    /// Download a URL into a container
    Download {
        /// Container ID
        container: String,
        /// URL to fetch
        url: String,
        /// Directory inside the container
        dest: String,
    },

    /// Stop a container
    Stop {
        /// Container ID
        container: String,
    },

    /// Start a container
    Start {
        /// Container ID
        container: String,
    },

    /// Remove a container
    #[command(name = "rm")]
    Remove {
        /// Container ID
        container: String,
    },

    /// List tags of a repository
    Tags {
        /// Repository, optionally prefixed by its registry
        repository: String,
        /// Registry URL
        #[arg(long)]
        registry: Option<String>,
    },

    /// Manage stored credentials
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Provision a database server and record its credentials
    Up {
        /// Server image
        #[arg(long, default_value = DEFAULT_IMAGE)]
        image: String,
        /// Host port
        #[arg(short, long, default_value_t = DEFAULT_HOST_PORT)]
        port: u16,
        /// Container name
        #[arg(long)]
        name: Option<String>,
        /// Name to store the credentials under
        #[arg(long, default_value = provision::ADMIN_LOGIN)]
        user_name: String,
        /// Accept the server image's licence terms
        #[arg(long)]
        accept_eula: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a user
    Add {
        /// Credential name
        name: String,
        /// Login for basic authentication; omit for other authentication
        #[arg(short, long)]
        username: Option<String>,
        /// Password for basic authentication
        #[arg(long, env = "DBDOCK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Encrypt the stored password
        #[arg(long)]
        encrypt: bool,
    },

    /// Show a user
    Get {
        /// Credential name
        name: String,
        /// Print the decoded password
        #[arg(long)]
        show_password: bool,
    },

    /// List users
    #[command(name = "ls")]
    List,

    /// Remove a user
    #[command(name = "rm")]
    Remove {
        /// Credential name
        name: String,
    },
}

impl Cli {
    fn settings(&self) -> ControllerSettings {
        ControllerSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_attempts: self.poll_attempts,
            stop_timeout: Duration::from_secs(self.stop_timeout),
        }
    }

    fn registry(&self) -> Result<CredentialRegistry> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };
        CredentialRegistry::open(path)
    }

    async fn controller(&self) -> Result<Controller<DockerEngine>> {
        Controller::<DockerEngine>::connect(self.settings()).await
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match execute(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn execute(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Pull { image, always } => {
            let controller = cli.controller().await?;
            if *always {
                dbdock::image::ImageResolver::new(controller.engine())
                    .pull(image)
                    .await?;
            } else {
                controller.ensure_image(image).await?;
            }
            println!("{}", ImageReference::parse(image)?);
        }

        Commands::Run {
            image,
            name,
            publish,
            env,
            volume,
            always_pull,
            wait_for,
            command,
        } => {
            let mut options = RunOptions::new(image).always_pull(*always_pull);

            for e in env {
                let (key, value) = e.split_once('=').ok_or_else(|| {
                    DbdockError::InvalidArgument(format!("environment '{}' must be KEY=VALUE", e))
                })?;
                options = options.env(key, value);
            }
            if let Some(publish) = publish {
                let (host, container) = parse_port_mapping(publish)?;
                options = options.port(host, container);
            }
            if let Some(name) = name {
                options = options.name(name);
            }
            if let Some(volume) = volume {
                options = options.mount(volume);
            }
            if !command.is_empty() {
                options = options.cmd(command.iter().cloned());
            }

            let controller = cli.controller().await?;
            let id = controller.run(&options).await?;

            if let Some(text) = wait_for {
                let ready = controller.wait_for_log_entry(id.as_str(), text).await;
                controller.discard_on_error(&id, ready).await?;
            }
            println!("{}", id);
        }

        Commands::WaitLog { container, text } => {
            cli.controller()
                .await?
                .wait_for_log_entry(container, text)
                .await?;
        }

        Commands::Status { container } => {
            let controller = cli.controller().await?;
            if !controller.exists(container).await? {
                return Err(DbdockError::ContainerNotFound(container.clone()));
            }
            println!("{}", controller.status(container).await?);
        }

        Commands::Files { container, pattern } => {
            let files = cli.controller().await?.files(container, pattern).await?;
            for file in files {
                println!("{}", file);
            }
        }

        Commands::Download {
            container,
            url,
            dest,
        } => {
            cli.controller()
                .await?
                .download_file(container, url, dest)
                .await?;
        }

        Commands::Stop { container } => {
            cli.controller().await?.stop(container).await?;
            println!("{}", container);
        }

        Commands::Start { container } => {
            cli.controller().await?.start(container).await?;
            println!("{}", container);
        }

        Commands::Remove { container } => {
            cli.controller().await?.remove(container).await?;
            println!("{}", container);
        }

        Commands::Tags {
            repository,
            registry,
        } => {
            // Tag listing is informational; failures don't fail the command
            match list_tags(repository, registry.as_deref()).await {
                Ok(tags) => {
                    for tag in tags {
                        println!("{}", tag);
                    }
                }
                Err(e) => warn!("Could not list tags for {}: {}", repository, e),
            }
        }

        Commands::User { action } => user_command(cli, action)?,

        Commands::Up {
            image,
            port,
            name,
            user_name,
            accept_eula,
        } => {
            let options = ProvisionOptions {
                image: image.clone(),
                host_port: *port,
                container_name: name.clone().unwrap_or_default(),
                user_name: user_name.clone(),
                accept_eula: *accept_eula,
            };

            // Check the options and config before touching the engine
            options.check()?;
            let mut registry = cli.registry()?;

            let controller = cli.controller().await?;
            let provisioned = provision::provision(&controller, &mut registry, &options).await?;

            println!("Container:   {}", provisioned.container);
            println!("Port:        {}", provisioned.host_port);
            println!("Credentials: {}", provisioned.user_name);
        }
    }

    Ok(())
}

async fn list_tags(repository: &str, registry: Option<&str>) -> Result<Vec<String>> {
    match registry {
        Some(url) => RegistryClient::new(url)?.list_tags(repository).await,
        None => {
            let reference = ImageReference::parse(repository)?;
            RegistryClient::new(&reference.registry_url())?
                .list_tags(reference.repository())
                .await
        }
    }
}

fn user_command(cli: &Cli, action: &UserCommands) -> Result<()> {
    let mut registry = cli.registry()?;

    match action {
        UserCommands::Add {
            name,
            username,
            password,
            encrypt,
        } => {
            let user = match username {
                Some(username) => {
                    let stored = secret::encode(password.as_deref().unwrap_or_default(), *encrypt)?;
                    UserCredential::basic(name, username, &stored, *encrypt)
                }
                None => UserCredential {
                    name: name.clone(),
                    authentication_type: AuthenticationType::Other,
                    basic_auth: None,
                },
            };
            registry.add_user(user)?;
            println!("{}", name);
        }

        UserCommands::Get {
            name,
            show_password,
        } => {
            let user = registry.get_user(name)?;
            println!("name: {}", user.name);
            println!("authentication: {}", user.authentication_type);
            if let Some(details) = &user.basic_auth {
                println!("username: {}", details.username);
                if *show_password {
                    let password = secret::decode(&details.password, details.password_encrypted)?;
                    println!("password: {}", password);
                }
            }
        }

        UserCommands::List => {
            println!("{:<20} {:<10} {:<20}", "NAME", "AUTH", "USERNAME");
            for user in registry.users() {
                let username = user
                    .basic_auth
                    .as_ref()
                    .map(|d| d.username.as_str())
                    .unwrap_or("-");
                println!(
                    "{:<20} {:<10} {:<20}",
                    user.name,
                    user.authentication_type.to_string(),
                    username
                );
            }
        }

        UserCommands::Remove { name } => {
            registry.delete_user(name)?;
            println!("{}", name);
        }
    }

    Ok(())
}
