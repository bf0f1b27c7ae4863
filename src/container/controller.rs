//! Container lifecycle controller
//!
//! Drives one container at a time through
//! `Unresolved -> ImagePresent -> Created -> Running <-> Stopped -> Removed`.
//! Every operation awaits the engine before returning, and every failure is
//! returned to the caller. Nothing is retried except the bounded log poll.

use super::archive;
use super::config::{ContainerStatus, ControllerSettings, RunOptions};
use crate::engine::{ContainerEngine, ContainerSpec, DockerEngine};
use crate::error::{require, DbdockError, Result};
use crate::image::ImageResolver;
use std::fmt;
use tracing::{debug, info, warn};

/// Engine-assigned container identifier returned by [`Controller::run`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, as `docker ps` shows them
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContainerHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Container lifecycle controller
pub struct Controller<E: ContainerEngine = DockerEngine> {
    engine: E,
    settings: ControllerSettings,
    http: reqwest::Client,
}

impl Controller<DockerEngine> {
    /// Connect to the local engine
    pub async fn connect(settings: ControllerSettings) -> Result<Self> {
        let engine = DockerEngine::connect().await?;
        Self::with_engine(engine, settings)
    }
}

impl<E: ContainerEngine> Controller<E> {
    /// Create a controller over an explicit engine
    pub fn with_engine(engine: E, settings: ControllerSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("dbdock/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DbdockError::Network(e.to_string()))?;

        Ok(Self {
            engine,
            settings,
            http,
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Make sure the image is present locally, pulling it if absent
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        ImageResolver::new(&self.engine).ensure(image).await?;
        Ok(())
    }

    /// Create and start a container
    ///
    /// If anything fails after the container has been created, the container
    /// is force-removed before the error is returned.
    pub async fn run(&self, options: &RunOptions) -> Result<ContainerHandle> {
        require(&options.image, "image reference")?;
        let binds = options.binds()?;

        let resolver = ImageResolver::new(&self.engine);
        let reference = if options.always_pull {
            resolver.pull(&options.image).await?
        } else {
            resolver.ensure(&options.image).await?
        };

        let spec = ContainerSpec {
            image: reference.to_string(),
            name: Some(options.container_name()),
            env: options.env.clone(),
            cmd: options.command.clone(),
            ports: options.ports(),
            binds,
        };

        let id = self.engine.create_container(&spec).await?;
        let handle = ContainerHandle(id);
        debug!("Created container {} from {}", handle.short(), reference);

        if let Err(err) = self.engine.start_container(handle.as_str()).await {
            self.discard(&handle).await;
            return Err(err);
        }

        info!(
            "Started container {} ({})",
            handle.short(),
            spec.name.as_deref().unwrap_or_default()
        );
        Ok(handle)
    }

    /// Best-effort forced removal of a container that failed to come up.
    /// Removal errors are logged, never returned.
    pub async fn discard(&self, handle: &ContainerHandle) {
        match self.engine.remove_container(handle.as_str(), true).await {
            Ok(()) => debug!("Removed failed container {}", handle.short()),
            Err(e) => warn!("Failed to remove container {}: {}", handle.short(), e),
        }
    }

    /// Pass `result` through, force-removing the container first if it is an error
    pub async fn discard_on_error<T>(
        &self,
        handle: &ContainerHandle,
        result: Result<T>,
    ) -> Result<T> {
        if result.is_err() {
            self.discard(handle).await;
        }
        result
    }

    /// Poll the container's logs until `text` shows up. The logs are read at
    /// least once.
    pub async fn wait_for_log_entry(&self, id: &str, text: &str) -> Result<()> {
        require(id, "container id")?;
        require(text, "log text")?;

        let attempts = self.settings.poll_attempts.max(1);
        for attempt in 1..=attempts {
            let logs = self.engine.container_logs(id).await?;
            if logs.contains(text) {
                debug!("Found '{}' in logs of {} after {} polls", text, id, attempt);
                return Ok(());
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        }

        Err(DbdockError::Timeout(format!(
            "'{}' did not appear in the logs of {} after {} polls",
            text, id, attempts
        )))
    }

    /// Current engine status
    pub async fn status(&self, id: &str) -> Result<ContainerStatus> {
        require(id, "container id")?;
        self.engine.container_status(id).await
    }

    /// Whether the container is running
    pub async fn is_running(&self, id: &str) -> Result<bool> {
        Ok(self.status(id).await?.is_running())
    }

    /// Whether the engine knows the container
    pub async fn exists(&self, id: &str) -> Result<bool> {
        require(id, "container id")?;
        self.engine.container_exists(id).await
    }

    /// Paths inside the container whose names match `pattern`
    /// (case-insensitive shell glob)
    pub async fn files(&self, id: &str, pattern: &str) -> Result<Vec<String>> {
        require(id, "container id")?;
        require(pattern, "file pattern")?;

        let cmd = ["find", "/", "-iname", pattern].map(String::from);
        let output = self.engine.exec(id, &cmd).await?;

        // find exits non-zero on unreadable directories
        if output.exit_code != 0 {
            debug!("find in {} exited with {}", id, output.exit_code);
        }

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Fetch `url` on the host and place it in directory `dest` inside the container
    pub async fn download_file(&self, id: &str, url: &str, dest: &str) -> Result<()> {
        require(id, "container id")?;
        require(url, "url")?;
        require(dest, "destination")?;

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| DbdockError::InvalidArgument(format!("url '{}': {}", url, e)))?;
        let target = archive::download_path(dest, &parsed)?;

        debug!("Downloading {}", parsed);
        let response = self
            .http
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| DbdockError::Network(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(DbdockError::Network(format!(
                "{}: {}",
                url,
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DbdockError::Network(format!("{}: {}", url, e)))?;

        let tarball = archive::single_file(&target, &body)?;
        self.engine.upload_archive(id, "/", tarball).await?;

        info!("Copied {} ({} bytes) to {}:/{}", url, body.len(), id, target);
        Ok(())
    }

    /// Stop a running container
    pub async fn stop(&self, id: &str) -> Result<()> {
        let status = self.status(id).await?;
        if !status.is_running() {
            return Err(DbdockError::ContainerNotRunning(id.to_string()));
        }

        self.engine
            .stop_container(id, self.settings.stop_timeout)
            .await?;
        info!("Stopped container {}", id);
        Ok(())
    }

    /// Start a stopped container
    pub async fn start(&self, id: &str) -> Result<()> {
        let status = self.status(id).await?;
        if status.is_running() {
            return Err(DbdockError::ContainerAlreadyRunning(id.to_string()));
        }

        self.engine.start_container(id).await?;
        info!("Started container {}", id);
        Ok(())
    }

    /// Remove a stopped container
    pub async fn remove(&self, id: &str) -> Result<()> {
        let status = self.status(id).await?;
        if status.is_running() {
            return Err(DbdockError::Container(format!(
                "Cannot remove running container {}; stop it first",
                id
            )));
        }

        self.engine.remove_container(id, false).await?;
        info!("Removed container {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::error::ErrorKind;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ALPINE: &str = "docker.io/library/alpine:latest";

    fn fast_settings() -> ControllerSettings {
        ControllerSettings {
            poll_interval: Duration::from_millis(1),
            poll_attempts: 5,
            stop_timeout: Duration::from_secs(1),
        }
    }

    fn controller(engine: FakeEngine) -> Controller<FakeEngine> {
        Controller::with_engine(engine, fast_settings()).unwrap()
    }

    fn hello_world() -> RunOptions {
        RunOptions::new(ALPINE).cmd(["ash", "-c", "echo 'Hello World'; sleep 1"])
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let c = controller(
            FakeEngine::new()
                .with_remote_image(ALPINE)
                .with_log_drip(&["starting", "Hello World"]),
        );

        c.ensure_image(ALPINE).await.unwrap();
        let id = c.run(&hello_world()).await.unwrap();
        let id = id.as_str();

        assert!(c.is_running(id).await.unwrap());
        c.wait_for_log_entry(id, "Hello World").await.unwrap();
        assert!(c.exists(id).await.unwrap());

        c.stop(id).await.unwrap();
        c.start(id).await.unwrap();
        c.stop(id).await.unwrap();
        c.remove(id).await.unwrap();

        assert!(!c.exists(id).await.unwrap());
        assert_eq!(c.engine().container_count(), 0);
    }

    #[tokio::test]
    async fn test_run_passes_spec_to_engine() {
        let c = controller(FakeEngine::new().with_local_image(ALPINE));
        let options = hello_world()
            .name("sql1")
            .env("ACCEPT_EULA", "Y")
            .port(14330, 1433)
            .mount("/tmp/data:/data");

        let id = c.run(&options).await.unwrap();
        let container = c.engine().container(id.as_str()).unwrap();
        assert_eq!(container.spec.name.as_deref(), Some("sql1"));
        assert_eq!(container.spec.env, vec!["ACCEPT_EULA=Y".to_string()]);
        assert_eq!(container.spec.ports[0].host_port, 14330);
        assert_eq!(container.spec.binds, vec!["/tmp/data:/data".to_string()]);
        assert!(c.engine().pulls().is_empty());
    }

    #[tokio::test]
    async fn test_run_always_pull() {
        let c = controller(
            FakeEngine::new()
                .with_local_image(ALPINE)
                .with_remote_image(ALPINE),
        );

        c.run(&hello_world().always_pull(true)).await.unwrap();
        assert_eq!(c.engine().pulls(), vec![ALPINE.to_string()]);
    }

    #[tokio::test]
    async fn test_run_missing_repository_produces_no_handle() {
        let c = controller(FakeEngine::new());
        let options = RunOptions::new("docker.io/does-not-exist:latest");

        let err = c.run(&options).await.unwrap_err();
        assert!(matches!(err, DbdockError::ImageNotFound(_)));
        assert_eq!(c.engine().container_count(), 0);
    }

    #[tokio::test]
    async fn test_run_rejects_empty_image() {
        let c = controller(FakeEngine::new());
        let err = c.run(&RunOptions::new("")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_start_failure_removes_container() {
        let c = controller(FakeEngine::new().with_local_image(ALPINE).failing_start());

        let err = c.run(&hello_world()).await.unwrap_err();
        assert!(matches!(err, DbdockError::Engine(_)));
        assert_eq!(c.engine().container_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_original_error() {
        let c = controller(
            FakeEngine::new()
                .with_local_image(ALPINE)
                .failing_start()
                .failing_remove(),
        );

        let err = c.run(&hello_world()).await.unwrap_err();
        assert!(err.to_string().contains("start refused"));
    }

    #[tokio::test]
    async fn test_wait_for_log_entry_times_out() {
        let c = controller(FakeEngine::new().with_local_image(ALPINE));
        let id = c.run(&hello_world()).await.unwrap();

        let err = c
            .wait_for_log_entry(id.as_str(), "never printed")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_wait_for_log_entry_polls_at_least_once() {
        let engine = FakeEngine::new()
            .with_local_image(ALPINE)
            .with_log_drip(&["Hello World"]);
        let settings = ControllerSettings {
            poll_interval: Duration::from_secs(60),
            poll_attempts: 0,
            stop_timeout: Duration::from_secs(1),
        };
        let c = Controller::with_engine(engine, settings).unwrap();
        let id = c.run(&hello_world()).await.unwrap();

        c.wait_for_log_entry(id.as_str(), "Hello World").await.unwrap();
        assert_eq!(c.engine().log_reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_log_entry_does_not_sleep_after_last_poll() {
        let engine = FakeEngine::new().with_local_image(ALPINE);
        let settings = ControllerSettings {
            poll_interval: Duration::from_secs(10),
            poll_attempts: 3,
            stop_timeout: Duration::from_secs(1),
        };
        let c = Controller::with_engine(engine, settings).unwrap();
        let id = c.run(&hello_world()).await.unwrap();

        let started = tokio::time::Instant::now();
        let err = c.wait_for_log_entry(id.as_str(), "never").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(c.engine().log_reads(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_discard_on_error_removes_container() {
        let c = controller(FakeEngine::new().with_local_image(ALPINE));
        let id = c.run(&hello_world()).await.unwrap();

        let ok = c.discard_on_error(&id, Ok(7)).await.unwrap();
        assert_eq!(ok, 7);
        assert_eq!(c.engine().container_count(), 1);

        let failed: Result<()> = Err(DbdockError::Timeout("not ready".to_string()));
        let err = c.discard_on_error(&id, failed).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(c.engine().container_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_id_is_rejected_everywhere() {
        let c = controller(FakeEngine::new());

        let results = [
            c.stop("").await,
            c.remove("").await,
            c.start("").await,
            c.files("", "").await.map(|_| ()),
            c.files("id", "").await.map(|_| ()),
            c.is_running("").await.map(|_| ()),
            c.exists("").await.map(|_| ()),
            c.wait_for_log_entry("", "x").await,
            c.download_file("", "", "").await,
            c.download_file("not_blank", "", "").await,
            c.download_file("not_blank", "not_blank", "").await,
        ];

        for result in results {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let c = controller(FakeEngine::new());
        assert!(matches!(
            c.stop("deadbeef").await.unwrap_err(),
            DbdockError::ContainerNotFound(_)
        ));
        assert!(matches!(
            c.is_running("deadbeef").await.unwrap_err(),
            DbdockError::ContainerNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_stop_twice_is_an_error() {
        let c = controller(FakeEngine::new().with_local_image(ALPINE));
        let id = c.run(&hello_world()).await.unwrap();

        c.stop(id.as_str()).await.unwrap();
        assert!(matches!(
            c.stop(id.as_str()).await.unwrap_err(),
            DbdockError::ContainerNotRunning(_)
        ));
    }

    #[tokio::test]
    async fn test_start_running_and_remove_running_are_errors() {
        let c = controller(FakeEngine::new().with_local_image(ALPINE));
        let id = c.run(&hello_world()).await.unwrap();

        assert!(matches!(
            c.start(id.as_str()).await.unwrap_err(),
            DbdockError::ContainerAlreadyRunning(_)
        ));
        assert!(matches!(
            c.remove(id.as_str()).await.unwrap_err(),
            DbdockError::Container(_)
        ));
    }

    #[tokio::test]
    async fn test_operations_after_remove_fail() {
        let c = controller(FakeEngine::new().with_local_image(ALPINE));
        let id = c.run(&hello_world()).await.unwrap();
        c.stop(id.as_str()).await.unwrap();
        c.remove(id.as_str()).await.unwrap();

        assert!(matches!(
            c.remove(id.as_str()).await.unwrap_err(),
            DbdockError::ContainerNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_files_lists_find_output() {
        let c = controller(
            FakeEngine::new()
                .with_local_image(ALPINE)
                .with_exec_stdout("/var/opt/mssql/data/master.mdf\n\n/var/opt/mssql/data/model.MDF\n"),
        );
        let id = c.run(&hello_world()).await.unwrap();

        let files = c.files(id.as_str(), "*.mdf").await.unwrap();
        assert_eq!(
            c.engine().execs(),
            vec![(
                id.to_string(),
                vec!["find", "/", "-iname", "*.mdf"]
                    .into_iter()
                    .map(String::from)
                    .collect::<Vec<_>>()
            )]
        );
        assert_eq!(
            files,
            vec![
                "/var/opt/mssql/data/master.mdf".to_string(),
                "/var/opt/mssql/data/model.MDF".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_download_file_uploads_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/backups/db.bak"))
            .respond_with(ResponseTemplate::new(200).set_body_string("test"))
            .mount(&server)
            .await;

        let c = controller(FakeEngine::new().with_local_image(ALPINE));
        let id = c.run(&hello_world()).await.unwrap();

        let url = format!("{}/backups/db.bak", server.uri());
        c.download_file(id.as_str(), &url, "/var/opt/backup")
            .await
            .unwrap();

        let uploads = c.engine().uploads();
        assert_eq!(uploads.len(), 1);
        let (target, dir, tarball) = &uploads[0];
        assert_eq!(target, id.as_str());
        assert_eq!(dir, "/");

        let mut reader = tar::Archive::new(tarball.as_slice());
        let entry = reader.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(
            entry.path().unwrap().to_str().unwrap(),
            "var/opt/backup/db.bak"
        );
        assert_eq!(entry.header().size().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_download_file_unreachable_url() {
        let c = controller(FakeEngine::new().with_local_image(ALPINE));
        let id = c.run(&hello_world()).await.unwrap();

        let err = c
            .download_file(id.as_str(), "http://127.0.0.1:1/missing", "test.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, DbdockError::Network(_)));
        assert!(c.engine().uploads().is_empty());
    }

    #[tokio::test]
    async fn test_download_file_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let c = controller(FakeEngine::new().with_local_image(ALPINE));
        let id = c.run(&hello_world()).await.unwrap();

        let err = c
            .download_file(id.as_str(), &server.uri(), "test.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, DbdockError::Network(_)));
    }

    #[test]
    fn test_handle_short() {
        let handle = ContainerHandle("0123456789abcdef".to_string());
        assert_eq!(handle.short(), "0123456789ab");
        assert_eq!(handle.to_string(), "0123456789abcdef");
    }
}
