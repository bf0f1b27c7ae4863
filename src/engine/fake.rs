//! In-memory engine used by unit tests

use super::{ContainerEngine, ContainerSpec, ExecOutput};
use crate::container::config::ContainerStatus;
use crate::error::{DbdockError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct FakeContainer {
    pub spec: ContainerSpec,
    pub status: ContainerStatus,
    pub logs: String,
}

#[derive(Default)]
struct State {
    images: HashSet<String>,
    /// Images the fake registry can serve
    pullable: HashSet<String>,
    containers: HashMap<String, FakeContainer>,
    next_id: u32,
    pulls: Vec<String>,
    uploads: Vec<(String, String, Vec<u8>)>,
    execs: Vec<(String, Vec<String>)>,
    log_reads: usize,
    exec_stdout: String,
    fail_start: bool,
    fail_remove: bool,
    /// Log text appended on every poll
    log_drip: Vec<String>,
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    state: Mutex<State>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an image pullable from the fake registry
    pub fn with_remote_image(self, image: &str) -> Self {
        self.state.lock().unwrap().pullable.insert(image.to_string());
        self
    }

    /// Make an image present locally
    pub fn with_local_image(self, image: &str) -> Self {
        self.state.lock().unwrap().images.insert(image.to_string());
        self
    }

    pub fn failing_start(self) -> Self {
        self.state.lock().unwrap().fail_start = true;
        self
    }

    pub fn failing_remove(self) -> Self {
        self.state.lock().unwrap().fail_remove = true;
        self
    }

    pub fn with_exec_stdout(self, stdout: &str) -> Self {
        self.state.lock().unwrap().exec_stdout = stdout.to_string();
        self
    }

    /// Queue log lines; one is appended each time logs are read
    pub fn with_log_drip(self, lines: &[&str]) -> Self {
        self.state.lock().unwrap().log_drip = lines.iter().rev().map(|l| l.to_string()).collect();
        self
    }

    pub fn container(&self, id: &str) -> Option<FakeContainer> {
        self.state.lock().unwrap().containers.get(id).cloned()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().unwrap().pulls.clone()
    }

    /// Commands run through `exec`, with the container they ran in
    pub fn execs(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().execs.clone()
    }

    pub fn log_reads(&self) -> usize {
        self.state.lock().unwrap().log_reads
    }

    pub fn uploads(&self) -> Vec<(String, String, Vec<u8>)> {
        self.state.lock().unwrap().uploads.clone()
    }
}

fn not_found(id: &str) -> DbdockError {
    DbdockError::ContainerNotFound(id.to_string())
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.pulls.push(image.to_string());
        if !state.pullable.contains(image) {
            return Err(DbdockError::ImageNotFound(image.to_string()));
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if !state.images.contains(&spec.image) {
            return Err(DbdockError::ImageNotFound(spec.image.clone()));
        }
        state.next_id += 1;
        let id = format!("fake{:08x}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                spec: spec.clone(),
                status: ContainerStatus::Created,
                logs: String::new(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let fail = state.fail_start;
        let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
        if fail {
            return Err(DbdockError::Engine(format!("{}: start refused", id)));
        }
        container.status = ContainerStatus::Running;
        Ok(())
    }

    async fn stop_container(&self, id: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
        container.status = ContainerStatus::Exited;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_remove {
            return Err(DbdockError::Engine(format!("{}: remove refused", id)));
        }
        let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
        if container.status == ContainerStatus::Running && !force {
            return Err(DbdockError::Container(format!("{} is running", id)));
        }
        state.containers.remove(id);
        Ok(())
    }

    async fn container_status(&self, id: &str) -> Result<ContainerStatus> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .get(id)
            .map(|c| c.status)
            .ok_or_else(|| not_found(id))
    }

    async fn container_exists(&self, id: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().containers.contains_key(id))
    }

    async fn container_logs(&self, id: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.log_reads += 1;
        let next = state.log_drip.pop();
        let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
        if let Some(line) = next {
            container.logs.push_str(&line);
            container.logs.push('\n');
        }
        Ok(container.logs.clone())
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput> {
        let mut state = self.state.lock().unwrap();
        let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
        if container.status != ContainerStatus::Running {
            return Err(DbdockError::ContainerNotRunning(id.to_string()));
        }
        state.execs.push((id.to_string(), cmd.to_vec()));
        Ok(ExecOutput {
            exit_code: 1,
            stdout: state.exec_stdout.clone(),
            stderr: "find: /proc/1/map_files: Permission denied\n".to_string(),
        })
    }

    async fn upload_archive(&self, id: &str, dir: &str, archive: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.containers.contains_key(id) {
            return Err(not_found(id));
        }
        state.uploads.push((id.to_string(), dir.to_string(), archive));
        Ok(())
    }
}
