//! Persisted credential registry

use super::user::UserCredential;
use crate::error::{DbdockError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Current document version
pub const CONFIG_VERSION: u32 = 1;

/// On-disk document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub users: Vec<UserCredential>,
}

fn current_version() -> u32 {
    CONFIG_VERSION
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            users: Vec::new(),
        }
    }
}

/// Default config file location: `~/.dbdock/config.yaml`
pub fn default_config_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".dbdock").join("config.yaml"))
        .ok_or_else(|| DbdockError::InvalidConfig("cannot determine home directory".to_string()))
}

/// Named user credentials, saved to disk after every change
pub struct CredentialRegistry {
    /// Backing file; `None` keeps everything in memory
    path: Option<PathBuf>,
    document: ConfigDocument,
}

impl CredentialRegistry {
    /// Load the registry at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let document = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                ConfigDocument::default()
            } else {
                serde_yaml::from_str(&content).map_err(|e| {
                    DbdockError::Yaml(format!("Failed to parse {}: {}", path.display(), e))
                })?
            }
        } else {
            ConfigDocument::default()
        };

        if document.version > CONFIG_VERSION {
            return Err(DbdockError::InvalidConfig(format!(
                "{} has version {}, newest supported is {}",
                path.display(),
                document.version,
                CONFIG_VERSION
            )));
        }

        debug!(
            "Loaded {} user(s) from {}",
            document.users.len(),
            path.display()
        );

        Ok(Self {
            path: Some(path),
            document,
        })
    }

    /// Registry that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: ConfigDocument::default(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Add a user and save
    pub fn add_user(&mut self, user: UserCredential) -> Result<()> {
        user.validate()?;

        if self.user_exists(&user.name) {
            return Err(DbdockError::DuplicateUser(user.name));
        }

        debug!("Adding user {}", user.name);
        let mut candidate = self.document.clone();
        candidate.users.push(user);
        self.commit(candidate)
    }

    /// Look up a user by name
    pub fn get_user(&self, name: &str) -> Result<&UserCredential> {
        self.document
            .users
            .iter()
            .find(|u| u.name == name)
            .ok_or_else(|| DbdockError::UserNotFound(name.to_string()))
    }

    /// All users in insertion order
    pub fn users(&self) -> &[UserCredential] {
        &self.document.users
    }

    pub fn user_exists(&self, name: &str) -> bool {
        self.document.users.iter().any(|u| u.name == name)
    }

    /// Delete a user and save
    pub fn delete_user(&mut self, name: &str) -> Result<UserCredential> {
        let index = self
            .document
            .users
            .iter()
            .position(|u| u.name == name)
            .ok_or_else(|| DbdockError::UserNotFound(name.to_string()))?;

        let mut candidate = self.document.clone();
        let removed = candidate.users.remove(index);
        self.commit(candidate)?;
        Ok(removed)
    }

    /// `base` if unused, otherwise the first free `base2`, `base3`, ...
    pub fn find_unique_user_name(&self, base: &str) -> Result<String> {
        if base.trim().is_empty() {
            return Err(DbdockError::InvalidArgument(
                "user name must not be empty".to_string(),
            ));
        }

        if !self.user_exists(base) {
            return Ok(base.to_string());
        }

        let mut suffix = 2u32;
        loop {
            let candidate = format!("{}{}", base, suffix);
            if !self.user_exists(&candidate) {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }

    /// Persist `document` and adopt it only once it is on disk
    fn commit(&mut self, document: ConfigDocument) -> Result<()> {
        if let Some(path) = &self.path {
            save(path, &document)?;
        }
        self.document = document;
        Ok(())
    }
}

/// Write the whole document through a temp file and rename
fn save(path: &Path, document: &ConfigDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let content = serde_yaml::to_string(document)
        .map_err(|e| DbdockError::Yaml(format!("Failed to serialize config: {}", e)))?;

    let tmp = path.with_extension("yaml.tmp");
    match fs::remove_file(&tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    debug!("Saved {}", path.display());
    Ok(())
}
