//! User configuration
//!
//! The credential registry persisted at `~/.dbdock/config.yaml` and the
//! encoding of the passwords it stores.

pub mod registry;
pub mod secret;
pub mod user;

pub use registry::{default_config_path, ConfigDocument, CredentialRegistry, CONFIG_VERSION};
pub use user::{AuthenticationType, BasicAuthDetails, UserCredential};
