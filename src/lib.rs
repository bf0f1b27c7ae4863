//! dbdock - local database-server containers for development
//!
//! dbdock drives a container engine (Docker) to provision and manage a
//! database-server container:
//!
//! - Image resolution and pulling
//! - Container lifecycle (run, wait for a log line, stop, start, remove)
//! - File search and download into a running container
//! - Registry tag listing
//! - A persisted registry of user credentials

pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod image;
pub mod provision;

pub use error::{DbdockError, ErrorKind, Result};
