//! Container management module
//!
//! Run, inspect, stop, start and remove a single database-server container
//! through a [`ContainerEngine`](crate::engine::ContainerEngine).

mod archive;
pub mod config;
pub mod controller;

pub use config::{
    parse_port_mapping, ContainerStatus, ControllerSettings, PortMapping, Protocol, RunOptions,
    DEFAULT_CONTAINER_PORT,
};
pub use controller::{ContainerHandle, Controller};
