//! Image management module
//!
//! Image references, pulling images that are not present locally, and
//! read-only registry queries.

pub mod reference;
pub mod registry;
pub mod resolver;

pub use reference::ImageReference;
pub use registry::RegistryClient;
pub use resolver::ImageResolver;
