//! Make sure an image is present before it is run

use super::reference::ImageReference;
use crate::engine::ContainerEngine;
use crate::error::Result;
use tracing::{debug, info};

/// Resolves image references against the engine's local image store
pub struct ImageResolver<'a, E: ContainerEngine + ?Sized> {
    engine: &'a E,
}

impl<'a, E: ContainerEngine + ?Sized> ImageResolver<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    /// Pull the image unless it is already present. A failed pull is not retried.
    pub async fn ensure(&self, image: &str) -> Result<ImageReference> {
        let reference = ImageReference::parse(image)?;
        let address = reference.to_string();

        if self.engine.image_exists(&address).await? {
            debug!("Image {} already present", address);
            return Ok(reference);
        }

        self.pull_reference(&reference).await?;
        Ok(reference)
    }

    /// Pull the image whether or not it is present
    pub async fn pull(&self, image: &str) -> Result<ImageReference> {
        let reference = ImageReference::parse(image)?;
        self.pull_reference(&reference).await?;
        Ok(reference)
    }

    async fn pull_reference(&self, reference: &ImageReference) -> Result<()> {
        info!("Pulling image {}", reference);
        self.engine.pull_image(&reference.to_string()).await?;
        info!("Pulled image {}", reference);
        Ok(())
    }
}
