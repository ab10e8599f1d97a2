//! Texture references bound into sampler uniforms.

use crate::device::{DeviceError, TextureHandle, TextureTarget};
use crate::renderer::Renderer;

/// A device texture plus the unit it is pinned to. This is a lightweight
/// reference, cloning it does not duplicate device storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Texture {
    pub handle: TextureHandle,
    pub target: TextureTarget,
    /// Pinned device texture unit. Ignored once the owning program switched
    /// to sequential unit assignment after a collision.
    pub unit: u32,
}

impl Texture {
    /// Allocate a device texture on unit 0.
    pub fn new(renderer: &mut Renderer, target: TextureTarget) -> Result<Self, DeviceError> {
        let handle = renderer.device_mut().create_texture()?;
        Ok(Self {
            handle,
            target,
            unit: 0,
        })
    }

    pub fn with_unit(mut self, unit: u32) -> Self {
        self.unit = unit;
        self
    }

    /// Release the device texture. Any copies of this reference are dangling
    /// afterwards.
    pub fn remove(self, renderer: &mut Renderer) {
        renderer.device_mut().delete_texture(self.handle);
    }
}
