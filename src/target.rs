//! Offscreen render targets.

use crate::device::{DeviceError, FramebufferHandle, TextureTarget};
use crate::renderer::Renderer;
use crate::texture::Texture;

/// A framebuffer with a 2D color texture attachment. Pass it to
/// [`crate::renderer::RenderOptions::target`] to render into the texture,
/// then feed [`RenderTarget::texture`] to a sampler uniform of a later pass.
pub struct RenderTarget {
    framebuffer: FramebufferHandle,
    texture: Texture,
    width: i32,
    height: i32,
}

impl RenderTarget {
    pub fn new(renderer: &mut Renderer, width: i32, height: i32) -> Result<Self, DeviceError> {
        let texture = Texture::new(renderer, TextureTarget::D2)?;
        renderer.bind_texture_unit(texture.unit, texture.target, texture.handle);
        renderer
            .device_mut()
            .tex_storage_2d(TextureTarget::D2, width, height);

        let framebuffer = renderer.device_mut().create_framebuffer()?;
        renderer.bind_framebuffer(Some(framebuffer));
        renderer.device_mut().framebuffer_texture_2d(texture.handle);
        renderer.bind_framebuffer(None);

        Ok(Self {
            framebuffer,
            texture,
            width,
            height,
        })
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    /// The color attachment, ready to be used as a sampler uniform value.
    pub fn texture(&self) -> Texture {
        self.texture
    }

    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// Release the framebuffer and its color attachment.
    pub fn remove(self, renderer: &mut Renderer) {
        renderer.device_mut().delete_framebuffer(self.framebuffer);
        self.texture.remove(renderer);
    }
}
