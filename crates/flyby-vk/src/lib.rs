// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: scene upload, per-image frame sync, swapchain presentation.

pub mod arena;
pub mod context;
pub mod depth;
pub mod descriptors;
pub mod error;
pub mod frame_sync;
pub mod memory;
pub mod mesh;
pub mod pipeline;
pub mod presenter;
pub mod recorder;
pub mod renderer;
pub mod swapchain;
pub mod texture;
pub mod uniform;
pub mod upload;

pub use error::{VkCallError, VkResultExt};
pub use renderer::{FrameOutcome, RendererConfig, VkRenderer};
pub use swapchain::VkVsyncMode;
pub use uniform::SceneUniform;

/// Drawable size in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    /// Minimised windows report zero; there is nothing to present to.
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
