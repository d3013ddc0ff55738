// SPDX-License-Identifier: CEPL-1.0
//! Window-system glue: `winit` for hosts, and the bridge from a winit window
//! to the device's [`ViewHandle`].
use anyhow::Result;
use shaderapi_device::{RenderSize, ViewHandle};
use tracing::debug;

pub use winit;

use winit::dpi::PhysicalSize;
use winit::window::Window;

pub fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize::new(size.width, size.height)
}

/// Raw handles plus the current client size of `window`.
pub fn view_from_window(window: &Window) -> Result<ViewHandle> {
    let size = render_size(window.inner_size());
    debug!("platform: view {}x{}", size.width, size.height);
    ViewHandle::from_window(window, size)
}
