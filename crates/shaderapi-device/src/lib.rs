// SPDX-License-Identifier: CEPL-1.0
//! Host-facing device interface.
//!
//! The engine talks to a graphics backend only through [`ShaderDevice`].
//! Backends abort the process on unrecoverable device errors, so the
//! per-frame entry points (`draw_mesh`, `present`) have nothing to return.
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};

mod info;
mod matrices;
mod mesh;
pub mod recording;

pub use info::{
    AdapterInfo, BatchLimits, CullMode, FrontFace, PresentPreference, ShaderDeviceInfo,
};
pub use matrices::{MatrixSource, MatrixStack};
pub use mesh::{
    IndexBufferHandle, Mesh, PrimitiveType, ShaderHandle, ShaderStage, Vertex, VertexBufferHandle,
};
pub use shaderapi_math::{RowMajor, TransformBundle};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Minimised windows report a zero-area client rect.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// The window a device presents into, plus its current client size.
///
/// Only raw handles are kept: the host owns the window and must keep it
/// alive until the view is replaced or the device is shut down.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewHandle {
    pub window: RawWindowHandle,
    pub display: RawDisplayHandle,
    pub size: RenderSize,
}

impl ViewHandle {
    pub fn from_window<W>(window: &W, size: RenderSize) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + ?Sized,
    {
        Ok(Self {
            window: window.window_handle()?.as_raw(),
            display: window.display_handle()?.as_raw(),
            size,
        })
    }

    pub fn with_size(self, size: RenderSize) -> Self {
        Self { size, ..self }
    }
}

pub trait ShaderDevice {
    /// One-time setup. Calling it on an initialized device is a no-op.
    fn init_device(&mut self, adapter: &AdapterInfo, info: &ShaderDeviceInfo);

    /// Waits for the GPU and releases everything. Safe to call repeatedly and
    /// before `init_device`.
    fn shutdown_device(&mut self);

    fn is_initialized(&self) -> bool;

    /// Queues `mesh` for the next `present`, snapshotting the transforms now.
    fn draw_mesh(&mut self, mesh: &Mesh, matrices: &dyn MatrixSource);

    /// Renders every queued mesh in one submission and flips.
    fn present(&mut self);

    /// Retargets the device to another window. Pending draws are presented
    /// into the old one first.
    fn set_view(&mut self, view: ViewHandle);

    /// Records a new client size; the swapchain follows on the next present.
    fn resize(&mut self, size: RenderSize);

    fn set_clear_color(&mut self, rgba: [f32; 4]);

    fn back_buffer_size(&self) -> RenderSize;

    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> VertexBufferHandle;
    fn destroy_vertex_buffer(&mut self, buffer: VertexBufferHandle);

    fn create_index_buffer(&mut self, indices: &[u16]) -> IndexBufferHandle;
    fn destroy_index_buffer(&mut self, buffer: IndexBufferHandle);

    fn create_shader(&mut self, stage: ShaderStage, spirv: &[u8]) -> ShaderHandle;
    fn destroy_shader(&mut self, shader: ShaderHandle);
}
