// SPDX-License-Identifier: CEPL-1.0
//! A [`ShaderDevice`] that only writes down what it was asked to do.
//!
//! Hosts use it to test scene code without a GPU.
use std::collections::BTreeMap;

use crate::{
    AdapterInfo, IndexBufferHandle, Mesh, MatrixSource, RenderSize, ShaderDevice,
    ShaderDeviceInfo, ShaderHandle, ShaderStage, TransformBundle, Vertex, VertexBufferHandle,
    ViewHandle,
};

#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    Init,
    Shutdown,
    Draw { mesh: Mesh, transforms: TransformBundle },
    /// `meshes` is how many draws the flip carried.
    Present { meshes: usize },
    SetView(RenderSize),
    Resize(RenderSize),
    ClearColor([f32; 4]),
}

#[derive(Debug, Default)]
pub struct RecordingShaderDevice {
    pub calls: Vec<DeviceCall>,
    initialized: bool,
    pending: usize,
    size: RenderSize,
    next_handle: u32,
    vertex_buffers: BTreeMap<VertexBufferHandle, Vec<Vertex>>,
    index_buffers: BTreeMap<IndexBufferHandle, Vec<u16>>,
    shaders: BTreeMap<ShaderHandle, ShaderStage>,
}

impl RecordingShaderDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_draws(&self) -> usize {
        self.pending
    }

    pub fn presents(&self) -> impl Iterator<Item = usize> + '_ {
        self.calls.iter().filter_map(|c| match c {
            DeviceCall::Present { meshes } => Some(*meshes),
            _ => None,
        })
    }

    pub fn draws(&self) -> impl Iterator<Item = &Mesh> + '_ {
        self.calls.iter().filter_map(|c| match c {
            DeviceCall::Draw { mesh, .. } => Some(mesh),
            _ => None,
        })
    }

    pub fn vertex_buffer(&self, h: VertexBufferHandle) -> Option<&[Vertex]> {
        self.vertex_buffers.get(&h).map(Vec::as_slice)
    }

    pub fn index_buffer(&self, h: IndexBufferHandle) -> Option<&[u16]> {
        self.index_buffers.get(&h).map(Vec::as_slice)
    }

    pub fn live_resources(&self) -> usize {
        self.vertex_buffers.len() + self.index_buffers.len() + self.shaders.len()
    }

    fn handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl ShaderDevice for RecordingShaderDevice {
    fn init_device(&mut self, _adapter: &AdapterInfo, info: &ShaderDeviceInfo) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        self.size = info.view.size;
        self.calls.push(DeviceCall::Init);
    }

    fn shutdown_device(&mut self) {
        if !self.initialized {
            return;
        }
        self.initialized = false;
        self.pending = 0;
        self.calls.push(DeviceCall::Shutdown);
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn draw_mesh(&mut self, mesh: &Mesh, matrices: &dyn MatrixSource) {
        self.pending += 1;
        self.calls.push(DeviceCall::Draw {
            mesh: *mesh,
            transforms: matrices.transform_bundle(),
        });
    }

    fn present(&mut self) {
        let meshes = std::mem::take(&mut self.pending);
        self.calls.push(DeviceCall::Present { meshes });
    }

    fn set_view(&mut self, view: ViewHandle) {
        if self.pending > 0 {
            self.present();
        }
        self.size = view.size;
        self.calls.push(DeviceCall::SetView(view.size));
    }

    fn resize(&mut self, size: RenderSize) {
        self.size = size;
        self.calls.push(DeviceCall::Resize(size));
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.calls.push(DeviceCall::ClearColor(rgba));
    }

    fn back_buffer_size(&self) -> RenderSize {
        self.size
    }

    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> VertexBufferHandle {
        let h = VertexBufferHandle(self.handle());
        self.vertex_buffers.insert(h, vertices.to_vec());
        h
    }

    fn destroy_vertex_buffer(&mut self, buffer: VertexBufferHandle) {
        self.vertex_buffers.remove(&buffer);
    }

    fn create_index_buffer(&mut self, indices: &[u16]) -> IndexBufferHandle {
        let h = IndexBufferHandle(self.handle());
        self.index_buffers.insert(h, indices.to_vec());
        h
    }

    fn destroy_index_buffer(&mut self, buffer: IndexBufferHandle) {
        self.index_buffers.remove(&buffer);
    }

    fn create_shader(&mut self, stage: ShaderStage, _spirv: &[u8]) -> ShaderHandle {
        let h = ShaderHandle(self.handle());
        self.shaders.insert(h, stage);
        h
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader);
    }
}
