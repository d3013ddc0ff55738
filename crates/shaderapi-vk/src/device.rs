// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use shaderapi_core::{fatal, OrFatal};
use shaderapi_device::{
    AdapterInfo, IndexBufferHandle, MatrixSource, Mesh, RenderSize, ShaderDevice,
    ShaderDeviceInfo, ShaderHandle, ShaderStage, Vertex, VertexBufferHandle, ViewHandle,
};
use tracing::{debug, info, warn};

use crate::batch::{DrawBatch, MeshDrawRecord, INDEX_SIZE};
use crate::buffers::{copy_buffers, CopyOp, GpuBuffer};
use crate::config::DeviceSettings;
use crate::context::DeviceContext;
use crate::epoch::{EpochParams, SwapchainEpoch};
use crate::error::{BatchError, DeviceError};
use crate::instance::InstanceContext;
use crate::pipeline::ShaderModule;
use crate::present::{AcquireOutcome, FrameBackend, FrameOutcome, PresentLoop, PresentResult};
use crate::recorder::{record_batch, VkEncoder};
use crate::resources::{HostBuffer, Resources, ShaderEntry};
use crate::shaders::{decode_spirv, default_loader, ShaderBinaries};
use crate::surface::OwnedSurface;
use crate::sync::FrameRing;
use crate::uniforms::TransformSetLayout;

/// Vulkan implementation of [`ShaderDevice`].
///
/// Unrecoverable device errors abort the process through
/// [`shaderapi_core::fatal`]; rejected draws are logged and skipped.
#[derive(Default)]
pub struct VkShaderDevice {
    state: Option<DeviceState>,
    clear_color: [f32; 4],
}

struct DeviceState {
    present: PresentLoop,
    batch: DrawBatch,
    gpu: GpuState,
}

/// Fields drop top to bottom, the reverse of creation: per-swapchain objects
/// first, the device and the instance last.
struct GpuState {
    view: ViewHandle,
    settings: DeviceSettings,
    epoch: Option<SwapchainEpoch>,
    resources: Resources,
    index_batch: GpuBuffer,
    vertex_batch: GpuBuffer,
    set_layout: TransformSetLayout,
    frames: FrameRing,
    shaders: ShaderBinaries,
    device: Arc<DeviceContext>,
    surface: Option<OwnedSurface>,
    instance: Arc<InstanceContext>,
}

impl GpuState {
    fn new(adapter: &AdapterInfo, info: &ShaderDeviceInfo) -> Result<Self> {
        let settings = DeviceSettings::from_env(info);
        let shaders = ShaderBinaries::load(default_loader(&settings.shader_root).as_ref())?;

        let view = info.view;
        let instance = Arc::new(InstanceContext::new(view.display, settings.validation)?);
        let surface = OwnedSurface::new(instance.clone(), &view)?;
        let device = Arc::new(DeviceContext::new(
            instance.clone(),
            adapter.ordinal,
            surface.raw,
        )?);

        let frames = FrameRing::new(device.clone())?;
        let set_layout = TransformSetLayout::new(device.clone())?;
        let limits = settings.limits;
        let vertex_batch = GpuBuffer::new(
            device.clone(),
            (limits.max_vertices as vk::DeviceSize * Vertex::SIZE as vk::DeviceSize).max(4),
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .context("batched vertex buffer")?;
        let index_batch = GpuBuffer::new(
            device.clone(),
            (limits.max_indices as vk::DeviceSize * INDEX_SIZE).max(4),
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .context("batched index buffer")?;

        let mut gpu = Self {
            view,
            settings,
            epoch: None,
            frames,
            resources: Resources::default(),
            vertex_batch,
            index_batch,
            set_layout,
            shaders,
            device,
            surface: Some(surface),
            instance,
        };
        if !view.size.is_empty() {
            gpu.build_epoch()?;
        }
        Ok(gpu)
    }

    fn build_epoch(&mut self) -> Result<()> {
        let surface = self.surface.as_ref().context("no surface")?;
        let params = EpochParams {
            size: self.view.size,
            present: self.settings.present,
            raster: self.settings.raster,
            set_layout: &self.set_layout,
            shaders: &self.shaders,
            max_meshes: self.settings.limits.max_meshes,
        };
        self.epoch = Some(SwapchainEpoch::new(&self.device, surface, &params)?);
        Ok(())
    }

    /// Tears down the epoch and the surface, then rebuilds both for the
    /// current view. A zero-area view ends up with a surface but no epoch.
    fn recreate(&mut self) -> Result<()> {
        self.device.wait_idle()?;
        self.epoch = None;
        self.surface = None;

        let surface = OwnedSurface::new(self.instance.clone(), &self.view)?;
        let queue_family = self.device.queue_family;
        if !surface.supports_queue(self.device.phys, queue_family)? {
            return Err(DeviceError::UnsupportedSurface { queue_family }.into());
        }
        self.surface = Some(surface);

        if self.view.size.is_empty() {
            debug!("vk: view has no area, swapchain deferred");
            return Ok(());
        }
        self.build_epoch()?;
        info!(
            "vk: swapchain recreated for {}x{}",
            self.view.size.width, self.view.size.height
        );
        Ok(())
    }

    fn epoch(&self) -> Result<&SwapchainEpoch> {
        self.epoch.as_ref().context("no swapchain")
    }
}

impl Drop for GpuState {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("vk: wait idle on shutdown: {e:#}");
        }
    }
}

impl DeviceState {
    /// Validates `mesh` against its source buffers and the batch limits, then
    /// copies its data to the current fill offsets.
    fn queue_mesh(&mut self, mesh: &Mesh, matrices: &dyn MatrixSource) -> Result<()> {
        let gpu = &self.gpu;
        let vb = gpu
            .resources
            .vertex_buffer(mesh.vertex_buffer)
            .ok_or(BatchError::UnknownVertexBuffer(mesh.vertex_buffer))?;
        let ib = gpu
            .resources
            .index_buffer(mesh.index_buffer)
            .ok_or(BatchError::UnknownIndexBuffer(mesh.index_buffer))?;
        for (requested, available) in [(mesh.vertex_count, vb.len), (mesh.index_count, ib.len)] {
            if requested > available {
                return Err(BatchError::MeshExceedsBuffer {
                    requested,
                    available,
                }
                .into());
            }
        }

        let first_in_batch = self.batch.is_empty();
        let rec = self.batch.push(
            mesh.vertex_count,
            mesh.index_count,
            mesh.primitive,
            matrices.transform_bundle(),
        )?;
        // The last submitted frame may still be reading the batch buffers.
        if first_in_batch {
            gpu.device.wait_idle()?;
        }

        copy_buffers(
            &gpu.device,
            &[
                CopyOp {
                    src: vb.buffer.raw,
                    dst: gpu.vertex_batch.raw,
                    region: vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: rec.vertex_byte_offset(),
                        size: rec.vertex_count as vk::DeviceSize * Vertex::SIZE as vk::DeviceSize,
                    },
                },
                CopyOp {
                    src: ib.buffer.raw,
                    dst: gpu.index_batch.raw,
                    region: vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: rec.index_byte_offset(),
                        size: rec.index_count as vk::DeviceSize * INDEX_SIZE,
                    },
                },
            ],
        )
    }

    /// Presents the queued batch. The batch is empty afterwards on every
    /// path, including errors.
    fn present_frame(&mut self, clear: [f32; 4]) -> Result<FrameOutcome> {
        let mut target = FrameTarget {
            gpu: &mut self.gpu,
            clear,
        };
        self.present.present_batch(&mut target, &mut self.batch)
    }
}

/// One `present` worth of GPU work for the loop to drive.
struct FrameTarget<'a> {
    gpu: &'a mut GpuState,
    clear: [f32; 4],
}

impl FrameBackend for FrameTarget<'_> {
    fn target_is_empty(&self) -> bool {
        self.gpu.view.size.is_empty()
    }

    fn has_swapchain(&self) -> bool {
        self.gpu.epoch.is_some()
    }

    fn recreate(&mut self) -> Result<()> {
        self.gpu.recreate()
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.gpu.frames.get(slot).wait()
    }

    fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let epoch = self.gpu.epoch()?;
        let sync = self.gpu.frames.get(slot);
        let res = unsafe {
            self.gpu.device.swapchain_fn.acquire_next_image(
                epoch.swapchain.raw,
                u64::MAX,
                sync.image_available,
                vk::Fence::null(),
            )
        };
        match res {
            Ok((image, suboptimal)) => Ok(AcquireOutcome::Acquired { image, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e).context("vkAcquireNextImageKHR"),
        }
    }

    fn prepare_image(&mut self, slot: usize, image: u32) -> Result<()> {
        let fence = self.gpu.frames.get(slot).in_flight;
        let device = self.gpu.device.clone();
        let epoch = self.gpu.epoch.as_mut().context("no swapchain")?;
        let prev = &mut epoch.images_in_flight[image as usize];
        if *prev != vk::Fence::null() && *prev != fence {
            unsafe { device.device.wait_for_fences(&[*prev], true, u64::MAX) }
                .context("vkWaitForFences(image)")?;
        }
        *prev = fence;
        Ok(())
    }

    fn write_uniforms(&mut self, image: u32, records: &[MeshDrawRecord]) -> Result<()> {
        self.gpu.epoch()?.uniforms.write(image as usize, records)?;
        Ok(())
    }

    fn record(&mut self, image: u32, records: &[MeshDrawRecord]) -> Result<()> {
        let gpu = &*self.gpu;
        let epoch = gpu.epoch()?;
        let i = image as usize;
        let mut enc = VkEncoder {
            device: &gpu.device,
            cmd: epoch.commands.raw[i],
            render_pass: epoch.render_pass.raw,
            framebuffer: epoch.framebuffers.raw[i],
            extent: epoch.extent(),
            pipelines: &epoch.pipelines,
            transforms: epoch.uniforms.sets[i],
            vertex_buffer: gpu.vertex_batch.raw,
            index_buffer: gpu.index_batch.raw,
        };
        record_batch(
            &mut enc,
            records,
            epoch.uniforms.stride as u32,
            self.clear,
        )
    }

    fn submit(&mut self, slot: usize, image: u32) -> Result<()> {
        let epoch = self.gpu.epoch()?;
        let sync = self.gpu.frames.get(slot);
        sync.reset()?;

        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let cmd = epoch.commands.raw[image as usize];
        let si = vk::SubmitInfo {
            wait_semaphore_count: 1,
            p_wait_semaphores: &sync.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &sync.render_finished,
            ..Default::default()
        };
        let d = &self.gpu.device;
        unsafe { d.device.queue_submit(d.queue, std::slice::from_ref(&si), sync.in_flight) }
            .context("vkQueueSubmit")
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<PresentResult> {
        let epoch = self.gpu.epoch()?;
        let sync = self.gpu.frames.get(slot);
        let info = vk::PresentInfoKHR {
            wait_semaphore_count: 1,
            p_wait_semaphores: &sync.render_finished,
            swapchain_count: 1,
            p_swapchains: &epoch.swapchain.raw,
            p_image_indices: &image,
            ..Default::default()
        };
        let d = &self.gpu.device;
        match unsafe { d.swapchain_fn.queue_present(d.queue, &info) } {
            Ok(false) => Ok(PresentResult::Ok),
            Ok(true) => Ok(PresentResult::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::OutOfDate),
            Err(e) => Err(e).context("vkQueuePresentKHR"),
        }
    }
}

impl VkShaderDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format of the current swapchain images, if there is one.
    pub fn back_buffer_format(&self) -> Option<vk::Format> {
        let epoch = self.state.as_ref()?.gpu.epoch.as_ref()?;
        Some(epoch.swapchain.format.format)
    }

    fn state_or_fatal(&mut self, what: &str) -> &mut DeviceState {
        match self.state.as_mut() {
            Some(s) => s,
            None => fatal(what, &DeviceError::NotInitialized.into()),
        }
    }
}

impl ShaderDevice for VkShaderDevice {
    fn init_device(&mut self, adapter: &AdapterInfo, info: &ShaderDeviceInfo) {
        if self.state.is_some() {
            warn!("vk: init_device on an initialized device ignored");
            return;
        }
        let gpu = GpuState::new(adapter, info).or_fatal("init_device");
        self.clear_color = info.clear_color;
        self.state = Some(DeviceState {
            present: PresentLoop::new(),
            batch: DrawBatch::new(gpu.settings.limits),
            gpu,
        });
        info!("vk: device initialized");
    }

    fn shutdown_device(&mut self) {
        if let Some(state) = self.state.take() {
            drop(state);
            info!("vk: device shut down");
        }
    }

    fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    fn draw_mesh(&mut self, mesh: &Mesh, matrices: &dyn MatrixSource) {
        let Some(state) = self.state.as_mut() else {
            warn!("vk: draw_mesh before init_device ignored");
            return;
        };
        if let Err(e) = state.queue_mesh(mesh, matrices) {
            match e.downcast_ref::<BatchError>() {
                Some(rejected) => warn!("vk: mesh skipped: {rejected}"),
                None => fatal("draw_mesh", &e),
            }
        }
    }

    fn present(&mut self) {
        let clear = self.clear_color;
        let Some(state) = self.state.as_mut() else {
            return;
        };
        match state.present_frame(clear) {
            Ok(outcome) => debug!("vk: present {outcome:?}"),
            Err(e) => fatal("present", &e),
        }
    }

    fn set_view(&mut self, view: ViewHandle) {
        if self.state.is_none() {
            warn!("vk: set_view before init_device ignored");
            return;
        }
        if self.state.as_ref().is_some_and(|s| !s.batch.is_empty()) {
            self.present();
        }
        let state = self.state_or_fatal("set_view");
        state.gpu.view = view;
        state.gpu.recreate().or_fatal("set_view");
        state.present.clear_resize();
    }

    fn resize(&mut self, size: RenderSize) {
        let Some(state) = self.state.as_mut() else {
            debug!("vk: resize before init_device ignored");
            return;
        };
        state.gpu.view.size = size;
        state.present.request_resize();
        debug!("vk: resize to {}x{} pending", size.width, size.height);
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    fn back_buffer_size(&self) -> RenderSize {
        let Some(state) = self.state.as_ref() else {
            return RenderSize::default();
        };
        match &state.gpu.epoch {
            Some(e) => RenderSize::new(e.extent().width, e.extent().height),
            None => state.gpu.view.size,
        }
    }

    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> VertexBufferHandle {
        let gpu = &mut self.state_or_fatal("create_vertex_buffer").gpu;
        let buffer = GpuBuffer::staging(gpu.device.clone(), bytemuck::cast_slice(vertices))
            .or_fatal("create_vertex_buffer");
        VertexBufferHandle(gpu.resources.vertex.insert(HostBuffer {
            buffer,
            len: vertices.len() as u32,
        }))
    }

    fn destroy_vertex_buffer(&mut self, buffer: VertexBufferHandle) {
        let removed = self
            .state
            .as_mut()
            .and_then(|s| s.gpu.resources.vertex.remove(buffer.0));
        if removed.is_none() {
            warn!("vk: destroy of unknown vertex buffer {buffer:?}");
        }
    }

    fn create_index_buffer(&mut self, indices: &[u16]) -> IndexBufferHandle {
        let gpu = &mut self.state_or_fatal("create_index_buffer").gpu;
        let buffer = GpuBuffer::staging(gpu.device.clone(), bytemuck::cast_slice(indices))
            .or_fatal("create_index_buffer");
        IndexBufferHandle(gpu.resources.index.insert(HostBuffer {
            buffer,
            len: indices.len() as u32,
        }))
    }

    fn destroy_index_buffer(&mut self, buffer: IndexBufferHandle) {
        let removed = self
            .state
            .as_mut()
            .and_then(|s| s.gpu.resources.index.remove(buffer.0));
        if removed.is_none() {
            warn!("vk: destroy of unknown index buffer {buffer:?}");
        }
    }

    fn create_shader(&mut self, stage: ShaderStage, spirv: &[u8]) -> ShaderHandle {
        let gpu = &mut self.state_or_fatal("create_shader").gpu;
        let module = decode_spirv(spirv, &format!("{stage:?} shader"))
            .and_then(|words| ShaderModule::new(gpu.device.clone(), &words))
            .or_fatal("create_shader");
        ShaderHandle(gpu.resources.shaders.insert(ShaderEntry { stage, module }))
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        let removed = self
            .state
            .as_mut()
            .and_then(|s| s.gpu.resources.shaders.remove(shader.0));
        match removed {
            Some(entry) => debug!("vk: {:?} shader {} destroyed", entry.stage, shader.0),
            None => warn!("vk: destroy of unknown shader {shader:?}"),
        }
    }
}

impl Drop for VkShaderDevice {
    fn drop(&mut self) {
        self.shutdown_device();
    }
}
