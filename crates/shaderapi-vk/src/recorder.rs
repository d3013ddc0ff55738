// SPDX-License-Identifier: CEPL-1.0
//! Per-present command recording.
//!
//! [`record_batch`] decides what goes into the command buffer; a
//! [`CommandEncoder`] decides how. `VkEncoder` writes real Vulkan commands,
//! tests use an encoder that only logs calls.
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use shaderapi_device::PrimitiveType;

use crate::batch::MeshDrawRecord;
use crate::context::DeviceContext;
use crate::pipeline::{flipped_viewport, PipelineSet, TopologyClass};

pub trait CommandEncoder {
    fn begin(&mut self) -> Result<()>;
    fn begin_render_pass(&mut self, clear: [f32; 4]);
    fn set_viewport_and_scissor(&mut self);
    fn bind_pipeline(&mut self, class: TopologyClass);
    /// Shared vertex buffer at binding 0 and the 16-bit index buffer.
    fn bind_geometry(&mut self);
    fn bind_transforms(&mut self, dynamic_offset: u32);
    fn set_topology(&mut self, topology: PrimitiveType);
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32);
    fn end_render_pass(&mut self);
    fn end(&mut self) -> Result<()>;
}

/// Records one frame: the render pass always runs (so the image is cleared
/// and transitioned), draws only if there are records.
pub fn record_batch<E: CommandEncoder + ?Sized>(
    enc: &mut E,
    records: &[MeshDrawRecord],
    stride: u32,
    clear: [f32; 4],
) -> Result<()> {
    enc.begin()?;
    enc.begin_render_pass(clear);
    enc.set_viewport_and_scissor();

    let mut bound = records
        .first()
        .map_or(TopologyClass::Triangle, |r| TopologyClass::of(r.topology));
    enc.bind_pipeline(bound);

    if !records.is_empty() {
        enc.bind_geometry();
        for (i, r) in records.iter().enumerate() {
            let class = TopologyClass::of(r.topology);
            if class != bound {
                enc.bind_pipeline(class);
                bound = class;
            }
            enc.bind_transforms(i as u32 * stride);
            enc.set_topology(r.topology);
            enc.draw_indexed(r.index_count, r.first_index, r.first_vertex as i32);
        }
    }

    enc.end_render_pass();
    enc.end()
}

/// Per-image primary command buffers from their own resettable pool.
pub struct CommandBuffers {
    device: Arc<DeviceContext>,
    pool: vk::CommandPool,
    pub raw: Vec<vk::CommandBuffer>,
}

impl CommandBuffers {
    pub fn new(device: Arc<DeviceContext>, count: usize) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            queue_family_index: device.queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("vkCreateCommandPool")?;
        let mut cbs = Self {
            device,
            pool,
            raw: Vec::new(),
        };
        let alloc_info = vk::CommandBufferAllocateInfo {
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        cbs.raw = unsafe { cbs.device.device.allocate_command_buffers(&alloc_info) }
            .context("vkAllocateCommandBuffers")?;
        Ok(cbs)
    }
}

impl Drop for CommandBuffers {
    fn drop(&mut self) {
        let d = &self.device.device;
        unsafe {
            if !self.raw.is_empty() {
                d.free_command_buffers(self.pool, &self.raw);
            }
            d.destroy_command_pool(self.pool, None);
        }
    }
}

/// Everything one image's command buffer refers to.
pub struct VkEncoder<'a> {
    pub device: &'a DeviceContext,
    pub cmd: vk::CommandBuffer,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipelines: &'a PipelineSet,
    pub transforms: vk::DescriptorSet,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
}

impl CommandEncoder for VkEncoder<'_> {
    fn begin(&mut self) -> Result<()> {
        let d = &self.device.device;
        unsafe {
            d.reset_command_buffer(self.cmd, vk::CommandBufferResetFlags::empty())
                .context("vkResetCommandBuffer")?;
            let begin = vk::CommandBufferBeginInfo {
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            d.begin_command_buffer(self.cmd, &begin)
                .context("vkBeginCommandBuffer")
        }
    }

    fn begin_render_pass(&mut self, clear: [f32; 4]) {
        let clear_value = vk::ClearValue {
            color: vk::ClearColorValue { float32: clear },
        };
        let info = vk::RenderPassBeginInfo {
            render_pass: self.render_pass,
            framebuffer: self.framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            },
            clear_value_count: 1,
            p_clear_values: &clear_value,
            ..Default::default()
        };
        unsafe {
            self.device
                .device
                .cmd_begin_render_pass(self.cmd, &info, vk::SubpassContents::INLINE)
        };
    }

    fn set_viewport_and_scissor(&mut self) {
        let vp = flipped_viewport(self.extent);
        let sc = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        };
        let d = &self.device.device;
        unsafe {
            d.cmd_set_viewport(self.cmd, 0, std::slice::from_ref(&vp));
            d.cmd_set_scissor(self.cmd, 0, std::slice::from_ref(&sc));
        }
    }

    fn bind_pipeline(&mut self, class: TopologyClass) {
        unsafe {
            self.device.device.cmd_bind_pipeline(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipelines.get(class),
            )
        };
    }

    fn bind_geometry(&mut self) {
        let d = &self.device.device;
        unsafe {
            d.cmd_bind_vertex_buffers(self.cmd, 0, &[self.vertex_buffer], &[0]);
            d.cmd_bind_index_buffer(self.cmd, self.index_buffer, 0, vk::IndexType::UINT16);
        }
    }

    fn bind_transforms(&mut self, dynamic_offset: u32) {
        unsafe {
            self.device.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipelines.layout,
                0,
                &[self.transforms],
                &[dynamic_offset],
            )
        };
    }

    fn set_topology(&mut self, topology: PrimitiveType) {
        self.device.set_primitive_topology(self.cmd, topology);
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) {
        unsafe {
            self.device
                .device
                .cmd_draw_indexed(self.cmd, index_count, 1, first_index, vertex_offset, 0)
        };
    }

    fn end_render_pass(&mut self) {
        unsafe { self.device.device.cmd_end_render_pass(self.cmd) };
    }

    fn end(&mut self) -> Result<()> {
        unsafe { self.device.device.end_command_buffer(self.cmd) }.context("vkEndCommandBuffer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaderapi_device::TransformBundle;

    #[derive(Debug, PartialEq)]
    enum Cmd {
        Begin,
        BeginPass([f32; 4]),
        Viewport,
        Pipeline(TopologyClass),
        Geometry,
        Transforms(u32),
        Topology(PrimitiveType),
        Draw(u32, u32, i32),
        EndPass,
        End,
    }

    #[derive(Default)]
    struct Log(Vec<Cmd>);

    impl CommandEncoder for Log {
        fn begin(&mut self) -> Result<()> {
            self.0.push(Cmd::Begin);
            Ok(())
        }
        fn begin_render_pass(&mut self, clear: [f32; 4]) {
            self.0.push(Cmd::BeginPass(clear));
        }
        fn set_viewport_and_scissor(&mut self) {
            self.0.push(Cmd::Viewport);
        }
        fn bind_pipeline(&mut self, class: TopologyClass) {
            self.0.push(Cmd::Pipeline(class));
        }
        fn bind_geometry(&mut self) {
            self.0.push(Cmd::Geometry);
        }
        fn bind_transforms(&mut self, dynamic_offset: u32) {
            self.0.push(Cmd::Transforms(dynamic_offset));
        }
        fn set_topology(&mut self, topology: PrimitiveType) {
            self.0.push(Cmd::Topology(topology));
        }
        fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) {
            self.0.push(Cmd::Draw(index_count, first_index, vertex_offset));
        }
        fn end_render_pass(&mut self) {
            self.0.push(Cmd::EndPass);
        }
        fn end(&mut self) -> Result<()> {
            self.0.push(Cmd::End);
            Ok(())
        }
    }

    fn rec(first_vertex: u32, first_index: u32, count: u32, t: PrimitiveType) -> MeshDrawRecord {
        MeshDrawRecord {
            vertex_count: count,
            index_count: count,
            first_vertex,
            first_index,
            topology: t,
            transforms: TransformBundle::IDENTITY,
        }
    }

    #[test]
    fn empty_batch_still_clears() {
        let mut log = Log::default();
        let clear = [0.1, 0.2, 0.3, 1.0];
        record_batch(&mut log, &[], 256, clear).unwrap();
        assert_eq!(
            log.0,
            [
                Cmd::Begin,
                Cmd::BeginPass(clear),
                Cmd::Viewport,
                Cmd::Pipeline(TopologyClass::Triangle),
                Cmd::EndPass,
                Cmd::End,
            ]
        );
    }

    #[test]
    fn draws_use_record_offsets_and_stride() {
        let mut log = Log::default();
        let records = [
            rec(0, 0, 3, PrimitiveType::Triangles),
            rec(3, 3, 6, PrimitiveType::TriangleStrip),
        ];
        record_batch(&mut log, &records, 256, [0.0; 4]).unwrap();
        assert_eq!(
            &log.0[3..],
            [
                Cmd::Pipeline(TopologyClass::Triangle),
                Cmd::Geometry,
                Cmd::Transforms(0),
                Cmd::Topology(PrimitiveType::Triangles),
                Cmd::Draw(3, 0, 0),
                Cmd::Transforms(256),
                Cmd::Topology(PrimitiveType::TriangleStrip),
                Cmd::Draw(6, 3, 3),
                Cmd::EndPass,
                Cmd::End,
            ]
        );
    }

    #[test]
    fn pipeline_switches_only_on_class_change() {
        let mut log = Log::default();
        let records = [
            rec(0, 0, 2, PrimitiveType::Lines),
            rec(2, 2, 3, PrimitiveType::LineStrip),
            rec(5, 5, 1, PrimitiveType::Points),
            rec(6, 6, 3, PrimitiveType::Triangles),
        ];
        record_batch(&mut log, &records, 64, [0.0; 4]).unwrap();
        let binds: Vec<&Cmd> = log
            .0
            .iter()
            .filter(|c| matches!(c, Cmd::Pipeline(_)))
            .collect();
        assert_eq!(
            binds,
            [
                &Cmd::Pipeline(TopologyClass::Line),
                &Cmd::Pipeline(TopologyClass::Point),
                &Cmd::Pipeline(TopologyClass::Triangle),
            ]
        );
        let draws = log.0.iter().filter(|c| matches!(c, Cmd::Draw(..))).count();
        assert_eq!(draws, 4);
    }
}
