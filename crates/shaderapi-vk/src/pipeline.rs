// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use ash::vk;
use shaderapi_device::{CullMode, FrontFace, PrimitiveType, Vertex};
use tracing::{debug, warn};

use crate::context::DeviceContext;
use crate::shaders::ShaderBinaries;

pub fn vk_topology(p: PrimitiveType) -> vk::PrimitiveTopology {
    match p {
        PrimitiveType::Points => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveType::Lines => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveType::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveType::Triangles => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveType::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

/// Dynamic topology may only change within the class baked into the
/// pipeline, so there is one pipeline per class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopologyClass {
    Point,
    Line,
    Triangle,
}

impl TopologyClass {
    pub const ALL: [TopologyClass; 3] = [Self::Point, Self::Line, Self::Triangle];

    pub fn of(p: PrimitiveType) -> Self {
        match p {
            PrimitiveType::Points => Self::Point,
            PrimitiveType::Lines | PrimitiveType::LineStrip => Self::Line,
            PrimitiveType::Triangles | PrimitiveType::TriangleStrip => Self::Triangle,
        }
    }

    /// Topology baked into the pipeline; the recorder overrides it per draw.
    fn baked(self) -> vk::PrimitiveTopology {
        match self {
            Self::Point => vk::PrimitiveTopology::POINT_LIST,
            Self::Line => vk::PrimitiveTopology::LINE_LIST,
            Self::Triangle => vk::PrimitiveTopology::TRIANGLE_LIST,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterState {
    pub cull: CullMode,
    pub front: FrontFace,
    pub wireframe: bool,
}

impl RasterState {
    fn cull_flags(&self) -> vk::CullModeFlags {
        match self.cull {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }

    fn front_face(&self) -> vk::FrontFace {
        match self.front {
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }

    fn polygon_mode(&self, line_supported: bool) -> vk::PolygonMode {
        if self.wireframe && line_supported {
            vk::PolygonMode::LINE
        } else {
            vk::PolygonMode::FILL
        }
    }
}

/// Viewport with the origin at the bottom-left: y starts at the height and
/// the height is negative.
pub fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub struct ShaderModule {
    device: Arc<DeviceContext>,
    pub raw: vk::ShaderModule,
}

impl ShaderModule {
    pub fn new(device: Arc<DeviceContext>, words: &[u32]) -> Result<Self> {
        let ci = vk::ShaderModuleCreateInfo {
            code_size: std::mem::size_of_val(words),
            p_code: words.as_ptr(),
            ..Default::default()
        };
        let raw = unsafe { device.device.create_shader_module(&ci, None) }
            .context("vkCreateShaderModule")?;
        Ok(Self { device, raw })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_shader_module(self.raw, None) };
    }
}

/// The pipeline layout and one graphics pipeline per topology class.
pub struct PipelineSet {
    device: Arc<DeviceContext>,
    pub layout: vk::PipelineLayout,
    pipelines: [vk::Pipeline; 3],
}

impl PipelineSet {
    pub fn new(
        device: Arc<DeviceContext>,
        render_pass: vk::RenderPass,
        set_layout: vk::DescriptorSetLayout,
        shaders: &ShaderBinaries,
        raster: RasterState,
    ) -> Result<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo {
            set_layout_count: 1,
            p_set_layouts: &set_layout,
            ..Default::default()
        };
        let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
            .context("vkCreatePipelineLayout")?;
        let mut set = Self {
            device: device.clone(),
            layout,
            pipelines: [vk::Pipeline::null(); 3],
        };

        // Modules only need to live until the pipelines exist.
        let vs = ShaderModule::new(device.clone(), &shaders.vertex)?;
        let fs = ShaderModule::new(device.clone(), &shaders.fragment)?;
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                stage: vk::ShaderStageFlags::VERTEX,
                module: vs.raw,
                p_name: c"main".as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: fs.raw,
                p_name: c"main".as_ptr(),
                ..Default::default()
            },
        ];

        let vb = vk::VertexInputBindingDescription {
            binding: 0,
            stride: Vertex::SIZE as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        };
        let va = [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
        ];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &vb,
            vertex_attribute_description_count: va.len() as u32,
            p_vertex_attribute_descriptions: va.as_ptr(),
            ..Default::default()
        };

        let dyn_states = [
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::PRIMITIVE_TOPOLOGY,
        ];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo {
            dynamic_state_count: dyn_states.len() as u32,
            p_dynamic_states: dyn_states.as_ptr(),
            ..Default::default()
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        if raster.wireframe && !device.fill_mode_non_solid {
            warn!("vk: wireframe requested without fillModeNonSolid, using fill");
        }
        let raster_ci = vk::PipelineRasterizationStateCreateInfo {
            polygon_mode: raster.polygon_mode(device.fill_mode_non_solid),
            cull_mode: raster.cull_flags(),
            front_face: raster.front_face(),
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        let blend_att = vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::TRUE,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            attachment_count: 1,
            p_attachments: &blend_att,
            ..Default::default()
        };

        let assembly: Vec<vk::PipelineInputAssemblyStateCreateInfo> = TopologyClass::ALL
            .iter()
            .map(|c| vk::PipelineInputAssemblyStateCreateInfo {
                topology: c.baked(),
                ..Default::default()
            })
            .collect();
        let infos: Vec<vk::GraphicsPipelineCreateInfo> = assembly
            .iter()
            .map(|ia| vk::GraphicsPipelineCreateInfo {
                stage_count: stages.len() as u32,
                p_stages: stages.as_ptr(),
                p_vertex_input_state: &vertex_input,
                p_input_assembly_state: ia,
                p_viewport_state: &viewport_state,
                p_rasterization_state: &raster_ci,
                p_multisample_state: &multisample,
                p_color_blend_state: &color_blend,
                p_dynamic_state: &dynamic_state,
                layout,
                render_pass,
                subpass: 0,
                ..Default::default()
            })
            .collect();

        let created = unsafe {
            device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &infos, None)
        };
        match created {
            Ok(p) => set.pipelines.copy_from_slice(&p),
            Err((partial, err)) => {
                for p in partial {
                    unsafe { device.device.destroy_pipeline(p, None) };
                }
                return Err(anyhow!("vkCreateGraphicsPipelines: {err:?}"));
            }
        }
        debug!("vk: pipelines built ({raster:?})");
        Ok(set)
    }

    pub fn get(&self, class: TopologyClass) -> vk::Pipeline {
        self.pipelines[class.index()]
    }
}

impl Drop for PipelineSet {
    fn drop(&mut self) {
        let d = &self.device.device;
        unsafe {
            for &p in &self.pipelines {
                d.destroy_pipeline(p, None);
            }
            d.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_group_list_and_strip() {
        assert_eq!(TopologyClass::of(PrimitiveType::Points), TopologyClass::Point);
        assert_eq!(TopologyClass::of(PrimitiveType::Lines), TopologyClass::Line);
        assert_eq!(TopologyClass::of(PrimitiveType::LineStrip), TopologyClass::Line);
        assert_eq!(
            TopologyClass::of(PrimitiveType::TriangleStrip),
            TopologyClass::Triangle
        );
        for p in [
            PrimitiveType::Points,
            PrimitiveType::Lines,
            PrimitiveType::LineStrip,
            PrimitiveType::Triangles,
            PrimitiveType::TriangleStrip,
        ] {
            // The baked topology must be in the same class as every member.
            let baked = TopologyClass::of(p).baked();
            let exact = vk_topology(p);
            let same_family = |t: vk::PrimitiveTopology| match t {
                vk::PrimitiveTopology::POINT_LIST => 0,
                vk::PrimitiveTopology::LINE_LIST | vk::PrimitiveTopology::LINE_STRIP => 1,
                _ => 2,
            };
            assert_eq!(same_family(baked), same_family(exact), "{p:?}");
        }
    }

    #[test]
    fn viewport_is_flipped() {
        let vp = flipped_viewport(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!(vp.y, 600.0);
        assert_eq!(vp.height, -600.0);
        assert_eq!(vp.width, 800.0);
    }

    #[test]
    fn wireframe_needs_device_support() {
        let r = RasterState {
            cull: CullMode::Back,
            front: FrontFace::Clockwise,
            wireframe: true,
        };
        assert_eq!(r.polygon_mode(true), vk::PolygonMode::LINE);
        assert_eq!(r.polygon_mode(false), vk::PolygonMode::FILL);
        assert_eq!(r.cull_flags(), vk::CullModeFlags::BACK);
        assert_eq!(r.front_face(), vk::FrontFace::CLOCKWISE);
    }
}
