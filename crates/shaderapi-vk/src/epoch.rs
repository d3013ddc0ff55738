// SPDX-License-Identifier: CEPL-1.0
//! Everything that has to be rebuilt when the swapchain is.
use std::sync::Arc;

use anyhow::Result;
use ash::vk;
use shaderapi_device::{PresentPreference, RenderSize};
use tracing::info;

use crate::context::DeviceContext;
use crate::pipeline::{PipelineSet, RasterState};
use crate::recorder::CommandBuffers;
use crate::render_pass::{Framebuffers, RenderPass};
use crate::shaders::ShaderBinaries;
use crate::surface::OwnedSurface;
use crate::swapchain::SwapchainBundle;
use crate::uniforms::{DynamicUniforms, TransformSetLayout};

/// Per-image object counts of one epoch. All of them come from the same
/// swapchain creation and must agree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochCounts {
    pub images: usize,
    pub views: usize,
    pub framebuffers: usize,
    pub descriptor_sets: usize,
    pub uniform_buffers: usize,
    pub command_buffers: usize,
}

impl EpochCounts {
    pub fn is_consistent(&self) -> bool {
        [
            self.views,
            self.framebuffers,
            self.descriptor_sets,
            self.uniform_buffers,
            self.command_buffers,
        ]
        .iter()
        .all(|&n| n == self.images)
    }
}

/// Inputs that stay fixed across recreations.
pub struct EpochParams<'a> {
    pub size: RenderSize,
    pub present: PresentPreference,
    pub raster: RasterState,
    pub set_layout: &'a TransformSetLayout,
    pub shaders: &'a ShaderBinaries,
    pub max_meshes: u32,
}

/// Fields drop top to bottom, which is the teardown order: framebuffers,
/// uniform buffers and their descriptor pool, command buffers, pipelines and
/// layout, render pass, image views and swapchain.
pub struct SwapchainEpoch {
    pub framebuffers: Framebuffers,
    pub uniforms: DynamicUniforms,
    pub commands: CommandBuffers,
    pub pipelines: PipelineSet,
    pub render_pass: RenderPass,
    pub swapchain: SwapchainBundle,
    /// The slot fence that last rendered into each image. Borrowed from the
    /// frame ring, never destroyed here.
    pub images_in_flight: Vec<vk::Fence>,
}

impl SwapchainEpoch {
    pub fn new(
        device: &Arc<DeviceContext>,
        surface: &OwnedSurface,
        params: &EpochParams<'_>,
    ) -> Result<Self> {
        let swapchain = SwapchainBundle::new(device.clone(), surface, params.size, params.present)?;
        let render_pass = RenderPass::new(device.clone(), swapchain.format.format)?;
        let pipelines = PipelineSet::new(
            device.clone(),
            render_pass.raw,
            params.set_layout.raw,
            params.shaders,
            params.raster,
        )?;
        let image_count = swapchain.images.len();
        let commands = CommandBuffers::new(device.clone(), image_count)?;
        let uniforms = DynamicUniforms::new(
            device.clone(),
            params.set_layout,
            image_count,
            params.max_meshes,
        )?;
        let framebuffers = Framebuffers::new(
            device.clone(),
            &render_pass,
            &swapchain.views,
            swapchain.extent,
        )?;

        let epoch = Self {
            framebuffers,
            uniforms,
            commands,
            pipelines,
            render_pass,
            images_in_flight: vec![vk::Fence::null(); image_count],
            swapchain,
        };
        debug_assert!(epoch.counts().is_consistent());
        info!(
            "vk: swapchain epoch ready ({} images, uniform stride {})",
            image_count, epoch.uniforms.stride
        );
        Ok(epoch)
    }

    pub fn counts(&self) -> EpochCounts {
        EpochCounts {
            images: self.swapchain.images.len(),
            views: self.swapchain.views.len(),
            framebuffers: self.framebuffers.raw.len(),
            descriptor_sets: self.uniforms.sets.len(),
            uniform_buffers: self.uniforms.buffer_count(),
            command_buffers: self.commands.raw.len(),
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }
}
