// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;

use crate::context::DeviceContext;

/// Single color attachment: cleared on load, stored, handed to present.
pub struct RenderPass {
    device: Arc<DeviceContext>,
    pub raw: vk::RenderPass,
}

impl RenderPass {
    pub fn new(device: Arc<DeviceContext>, format: vk::Format) -> Result<Self> {
        let attachment = vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        };
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            ..Default::default()
        };
        // The layout transition waits for the acquire semaphore, which is
        // waited on at COLOR_ATTACHMENT_OUTPUT.
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };
        let ci = vk::RenderPassCreateInfo {
            attachment_count: 1,
            p_attachments: &attachment,
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        let raw = unsafe { device.device.create_render_pass(&ci, None) }
            .context("vkCreateRenderPass")?;
        Ok(Self { device, raw })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_render_pass(self.raw, None) };
    }
}

/// One framebuffer per swapchain image view.
pub struct Framebuffers {
    device: Arc<DeviceContext>,
    pub raw: Vec<vk::Framebuffer>,
}

impl Framebuffers {
    pub fn new(
        device: Arc<DeviceContext>,
        render_pass: &RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let mut fbs = Self {
            device,
            raw: Vec::with_capacity(views.len()),
        };
        for view in views {
            let ci = vk::FramebufferCreateInfo {
                render_pass: render_pass.raw,
                attachment_count: 1,
                p_attachments: view,
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { fbs.device.device.create_framebuffer(&ci, None) }
                .context("vkCreateFramebuffer")?;
            fbs.raw.push(fb);
        }
        Ok(fbs)
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        for &fb in &self.raw {
            unsafe { self.device.device.destroy_framebuffer(fb, None) };
        }
    }
}
