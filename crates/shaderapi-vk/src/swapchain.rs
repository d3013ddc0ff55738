// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use shaderapi_device::{PresentPreference, RenderSize};
use tracing::info;

use crate::context::DeviceContext;
use crate::error::DeviceError;
use crate::surface::OwnedSurface;

pub const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;
pub const PREFERRED_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// The preferred sRGB pair if offered, otherwise whatever the surface lists
/// first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == PREFERRED_FORMAT && f.color_space == PREFERRED_COLOR_SPACE)
        .or_else(|| formats.first().copied())
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    pref: PresentPreference,
) -> vk::PresentModeKHR {
    match pref {
        PresentPreference::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        // FIFO is the one mode every surface has to support.
        _ => vk::PresentModeKHR::FIFO,
    }
}

/// Client size clamped into the surface's extent range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    vk::Extent2D {
        width: want
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: want
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub struct SwapchainBundle {
    device: Arc<DeviceContext>,
    pub raw: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
}

impl SwapchainBundle {
    pub fn new(
        device: Arc<DeviceContext>,
        surface: &OwnedSurface,
        want: RenderSize,
        pref: PresentPreference,
    ) -> Result<Self> {
        let support = surface.support(device.phys)?;
        let format =
            choose_surface_format(&support.formats).ok_or(DeviceError::NoSurfaceFormats)?;
        let present_mode = choose_present_mode(&support.present_modes, pref);
        let extent = choose_extent(&support.caps, want);
        let min_image_count = choose_image_count(&support.caps);

        let info = vk::SwapchainCreateInfoKHR {
            surface: surface.raw,
            min_image_count,
            image_format: format.format,
            image_color_space: format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: support.caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            ..Default::default()
        };
        let raw = unsafe { device.swapchain_fn.create_swapchain(&info, None) }
            .context("vkCreateSwapchainKHR")?;

        let mut bundle = Self {
            device,
            raw,
            format,
            present_mode,
            extent,
            images: Vec::new(),
            views: Vec::new(),
        };
        bundle.images = unsafe { bundle.device.swapchain_fn.get_swapchain_images(raw) }
            .context("vkGetSwapchainImagesKHR")?;

        for &image in &bundle.images {
            let ci = vk::ImageViewCreateInfo {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: format.format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = unsafe { bundle.device.device.create_image_view(&ci, None) }
                .context("vkCreateImageView")?;
            bundle.views.push(view);
        }

        info!(
            "vk: swapchain {}x{} format={:?}/{:?} present_mode={:?} images={} (min {})",
            extent.width,
            extent.height,
            format.format,
            format.color_space,
            present_mode,
            bundle.images.len(),
            min_image_count
        );
        Ok(bundle)
    }
}

impl Drop for SwapchainBundle {
    fn drop(&mut self) {
        let d = &self.device;
        unsafe {
            for &v in &self.views {
                d.device.destroy_image_view(v, None);
            }
            d.swapchain_fn.destroy_swapchain(self.raw, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(min: (u32, u32), max: (u32, u32), images: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: images.0,
            max_image_count: images.1,
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn preferred_pair_wins_over_order() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let f = choose_surface_format(&formats).unwrap();
        assert_eq!(f.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn format_needs_matching_color_space() {
        let formats = [
            fmt(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        let f = choose_surface_format(&formats).unwrap();
        assert_eq!(f.format, vk::Format::R16G16B16A16_SFLOAT);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn mailbox_only_when_offered_and_wanted() {
        use vk::PresentModeKHR as P;
        let all = [P::FIFO, P::MAILBOX, P::IMMEDIATE];
        assert_eq!(choose_present_mode(&all, PresentPreference::Mailbox), P::MAILBOX);
        assert_eq!(choose_present_mode(&[P::FIFO], PresentPreference::Mailbox), P::FIFO);
        assert_eq!(choose_present_mode(&all, PresentPreference::Fifo), P::FIFO);
    }

    #[test]
    fn extent_is_clamped_to_surface_bounds() {
        let c = caps((1, 1), (1600, 900), (2, 0));
        let e = choose_extent(&c, RenderSize::new(800, 600));
        assert_eq!((e.width, e.height), (800, 600));
        let e = choose_extent(&c, RenderSize::new(1920, 1080));
        assert_eq!((e.width, e.height), (1600, 900));
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        assert_eq!(choose_image_count(&caps((1, 1), (1, 1), (2, 0))), 3);
        assert_eq!(choose_image_count(&caps((1, 1), (1, 1), (2, 3))), 3);
        assert_eq!(choose_image_count(&caps((1, 1), (1, 1), (3, 3))), 3);
    }
}
