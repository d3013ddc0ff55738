// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use shaderapi_device::ViewHandle;
use tracing::debug;

use crate::instance::InstanceContext;

/// Capabilities, formats and present modes for one adapter/surface pair.
#[derive(Clone, Debug)]
pub struct SurfaceSupport {
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

pub struct OwnedSurface {
    instance: Arc<InstanceContext>,
    pub raw: vk::SurfaceKHR,
}

impl OwnedSurface {
    /// The window behind `view` must outlive the returned surface.
    pub fn new(instance: Arc<InstanceContext>, view: &ViewHandle) -> Result<Self> {
        let raw = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                view.display,
                view.window,
                None,
            )
        }
        .context("ash_window::create_surface")?;
        debug!("vk: surface created");
        Ok(Self { instance, raw })
    }

    pub fn supports_queue(&self, phys: vk::PhysicalDevice, queue_family: u32) -> Result<bool> {
        unsafe {
            self.instance
                .surface_fn
                .get_physical_device_surface_support(phys, queue_family, self.raw)
        }
        .context("vkGetPhysicalDeviceSurfaceSupportKHR")
    }

    pub fn support(&self, phys: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        let s = &self.instance.surface_fn;
        unsafe {
            Ok(SurfaceSupport {
                caps: s
                    .get_physical_device_surface_capabilities(phys, self.raw)
                    .context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
                formats: s
                    .get_physical_device_surface_formats(phys, self.raw)
                    .context("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
                present_modes: s
                    .get_physical_device_surface_present_modes(phys, self.raw)
                    .context("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
            })
        }
    }
}

impl Drop for OwnedSurface {
    fn drop(&mut self) {
        unsafe { self.instance.surface_fn.destroy_surface(self.raw, None) };
        debug!("vk: surface destroyed");
    }
}
