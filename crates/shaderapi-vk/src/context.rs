// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, c_void, CStr};
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::ext::extended_dynamic_state;
use ash::khr::swapchain;
use ash::vk;
use shaderapi_device::PrimitiveType;
use tracing::{info, warn};

use crate::error::DeviceError;
use crate::instance::InstanceContext;
use crate::pipeline::vk_topology;

/// How `vkCmdSetPrimitiveTopology` is reached on this device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopologyPath {
    /// Vulkan 1.3 core entry point.
    Core13,
    /// `VK_EXT_extended_dynamic_state` on an older device.
    Ext,
}

pub fn decide_topology_path(api_version: u32, has_ext: bool) -> Option<TopologyPath> {
    let maj = vk::api_version_major(api_version);
    let min = vk::api_version_minor(api_version);
    if maj > 1 || (maj == 1 && min >= 3) {
        Some(TopologyPath::Core13)
    } else if has_ext {
        Some(TopologyPath::Ext)
    } else {
        None
    }
}

/// What adapter probing learned about one physical device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterCandidate {
    /// First family with graphics and present support for the surface.
    pub queue_family: Option<u32>,
    pub topology: Option<TopologyPath>,
}

impl AdapterCandidate {
    pub fn is_suitable(&self) -> bool {
        self.queue_family.is_some() && self.topology.is_some()
    }
}

/// Requested ordinal when it is usable, else the first usable adapter.
pub fn select_adapter(candidates: &[AdapterCandidate], ordinal: Option<usize>) -> Option<usize> {
    if let Some(i) = ordinal {
        match candidates.get(i) {
            Some(c) if c.is_suitable() => return Some(i),
            Some(_) => warn!("vk: adapter {i} cannot render to this surface, picking another"),
            None => warn!(
                "vk: adapter {i} requested but only {} present",
                candidates.len()
            ),
        }
    }
    candidates.iter().position(AdapterCandidate::is_suitable)
}

pub fn memory_type_index(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        type_bits & (1 << i) != 0 && props.memory_types[i as usize].property_flags.contains(flags)
    })
}

#[derive(Clone, Copy, Debug)]
pub struct DeviceLimits {
    pub min_uniform_offset_alignment: u64,
    pub non_coherent_atom_size: u64,
}

/// Logical device, its single graphics+present queue and device-level
/// extension tables. Shared by every GPU object wrapper.
pub struct DeviceContext {
    pub instance: Arc<InstanceContext>,
    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family: u32,
    pub swapchain_fn: swapchain::Device,
    pub limits: DeviceLimits,
    pub fill_mode_non_solid: bool,
    eds_fn: Option<extended_dynamic_state::Device>,
    memory: vk::PhysicalDeviceMemoryProperties,
    transfer_pool: vk::CommandPool,
}

fn has_extension(props: &[vk::ExtensionProperties], name: &CStr) -> bool {
    props
        .iter()
        .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == name))
}

unsafe fn probe(
    ctx: &InstanceContext,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> AdapterCandidate {
    let instance = &ctx.instance;
    let families = unsafe { instance.get_physical_device_queue_family_properties(phys) };
    let queue_family = families
        .iter()
        .enumerate()
        .find(|(i, q)| {
            q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && unsafe {
                    ctx.surface_fn
                        .get_physical_device_surface_support(phys, *i as u32, surface)
                }
                .unwrap_or(false)
        })
        .map(|(i, _)| i as u32);

    let exts = unsafe { instance.enumerate_device_extension_properties(phys) }.unwrap_or_default();
    if !has_extension(&exts, swapchain::NAME) {
        return AdapterCandidate {
            queue_family,
            topology: None,
        };
    }

    let mut has_eds = has_extension(&exts, extended_dynamic_state::NAME);
    if has_eds {
        let mut eds = vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default();
        let mut feats2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut eds);
        unsafe { instance.get_physical_device_features2(phys, &mut feats2) };
        has_eds = eds.extended_dynamic_state == vk::TRUE;
    }

    let props = unsafe { instance.get_physical_device_properties(phys) };
    AdapterCandidate {
        queue_family,
        topology: decide_topology_path(props.api_version, has_eds),
    }
}

impl DeviceContext {
    pub fn new(
        instance: Arc<InstanceContext>,
        ordinal: Option<usize>,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let physicals = unsafe { instance.instance.enumerate_physical_devices() }
            .context("vkEnumeratePhysicalDevices")?;
        let candidates: Vec<AdapterCandidate> = physicals
            .iter()
            .map(|&p| unsafe { probe(&instance, p, surface) })
            .collect();
        let picked = select_adapter(&candidates, ordinal).ok_or(DeviceError::NoSuitableAdapter)?;
        let phys = physicals[picked];
        let cand = candidates[picked];
        let (Some(queue_family), Some(topology)) = (cand.queue_family, cand.topology) else {
            return Err(DeviceError::NoSuitableAdapter.into());
        };

        let props = unsafe { instance.instance.get_physical_device_properties(phys) };
        let supported = unsafe { instance.instance.get_physical_device_features(phys) };
        let memory = unsafe { instance.instance.get_physical_device_memory_properties(phys) };

        let features = vk::PhysicalDeviceFeatures {
            fill_mode_non_solid: supported.fill_mode_non_solid,
            ..Default::default()
        };
        let fill_mode_non_solid = supported.fill_mode_non_solid == vk::TRUE;
        if !fill_mode_non_solid {
            warn!("vk: fillModeNonSolid unsupported, wireframe falls back to fill");
        }

        let priorities = [1.0_f32];
        let qinfo = vk::DeviceQueueCreateInfo {
            queue_family_index: queue_family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };

        let mut device_exts: Vec<*const c_char> = vec![swapchain::NAME.as_ptr()];
        let eds_feats = vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT {
            extended_dynamic_state: vk::TRUE,
            ..Default::default()
        };
        let p_next: *const c_void = match topology {
            TopologyPath::Core13 => std::ptr::null(),
            TopologyPath::Ext => {
                device_exts.push(extended_dynamic_state::NAME.as_ptr());
                (&eds_feats as *const vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT).cast()
            }
        };

        let dinfo = vk::DeviceCreateInfo {
            p_next,
            queue_create_info_count: 1,
            p_queue_create_infos: &qinfo,
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };
        let device = unsafe { instance.instance.create_device(phys, &dinfo, None) }
            .context("vkCreateDevice")?;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let pool_info = vk::CommandPoolCreateInfo {
            queue_family_index: queue_family,
            flags: vk::CommandPoolCreateFlags::TRANSIENT,
            ..Default::default()
        };
        let transfer_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(p) => p,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e).context("vkCreateCommandPool(transfer)");
            }
        };

        let swapchain_fn = swapchain::Device::new(&instance.instance, &device);
        let eds_fn = (topology == TopologyPath::Ext)
            .then(|| extended_dynamic_state::Device::new(&instance.instance, &device));

        info!(
            "vk: adapter {} '{}' api {}.{} queue_family={} topology={:?}",
            picked,
            props
                .device_name_as_c_str()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default(),
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            queue_family,
            topology
        );

        Ok(Self {
            instance,
            phys,
            device,
            queue,
            queue_family,
            swapchain_fn,
            limits: DeviceLimits {
                min_uniform_offset_alignment: props.limits.min_uniform_buffer_offset_alignment,
                non_coherent_atom_size: props.limits.non_coherent_atom_size,
            },
            fill_mode_non_solid,
            eds_fn,
            memory,
            transfer_pool,
        })
    }

    pub fn find_memory_type(&self, type_bits: u32, flags: vk::MemoryPropertyFlags) -> Result<u32> {
        memory_type_index(&self.memory, type_bits, flags)
            .ok_or_else(|| DeviceError::NoMemoryType { type_bits, flags }.into())
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("vkDeviceWaitIdle")
    }

    pub fn set_primitive_topology(&self, cmd: vk::CommandBuffer, primitive: PrimitiveType) {
        let topo = vk_topology(primitive);
        unsafe {
            match &self.eds_fn {
                Some(eds) => eds.cmd_set_primitive_topology(cmd, topo),
                None => self.device.cmd_set_primitive_topology(cmd, topo),
            }
        }
    }

    /// Records `f` into a throwaway command buffer, submits it and waits for
    /// the queue to drain.
    pub fn submit_one_shot(&self, f: impl FnOnce(&ash::Device, vk::CommandBuffer)) -> Result<()> {
        let ai = vk::CommandBufferAllocateInfo {
            command_pool: self.transfer_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = unsafe { self.device.allocate_command_buffers(&ai) }
            .context("vkAllocateCommandBuffers(one-shot)")?[0];

        let run = || -> Result<()> {
            let bi = vk::CommandBufferBeginInfo {
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            unsafe { self.device.begin_command_buffer(cmd, &bi) }
                .context("vkBeginCommandBuffer(one-shot)")?;
            f(&self.device, cmd);
            unsafe { self.device.end_command_buffer(cmd) }
                .context("vkEndCommandBuffer(one-shot)")?;

            let si = vk::SubmitInfo {
                command_buffer_count: 1,
                p_command_buffers: &cmd,
                ..Default::default()
            };
            unsafe {
                self.device
                    .queue_submit(self.queue, std::slice::from_ref(&si), vk::Fence::null())
            }
            .context("vkQueueSubmit(one-shot)")?;
            unsafe { self.device.queue_wait_idle(self.queue) }.context("vkQueueWaitIdle")
        };
        let res = run();
        unsafe {
            self.device
                .free_command_buffers(self.transfer_pool, std::slice::from_ref(&cmd))
        };
        res
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.transfer_pool, None);
            self.device.destroy_device(None);
        }
        info!("vk: device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_path_prefers_core() {
        let v13 = vk::make_api_version(0, 1, 3, 250);
        let v12 = vk::make_api_version(0, 1, 2, 0);
        assert_eq!(decide_topology_path(v13, false), Some(TopologyPath::Core13));
        assert_eq!(decide_topology_path(v13, true), Some(TopologyPath::Core13));
        assert_eq!(decide_topology_path(v12, true), Some(TopologyPath::Ext));
        assert_eq!(decide_topology_path(v12, false), None);
    }

    const GOOD: AdapterCandidate = AdapterCandidate {
        queue_family: Some(0),
        topology: Some(TopologyPath::Core13),
    };
    const NO_PRESENT: AdapterCandidate = AdapterCandidate {
        queue_family: None,
        topology: Some(TopologyPath::Core13),
    };
    const NO_TOPOLOGY: AdapterCandidate = AdapterCandidate {
        queue_family: Some(1),
        topology: None,
    };

    #[test]
    fn adapter_ordinal_is_honoured_when_usable() {
        assert_eq!(select_adapter(&[GOOD, GOOD], Some(1)), Some(1));
        assert_eq!(select_adapter(&[GOOD, GOOD], None), Some(0));
    }

    #[test]
    fn adapter_falls_back_to_first_usable() {
        let c = [NO_PRESENT, NO_TOPOLOGY, GOOD];
        assert_eq!(select_adapter(&c, Some(0)), Some(2));
        assert_eq!(select_adapter(&c, Some(9)), Some(2));
        assert_eq!(select_adapter(&c[..2], None), None);
    }

    #[test]
    fn memory_type_respects_bits_and_flags() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[2].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;

        let hv = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert_eq!(memory_type_index(&props, 0b111, hv), Some(1));
        assert_eq!(memory_type_index(&props, 0b101, hv), Some(2));
        assert_eq!(memory_type_index(&props, 0b001, hv), None);
        assert_eq!(
            memory_type_index(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
    }
}
