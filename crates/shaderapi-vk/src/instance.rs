// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, c_void, CStr};

use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Loader, instance and the instance-level extension tables.
///
/// Everything created from the instance holds an `Arc` to this, so the
/// instance is destroyed last.
pub struct InstanceContext {
    pub entry: Entry,
    pub instance: ash::Instance,
    pub surface_fn: surface::Instance,
    debug: Option<DebugMessenger>,
}

struct DebugMessenger {
    loader: debug_utils::Instance,
    raw: vk::DebugUtilsMessengerEXT,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || unsafe { (*data).p_message.is_null() } {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{msg}");
    } else {
        debug!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

fn has_layer(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .unwrap_or_default()
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == name))
}

fn has_instance_extension(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_extension_properties(None) }
        .unwrap_or_default()
        .iter()
        .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == name))
}

impl InstanceContext {
    pub fn new(display: RawDisplayHandle, validation: bool) -> Result<Self> {
        let entry = unsafe { Entry::load() }.context("load Vulkan loader")?;

        let app_info = vk::ApplicationInfo {
            p_application_name: c"shaderapi".as_ptr(),
            p_engine_name: c"shaderapi".as_ptr(),
            api_version: vk::API_VERSION_1_3,
            ..Default::default()
        };

        let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
            .context("enumerate_required_extensions")?
            .to_vec();

        let mut layers: Vec<*const c_char> = Vec::new();
        let mut debug_ext = false;
        if validation {
            if has_layer(&entry, VALIDATION_LAYER) {
                layers.push(VALIDATION_LAYER.as_ptr());
            } else {
                warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
            }
            if has_instance_extension(&entry, debug_utils::NAME) {
                extensions.push(debug_utils::NAME.as_ptr());
                debug_ext = true;
            }
        }

        let create_info = vk::InstanceCreateInfo {
            p_application_info: &app_info,
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: extensions.as_ptr(),
            enabled_layer_count: layers.len() as u32,
            pp_enabled_layer_names: layers.as_ptr(),
            ..Default::default()
        };
        let instance =
            unsafe { entry.create_instance(&create_info, None) }.context("vkCreateInstance")?;
        let surface_fn = surface::Instance::new(&entry, &instance);

        let mut ctx = Self {
            entry,
            instance,
            surface_fn,
            debug: None,
        };

        if debug_ext {
            let loader = debug_utils::Instance::new(&ctx.entry, &ctx.instance);
            let ci = vk::DebugUtilsMessengerCreateInfoEXT {
                message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                pfn_user_callback: Some(debug_callback),
                ..Default::default()
            };
            let raw = unsafe { loader.create_debug_utils_messenger(&ci, None) }
                .context("vkCreateDebugUtilsMessengerEXT")?;
            ctx.debug = Some(DebugMessenger { loader, raw });
        }

        info!(
            "vk: instance ready (validation layer={}, messenger={})",
            !layers.is_empty(),
            ctx.debug.is_some()
        );
        Ok(ctx)
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if let Some(d) = self.debug.take() {
                d.loader.destroy_debug_utils_messenger(d.raw, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("vk: instance destroyed");
    }
}
