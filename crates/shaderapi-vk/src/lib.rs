// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan backend for [`shaderapi_device::ShaderDevice`].
//!
//! Meshes queued with `draw_mesh` are copied into one shared vertex buffer
//! and one shared index buffer, then drawn from a single command buffer per
//! `present` with per-draw transforms picked by dynamic uniform offsets.
//! Two frames can be in flight.

pub mod batch;
pub mod buffers;
pub mod config;
pub mod context;
mod device;
pub mod epoch;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod present;
pub mod recorder;
pub mod render_pass;
pub mod resources;
pub mod shaders;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod uniforms;

pub use device::VkShaderDevice;
pub use error::{BatchError, DeviceError};
