// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use crate::ViewHandle;

/// Which physical adapter to open. `None` takes the first suitable one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdapterInfo {
    pub ordinal: Option<usize>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    Clockwise,
    CounterClockwise,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentPreference {
    /// Mailbox when the surface offers it, FIFO otherwise.
    #[default]
    Mailbox,
    Fifo,
}

/// Fixed capacities of the per-frame batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_meshes: u32,
    pub max_vertices: u32,
    pub max_indices: u32,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_meshes: 1024,
            max_vertices: 65535 * 8,
            max_indices: 65535 * 8,
        }
    }
}

/// Creation parameters for `ShaderDevice::init_device`.
#[derive(Clone, Debug)]
pub struct ShaderDeviceInfo {
    pub view: ViewHandle,
    pub clear_color: [f32; 4],
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    /// Rasterize polygons as lines.
    pub wireframe: bool,
    pub present: PresentPreference,
    /// Directory holding `shaders/vert.spv` and `shaders/frag.spv`.
    pub shader_root: PathBuf,
    pub limits: BatchLimits,
    pub validation: bool,
}

impl ShaderDeviceInfo {
    pub fn new(view: ViewHandle) -> Self {
        Self {
            view,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            cull_mode: CullMode::default(),
            front_face: FrontFace::default(),
            wireframe: true,
            present: PresentPreference::default(),
            shader_root: PathBuf::from("."),
            limits: BatchLimits::default(),
            validation: cfg!(debug_assertions),
        }
    }
}
