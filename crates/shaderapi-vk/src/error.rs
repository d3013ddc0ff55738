// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use shaderapi_device::{IndexBufferHandle, VertexBufferHandle};
use thiserror::Error;

/// Reasons a `draw_mesh` is refused. None of these are fatal: the mesh is
/// skipped and the batch keeps what it already holds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("batch already holds the maximum of {max} meshes")]
    TooManyMeshes { max: u32 },

    #[error("batched vertex buffer full: {used} + {requested} > {max}")]
    VertexOverflow { used: u32, requested: u32, max: u32 },

    #[error("batched index buffer full: {used} + {requested} > {max}")]
    IndexOverflow { used: u32, requested: u32, max: u32 },

    #[error("unknown vertex buffer {0:?}")]
    UnknownVertexBuffer(VertexBufferHandle),

    #[error("unknown index buffer {0:?}")]
    UnknownIndexBuffer(IndexBufferHandle),

    #[error("mesh wants {requested} elements from a buffer holding {available}")]
    MeshExceedsBuffer { requested: u32, available: u32 },
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no Vulkan adapter can render and present to this surface")]
    NoSuitableAdapter,

    #[error("surface is not supported by queue family {queue_family}")]
    UnsupportedSurface { queue_family: u32 },

    #[error("surface reports no formats")]
    NoSurfaceFormats,

    #[error("no memory type in {type_bits:#x} has {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("{0} is not a SPIR-V module")]
    InvalidShader(String),

    #[error("device is not initialized")]
    NotInitialized,
}
