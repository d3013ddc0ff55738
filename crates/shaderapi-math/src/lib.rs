// SPDX-License-Identifier: CEPL-1.0
//! Matrix plumbing between the host engine and the shaders.
//!
//! The host stores matrices row-major; GLSL reads column-major. Everything
//! crossing into a uniform buffer goes through [`TransformBundle`].

use bytemuck::{Pod, Zeroable};
pub use glam::{Mat4, Vec3};

/// A 4x4 matrix as the host stores it: sixteen floats, row after row.
pub type RowMajor = [f32; 16];

pub const IDENTITY_ROW_MAJOR: RowMajor = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Converts a row-major host matrix into a column-major `Mat4`.
#[inline]
pub fn from_row_major(m: &RowMajor) -> Mat4 {
    Mat4::from_cols_array(m).transpose()
}

/// Converts a column-major `Mat4` back into host storage order.
#[inline]
pub fn to_row_major(m: &Mat4) -> RowMajor {
    m.transpose().to_cols_array()
}

/// Per-draw uniform block. Layout matches `Transforms` in `batch.vert`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TransformBundle {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl TransformBundle {
    pub const SIZE: usize = std::mem::size_of::<TransformBundle>();

    pub const IDENTITY: TransformBundle = TransformBundle {
        model: Mat4::IDENTITY,
        view: Mat4::IDENTITY,
        proj: Mat4::IDENTITY,
    };

    /// Builds a bundle from host matrices, transposing each one.
    pub fn from_row_major(view: &RowMajor, proj: &RowMajor, model: &RowMajor) -> Self {
        Self {
            model: from_row_major(model),
            view: from_row_major(view),
            proj: from_row_major(proj),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for TransformBundle {
    fn default() -> Self {
        Self::IDENTITY
    }
}
