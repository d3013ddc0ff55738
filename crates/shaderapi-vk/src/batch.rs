// SPDX-License-Identifier: CEPL-1.0
//! The per-frame draw batch.
//!
//! Every queued mesh gets a contiguous slice of the shared vertex and index
//! buffers, in call order. `Present` consumes the batch and resets the fill
//! offsets to zero.
use ash::vk;
use shaderapi_device::{BatchLimits, PrimitiveType, TransformBundle, Vertex};

use crate::error::BatchError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshDrawRecord {
    pub vertex_count: u32,
    pub index_count: u32,
    pub first_vertex: u32,
    pub first_index: u32,
    pub topology: PrimitiveType,
    pub transforms: TransformBundle,
}

impl MeshDrawRecord {
    pub fn vertex_byte_offset(&self) -> vk::DeviceSize {
        self.first_vertex as vk::DeviceSize * Vertex::SIZE as vk::DeviceSize
    }

    pub fn index_byte_offset(&self) -> vk::DeviceSize {
        self.first_index as vk::DeviceSize * INDEX_SIZE
    }
}

/// Indices are 16-bit.
pub const INDEX_SIZE: vk::DeviceSize = 2;

#[derive(Debug)]
pub struct DrawBatch {
    limits: BatchLimits,
    records: Vec<MeshDrawRecord>,
    vertex_fill: u32,
    index_fill: u32,
}

impl DrawBatch {
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            limits,
            records: Vec::with_capacity(limits.max_meshes as usize),
            vertex_fill: 0,
            index_fill: 0,
        }
    }

    /// Appends a record at the current fill offsets. On error the batch is
    /// left untouched.
    pub fn push(
        &mut self,
        vertex_count: u32,
        index_count: u32,
        topology: PrimitiveType,
        transforms: TransformBundle,
    ) -> Result<MeshDrawRecord, BatchError> {
        let l = self.limits;
        if self.records.len() as u32 >= l.max_meshes {
            return Err(BatchError::TooManyMeshes { max: l.max_meshes });
        }
        if self.vertex_fill.checked_add(vertex_count).map_or(true, |v| v > l.max_vertices) {
            return Err(BatchError::VertexOverflow {
                used: self.vertex_fill,
                requested: vertex_count,
                max: l.max_vertices,
            });
        }
        if self.index_fill.checked_add(index_count).map_or(true, |v| v > l.max_indices) {
            return Err(BatchError::IndexOverflow {
                used: self.index_fill,
                requested: index_count,
                max: l.max_indices,
            });
        }

        let rec = MeshDrawRecord {
            vertex_count,
            index_count,
            first_vertex: self.vertex_fill,
            first_index: self.index_fill,
            topology,
            transforms,
        };
        self.vertex_fill += vertex_count;
        self.index_fill += index_count;
        self.records.push(rec);
        Ok(rec)
    }

    pub fn records(&self) -> &[MeshDrawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn vertex_fill(&self) -> u32 {
        self.vertex_fill
    }

    pub fn index_fill(&self) -> u32 {
        self.index_fill
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.vertex_fill = 0;
        self.index_fill = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> DrawBatch {
        DrawBatch::new(BatchLimits {
            max_meshes: 3,
            max_vertices: 100,
            max_indices: 150,
        })
    }

    #[test]
    fn offsets_follow_call_order() {
        let mut b = small();
        let sizes = [(3, 3), (4, 6), (10, 12)];
        for (v, i) in sizes {
            b.push(v, i, PrimitiveType::Triangles, TransformBundle::IDENTITY)
                .unwrap();
        }
        let firsts: Vec<(u32, u32)> = b
            .records()
            .iter()
            .map(|r| (r.first_vertex, r.first_index))
            .collect();
        assert_eq!(firsts, [(0, 0), (3, 3), (7, 9)]);
        assert_eq!((b.vertex_fill(), b.index_fill()), (17, 21));
        assert_eq!(b.records()[2].vertex_byte_offset(), 7 * Vertex::SIZE as u64);
        assert_eq!(b.records()[2].index_byte_offset(), 18);
    }

    #[test]
    fn clear_resets_fill() {
        let mut b = small();
        b.push(5, 5, PrimitiveType::Lines, TransformBundle::IDENTITY)
            .unwrap();
        b.clear();
        assert!(b.is_empty());
        assert_eq!((b.vertex_fill(), b.index_fill()), (0, 0));
        let r = b
            .push(1, 1, PrimitiveType::Points, TransformBundle::IDENTITY)
            .unwrap();
        assert_eq!((r.first_vertex, r.first_index), (0, 0));
    }

    #[test]
    fn overflow_is_rejected_and_batch_kept() {
        let mut b = small();
        b.push(90, 10, PrimitiveType::Triangles, TransformBundle::IDENTITY)
            .unwrap();
        let err = b
            .push(11, 1, PrimitiveType::Triangles, TransformBundle::IDENTITY)
            .unwrap_err();
        assert_eq!(
            err,
            BatchError::VertexOverflow {
                used: 90,
                requested: 11,
                max: 100
            }
        );
        assert!(matches!(
            b.push(1, 141, PrimitiveType::Triangles, TransformBundle::IDENTITY),
            Err(BatchError::IndexOverflow { .. })
        ));
        assert_eq!(b.len(), 1);
        assert_eq!(b.vertex_fill(), 90);

        b.push(10, 140, PrimitiveType::Triangles, TransformBundle::IDENTITY)
            .unwrap();
        b.push(0, 0, PrimitiveType::Triangles, TransformBundle::IDENTITY)
            .unwrap();
        assert_eq!(
            b.push(0, 0, PrimitiveType::Triangles, TransformBundle::IDENTITY),
            Err(BatchError::TooManyMeshes { max: 3 })
        );
    }
}
