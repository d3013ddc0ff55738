// SPDX-License-Identifier: CEPL-1.0
//! Per-image dynamic uniform buffers holding one `TransformBundle` per draw.
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use shaderapi_device::TransformBundle;

use crate::batch::MeshDrawRecord;
use crate::buffers::GpuBuffer;
use crate::context::DeviceContext;

/// Smallest multiple of `alignment` that holds `size` bytes.
pub fn aligned_stride(size: u64, alignment: u64) -> u64 {
    let a = alignment.max(1);
    size.div_ceil(a) * a
}

/// Lays the bundles out `stride` bytes apart. The scratch buffer covers only
/// the bundles given; `None` when there are none.
pub fn pack_transforms<'a, I>(bundles: I, stride: usize) -> Option<Vec<u8>>
where
    I: ExactSizeIterator<Item = &'a TransformBundle>,
{
    let n = bundles.len();
    if n == 0 {
        return None;
    }
    let mut scratch = vec![0u8; n * stride];
    for (i, b) in bundles.enumerate() {
        let at = i * stride;
        scratch[at..at + TransformBundle::SIZE].copy_from_slice(b.as_bytes());
    }
    Some(scratch)
}

/// Flush size for `written` bytes from offset 0: rounded up to the atom, or
/// `WHOLE_SIZE` once that would run past the allocation.
pub fn flush_len(written: u64, atom: u64, alloc_size: u64) -> u64 {
    let a = atom.max(1);
    let rounded = written.div_ceil(a) * a;
    if rounded >= alloc_size {
        vk::WHOLE_SIZE
    } else {
        rounded
    }
}

/// Set 0, binding 0: one dynamic uniform buffer read by the vertex stage.
pub struct TransformSetLayout {
    device: Arc<DeviceContext>,
    pub raw: vk::DescriptorSetLayout,
}

impl TransformSetLayout {
    pub fn new(device: Arc<DeviceContext>) -> Result<Self> {
        let binding = vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        };
        let ci = vk::DescriptorSetLayoutCreateInfo {
            binding_count: 1,
            p_bindings: &binding,
            ..Default::default()
        };
        let raw = unsafe { device.device.create_descriptor_set_layout(&ci, None) }
            .context("vkCreateDescriptorSetLayout")?;
        Ok(Self { device, raw })
    }
}

impl Drop for TransformSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_descriptor_set_layout(self.raw, None)
        };
    }
}

pub struct DynamicUniforms {
    device: Arc<DeviceContext>,
    pool: vk::DescriptorPool,
    pub sets: Vec<vk::DescriptorSet>,
    buffers: Vec<GpuBuffer>,
    pub stride: u64,
    capacity: u32,
}

impl DynamicUniforms {
    pub fn new(
        device: Arc<DeviceContext>,
        layout: &TransformSetLayout,
        image_count: usize,
        capacity: u32,
    ) -> Result<Self> {
        let stride = aligned_stride(
            TransformBundle::SIZE as u64,
            device.limits.min_uniform_offset_alignment,
        );
        let size = stride * capacity.max(1) as u64;

        let mut u = Self {
            device: device.clone(),
            pool: vk::DescriptorPool::null(),
            sets: Vec::new(),
            buffers: Vec::with_capacity(image_count),
            stride,
            capacity,
        };
        for _ in 0..image_count {
            u.buffers.push(GpuBuffer::new(
                device.clone(),
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE,
            )?);
        }

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            descriptor_count: image_count as u32,
        }];
        let pool_ci = vk::DescriptorPoolCreateInfo {
            max_sets: image_count as u32,
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            ..Default::default()
        };
        u.pool = unsafe { device.device.create_descriptor_pool(&pool_ci, None) }
            .context("vkCreateDescriptorPool")?;

        let layouts = vec![layout.raw; image_count];
        let alloc = vk::DescriptorSetAllocateInfo {
            descriptor_pool: u.pool,
            descriptor_set_count: image_count as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        u.sets = unsafe { device.device.allocate_descriptor_sets(&alloc) }
            .context("vkAllocateDescriptorSets")?;

        // The range is one record; the dynamic offset picks which.
        let infos: Vec<vk::DescriptorBufferInfo> = u
            .buffers
            .iter()
            .map(|b| vk::DescriptorBufferInfo {
                buffer: b.raw,
                offset: 0,
                range: TransformBundle::SIZE as u64,
            })
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = u
            .sets
            .iter()
            .zip(&infos)
            .map(|(&set, info)| vk::WriteDescriptorSet {
                dst_set: set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                p_buffer_info: info,
                ..Default::default()
            })
            .collect();
        unsafe { device.device.update_descriptor_sets(&writes, &[]) };

        Ok(u)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Writes one bundle per record into the image's buffer and flushes the
    /// written range. Returns `false` without mapping when there are no
    /// records.
    pub fn write(&self, image: usize, records: &[MeshDrawRecord]) -> Result<bool> {
        debug_assert!(records.len() <= self.capacity as usize);
        let Some(bytes) = pack_transforms(records.iter().map(|r| &r.transforms), self.stride as usize)
        else {
            return Ok(false);
        };
        let buf = &self.buffers[image];
        let d = &buf.device().device;
        unsafe {
            let ptr = d
                .map_memory(buf.memory(), 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .context("vkMapMemory(uniforms)")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            let range = vk::MappedMemoryRange {
                memory: buf.memory(),
                offset: 0,
                size: flush_len(
                    bytes.len() as u64,
                    self.device.limits.non_coherent_atom_size,
                    buf.alloc_size,
                ),
                ..Default::default()
            };
            let flushed = d.flush_mapped_memory_ranges(std::slice::from_ref(&range));
            d.unmap_memory(buf.memory());
            flushed.context("vkFlushMappedMemoryRanges")?;
        }
        Ok(true)
    }
}

impl Drop for DynamicUniforms {
    fn drop(&mut self) {
        // Frees the sets with it; the buffers go when the fields drop.
        unsafe { self.device.device.destroy_descriptor_pool(self.pool, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaderapi_math::{Mat4, Vec3};

    #[test]
    fn stride_is_aligned_and_large_enough() {
        let size = TransformBundle::SIZE as u64;
        for a in [1u64, 2, 4, 16, 64, 100, 256, 1000] {
            let s = aligned_stride(size, a);
            assert_eq!(s % a, 0, "alignment {a}");
            assert!(s >= size);
            assert!(s < size + a);
        }
        assert_eq!(aligned_stride(192, 256), 256);
        assert_eq!(aligned_stride(192, 64), 192);
        assert_eq!(aligned_stride(192, 0), 192);
    }

    #[test]
    fn packing_places_bundles_at_stride() {
        let a = TransformBundle::IDENTITY;
        let b = TransformBundle {
            model: Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
            ..TransformBundle::IDENTITY
        };
        let stride = 256;
        let bytes = pack_transforms([a, b].iter(), stride).unwrap();
        assert_eq!(bytes.len(), 2 * stride);
        assert_eq!(&bytes[..TransformBundle::SIZE], a.as_bytes());
        assert_eq!(&bytes[stride..stride + TransformBundle::SIZE], b.as_bytes());
        assert!(bytes[TransformBundle::SIZE..stride].iter().all(|&x| x == 0));
    }

    #[test]
    fn nothing_to_pack_for_empty_batch() {
        let none: [TransformBundle; 0] = [];
        assert!(pack_transforms(none.iter(), 256).is_none());
    }

    #[test]
    fn flush_rounds_to_atom_within_allocation() {
        assert_eq!(flush_len(192, 64, 4096), 192);
        assert_eq!(flush_len(200, 64, 4096), 256);
        assert_eq!(flush_len(200, 1, 4096), 200);
        assert_eq!(flush_len(4000, 256, 4096), vk::WHOLE_SIZE);
        assert_eq!(flush_len(4096, 64, 4096), vk::WHOLE_SIZE);
    }
}
