// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;

use crate::context::DeviceContext;

/// A buffer with its own dedicated allocation.
pub struct GpuBuffer {
    device: Arc<DeviceContext>,
    pub raw: vk::Buffer,
    memory: vk::DeviceMemory,
    /// Requested size in bytes.
    pub size: vk::DeviceSize,
    /// Size of the backing allocation (at least `size`).
    pub alloc_size: vk::DeviceSize,
}

impl GpuBuffer {
    pub fn new(
        device: Arc<DeviceContext>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let bci = vk::BufferCreateInfo {
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let raw = unsafe { device.device.create_buffer(&bci, None) }.context("vkCreateBuffer")?;
        let mut buf = Self {
            device,
            raw,
            memory: vk::DeviceMemory::null(),
            size,
            alloc_size: 0,
        };

        let req = unsafe { buf.device.device.get_buffer_memory_requirements(raw) };
        let mai = vk::MemoryAllocateInfo {
            allocation_size: req.size,
            memory_type_index: buf.device.find_memory_type(req.memory_type_bits, props)?,
            ..Default::default()
        };
        buf.memory =
            unsafe { buf.device.device.allocate_memory(&mai, None) }.context("vkAllocateMemory")?;
        buf.alloc_size = req.size;
        unsafe { buf.device.device.bind_buffer_memory(raw, buf.memory, 0) }
            .context("vkBindBufferMemory")?;
        Ok(buf)
    }

    /// Host-visible source buffer filled with `bytes`.
    pub fn staging(device: Arc<DeviceContext>, bytes: &[u8]) -> Result<Self> {
        // Zero-sized buffers are invalid; empty host data still gets a handle.
        let size = (bytes.len() as vk::DeviceSize).max(4);
        let buf = Self::new(
            device,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buf.write(0, bytes)?;
        Ok(buf)
    }

    /// Maps `[offset, offset + bytes.len())`, copies and unmaps. Memory must
    /// be host-coherent; see `DynamicUniforms` for the flushed path.
    pub fn write(&self, offset: vk::DeviceSize, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let d = &self.device.device;
        unsafe {
            let ptr = d
                .map_memory(
                    self.memory,
                    offset,
                    bytes.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .context("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            d.unmap_memory(self.memory);
        }
        Ok(())
    }

    pub(crate) fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    pub(crate) fn device(&self) -> &Arc<DeviceContext> {
        &self.device
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        let d = &self.device.device;
        unsafe {
            d.destroy_buffer(self.raw, None);
            d.free_memory(self.memory, None);
        }
    }
}

/// One `vkCmdCopyBuffer` region between two buffers.
#[derive(Clone, Copy, Debug)]
pub struct CopyOp {
    pub src: vk::Buffer,
    pub dst: vk::Buffer,
    pub region: vk::BufferCopy,
}

/// Runs all copies in one submission and waits for them. Empty regions are
/// dropped; nothing is submitted if none remain.
pub fn copy_buffers(device: &DeviceContext, ops: &[CopyOp]) -> Result<()> {
    let ops: Vec<&CopyOp> = ops.iter().filter(|op| op.region.size > 0).collect();
    if ops.is_empty() {
        return Ok(());
    }
    device.submit_one_shot(|d, cmd| {
        for op in &ops {
            unsafe { d.cmd_copy_buffer(cmd, op.src, op.dst, std::slice::from_ref(&op.region)) };
        }
    })
}
