// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;

use crate::context::DeviceContext;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Monotonic frame number; the in-flight slot is derived from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCounter {
    frame: u64,
}

impl FrameCounter {
    pub fn slot(&self) -> usize {
        (self.frame % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn advance(&mut self) {
        self.frame += 1;
    }
}

/// The semaphore/fence triple of one in-flight slot. The fence starts
/// signalled so the first wait on each slot returns immediately.
pub struct FrameSync {
    device: Arc<DeviceContext>,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    fn new(device: Arc<DeviceContext>) -> Result<Self> {
        let d = &device.device;
        let sem_ci = vk::SemaphoreCreateInfo::default();
        let fence_ci = vk::FenceCreateInfo {
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        // Null handles are ignored by the destroy calls in Drop.
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
            device: device.clone(),
        };
        unsafe {
            sync.image_available = d
                .create_semaphore(&sem_ci, None)
                .context("vkCreateSemaphore(image_available)")?;
            sync.render_finished = d
                .create_semaphore(&sem_ci, None)
                .context("vkCreateSemaphore(render_finished)")?;
            sync.in_flight = d
                .create_fence(&fence_ci, None)
                .context("vkCreateFence(in_flight)")?;
        }
        Ok(sync)
    }

    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.in_flight], true, u64::MAX)
        }
        .context("vkWaitForFences(in_flight)")
    }

    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.device.reset_fences(&[self.in_flight]) }
            .context("vkResetFences(in_flight)")
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        let d = &self.device.device;
        unsafe {
            d.destroy_fence(self.in_flight, None);
            d.destroy_semaphore(self.render_finished, None);
            d.destroy_semaphore(self.image_available, None);
        }
    }
}

pub struct FrameRing {
    slots: Vec<FrameSync>,
}

impl FrameRing {
    pub fn new(device: Arc<DeviceContext>) -> Result<Self> {
        let slots = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { slots })
    }

    pub fn get(&self, slot: usize) -> &FrameSync {
        &self.slots[slot % MAX_FRAMES_IN_FLIGHT]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_cycles_with_frame() {
        let mut c = FrameCounter::default();
        let seen: Vec<usize> = (0..5)
            .map(|_| {
                let s = c.slot();
                c.advance();
                s
            })
            .collect();
        assert_eq!(seen, [0, 1, 0, 1, 0]);
        assert_eq!(c.frame(), 5);
    }
}
