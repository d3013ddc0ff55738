// SPDX-License-Identifier: CEPL-1.0
//! Host-created buffers and shader modules, addressed by small handles.
use std::collections::HashMap;

use shaderapi_device::{IndexBufferHandle, ShaderStage, VertexBufferHandle};

use crate::buffers::GpuBuffer;
use crate::pipeline::ShaderModule;

/// Hands out ids from 1 upwards; ids are never reused.
#[derive(Debug)]
pub struct Registry<T> {
    next: u32,
    items: HashMap<u32, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            next: 0,
            items: HashMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn insert(&mut self, item: T) -> u32 {
        self.next += 1;
        self.items.insert(self.next, item);
        self.next
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.items.get(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<T> {
        self.items.remove(&id)
    }

}

/// A host-visible copy source plus how many elements it holds.
pub struct HostBuffer {
    pub buffer: GpuBuffer,
    pub len: u32,
}

pub struct ShaderEntry {
    pub stage: ShaderStage,
    pub module: ShaderModule,
}

#[derive(Default)]
pub struct Resources {
    pub vertex: Registry<HostBuffer>,
    pub index: Registry<HostBuffer>,
    pub shaders: Registry<ShaderEntry>,
}

impl Resources {
    pub fn vertex_buffer(&self, h: VertexBufferHandle) -> Option<&HostBuffer> {
        self.vertex.get(h.0)
    }

    pub fn index_buffer(&self, h: IndexBufferHandle) -> Option<&HostBuffer> {
        self.index.get(h.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_are_not_reused() {
        let mut r = Registry::default();
        let a = r.insert("a");
        let b = r.insert("b");
        assert_eq!((a, b), (1, 2));
        assert_eq!(r.remove(a), Some("a"));
        assert_eq!(r.remove(a), None);
        let c = r.insert("c");
        assert_eq!(c, 3);
        assert_eq!(r.get(b), Some(&"b"));
        assert_eq!(r.get(0), None);
        assert_eq!(r.get(c), Some(&"c"));
    }
}
