// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Backend-agnostic data types for compute pipelines, buffers and dispatches.

use bitflags::bitflags;
use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future, used for the read-back operation of compute devices.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The workgroup size every built-in kernel is compiled with.
pub const DEFAULT_WORKGROUP_SIZE: u32 = 64;

/// An opaque handle to a GPU buffer owned by a compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

/// An opaque handle to a compiled compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputePipelineId(pub usize);

/// An opaque handle to a set of buffers bound to a compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindGroupId(pub usize);

bitflags! {
    /// How a buffer will be used. Mirrors the usage flags of the GPU runtime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// The buffer can be bound as a read-write storage buffer.
        const STORAGE = 1 << 0;
        /// The buffer can be bound as a uniform buffer.
        const UNIFORM = 1 << 1;
        /// The buffer can be the source of a copy.
        const COPY_SRC = 1 << 2;
        /// The buffer can be the destination of a copy or a queue write.
        const COPY_DST = 1 << 3;
        /// The buffer can be used as a per-instance vertex buffer.
        const VERTEX = 1 << 4;
        /// The buffer can be mapped for reading on the host.
        const MAP_READ = 1 << 5;
    }
}

/// A descriptor for a GPU buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// An optional debug label.
    pub label: Option<String>,
    /// The size of the buffer in bytes.
    pub size: u64,
    /// The allowed usages of the buffer.
    pub usage: BufferUsage,
}

/// A descriptor used to compile a compute pipeline.
///
/// The device makes `workgroup_size` available to the shader as a
/// `WORKGROUP_SIZE` constant, so a single source can be compiled at several sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePipelineDescriptor {
    /// A descriptive label for the pipeline.
    pub label: String,
    /// WGSL source of the compute shader.
    pub source: String,
    /// The entry point function name.
    pub entry_point: String,
    /// The one-dimensional workgroup size.
    pub workgroup_size: u32,
}

impl ComputePipelineDescriptor {
    /// Creates a descriptor with the conventional `main` entry point.
    pub fn new(label: impl Into<String>, source: impl Into<String>, workgroup_size: u32) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            entry_point: "main".to_string(),
            workgroup_size,
        }
    }
}

/// One buffer binding inside a bind group (group 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupEntry {
    /// The `@binding` index in the shader.
    pub binding: u32,
    /// The buffer bound at that index.
    pub buffer: BufferId,
}

/// The number of workgroups to dispatch along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkgroupCount {
    /// Workgroups along X.
    pub x: u32,
    /// Workgroups along Y.
    pub y: u32,
    /// Workgroups along Z.
    pub z: u32,
}

impl WorkgroupCount {
    /// A one-dimensional dispatch covering `elements` invocations.
    pub fn for_elements(elements: u32, workgroup_size: u32) -> Self {
        let size = workgroup_size.max(1);
        Self {
            x: elements.div_ceil(size),
            y: 1,
            z: 1,
        }
    }

    /// Returns `true` if any axis is zero.
    pub fn is_empty(&self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroup_count_rounds_up() {
        assert_eq!(WorkgroupCount::for_elements(1000, 64).x, 16);
        assert_eq!(WorkgroupCount::for_elements(1024, 64).x, 16);
        assert_eq!(WorkgroupCount::for_elements(1025, 64).x, 17);
        assert!(WorkgroupCount::for_elements(0, 64).is_empty());
    }

    #[test]
    fn pipeline_descriptor_defaults_to_main() {
        let desc = ComputePipelineDescriptor::new("particles", "fn main() {}", 64);
        assert_eq!(desc.entry_point, "main");
        assert_eq!(desc.workgroup_size, 64);
    }

    #[test]
    fn buffer_usage_combines() {
        let usage = BufferUsage::STORAGE | BufferUsage::COPY_SRC;
        assert!(usage.contains(BufferUsage::STORAGE));
        assert!(!usage.contains(BufferUsage::UNIFORM));
    }
}
