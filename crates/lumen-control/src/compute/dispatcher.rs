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

//! Pipeline caching and resource tracking on top of a [`ComputeDevice`].

use lumen_core::compute::{
    BindGroupEntry, BindGroupId, BoxFuture, BufferDescriptor, BufferId, BufferUsage,
    ComputePipelineDescriptor, ComputePipelineId, WorkgroupCount,
};
use lumen_core::resource::fnv1a_64;
use lumen_core::traits::ComputeDevice;
use lumen_core::ComputeError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    source_hash: u64,
    workgroup_size: u32,
}

struct CachedPipeline {
    source: String,
    id: ComputePipelineId,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ComputeError> {
    mutex
        .lock()
        .map_err(|e| ComputeError::Backend(format!("Failed to lock {what}: {e}")))
}

/// Compiles compute pipelines once per `(source, workgroup size)` and tracks
/// the buffers and bind groups created through it.
///
/// Only exists while the modern backend is active. Every method except
/// the read-backs returns as soon as the work is enqueued.
pub struct ComputeDispatcher {
    device: Arc<dyn ComputeDevice>,
    pipelines: Mutex<HashMap<PipelineKey, Vec<CachedPipeline>>>,
    buffers: Mutex<HashSet<BufferId>>,
    bind_groups: Mutex<HashSet<BindGroupId>>,
    compilations: AtomicUsize,
}

impl ComputeDispatcher {
    /// Creates a dispatcher over the compute device of the active backend.
    pub fn new(device: Arc<dyn ComputeDevice>) -> Self {
        Self {
            device,
            pipelines: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashSet::new()),
            bind_groups: Mutex::new(HashSet::new()),
            compilations: AtomicUsize::new(0),
        }
    }

    /// The underlying compute device.
    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }

    /// Returns the pipeline compiled from `source` at `workgroup_size`,
    /// compiling it on the first request.
    ///
    /// The cache is keyed on a hash of the source; the full source is compared
    /// on lookup so a collision only costs an extra compilation.
    pub fn get_or_create_pipeline(
        &self,
        label: &str,
        source: &str,
        workgroup_size: u32,
    ) -> Result<ComputePipelineId, ComputeError> {
        let key = PipelineKey {
            source_hash: fnv1a_64(source.as_bytes()),
            workgroup_size,
        };
        let mut pipelines = lock(&self.pipelines, "pipeline cache")?;
        let entries = pipelines.entry(key).or_default();
        if let Some(hit) = entries.iter().find(|p| p.source == source) {
            log::trace!("Pipeline cache hit for '{label}' ({:?})", hit.id);
            return Ok(hit.id);
        }

        let id = self
            .device
            .create_compute_pipeline(&ComputePipelineDescriptor::new(
                label,
                source,
                workgroup_size,
            ))?;
        self.compilations.fetch_add(1, Ordering::SeqCst);
        entries.push(CachedPipeline {
            source: source.to_string(),
            id,
        });
        Ok(id)
    }

    /// Allocates a buffer of `size` bytes.
    pub fn create_buffer(
        &self,
        label: &str,
        size: u64,
        usage: BufferUsage,
    ) -> Result<BufferId, ComputeError> {
        let id = self.device.create_buffer(&BufferDescriptor {
            label: Some(label.to_string()),
            size,
            usage,
        })?;
        lock(&self.buffers, "buffer set")?.insert(id);
        Ok(id)
    }

    /// Enqueues a write into a buffer.
    pub fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ComputeError> {
        self.device.write_buffer(id, offset, data)
    }

    /// Binds buffers to group 0 of a pipeline.
    pub fn create_bind_group(
        &self,
        pipeline: ComputePipelineId,
        entries: &[BindGroupEntry],
    ) -> Result<BindGroupId, ComputeError> {
        let id = self.device.create_bind_group(pipeline, entries)?;
        lock(&self.bind_groups, "bind group set")?.insert(id);
        Ok(id)
    }

    /// Enqueues one compute pass. Completion is not awaited.
    pub fn dispatch(
        &self,
        pipeline: ComputePipelineId,
        bind_group: BindGroupId,
        workgroups: WorkgroupCount,
    ) -> Result<(), ComputeError> {
        self.device.dispatch(pipeline, bind_group, workgroups)
    }

    /// Enqueues enough workgroups of `workgroup_size` to cover `elements`.
    pub fn dispatch_elements(
        &self,
        pipeline: ComputePipelineId,
        bind_group: BindGroupId,
        elements: u32,
        workgroup_size: u32,
    ) -> Result<(), ComputeError> {
        let workgroups = WorkgroupCount::for_elements(elements, workgroup_size);
        if workgroups.x > self.device.max_workgroups_per_dimension() {
            return Err(ComputeError::InvalidDispatch(format!(
                "{elements} elements need {} workgroups of {workgroup_size}",
                workgroups.x
            )));
        }
        self.dispatch(pipeline, bind_group, workgroups)
    }

    /// Reads the first `size` bytes of a buffer back to the host.
    ///
    /// The future resolves after every previously enqueued dispatch finished.
    /// It has no timeout; a lost device leaves it pending.
    pub fn read_buffer(
        &self,
        id: BufferId,
        size: u64,
    ) -> BoxFuture<'static, Result<Vec<u8>, ComputeError>> {
        self.device.read_buffer(id, 0, size)
    }

    /// Reads `size` bytes starting at `offset`.
    pub fn read_buffer_range(
        &self,
        id: BufferId,
        offset: u64,
        size: u64,
    ) -> BoxFuture<'static, Result<Vec<u8>, ComputeError>> {
        self.device.read_buffer(id, offset, size)
    }

    /// Reads the first `size` bytes of several buffers with a single map.
    pub fn read_buffers(
        &self,
        ranges: &[(BufferId, u64)],
    ) -> BoxFuture<'static, Result<Vec<Vec<u8>>, ComputeError>> {
        self.device.read_buffers(ranges)
    }

    /// Releases a buffer created through this dispatcher.
    pub fn destroy_buffer(&self, id: BufferId) -> Result<(), ComputeError> {
        lock(&self.buffers, "buffer set")?.remove(&id);
        self.device.destroy_buffer(id)
    }

    /// Releases a bind group created through this dispatcher.
    pub fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ComputeError> {
        lock(&self.bind_groups, "bind group set")?.remove(&id);
        self.device.destroy_bind_group(id)
    }

    /// Number of cached pipelines.
    pub fn pipeline_count(&self) -> usize {
        lock(&self.pipelines, "pipeline cache")
            .map(|p| p.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Number of pipelines compiled so far.
    pub fn compilation_count(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    /// Number of live buffers created through this dispatcher.
    pub fn buffer_count(&self) -> usize {
        lock(&self.buffers, "buffer set").map(|b| b.len()).unwrap_or(0)
    }

    /// Releases every pipeline, bind group and buffer the dispatcher tracks.
    pub fn dispose(&self) {
        if let Ok(mut groups) = self.bind_groups.lock() {
            for id in groups.drain() {
                if let Err(e) = self.device.destroy_bind_group(id) {
                    log::debug!("Bind group already gone: {e}");
                }
            }
        }
        if let Ok(mut buffers) = self.buffers.lock() {
            for id in buffers.drain() {
                if let Err(e) = self.device.destroy_buffer(id) {
                    log::debug!("Buffer already gone: {e}");
                }
            }
        }
        if let Ok(mut pipelines) = self.pipelines.lock() {
            for (_, entries) in pipelines.drain() {
                for entry in entries {
                    if let Err(e) = self.device.destroy_compute_pipeline(entry.id) {
                        log::debug!("Pipeline already gone: {e}");
                    }
                }
            }
        }
        log::info!("Compute dispatcher disposed");
    }
}
