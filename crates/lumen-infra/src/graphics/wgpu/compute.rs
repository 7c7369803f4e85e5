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

//! `wgpu` implementation of the compute device contract.

use super::context::WgpuDeviceContext;
use super::conversions::IntoWgpu;
use lumen_core::compute::{
    BindGroupEntry, BindGroupId, BoxFuture, BufferDescriptor, BufferId, ComputePipelineDescriptor,
    ComputePipelineId, WorkgroupCount,
};
use lumen_core::traits::ComputeDevice;
use lumen_core::ComputeError;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

struct MapReadState {
    result: Mutex<Option<Result<(), ComputeError>>>,
    waker: Mutex<Option<Waker>>,
}

/// Resolves once a staging buffer is mapped, then copies it out.
///
/// `wgpu` only runs map callbacks while the device is polled, so the future
/// polls the device without blocking and asks to be polled again until the
/// callback fires.
struct ReadBackFuture {
    state: Arc<MapReadState>,
    staging: wgpu::Buffer,
    context: Arc<WgpuDeviceContext>,
}

impl ReadBackFuture {
    fn take_result(&self) -> Option<Result<(), ComputeError>> {
        match self.state.result.lock() {
            Ok(mut guard) => guard.take(),
            Err(e) => Some(Err(ComputeError::MapFailed(format!(
                "read-back state poisoned: {e}"
            )))),
        }
    }

    fn finish(&self, result: Result<(), ComputeError>) -> Result<Vec<u8>, ComputeError> {
        result?;
        let bytes = self.staging.slice(..).get_mapped_range().to_vec();
        self.staging.unmap();
        Ok(bytes)
    }
}

impl Future for ReadBackFuture {
    type Output = Result<Vec<u8>, ComputeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.take_result() {
            return Poll::Ready(self.finish(result));
        }
        if let Ok(mut waker) = self.state.waker.lock() {
            *waker = Some(cx.waker().clone());
        }
        if let Err(e) = self.context.device.poll(wgpu::PollType::Poll) {
            return Poll::Ready(Err(ComputeError::MapFailed(format!("{e:?}"))));
        }
        if let Some(result) = self.take_result() {
            return Poll::Ready(self.finish(result));
        }
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

struct BufferEntry {
    buffer: Arc<wgpu::Buffer>,
    size: u64,
}

struct PipelineEntry {
    label: String,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

/// Compiles compute pipelines and owns the buffers and bind groups they use.
///
/// Resources are kept in registries keyed by opaque IDs, so the control layer
/// never sees a `wgpu` type.
pub struct WgpuComputeDevice {
    context: Arc<WgpuDeviceContext>,
    buffers: Mutex<HashMap<BufferId, BufferEntry>>,
    pipelines: Mutex<HashMap<ComputePipelineId, PipelineEntry>>,
    bind_groups: Mutex<HashMap<BindGroupId, wgpu::BindGroup>>,
    next_buffer_id: AtomicUsize,
    next_pipeline_id: AtomicUsize,
    next_bind_group_id: AtomicUsize,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ComputeError> {
    mutex
        .lock()
        .map_err(|e| ComputeError::Backend(format!("Failed to lock {what} registry: {e}")))
}

impl WgpuComputeDevice {
    /// Creates an empty compute device on top of a logical device.
    pub fn new(context: Arc<WgpuDeviceContext>) -> Self {
        Self {
            context,
            buffers: Mutex::new(HashMap::new()),
            pipelines: Mutex::new(HashMap::new()),
            bind_groups: Mutex::new(HashMap::new()),
            next_buffer_id: AtomicUsize::new(0),
            next_pipeline_id: AtomicUsize::new(0),
            next_bind_group_id: AtomicUsize::new(0),
        }
    }

    /// Returns a clone of the underlying buffer, for vertex binding by the backend.
    pub fn wgpu_buffer(&self, id: BufferId) -> Option<Arc<wgpu::Buffer>> {
        self.buffers
            .lock()
            .ok()?
            .get(&id)
            .map(|entry| Arc::clone(&entry.buffer))
    }

    /// Number of live buffers, pipelines and bind groups.
    pub fn resource_counts(&self) -> (usize, usize, usize) {
        let count = |n: Result<usize, ComputeError>| n.unwrap_or(0);
        (
            count(lock(&self.buffers, "buffer").map(|m| m.len())),
            count(lock(&self.pipelines, "pipeline").map(|m| m.len())),
            count(lock(&self.bind_groups, "bind group").map(|m| m.len())),
        )
    }

    /// Drops every registered resource.
    pub fn clear(&self) {
        self.clear_retaining(&HashSet::new());
    }

    /// Drops every registered resource except the buffers in `keep`.
    pub fn clear_retaining(&self, keep: &HashSet<BufferId>) {
        if let Ok(mut groups) = self.bind_groups.lock() {
            groups.clear();
        }
        if let Ok(mut pipelines) = self.pipelines.lock() {
            pipelines.clear();
        }
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.retain(|id, entry| {
                let kept = keep.contains(id);
                if !kept {
                    entry.buffer.destroy();
                }
                kept
            });
        }
    }

    /// Copies every `(buffer, offset, size)` range into one staging buffer,
    /// maps it once and splits the bytes back per range.
    fn read_ranges(
        &self,
        ranges: &[(BufferId, u64, u64)],
    ) -> BoxFuture<'static, Result<Vec<Vec<u8>>, ComputeError>> {
        let mut sources = Vec::with_capacity(ranges.len());
        for &(id, offset, size) in ranges {
            if let Err(e) = self.check_range(id, offset, size) {
                return Box::pin(async move { Err(e) });
            }
            if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || size % wgpu::COPY_BUFFER_ALIGNMENT != 0
            {
                return Box::pin(async move {
                    Err(ComputeError::Backend(format!(
                        "read of {size} bytes at offset {offset} is not 4-byte aligned"
                    )))
                });
            }
            match self.wgpu_buffer(id) {
                Some(buffer) => sources.push((buffer, offset, size)),
                None => return Box::pin(async move { Err(ComputeError::BufferNotFound(id)) }),
            }
        }
        let sizes: Vec<u64> = sources.iter().map(|&(_, _, size)| size).collect();
        let total: u64 = sizes.iter().sum();
        if total == 0 {
            return Box::pin(async move { Ok(sizes.iter().map(|_| Vec::new()).collect()) });
        }

        let device = &self.context.device;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lumen read-back staging"),
            size: total,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lumen read-back"),
        });
        let mut at = 0;
        for (source, offset, size) in &sources {
            if *size > 0 {
                encoder.copy_buffer_to_buffer(source, *offset, &staging, at, *size);
            }
            at += size;
        }
        self.context.queue.submit(Some(encoder.finish()));

        let state = Arc::new(MapReadState {
            result: Mutex::new(None),
            waker: Mutex::new(None),
        });
        let callback_state = Arc::clone(&state);
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let result =
                    result.map_err(|e| ComputeError::MapFailed(format!("map_async failed: {e}")));
                if let Ok(mut slot) = callback_state.result.lock() {
                    *slot = Some(result);
                }
                if let Some(waker) = callback_state
                    .waker
                    .lock()
                    .ok()
                    .and_then(|mut waker| waker.take())
                {
                    waker.wake();
                }
            });

        let mapped = ReadBackFuture {
            state,
            staging,
            context: Arc::clone(&self.context),
        };
        Box::pin(async move {
            let bytes = mapped.await?;
            let mut parts = Vec::with_capacity(sizes.len());
            let mut at = 0;
            for size in sizes {
                let end = at + size as usize;
                parts.push(bytes[at..end].to_vec());
                at = end;
            }
            Ok(parts)
        })
    }

    fn check_range(&self, id: BufferId, offset: u64, len: u64) -> Result<(), ComputeError> {
        let size = self.buffer_size(id)?;
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(ComputeError::OutOfBounds {
                buffer: id,
                offset,
                len,
                size,
            }),
        }
    }
}

impl ComputeDevice for WgpuComputeDevice {
    fn max_workgroup_size(&self) -> u32 {
        let limits = &self.context.limits;
        limits
            .max_compute_workgroup_size_x
            .min(limits.max_compute_invocations_per_workgroup)
    }

    fn max_workgroups_per_dimension(&self) -> u32 {
        self.context.limits.max_compute_workgroups_per_dimension
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ComputeError> {
        let max = self.max_workgroup_size();
        if descriptor.workgroup_size == 0 || descriptor.workgroup_size > max {
            return Err(ComputeError::InvalidWorkgroupSize {
                requested: descriptor.workgroup_size,
                max,
            });
        }

        let source = format!(
            "const WORKGROUP_SIZE: u32 = {}u;\n{}",
            descriptor.workgroup_size, descriptor.source
        );
        let device = &self.context.device;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&descriptor.label),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&descriptor.label),
            layout: None,
            module: &module,
            entry_point: Some(&descriptor.entry_point),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(ComputeError::CompilationFailed {
                label: descriptor.label.clone(),
                details: error.to_string(),
            });
        }
        let layout = pipeline.get_bind_group_layout(0);

        let id = ComputePipelineId(self.next_pipeline_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.pipelines, "pipeline")?.insert(
            id,
            PipelineEntry {
                label: descriptor.label.clone(),
                pipeline,
                layout,
            },
        );
        log::info!(
            "WgpuComputeDevice: Compiled pipeline '{}' (workgroup size {}) with ID: {:?}",
            descriptor.label,
            descriptor.workgroup_size,
            id
        );
        Ok(id)
    }

    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ComputeError> {
        lock(&self.pipelines, "pipeline")?
            .remove(&id)
            .map(|entry| log::debug!("WgpuComputeDevice: Destroyed pipeline '{}'", entry.label))
            .ok_or(ComputeError::PipelineNotFound(id))
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ComputeError> {
        // Copies and storage bindings need a 4-byte multiple.
        let size = descriptor.size.max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let max = self.context.limits.max_buffer_size;
        if size > max {
            return Err(ComputeError::Backend(format!(
                "buffer of {size} bytes exceeds the device maximum of {max}"
            )));
        }
        let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size,
            usage: descriptor.usage.into_wgpu(),
            mapped_at_creation: false,
        });
        let id = BufferId(self.next_buffer_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.buffers, "buffer")?.insert(
            id,
            BufferEntry {
                buffer: Arc::new(buffer),
                size,
            },
        );
        log::debug!(
            "WgpuComputeDevice: Created buffer '{}' with ID: {:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            descriptor.size
        );
        Ok(id)
    }

    fn buffer_size(&self, id: BufferId) -> Result<u64, ComputeError> {
        lock(&self.buffers, "buffer")?
            .get(&id)
            .map(|entry| entry.size)
            .ok_or(ComputeError::BufferNotFound(id))
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ComputeError> {
        self.check_range(id, offset, data.len() as u64)?;
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0
            || data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT != 0
        {
            return Err(ComputeError::Backend(format!(
                "write of {} bytes at offset {offset} is not 4-byte aligned",
                data.len()
            )));
        }
        let buffers = lock(&self.buffers, "buffer")?;
        let entry = buffers.get(&id).ok_or(ComputeError::BufferNotFound(id))?;
        self.context.queue.write_buffer(&entry.buffer, offset, data);
        log::trace!(
            "WgpuComputeDevice: Wrote {} bytes to buffer ID: {:?} at offset {}",
            data.len(),
            id,
            offset
        );
        Ok(())
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ComputeError> {
        let entry = lock(&self.buffers, "buffer")?
            .remove(&id)
            .ok_or(ComputeError::BufferNotFound(id))?;
        entry.buffer.destroy();
        log::debug!("WgpuComputeDevice: Destroyed buffer with ID: {id:?}");
        Ok(())
    }

    fn create_bind_group(
        &self,
        pipeline: ComputePipelineId,
        entries: &[BindGroupEntry],
    ) -> Result<BindGroupId, ComputeError> {
        let pipelines = lock(&self.pipelines, "pipeline")?;
        let pipeline_entry = pipelines
            .get(&pipeline)
            .ok_or(ComputeError::PipelineNotFound(pipeline))?;
        let buffers = lock(&self.buffers, "buffer")?;
        let resolved = entries
            .iter()
            .map(|entry| {
                buffers
                    .get(&entry.buffer)
                    .map(|b| (entry.binding, Arc::clone(&b.buffer)))
                    .ok_or(ComputeError::BufferNotFound(entry.buffer))
            })
            .collect::<Result<Vec<_>, _>>()?;
        drop(buffers);

        let wgpu_entries: Vec<wgpu::BindGroupEntry> = resolved
            .iter()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&pipeline_entry.label),
            layout: &pipeline_entry.layout,
            entries: &wgpu_entries,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(ComputeError::Backend(format!(
                "bind group for '{}' is invalid: {error}",
                pipeline_entry.label
            )));
        }
        drop(pipelines);

        let id = BindGroupId(self.next_bind_group_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.bind_groups, "bind group")?.insert(id, bind_group);
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ComputeError> {
        lock(&self.bind_groups, "bind group")?
            .remove(&id)
            .map(|_| ())
            .ok_or(ComputeError::BindGroupNotFound(id))
    }

    fn dispatch(
        &self,
        pipeline: ComputePipelineId,
        bind_group: BindGroupId,
        workgroups: WorkgroupCount,
    ) -> Result<(), ComputeError> {
        let max = self.max_workgroups_per_dimension();
        if workgroups.is_empty() {
            return Err(ComputeError::InvalidDispatch(format!(
                "empty dispatch {workgroups:?}"
            )));
        }
        if workgroups.x > max || workgroups.y > max || workgroups.z > max {
            return Err(ComputeError::InvalidDispatch(format!(
                "{workgroups:?} exceeds {max} workgroups per dimension"
            )));
        }

        let pipelines = lock(&self.pipelines, "pipeline")?;
        let pipeline_entry = pipelines
            .get(&pipeline)
            .ok_or(ComputeError::PipelineNotFound(pipeline))?;
        let groups = lock(&self.bind_groups, "bind group")?;
        let group = groups
            .get(&bind_group)
            .ok_or(ComputeError::BindGroupNotFound(bind_group))?;

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some(&pipeline_entry.label),
                });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&pipeline_entry.label),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline_entry.pipeline);
            pass.set_bind_group(0, group, &[]);
            pass.dispatch_workgroups(workgroups.x, workgroups.y, workgroups.z);
        }
        self.context.queue.submit(Some(encoder.finish()));
        log::trace!(
            "WgpuComputeDevice: Dispatched '{}' with {:?}",
            pipeline_entry.label,
            workgroups
        );
        Ok(())
    }

    fn read_buffer(
        &self,
        id: BufferId,
        offset: u64,
        size: u64,
    ) -> BoxFuture<'static, Result<Vec<u8>, ComputeError>> {
        let read = self.read_ranges(&[(id, offset, size)]);
        Box::pin(async move { Ok(read.await?.into_iter().next().unwrap_or_default()) })
    }

    fn read_buffers(
        &self,
        ranges: &[(BufferId, u64)],
    ) -> BoxFuture<'static, Result<Vec<Vec<u8>>, ComputeError>> {
        let ranges: Vec<_> = ranges.iter().map(|&(id, size)| (id, 0, size)).collect();
        self.read_ranges(&ranges)
    }
}

impl Drop for WgpuComputeDevice {
    fn drop(&mut self) {
        self.clear();
    }
}
