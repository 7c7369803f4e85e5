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

//! The compute device contract used by the dispatcher.

use crate::compute::{
    BindGroupEntry, BindGroupId, BoxFuture, BufferDescriptor, BufferId, ComputePipelineDescriptor,
    ComputePipelineId, WorkgroupCount,
};
use crate::error::ComputeError;

/// A device able to compile compute pipelines, own buffers and dispatch workgroups.
///
/// All methods except the read-backs return once the work is
/// enqueued. Work submitted through one device executes in submission order.
pub trait ComputeDevice: Send + Sync {
    /// Largest one-dimensional workgroup size the device accepts.
    fn max_workgroup_size(&self) -> u32;

    /// Largest number of workgroups along one dispatch dimension.
    fn max_workgroups_per_dimension(&self) -> u32;

    /// Compiles a compute pipeline.
    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ComputeError>;

    /// Releases a compute pipeline.
    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ComputeError>;

    /// Allocates a buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ComputeError>;

    /// The size in bytes of a buffer.
    fn buffer_size(&self, id: BufferId) -> Result<u64, ComputeError>;

    /// Enqueues a write of `data` at `offset` into a buffer.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ComputeError>;

    /// Releases a buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ComputeError>;

    /// Binds buffers to group 0 of a pipeline.
    fn create_bind_group(
        &self,
        pipeline: ComputePipelineId,
        entries: &[BindGroupEntry],
    ) -> Result<BindGroupId, ComputeError>;

    /// Releases a bind group.
    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ComputeError>;

    /// Encodes and submits one compute pass. Does not wait for completion.
    fn dispatch(
        &self,
        pipeline: ComputePipelineId,
        bind_group: BindGroupId,
        workgroups: WorkgroupCount,
    ) -> Result<(), ComputeError>;

    /// Copies a range of a buffer to host memory.
    ///
    /// The returned future resolves once all previously submitted work has
    /// completed and the staging copy is mapped. It never times out.
    fn read_buffer(
        &self,
        id: BufferId,
        offset: u64,
        size: u64,
    ) -> BoxFuture<'static, Result<Vec<u8>, ComputeError>>;

    /// Copies the first `size` bytes of each listed buffer to host memory in
    /// one staging transfer, returning one byte vector per entry.
    ///
    /// Resolves like [`ComputeDevice::read_buffer`], with a single map for the
    /// whole set.
    fn read_buffers(
        &self,
        ranges: &[(BufferId, u64)],
    ) -> BoxFuture<'static, Result<Vec<Vec<u8>>, ComputeError>>;
}
