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

//! Contracts for constructing and driving a render backend.

use crate::backend::{BackendDescription, BackendKind};
use crate::compute::BufferId;
use crate::error::{BackendError, ResourceError};
use crate::resource::{MaterialUniforms, MeshData};
use crate::traits::{ComputeDevice, GpuDevice};
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// An immutable GPU-side resource (uploaded geometry or material block).
pub trait GpuResource: Send + Sync + Debug {
    /// The debug label of the resource.
    fn label(&self) -> &str;

    /// GPU memory held by the resource, in bytes.
    fn byte_size(&self) -> u64;

    /// Allows downcasting to the concrete resource type.
    fn as_any(&self) -> &dyn Any;
}

/// An opaque handle to the per-instance buffers of an instanced batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceStorageId(pub usize);

/// The per-instance buffers backing one instanced batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceStorage {
    /// The backend-side handle.
    pub id: InstanceStorageId,
    /// Number of instance slots.
    pub capacity: usize,
    /// The transform buffer as seen by the compute device, modern backends only.
    pub transforms: Option<BufferId>,
    /// The colour buffer as seen by the compute device, modern backends only.
    pub colors: Option<BufferId>,
}

/// A constructed backend. Exactly one is alive per orchestrator.
pub trait RenderBackend: Send + Sync {
    /// The capability family of this backend.
    fn kind(&self) -> BackendKind;

    /// Human-readable information about the device.
    fn description(&self) -> BackendDescription;

    /// Returns `true` if the device was created with the named feature.
    fn supports_feature(&self, name: &str) -> bool;

    /// Largest instance capacity a single batch may have.
    fn max_instance_capacity(&self) -> usize;

    /// Uploads a mesh into immutable vertex and index buffers.
    fn build_geometry(
        &self,
        label: &str,
        mesh: &MeshData,
    ) -> Result<Arc<dyn GpuResource>, ResourceError>;

    /// Uploads a material uniform block.
    fn build_material(
        &self,
        label: &str,
        uniforms: &MaterialUniforms,
    ) -> Result<Arc<dyn GpuResource>, ResourceError>;

    /// Allocates transform and colour buffers for `capacity` instances.
    fn create_instance_storage(&self, capacity: usize) -> Result<InstanceStorage, ResourceError>;

    /// Replaces the whole content of an instance storage.
    ///
    /// `transforms` holds `capacity` column-major 4x4 matrices, `colors` holds
    /// `capacity` RGBA values.
    fn upload_instances(
        &self,
        storage: &InstanceStorage,
        transforms: &[u8],
        colors: &[u8],
    ) -> Result<(), ResourceError>;

    /// Frees an instance storage. Unknown handles are ignored.
    fn release_instance_storage(&self, storage: &InstanceStorage);

    /// The compute device sharing this backend's GPU, modern backends only.
    fn compute_device(&self) -> Option<Arc<dyn ComputeDevice>>;

    /// Releases every GPU object still owned by the backend.
    fn shutdown(&self);
}

/// Constructs backends. The modern constructor may reuse the device acquired during detection.
pub trait BackendFactory: Send + Sync {
    /// Builds the modern backend.
    fn create_modern(
        &self,
        device: Option<Arc<dyn GpuDevice>>,
    ) -> Result<Arc<dyn RenderBackend>, BackendError>;

    /// Builds the legacy backend.
    fn create_legacy(&self) -> Result<Arc<dyn RenderBackend>, BackendError>;
}
