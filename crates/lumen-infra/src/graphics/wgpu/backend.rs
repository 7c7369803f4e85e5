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

//! The modern and legacy render backends.
//!
//! Both are the same type tagged with a [`BackendKind`]: the modern one runs on
//! a primary API and shares its instance buffers with a [`WgpuComputeDevice`],
//! the legacy one runs on GL with WebGL2-level limits and never uses compute.

use super::compute::WgpuComputeDevice;
use super::context::WgpuDeviceContext;
use lumen_core::compute::{BufferDescriptor, BufferId, BufferUsage};
use lumen_core::resource::{
    IndexFormat, MaterialUniforms, MeshData, COLOR_STRIDE, TRANSFORM_STRIDE,
};
use lumen_core::traits::{
    ComputeDevice, GpuResource, InstanceStorage, InstanceStorageId, RenderBackend,
};
use lumen_core::{BackendDescription, BackendKind, ResourceError};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wgpu::util::DeviceExt;

/// Uploaded vertex and index buffers of one geometry.
#[derive(Debug)]
pub struct WgpuMesh {
    /// Debug label.
    pub label: String,
    /// Interleaved position, normal and UV data.
    pub vertex_buffer: wgpu::Buffer,
    /// Triangle indices.
    pub index_buffer: wgpu::Buffer,
    /// Width of the indices.
    pub index_format: wgpu::IndexFormat,
    /// Number of indices to draw.
    pub index_count: u32,
}

impl GpuResource for WgpuMesh {
    fn label(&self) -> &str {
        &self.label
    }

    fn byte_size(&self) -> u64 {
        self.vertex_buffer.size() + self.index_buffer.size()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The uploaded uniform block of one material.
#[derive(Debug)]
pub struct WgpuMaterialBlock {
    /// Debug label.
    pub label: String,
    /// The packed material uniforms.
    pub uniform_buffer: wgpu::Buffer,
}

impl GpuResource for WgpuMaterialBlock {
    fn label(&self) -> &str {
        &self.label
    }

    fn byte_size(&self) -> u64 {
        self.uniform_buffer.size()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

enum InstanceBuffers {
    /// Registered with the compute device so kernels can write them.
    Shared {
        transforms: BufferId,
        colors: BufferId,
    },
    /// Owned directly, legacy backends only.
    Owned {
        transforms: Arc<wgpu::Buffer>,
        colors: Arc<wgpu::Buffer>,
    },
}

/// A `wgpu` render backend of either kind.
pub struct WgpuRenderBackend {
    kind: BackendKind,
    context: Arc<WgpuDeviceContext>,
    compute: Option<Arc<WgpuComputeDevice>>,
    narrow_indices: bool,
    instance_storages: Mutex<HashMap<InstanceStorageId, InstanceBuffers>>,
    next_storage_id: AtomicUsize,
}

impl WgpuRenderBackend {
    /// A modern backend with a compute device on the same logical device.
    pub fn modern(context: Arc<WgpuDeviceContext>) -> Self {
        let compute = Arc::new(WgpuComputeDevice::new(Arc::clone(&context)));
        Self::with_parts(BackendKind::Modern, context, Some(compute), false)
    }

    /// A legacy backend. `narrow_indices` selects 16-bit indices whenever they fit.
    pub fn legacy(context: Arc<WgpuDeviceContext>, narrow_indices: bool) -> Self {
        Self::with_parts(BackendKind::Legacy, context, None, narrow_indices)
    }

    fn with_parts(
        kind: BackendKind,
        context: Arc<WgpuDeviceContext>,
        compute: Option<Arc<WgpuComputeDevice>>,
        narrow_indices: bool,
    ) -> Self {
        Self {
            kind,
            context,
            compute,
            narrow_indices,
            instance_storages: Mutex::new(HashMap::new()),
            next_storage_id: AtomicUsize::new(0),
        }
    }

    /// The logical device of this backend.
    pub fn context(&self) -> &Arc<WgpuDeviceContext> {
        &self.context
    }

    /// Returns the transform and colour buffers of an instance storage, for drawing.
    pub fn instance_buffers(
        &self,
        id: InstanceStorageId,
    ) -> Option<(Arc<wgpu::Buffer>, Arc<wgpu::Buffer>)> {
        let storages = self.instance_storages.lock().ok()?;
        match storages.get(&id)? {
            InstanceBuffers::Shared { transforms, colors } => {
                let compute = self.compute.as_ref()?;
                Some((compute.wgpu_buffer(*transforms)?, compute.wgpu_buffer(*colors)?))
            }
            InstanceBuffers::Owned { transforms, colors } => {
                Some((Arc::clone(transforms), Arc::clone(colors)))
            }
        }
    }

    fn storages(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<InstanceStorageId, InstanceBuffers>>, ResourceError>
    {
        self.instance_storages.lock().map_err(|e| {
            ResourceError::BackendError(format!("Failed to lock instance storages: {e}"))
        })
    }
}

impl RenderBackend for WgpuRenderBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn description(&self) -> BackendDescription {
        self.context.description()
    }

    fn supports_feature(&self, name: &str) -> bool {
        match name {
            "compute" => self.compute.is_some(),
            _ => self.context.has_feature(name),
        }
    }

    fn max_instance_capacity(&self) -> usize {
        let limits = &self.context.limits;
        let mut max_bytes = limits.max_buffer_size;
        if self.kind == BackendKind::Modern {
            max_bytes = max_bytes.min(u64::from(limits.max_storage_buffer_binding_size));
        }
        (max_bytes / TRANSFORM_STRIDE as u64) as usize
    }

    fn build_geometry(
        &self,
        label: &str,
        mesh: &MeshData,
    ) -> Result<Arc<dyn GpuResource>, ResourceError> {
        if mesh.positions.is_empty() || mesh.indices.is_empty() {
            return Err(ResourceError::InvalidDescriptor(format!(
                "geometry '{label}' has no triangles"
            )));
        }
        let format = if self.narrow_indices {
            mesh.preferred_index_format()
        } else {
            IndexFormat::Uint32
        };
        let device = &self.context.device;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: &mesh.interleaved_vertices(),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let mut index_bytes = mesh.index_bytes(format);
        // Buffer sizes must be 4-byte multiples; an odd u16 count gets one padding index.
        index_bytes.resize(index_bytes.len().next_multiple_of(4), 0);
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: &index_bytes,
            usage: wgpu::BufferUsages::INDEX,
        });
        log::debug!(
            "{} backend: Uploaded geometry '{}' ({} vertices, {:?})",
            self.kind,
            label,
            mesh.vertex_count(),
            format
        );
        Ok(Arc::new(WgpuMesh {
            label: label.to_string(),
            vertex_buffer,
            index_buffer,
            index_format: match format {
                IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
                IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
            },
            index_count: mesh.indices.len() as u32,
        }))
    }

    fn build_material(
        &self,
        label: &str,
        uniforms: &MaterialUniforms,
    ) -> Result<Arc<dyn GpuResource>, ResourceError> {
        let uniform_buffer =
            self.context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::bytes_of(uniforms),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
        Ok(Arc::new(WgpuMaterialBlock {
            label: label.to_string(),
            uniform_buffer,
        }))
    }

    fn create_instance_storage(&self, capacity: usize) -> Result<InstanceStorage, ResourceError> {
        let transform_bytes = (capacity * TRANSFORM_STRIDE) as u64;
        let color_bytes = (capacity * COLOR_STRIDE) as u64;
        let id = InstanceStorageId(self.next_storage_id.fetch_add(1, Ordering::Relaxed));

        let (buffers, storage) = match &self.compute {
            Some(compute) => {
                let usage = BufferUsage::STORAGE
                    | BufferUsage::VERTEX
                    | BufferUsage::COPY_DST
                    | BufferUsage::COPY_SRC;
                let transforms = compute.create_buffer(&BufferDescriptor {
                    label: Some(format!("instance transforms {}", id.0)),
                    size: transform_bytes,
                    usage,
                })?;
                let colors = match compute.create_buffer(&BufferDescriptor {
                    label: Some(format!("instance colors {}", id.0)),
                    size: color_bytes,
                    usage,
                }) {
                    Ok(colors) => colors,
                    Err(e) => {
                        let _ = compute.destroy_buffer(transforms);
                        return Err(e.into());
                    }
                };
                (
                    InstanceBuffers::Shared { transforms, colors },
                    InstanceStorage {
                        id,
                        capacity,
                        transforms: Some(transforms),
                        colors: Some(colors),
                    },
                )
            }
            None => {
                let device = &self.context.device;
                let make = |what: &str, size: u64| {
                    Arc::new(device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some(&format!("instance {what} {}", id.0)),
                        size,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    }))
                };
                (
                    InstanceBuffers::Owned {
                        transforms: make("transforms", transform_bytes),
                        colors: make("colors", color_bytes),
                    },
                    InstanceStorage {
                        id,
                        capacity,
                        transforms: None,
                        colors: None,
                    },
                )
            }
        };
        self.storages()?.insert(id, buffers);
        log::debug!(
            "{} backend: Created instance storage {:?} for {} instances",
            self.kind,
            id,
            capacity
        );
        Ok(storage)
    }

    fn upload_instances(
        &self,
        storage: &InstanceStorage,
        transforms: &[u8],
        colors: &[u8],
    ) -> Result<(), ResourceError> {
        let storages = self.storages()?;
        let buffers = storages
            .get(&storage.id)
            .ok_or_else(|| ResourceError::NotFound(format!("instance storage {:?}", storage.id)))?;
        match buffers {
            InstanceBuffers::Shared {
                transforms: t,
                colors: c,
            } => {
                let compute = self.compute.as_ref().ok_or_else(|| {
                    ResourceError::BackendError("shared storage without compute".to_string())
                })?;
                compute.write_buffer(*t, 0, transforms)?;
                compute.write_buffer(*c, 0, colors)?;
            }
            InstanceBuffers::Owned {
                transforms: t,
                colors: c,
            } => {
                if transforms.len() as u64 > t.size() || colors.len() as u64 > c.size() {
                    return Err(ResourceError::BackendError(format!(
                        "instance upload larger than storage {:?}",
                        storage.id
                    )));
                }
                self.context.queue.write_buffer(t, 0, transforms);
                self.context.queue.write_buffer(c, 0, colors);
            }
        }
        Ok(())
    }

    fn release_instance_storage(&self, storage: &InstanceStorage) {
        let Ok(mut storages) = self.instance_storages.lock() else {
            log::error!("Instance storage registry poisoned, leaking {:?}", storage.id);
            return;
        };
        match storages.remove(&storage.id) {
            Some(InstanceBuffers::Shared { transforms, colors }) => {
                if let Some(compute) = &self.compute {
                    let _ = compute.destroy_buffer(transforms);
                    let _ = compute.destroy_buffer(colors);
                }
            }
            Some(InstanceBuffers::Owned { transforms, colors }) => {
                transforms.destroy();
                colors.destroy();
            }
            None => {}
        }
    }

    fn compute_device(&self) -> Option<Arc<dyn ComputeDevice>> {
        self.compute
            .as_ref()
            .map(|c| Arc::clone(c) as Arc<dyn ComputeDevice>)
    }

    fn shutdown(&self) {
        // Instance storages belong to caller-owned batches; their drop releases them.
        let retained: HashSet<BufferId> = match self.instance_storages.lock() {
            Ok(storages) => storages
                .values()
                .filter_map(|buffers| match buffers {
                    InstanceBuffers::Shared { transforms, colors } => Some([*transforms, *colors]),
                    InstanceBuffers::Owned { .. } => None,
                })
                .flatten()
                .collect(),
            Err(_) => HashSet::new(),
        };
        if let Some(compute) = &self.compute {
            compute.clear_retaining(&retained);
        }
        self.context.poll_blocking();
        log::info!(
            "{} backend shut down, {} instance storages left with their batches",
            self.kind,
            self.instance_storages.lock().map(|s| s.len()).unwrap_or(0)
        );
    }
}
