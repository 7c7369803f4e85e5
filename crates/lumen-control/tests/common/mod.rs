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

//! In-memory runtime, backends and compute device shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use glam::{Mat3, Mat4, Vec3};
use lumen_control::compute::shaders::{INSTANCE_COMPOSE_WGSL, ORBITAL_WGSL, PARTICLES_WGSL};
use lumen_control::compute::{orbital_position, respawn_values};
use lumen_core::capability::{feature, limit, AdapterInfo};
use lumen_core::compute::{
    BindGroupEntry, BindGroupId, BoxFuture, BufferDescriptor, BufferId, BufferUsage,
    ComputePipelineDescriptor, ComputePipelineId, WorkgroupCount,
};
use lumen_core::resource::{MaterialUniforms, MeshData};
use lumen_core::traits::{
    BackendFactory, ComputeDevice, GpuAdapter, GpuDevice, GpuResource, GpuRuntime,
    InstanceStorage, InstanceStorageId, RenderBackend,
};
use lumen_core::{
    BackendDescription, BackendError, BackendKind, ComputeError, DetectionError, GraphicsApi,
    RendererDeviceType, ResourceError,
};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Limits of a device that meets the recommended profile with room to spare.
pub fn capable_limits() -> BTreeMap<String, u64> {
    [
        (limit::MAX_TEXTURE_DIMENSION_2D, 16384),
        (limit::MAX_BIND_GROUPS, 8),
        (limit::MAX_UNIFORM_BUFFERS_PER_SHADER_STAGE, 12),
        (limit::MAX_STORAGE_BUFFERS_PER_SHADER_STAGE, 8),
        (limit::MAX_VERTEX_ATTRIBUTES, 16),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// What the stub runtime reports when queried.
#[derive(Debug, Clone)]
pub struct RuntimeProfile {
    pub entry_point: bool,
    pub adapter: bool,
    pub device: bool,
    pub compute: bool,
    pub features: Vec<String>,
    pub limits: BTreeMap<String, u64>,
}

impl RuntimeProfile {
    pub fn capable() -> Self {
        Self {
            entry_point: true,
            adapter: true,
            device: true,
            compute: true,
            features: vec![
                feature::TIMESTAMP_QUERY.to_string(),
                feature::TEXTURE_COMPRESSION_BC.to_string(),
            ],
            limits: capable_limits(),
        }
    }

    pub fn without_entry_point() -> Self {
        Self {
            entry_point: false,
            ..Self::capable()
        }
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub adapter_requests: AtomicUsize,
    pub device_requests: AtomicUsize,
}

pub struct StubRuntime {
    profile: RuntimeProfile,
    pub counters: Arc<Counters>,
}

impl StubRuntime {
    pub fn new(profile: RuntimeProfile) -> Arc<Self> {
        Arc::new(Self {
            profile,
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn adapter_requests(&self) -> usize {
        self.counters.adapter_requests.load(Ordering::SeqCst)
    }

    pub fn device_requests(&self) -> usize {
        self.counters.device_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GpuRuntime for StubRuntime {
    fn has_modern_entry_point(&self) -> bool {
        self.profile.entry_point
    }

    async fn request_adapter(&self) -> Result<Box<dyn GpuAdapter>, DetectionError> {
        self.counters.adapter_requests.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up on the in-flight detection.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        if !self.profile.adapter {
            return Err(DetectionError::AdapterUnavailable(
                "stub runtime has no adapter".to_string(),
            ));
        }
        Ok(Box::new(StubAdapter {
            profile: self.profile.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct StubAdapter {
    profile: RuntimeProfile,
    counters: Arc<Counters>,
}

#[async_trait]
impl GpuAdapter for StubAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            name: "Stub GPU".to_string(),
            vendor: 0x10de,
            device: 1,
            device_type: RendererDeviceType::DiscreteGpu,
            api: GraphicsApi::Vulkan,
            driver: "stub".to_string(),
        }
    }

    fn features(&self) -> Vec<String> {
        self.profile.features.clone()
    }

    fn limits(&self) -> BTreeMap<String, u64> {
        self.profile.limits.clone()
    }

    fn supports_compute(&self) -> bool {
        self.profile.compute
    }

    async fn request_device(&self) -> Result<Arc<dyn GpuDevice>, DetectionError> {
        self.counters.device_requests.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if !self.profile.device {
            return Err(DetectionError::DeviceCreationFailed(
                "stub device lost".to_string(),
            ));
        }
        Ok(Arc::new(StubDevice))
    }
}

#[derive(Debug)]
pub struct StubDevice;

impl GpuDevice for StubDevice {
    fn label(&self) -> String {
        "Stub GPU (Vulkan)".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Debug)]
pub struct Blob {
    label: String,
    size: u64,
}

impl GpuResource for Blob {
    fn label(&self) -> &str {
        &self.label
    }

    fn byte_size(&self) -> u64 {
        self.size
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A backend that records what it is asked to build.
///
/// On the modern kind, instance storage lives in the fake compute device so
/// the compose kernel and uploads write to the same bytes.
pub struct StubBackend {
    kind: BackendKind,
    compute: Option<Arc<FakeComputeDevice>>,
    next_storage: AtomicUsize,
    host_storage: Mutex<HashMap<InstanceStorageId, (Vec<u8>, Vec<u8>)>>,
    device_storage: Mutex<HashMap<InstanceStorageId, InstanceStorage>>,
    pub geometry_builds: AtomicUsize,
    pub material_builds: AtomicUsize,
    pub uploads: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl StubBackend {
    pub fn new(kind: BackendKind, compute: Option<Arc<FakeComputeDevice>>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            compute,
            next_storage: AtomicUsize::new(0),
            host_storage: Mutex::new(HashMap::new()),
            device_storage: Mutex::new(HashMap::new()),
            geometry_builds: AtomicUsize::new(0),
            material_builds: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        })
    }

    pub fn legacy() -> Arc<Self> {
        Self::new(BackendKind::Legacy, None)
    }

    /// The transforms currently held by the backend for a storage.
    pub fn stored_transforms(&self, storage: &InstanceStorage) -> Vec<Mat4> {
        let bytes = match (&self.compute, storage.transforms) {
            (Some(device), Some(id)) => device.buffer_bytes(id),
            _ => self
                .host_storage
                .lock()
                .unwrap()
                .get(&storage.id)
                .map(|(t, _)| t.clone())
                .unwrap_or_default(),
        };
        floats(&bytes)
            .chunks_exact(16)
            .map(Mat4::from_cols_slice)
            .collect()
    }

    /// The colours currently held by the backend for a storage.
    pub fn stored_colors(&self, storage: &InstanceStorage) -> Vec<[f32; 4]> {
        let bytes = match (&self.compute, storage.colors) {
            (Some(device), Some(id)) => device.buffer_bytes(id),
            _ => self
                .host_storage
                .lock()
                .unwrap()
                .get(&storage.id)
                .map(|(_, c)| c.clone())
                .unwrap_or_default(),
        };
        floats(&bytes)
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect()
    }
}

impl RenderBackend for StubBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn description(&self) -> BackendDescription {
        BackendDescription {
            api: match self.kind {
                BackendKind::Modern => GraphicsApi::Vulkan,
                BackendKind::Legacy => GraphicsApi::OpenGL,
            },
            adapter_name: format!("Stub {} GPU", self.kind),
            vendor_id: 0x10de,
            device_type: RendererDeviceType::DiscreteGpu,
            max_texture_size: 16384,
            max_vertex_attributes: 16,
        }
    }

    fn supports_feature(&self, name: &str) -> bool {
        self.kind == BackendKind::Modern && name == feature::TIMESTAMP_QUERY
    }

    fn max_instance_capacity(&self) -> usize {
        100_000
    }

    fn build_geometry(
        &self,
        label: &str,
        mesh: &MeshData,
    ) -> Result<Arc<dyn GpuResource>, ResourceError> {
        self.geometry_builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Blob {
            label: label.to_string(),
            size: mesh.interleaved_vertices().len() as u64,
        }))
    }

    fn build_material(
        &self,
        label: &str,
        _uniforms: &MaterialUniforms,
    ) -> Result<Arc<dyn GpuResource>, ResourceError> {
        self.material_builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Blob {
            label: label.to_string(),
            size: std::mem::size_of::<MaterialUniforms>() as u64,
        }))
    }

    fn create_instance_storage(&self, capacity: usize) -> Result<InstanceStorage, ResourceError> {
        let id = InstanceStorageId(self.next_storage.fetch_add(1, Ordering::SeqCst));
        let Some(device) = &self.compute else {
            self.host_storage
                .lock()
                .unwrap()
                .insert(id, (Vec::new(), Vec::new()));
            return Ok(InstanceStorage {
                id,
                capacity,
                transforms: None,
                colors: None,
            });
        };
        let usage = BufferUsage::STORAGE | BufferUsage::VERTEX | BufferUsage::COPY_DST;
        let transforms = device.create_buffer(&BufferDescriptor {
            label: Some("instance transforms".to_string()),
            size: (capacity * 64) as u64,
            usage,
        })?;
        let colors = device.create_buffer(&BufferDescriptor {
            label: Some("instance colors".to_string()),
            size: (capacity * 16) as u64,
            usage,
        })?;
        let storage = InstanceStorage {
            id,
            capacity,
            transforms: Some(transforms),
            colors: Some(colors),
        };
        self.device_storage.lock().unwrap().insert(id, storage);
        Ok(storage)
    }

    fn upload_instances(
        &self,
        storage: &InstanceStorage,
        transforms: &[u8],
        colors: &[u8],
    ) -> Result<(), ResourceError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let registered = self.host_storage.lock().unwrap().contains_key(&storage.id)
            || self.device_storage.lock().unwrap().contains_key(&storage.id);
        if !registered {
            return Err(ResourceError::NotFound(format!("instance storage {:?}", storage.id)));
        }
        match (&self.compute, storage.transforms, storage.colors) {
            (Some(device), Some(t), Some(c)) => {
                device.write_buffer(t, 0, transforms)?;
                device.write_buffer(c, 0, colors)?;
            }
            _ => {
                self.host_storage
                    .lock()
                    .unwrap()
                    .insert(storage.id, (transforms.to_vec(), colors.to_vec()));
            }
        }
        Ok(())
    }

    fn release_instance_storage(&self, storage: &InstanceStorage) {
        self.host_storage.lock().unwrap().remove(&storage.id);
        if let Some(storage) = self.device_storage.lock().unwrap().remove(&storage.id) {
            if let Some(device) = &self.compute {
                for id in [storage.transforms, storage.colors].into_iter().flatten() {
                    let _ = device.destroy_buffer(id);
                }
            }
        }
    }

    fn compute_device(&self) -> Option<Arc<dyn ComputeDevice>> {
        self.compute
            .as_ref()
            .map(|d| Arc::clone(d) as Arc<dyn ComputeDevice>)
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if let Some(device) = &self.compute {
            let keep: Vec<BufferId> = self
                .device_storage
                .lock()
                .unwrap()
                .values()
                .flat_map(|s| [s.transforms, s.colors])
                .flatten()
                .collect();
            device.clear_retaining(&keep);
        }
    }
}

/// Builds stub backends and counts the attempts.
#[derive(Default)]
pub struct StubFactory {
    pub fail_modern: AtomicBool,
    pub fail_legacy: AtomicBool,
    /// Build the modern backend without a compute device.
    pub modern_without_compute: AtomicBool,
    pub modern_attempts: AtomicUsize,
    pub legacy_attempts: AtomicUsize,
    pub received_device: AtomicBool,
    pub compute: Arc<FakeComputeDevice>,
    pub built: Mutex<Vec<Arc<StubBackend>>>,
}

impl StubFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn modern_attempts(&self) -> usize {
        self.modern_attempts.load(Ordering::SeqCst)
    }

    pub fn legacy_attempts(&self) -> usize {
        self.legacy_attempts.load(Ordering::SeqCst)
    }

    pub fn last_built(&self) -> Option<Arc<StubBackend>> {
        self.built.lock().unwrap().last().cloned()
    }
}

impl BackendFactory for StubFactory {
    fn create_modern(
        &self,
        device: Option<Arc<dyn GpuDevice>>,
    ) -> Result<Arc<dyn RenderBackend>, BackendError> {
        self.modern_attempts.fetch_add(1, Ordering::SeqCst);
        self.received_device
            .store(device.is_some(), Ordering::SeqCst);
        if self.fail_modern.load(Ordering::SeqCst) {
            return Err(BackendError::ConstructionFailed(
                "stub modern backend refused".to_string(),
            ));
        }
        let compute = if self.modern_without_compute.load(Ordering::SeqCst) {
            None
        } else {
            Some(Arc::clone(&self.compute))
        };
        let backend = StubBackend::new(BackendKind::Modern, compute);
        self.built.lock().unwrap().push(Arc::clone(&backend));
        Ok(backend)
    }

    fn create_legacy(&self) -> Result<Arc<dyn RenderBackend>, BackendError> {
        self.legacy_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_legacy.load(Ordering::SeqCst) {
            return Err(BackendError::LegacyConstructionFailed(
                "stub legacy backend refused".to_string(),
            ));
        }
        let backend = StubBackend::legacy();
        self.built.lock().unwrap().push(Arc::clone(&backend));
        Ok(backend)
    }
}

pub fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn write_floats(bytes: &mut [u8], offset: usize, values: &[f32]) {
    for (i, v) in values.iter().enumerate() {
        let at = offset + i * 4;
        bytes[at..at + 4].copy_from_slice(&v.to_ne_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Compose,
    Particles,
    Orbital,
    Other,
}

struct FakeBindGroup {
    pipeline: ComputePipelineId,
    entries: Vec<BindGroupEntry>,
}

#[derive(Default)]
struct FakeState {
    next_id: usize,
    pipelines: HashMap<ComputePipelineId, Kernel>,
    buffers: HashMap<BufferId, Vec<u8>>,
    bind_groups: HashMap<BindGroupId, FakeBindGroup>,
}

/// A compute device backed by host memory.
///
/// Recognises the built-in kernels by source and runs them on the host with
/// the same arithmetic as the shaders.
#[derive(Default)]
pub struct FakeComputeDevice {
    state: Mutex<FakeState>,
    pub compilations: AtomicUsize,
    pub dispatches: AtomicUsize,
    pub reads: AtomicUsize,
    /// Make every dispatch fail.
    pub fail_dispatch: AtomicBool,
    /// Refuse to create buffers with this label.
    pub fail_buffer_label: Mutex<Option<String>>,
}

impl FakeComputeDevice {
    pub fn buffer_bytes(&self, id: BufferId) -> Vec<u8> {
        self.state
            .lock()
            .unwrap()
            .buffers
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().unwrap().buffers.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.state.lock().unwrap().pipelines.len()
    }

    pub fn fail_buffers_labelled(&self, label: &str) {
        *self.fail_buffer_label.lock().unwrap() = Some(label.to_string());
    }

    /// Drops every pipeline, bind group and buffer except `keep`, like the
    /// wgpu device does when its backend shuts down.
    pub fn clear_retaining(&self, keep: &[BufferId]) {
        let mut state = self.state.lock().unwrap();
        state.pipelines.clear();
        state.bind_groups.clear();
        state.buffers.retain(|id, _| keep.contains(id));
    }

    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    fn binding(state: &FakeState, group: &FakeBindGroup, binding: u32) -> Vec<f32> {
        group
            .entries
            .iter()
            .find(|e| e.binding == binding)
            .and_then(|e| state.buffers.get(&e.buffer))
            .map(|b| floats(b))
            .unwrap_or_default()
    }

    fn binding_id(group: &FakeBindGroup, binding: u32) -> BufferId {
        group
            .entries
            .iter()
            .find(|e| e.binding == binding)
            .map(|e| e.buffer)
            .expect("kernel binding missing")
    }

    fn run_compose(state: &mut FakeState, group: &FakeBindGroup) {
        let params = state.buffers[&Self::binding_id(group, 7)].clone();
        let count = u32::from_ne_bytes([params[0], params[1], params[2], params[3]]) as usize;
        let indices: Vec<u32> = state.buffers[&Self::binding_id(group, 0)]
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let t = Self::binding(state, group, 1);
        let r = Self::binding(state, group, 2);
        let s = Self::binding(state, group, 3);
        let c = Self::binding(state, group, 4);
        let transforms = Self::binding_id(group, 5);
        let colors = Self::binding_id(group, 6);

        for k in 0..count {
            let b = k * 3;
            let rotation = Mat3::from_rotation_x(r[b])
                * Mat3::from_rotation_y(r[b + 1])
                * Mat3::from_rotation_z(r[b + 2]);
            let m = Mat4::from_translation(Vec3::new(t[b], t[b + 1], t[b + 2]))
                * Mat4::from_mat3(rotation)
                * Mat4::from_scale(Vec3::new(s[b], s[b + 1], s[b + 2]));
            let slot = indices[k] as usize;
            let out = state.buffers.get_mut(&transforms).unwrap();
            write_floats(out, slot * 64, &m.to_cols_array());
            if c[k * 4 + 3] > 0.0 {
                let out = state.buffers.get_mut(&colors).unwrap();
                write_floats(out, slot * 16, &[c[k * 4], c[k * 4 + 1], c[k * 4 + 2], 1.0]);
            }
        }
    }

    fn run_particles(state: &mut FakeState, group: &FakeBindGroup) {
        let params = Self::binding(state, group, 4);
        let gravity = Vec3::new(params[0], params[1], params[2]);
        let damping = params[3];
        let dt = params[4];
        let count = params[5].to_bits() as usize;
        let mut p = Self::binding(state, group, 0);
        let mut v = Self::binding(state, group, 1);
        let mut life = Self::binding(state, group, 2);
        let mut size = Self::binding(state, group, 3);
        for i in 0..count {
            let b = i * 3;
            let mut vel = (Vec3::from_slice(&v[b..b + 3]) + gravity * dt) * damping;
            let mut pos = Vec3::from_slice(&p[b..b + 3]) + vel * dt;
            life[i] -= dt;
            if life[i] <= 0.0 {
                let (rp, rv, rl, rs) = respawn_values(i as u32);
                pos = rp;
                vel = rv;
                life[i] = rl;
                size[i] = rs;
            }
            p[b..b + 3].copy_from_slice(&pos.to_array());
            v[b..b + 3].copy_from_slice(&vel.to_array());
        }
        for (binding, values) in [(0, &p), (1, &v), (2, &life), (3, &size)] {
            let out = state.buffers.get_mut(&Self::binding_id(group, binding)).unwrap();
            write_floats(out, 0, values);
        }
    }

    fn run_orbital(state: &mut FakeState, group: &FakeBindGroup) {
        let params = Self::binding(state, group, 3);
        let (dt, mass, count, g) = (params[0], params[1], params[2].to_bits() as usize, params[3]);
        let mut angles = Self::binding(state, group, 0);
        let distances = Self::binding(state, group, 1);
        let mut positions = Self::binding(state, group, 2);
        for i in 0..count {
            let d = distances[i];
            angles[i] += (g * mass / d).sqrt() * dt / d;
            let p = orbital_position(angles[i], d);
            positions[i * 3..i * 3 + 3].copy_from_slice(&p.to_array());
        }
        for (binding, values) in [(0, &angles), (2, &positions)] {
            let out = state.buffers.get_mut(&Self::binding_id(group, binding)).unwrap();
            write_floats(out, 0, values);
        }
    }
}

impl ComputeDevice for FakeComputeDevice {
    fn max_workgroup_size(&self) -> u32 {
        256
    }

    fn max_workgroups_per_dimension(&self) -> u32 {
        65_535
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ComputeError> {
        if descriptor.workgroup_size == 0 || descriptor.workgroup_size > self.max_workgroup_size() {
            return Err(ComputeError::InvalidWorkgroupSize {
                requested: descriptor.workgroup_size,
                max: self.max_workgroup_size(),
            });
        }
        if !descriptor.source.contains("@compute") {
            return Err(ComputeError::CompilationFailed {
                label: descriptor.label.clone(),
                details: "no compute entry point".to_string(),
            });
        }
        self.compilations.fetch_add(1, Ordering::SeqCst);
        let kernel = if descriptor.source == INSTANCE_COMPOSE_WGSL {
            Kernel::Compose
        } else if descriptor.source == PARTICLES_WGSL {
            Kernel::Particles
        } else if descriptor.source == ORBITAL_WGSL {
            Kernel::Orbital
        } else {
            Kernel::Other
        };
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = ComputePipelineId(state.next_id);
        state.pipelines.insert(id, kernel);
        Ok(id)
    }

    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ComputeError> {
        self.state
            .lock()
            .unwrap()
            .pipelines
            .remove(&id)
            .map(|_| ())
            .ok_or(ComputeError::PipelineNotFound(id))
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ComputeError> {
        if let Some(label) = self.fail_buffer_label.lock().unwrap().as_deref() {
            if descriptor.label.as_deref() == Some(label) {
                return Err(ComputeError::Backend(format!("stub refused buffer {label}")));
            }
        }
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = BufferId(state.next_id);
        state.buffers.insert(id, vec![0; descriptor.size as usize]);
        Ok(id)
    }

    fn buffer_size(&self, id: BufferId) -> Result<u64, ComputeError> {
        self.state
            .lock()
            .unwrap()
            .buffers
            .get(&id)
            .map(|b| b.len() as u64)
            .ok_or(ComputeError::BufferNotFound(id))
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ComputeError> {
        let mut state = self.state.lock().unwrap();
        let buffer = state
            .buffers
            .get_mut(&id)
            .ok_or(ComputeError::BufferNotFound(id))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.len() {
            return Err(ComputeError::OutOfBounds {
                buffer: id,
                offset,
                len: data.len() as u64,
                size: buffer.len() as u64,
            });
        }
        buffer[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ComputeError> {
        self.state
            .lock()
            .unwrap()
            .buffers
            .remove(&id)
            .map(|_| ())
            .ok_or(ComputeError::BufferNotFound(id))
    }

    fn create_bind_group(
        &self,
        pipeline: ComputePipelineId,
        entries: &[BindGroupEntry],
    ) -> Result<BindGroupId, ComputeError> {
        let mut state = self.state.lock().unwrap();
        if !state.pipelines.contains_key(&pipeline) {
            return Err(ComputeError::PipelineNotFound(pipeline));
        }
        if let Some(missing) = entries.iter().find(|e| !state.buffers.contains_key(&e.buffer)) {
            return Err(ComputeError::BufferNotFound(missing.buffer));
        }
        state.next_id += 1;
        let id = BindGroupId(state.next_id);
        state.bind_groups.insert(
            id,
            FakeBindGroup {
                pipeline,
                entries: entries.to_vec(),
            },
        );
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ComputeError> {
        self.state
            .lock()
            .unwrap()
            .bind_groups
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
        if self.fail_dispatch.load(Ordering::SeqCst) {
            return Err(ComputeError::Backend("stub device lost".to_string()));
        }
        if workgroups.is_empty() {
            return Err(ComputeError::InvalidDispatch("empty dispatch".to_string()));
        }
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let kernel = *state
            .pipelines
            .get(&pipeline)
            .ok_or(ComputeError::PipelineNotFound(pipeline))?;
        let group = state
            .bind_groups
            .remove(&bind_group)
            .ok_or(ComputeError::BindGroupNotFound(bind_group))?;
        assert_eq!(group.pipeline, pipeline, "bind group used with another pipeline");
        match kernel {
            Kernel::Compose => Self::run_compose(&mut state, &group),
            Kernel::Particles => Self::run_particles(&mut state, &group),
            Kernel::Orbital => Self::run_orbital(&mut state, &group),
            Kernel::Other => {}
        }
        state.bind_groups.insert(bind_group, group);
        Ok(())
    }

    fn read_buffer(
        &self,
        id: BufferId,
        offset: u64,
        size: u64,
    ) -> BoxFuture<'static, Result<Vec<u8>, ComputeError>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let result = {
            let state = self.state.lock().unwrap();
            match state.buffers.get(&id) {
                None => Err(ComputeError::BufferNotFound(id)),
                Some(buffer) if offset + size > buffer.len() as u64 => {
                    Err(ComputeError::OutOfBounds {
                        buffer: id,
                        offset,
                        len: size,
                        size: buffer.len() as u64,
                    })
                }
                Some(buffer) => Ok(buffer[offset as usize..(offset + size) as usize].to_vec()),
            }
        };
        Box::pin(async move { result })
    }

    fn read_buffers(
        &self,
        ranges: &[(BufferId, u64)],
    ) -> BoxFuture<'static, Result<Vec<Vec<u8>>, ComputeError>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let result = {
            let state = self.state.lock().unwrap();
            ranges
                .iter()
                .map(|&(id, size)| match state.buffers.get(&id) {
                    None => Err(ComputeError::BufferNotFound(id)),
                    Some(buffer) if size > buffer.len() as u64 => Err(ComputeError::OutOfBounds {
                        buffer: id,
                        offset: 0,
                        len: size,
                        size: buffer.len() as u64,
                    }),
                    Some(buffer) => Ok(buffer[..size as usize].to_vec()),
                })
                .collect::<Result<Vec<_>, _>>()
        };
        Box::pin(async move { result })
    }
}
