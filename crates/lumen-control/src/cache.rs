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

//! Backend-agnostic construction of geometry, materials and instanced batches.

use crate::compute::{ComputeDispatcher, InstanceComposer};
use lumen_core::resource::{
    DescriptorKey, Geometry, GeometryDescriptor, InstanceUpdate, InstancedBatch, Material,
    MaterialDescriptor, MaterialUniforms, MeshData,
};
use lumen_core::traits::RenderBackend;
use lumen_core::{BackendKind, ComputeError, ResourceError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Tuning of the resource cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCacheConfig {
    /// Batch updates with at least this many entries go through the compute
    /// device when it exists.
    pub compute_batch_threshold: usize,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            compute_batch_threshold: 1000,
        }
    }
}

/// Which path applied a batch update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchUpdatePath {
    /// Composed on the host and uploaded on the next flush.
    Host,
    /// Composed by the compute device directly into the instance storage.
    Compute,
}

/// Counters of the resource cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// The backend resources are built on.
    pub backend_kind: BackendKind,
    /// Cached geometry prototypes.
    pub geometries: usize,
    /// Cached material prototypes.
    pub materials: usize,
    /// Geometries built by the backend.
    pub geometry_builds: u64,
    /// Materials built by the backend.
    pub material_builds: u64,
    /// Geometry requests served from the cache.
    pub geometry_hits: u64,
    /// Material requests served from the cache.
    pub material_hits: u64,
    /// Batch updates applied on the host.
    pub host_batch_updates: u64,
    /// Batch updates applied by the compute device.
    pub compute_batch_updates: u64,
}

struct Entry<T> {
    canonical: String,
    prototype: T,
}

type Shelf<T> = Mutex<HashMap<u64, Vec<Entry<T>>>>;

#[derive(Default)]
struct Counters {
    geometry_builds: AtomicU64,
    material_builds: AtomicU64,
    geometry_hits: AtomicU64,
    material_hits: AtomicU64,
    host_batch_updates: AtomicU64,
    compute_batch_updates: AtomicU64,
}

/// Builds resources on the active backend and caches them by descriptor content.
///
/// Requests with structurally equal descriptors share one build; every caller
/// receives its own clone of the cached prototype, and the prototype itself is
/// never handed out or mutated.
pub struct ResourceCache {
    backend: Arc<dyn RenderBackend>,
    config: ResourceCacheConfig,
    composer: Option<InstanceComposer>,
    geometries: Shelf<Geometry>,
    materials: Shelf<Material>,
    counters: Counters,
}

fn get_or_build<T: Clone>(
    shelf: &Shelf<T>,
    key: &DescriptorKey,
    hits: &AtomicU64,
    builds: &AtomicU64,
    build: impl FnOnce() -> Result<T, ResourceError>,
) -> Result<T, ResourceError> {
    let mut shelf = shelf
        .lock()
        .map_err(|e| ResourceError::BackendError(format!("Failed to lock resource cache: {e}")))?;
    let entries = shelf.entry(key.hash()).or_default();
    if let Some(entry) = entries.iter().find(|e| e.canonical == key.canonical()) {
        hits.fetch_add(1, Ordering::Relaxed);
        log::debug!("Resource cache hit for {:016x}", key.hash());
        return Ok(entry.prototype.clone());
    }
    let prototype = build()?;
    builds.fetch_add(1, Ordering::Relaxed);
    log::debug!("Resource cache miss for {:016x}, built", key.hash());
    entries.push(Entry {
        canonical: key.canonical().to_string(),
        prototype: prototype.clone(),
    });
    Ok(prototype)
}

impl ResourceCache {
    /// Creates an empty cache on `backend`.
    ///
    /// With a `dispatcher` on a modern backend, large batch updates are routed
    /// through the compute device; this compiles the compose kernel.
    pub fn new(
        backend: Arc<dyn RenderBackend>,
        dispatcher: Option<Arc<ComputeDispatcher>>,
        config: ResourceCacheConfig,
    ) -> Result<Self, ComputeError> {
        let composer = match dispatcher {
            Some(dispatcher) if backend.kind() == BackendKind::Modern => {
                Some(InstanceComposer::new(dispatcher)?)
            }
            _ => None,
        };
        Ok(Self {
            backend,
            config,
            composer,
            geometries: Mutex::new(HashMap::new()),
            materials: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        })
    }

    /// The backend resources are built on.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// The configuration the cache was created with.
    pub fn config(&self) -> ResourceCacheConfig {
        self.config
    }

    /// Returns `true` if large batch updates can run on the compute device.
    pub fn routes_to_compute(&self) -> bool {
        self.composer.is_some()
    }

    /// Returns a geometry for `descriptor`, building it on the first request.
    pub fn create_geometry(&self, descriptor: &GeometryDescriptor) -> Result<Geometry, ResourceError> {
        descriptor.validate()?;
        let key = descriptor.key()?;
        get_or_build(
            &self.geometries,
            &key,
            &self.counters.geometry_hits,
            &self.counters.geometry_builds,
            || {
                let mesh = MeshData::from_descriptor(descriptor);
                let gpu = self
                    .backend
                    .build_geometry(&format!("geometry {:016x}", key.hash()), &mesh)?;
                Ok(Geometry::new(*descriptor, mesh, gpu))
            },
        )
    }

    /// Returns a material for `descriptor`, building it on the first request.
    pub fn create_material(&self, descriptor: &MaterialDescriptor) -> Result<Material, ResourceError> {
        descriptor.validate()?;
        let key = descriptor.key()?;
        get_or_build(
            &self.materials,
            &key,
            &self.counters.material_hits,
            &self.counters.material_builds,
            || {
                let uniforms = MaterialUniforms::from(descriptor);
                let gpu = self
                    .backend
                    .build_material(&format!("material {:016x}", key.hash()), &uniforms)?;
                Ok(Material::new(*descriptor, gpu))
            },
        )
    }

    /// Creates a batch of `capacity` identity instances.
    ///
    /// The capacity is fixed; the caller owns the batch and its storage.
    pub fn create_instanced_batch(
        &self,
        geometry: &GeometryDescriptor,
        material: &MaterialDescriptor,
        capacity: usize,
    ) -> Result<InstancedBatch, ResourceError> {
        let geometry = self.create_geometry(geometry)?;
        let material = self.create_material(material)?;
        let batch = InstancedBatch::new(geometry, material, capacity, Arc::clone(&self.backend))?;
        log::debug!(
            "Created instanced batch of {capacity} on storage {:?}",
            batch.storage().id
        );
        Ok(batch)
    }

    /// Applies instance updates to `batch`.
    ///
    /// Each index is written once (the last update for an index wins) and the
    /// batch is marked dirty once. An out-of-range index rejects the whole call
    /// and leaves the batch untouched. Calls with at least
    /// [`ResourceCacheConfig::compute_batch_threshold`] updates run on the
    /// compute device when possible, falling back to the host on failure.
    pub fn batch_update(
        &self,
        batch: &mut InstancedBatch,
        updates: &[InstanceUpdate],
    ) -> Result<BatchUpdatePath, ResourceError> {
        if let Some(composer) = &self.composer {
            if updates.len() >= self.config.compute_batch_threshold
                && batch.storage().transforms.is_some()
            {
                batch.validate(updates)?;
                match composer.compose(batch, updates) {
                    Ok(()) => {
                        self.counters
                            .compute_batch_updates
                            .fetch_add(1, Ordering::Relaxed);
                        return Ok(BatchUpdatePath::Compute);
                    }
                    Err(e) => log::warn!("Compute batch update failed, using the host path: {e}"),
                }
            }
        }
        batch.apply_host(updates)?;
        self.counters
            .host_batch_updates
            .fetch_add(1, Ordering::Relaxed);
        Ok(BatchUpdatePath::Host)
    }

    /// Uploads a dirty batch. Returns `true` if it was dirty.
    pub fn flush(&self, batch: &mut InstancedBatch) -> Result<bool, ResourceError> {
        batch.flush()
    }

    /// Re-uploads a geometry whose host mesh was edited. Returns `true` if it was stale.
    pub fn refresh_geometry(&self, geometry: &mut Geometry) -> Result<bool, ResourceError> {
        if !geometry.is_stale() {
            return Ok(false);
        }
        geometry.mesh_mut().compute_bounds();
        let label = format!("{} (edited)", geometry.gpu().label());
        let gpu = self.backend.build_geometry(&label, geometry.mesh())?;
        geometry.replace_gpu(gpu);
        Ok(true)
    }

    /// Re-uploads a material whose parameters changed. Returns `true` if it was stale.
    pub fn refresh_material(&self, material: &mut Material) -> Result<bool, ResourceError> {
        if !material.is_stale() {
            return Ok(false);
        }
        material.descriptor().validate()?;
        let label = format!("{} (edited)", material.gpu().label());
        let gpu = self.backend.build_material(&label, material.uniforms())?;
        material.replace_gpu(gpu);
        Ok(true)
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let geometries = self
            .geometries
            .lock()
            .map(|m| m.values().map(Vec::len).sum())
            .unwrap_or(0);
        let materials = self
            .materials
            .lock()
            .map(|m| m.values().map(Vec::len).sum())
            .unwrap_or(0);
        let c = &self.counters;
        CacheStats {
            backend_kind: self.backend.kind(),
            geometries,
            materials,
            geometry_builds: c.geometry_builds.load(Ordering::Relaxed),
            material_builds: c.material_builds.load(Ordering::Relaxed),
            geometry_hits: c.geometry_hits.load(Ordering::Relaxed),
            material_hits: c.material_hits.load(Ordering::Relaxed),
            host_batch_updates: c.host_batch_updates.load(Ordering::Relaxed),
            compute_batch_updates: c.compute_batch_updates.load(Ordering::Relaxed),
        }
    }

    /// Drops every cached prototype and the compose staging buffers.
    ///
    /// Geometries, materials and batches already handed out stay valid.
    pub fn dispose(&self) {
        if let Ok(mut shelf) = self.geometries.lock() {
            shelf.clear();
        }
        if let Ok(mut shelf) = self.materials.lock() {
            shelf.clear();
        }
        if let Some(composer) = &self.composer {
            composer.dispose();
        }
        log::info!("Resource cache disposed");
    }
}
