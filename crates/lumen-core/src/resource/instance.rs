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

//! Instanced batches and the per-instance updates applied to them.

use super::handle::{Geometry, Material};
use crate::error::ResourceError;
use crate::traits::{InstanceStorage, RenderBackend};
use glam::{Mat4, Quat, Vec3};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The colour every instance starts with.
pub const DEFAULT_INSTANCE_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Size in bytes of one instance transform.
pub const TRANSFORM_STRIDE: usize = std::mem::size_of::<Mat4>();
/// Size in bytes of one instance colour.
pub const COLOR_STRIDE: usize = std::mem::size_of::<[f32; 4]>();

/// A change to one instance of a batch. Omitted fields take identity defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstanceUpdate {
    /// The instance slot to write.
    pub index: usize,
    /// Translation, defaults to the origin.
    pub position: Option<Vec3>,
    /// Euler angles in radians applied in X, Y, Z order, defaults to zero.
    pub rotation: Option<Vec3>,
    /// Per-axis scale, defaults to one.
    pub scale: Option<Vec3>,
    /// Linear RGB colour. When omitted the slot's colour is left untouched.
    pub color: Option<Vec3>,
}

impl InstanceUpdate {
    /// An update of `index` that resets its transform to identity.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// Sets the translation.
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    /// Sets the Euler rotation.
    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// Sets the scale.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Sets the colour.
    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = Some(color);
        self
    }

    /// The translation, rotation and scale with defaults filled in.
    pub fn resolved_trs(&self) -> (Vec3, Vec3, Vec3) {
        (
            self.position.unwrap_or(Vec3::ZERO),
            self.rotation.unwrap_or(Vec3::ZERO),
            self.scale.unwrap_or(Vec3::ONE),
        )
    }

    /// Composes `T * R * S`, with `R = Rx * Ry * Rz`.
    pub fn transform(&self) -> Mat4 {
        let (position, rotation, scale) = self.resolved_trs();
        let rotation = Quat::from_rotation_x(rotation.x)
            * Quat::from_rotation_y(rotation.y)
            * Quat::from_rotation_z(rotation.z);
        Mat4::from_scale_rotation_translation(scale, rotation, position)
    }
}

/// Collapses duplicate indices so each one appears once; the last update wins.
///
/// The output keeps the order in which indices first appear.
pub fn coalesce(updates: &[InstanceUpdate]) -> Vec<InstanceUpdate> {
    let mut slot_of: HashMap<usize, usize> = HashMap::with_capacity(updates.len());
    let mut out: Vec<InstanceUpdate> = Vec::with_capacity(updates.len());
    for update in updates {
        match slot_of.get(&update.index) {
            Some(&slot) => out[slot] = *update,
            None => {
                slot_of.insert(update.index, out.len());
                out.push(*update);
            }
        }
    }
    out
}

/// A fixed-capacity set of instances of one geometry and material.
///
/// The batch keeps a host mirror of every transform and colour and owns the
/// backend storage they are uploaded to. The storage is released on drop.
pub struct InstancedBatch {
    geometry: Geometry,
    material: Material,
    capacity: usize,
    live_count: usize,
    transforms: Vec<Mat4>,
    colors: Vec<[f32; 4]>,
    /// Updates already applied on the device but not yet on the host mirror.
    unreplayed: Vec<InstanceUpdate>,
    dirty: bool,
    needs_upload: bool,
    dirty_flips: u64,
    frustum_culled: bool,
    storage: InstanceStorage,
    backend: Arc<dyn RenderBackend>,
}

impl fmt::Debug for InstancedBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstancedBatch")
            .field("capacity", &self.capacity)
            .field("live_count", &self.live_count)
            .field("dirty", &self.dirty)
            .field("storage", &self.storage)
            .finish()
    }
}

impl InstancedBatch {
    /// Allocates a batch of `capacity` identity instances on `backend`.
    pub fn new(
        geometry: Geometry,
        material: Material,
        capacity: usize,
        backend: Arc<dyn RenderBackend>,
    ) -> Result<Self, ResourceError> {
        if capacity == 0 {
            return Err(ResourceError::ZeroCapacity);
        }
        let max = backend.max_instance_capacity();
        if capacity > max {
            return Err(ResourceError::CapacityTooLarge {
                requested: capacity,
                max,
            });
        }
        let storage = backend.create_instance_storage(capacity)?;
        Ok(Self {
            geometry,
            material,
            capacity,
            live_count: capacity,
            transforms: vec![Mat4::IDENTITY; capacity],
            colors: vec![DEFAULT_INSTANCE_COLOR; capacity],
            unreplayed: Vec::new(),
            dirty: true,
            needs_upload: true,
            dirty_flips: 0,
            frustum_culled: false,
            storage,
            backend,
        })
    }

    /// The instanced geometry.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// The instanced material.
    pub fn material(&self) -> &Material {
        &self.material
    }

    /// The fixed number of instance slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of leading instances that are drawn.
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Changes how many leading instances are drawn.
    pub fn set_live_count(&mut self, live_count: usize) -> Result<(), ResourceError> {
        if live_count > self.capacity {
            return Err(ResourceError::LiveCountExceedsCapacity {
                requested: live_count,
                capacity: self.capacity,
            });
        }
        self.live_count = live_count;
        Ok(())
    }

    /// Whether the renderer may cull the batch against the view frustum.
    pub fn frustum_culled(&self) -> bool {
        self.frustum_culled
    }

    /// Enables or disables frustum culling of the whole batch.
    pub fn set_frustum_culled(&mut self, culled: bool) {
        self.frustum_culled = culled;
    }

    /// The backend storage of the batch.
    pub fn storage(&self) -> &InstanceStorage {
        &self.storage
    }

    /// Returns `true` if the batch changed since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns `true` if the device copy lags the host mirror.
    pub fn needs_upload(&self) -> bool {
        self.needs_upload
    }

    /// How many times an update call marked the batch dirty.
    pub fn dirty_flips(&self) -> u64 {
        self.dirty_flips
    }

    /// Checks every index of `updates` against the capacity.
    pub fn validate(&self, updates: &[InstanceUpdate]) -> Result<(), ResourceError> {
        match updates.iter().find(|u| u.index >= self.capacity) {
            Some(bad) => Err(ResourceError::InvalidInstanceIndex {
                index: bad.index,
                capacity: self.capacity,
            }),
            None => Ok(()),
        }
    }

    /// Applies updates on the host mirror.
    ///
    /// Either every update is applied or, if any index is out of range, none is.
    /// The batch is marked dirty once per call.
    pub fn apply_host(&mut self, updates: &[InstanceUpdate]) -> Result<(), ResourceError> {
        self.validate(updates)?;
        self.replay();
        for update in coalesce(updates) {
            Self::write(&mut self.transforms, &mut self.colors, &update);
        }
        self.needs_upload = true;
        self.mark_dirty();
        Ok(())
    }

    /// Records updates that were already written to the device storage.
    ///
    /// `coalesced` must come from [`coalesce`] over validated updates. The host
    /// mirror catches up lazily the next time it is read. Fails if the device
    /// copy lagged the host mirror when the device wrote the updates.
    pub fn commit_device_update(
        &mut self,
        coalesced: Vec<InstanceUpdate>,
    ) -> Result<(), ResourceError> {
        if self.needs_upload {
            return Err(ResourceError::BackendError(
                "device update applied over unflushed host changes".to_string(),
            ));
        }
        self.unreplayed.extend(coalesced);
        self.mark_dirty();
        Ok(())
    }

    /// All transforms, column-major.
    pub fn transforms(&mut self) -> &[Mat4] {
        self.replay();
        &self.transforms
    }

    /// The transform of one instance.
    pub fn transform(&mut self, index: usize) -> Option<Mat4> {
        self.replay();
        self.transforms.get(index).copied()
    }

    /// All colours as RGBA.
    pub fn colors(&mut self) -> &[[f32; 4]] {
        self.replay();
        &self.colors
    }

    /// Uploads the whole instance storage if the device copy lags, then clears the dirty flag.
    ///
    /// Returns `true` if the batch was dirty.
    pub fn flush(&mut self) -> Result<bool, ResourceError> {
        if self.needs_upload {
            self.replay();
            self.backend.upload_instances(
                &self.storage,
                bytemuck::cast_slice(&self.transforms),
                bytemuck::cast_slice(&self.colors),
            )?;
            self.needs_upload = false;
            log::trace!(
                "Uploaded {} instances to storage {:?}",
                self.capacity,
                self.storage.id
            );
        }
        let was_dirty = self.dirty;
        self.dirty = false;
        Ok(was_dirty)
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.dirty_flips += 1;
    }

    fn replay(&mut self) {
        for update in std::mem::take(&mut self.unreplayed) {
            Self::write(&mut self.transforms, &mut self.colors, &update);
        }
    }

    fn write(transforms: &mut [Mat4], colors: &mut [[f32; 4]], update: &InstanceUpdate) {
        transforms[update.index] = update.transform();
        if let Some(color) = update.color {
            colors[update.index] = color.extend(1.0).to_array();
        }
    }
}

impl Drop for InstancedBatch {
    fn drop(&mut self) {
        self.backend.release_instance_storage(&self.storage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendDescription, BackendKind};
    use crate::resource::{GeometryDescriptor, MaterialDescriptor, MaterialUniforms, MeshData};
    use crate::traits::{ComputeDevice, GpuResource, InstanceStorageId};
    use approx::assert_relative_eq;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Blob;

    impl GpuResource for Blob {
        fn label(&self) -> &str {
            "blob"
        }
        fn byte_size(&self) -> u64 {
            0
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        uploads: AtomicUsize,
        released: Mutex<Vec<InstanceStorageId>>,
        last_upload: Mutex<Vec<u8>>,
    }

    impl RenderBackend for RecordingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Legacy
        }
        fn description(&self) -> BackendDescription {
            BackendDescription::default()
        }
        fn supports_feature(&self, _name: &str) -> bool {
            false
        }
        fn max_instance_capacity(&self) -> usize {
            4096
        }
        fn build_geometry(
            &self,
            _label: &str,
            _mesh: &MeshData,
        ) -> Result<Arc<dyn GpuResource>, ResourceError> {
            Ok(Arc::new(Blob))
        }
        fn build_material(
            &self,
            _label: &str,
            _uniforms: &MaterialUniforms,
        ) -> Result<Arc<dyn GpuResource>, ResourceError> {
            Ok(Arc::new(Blob))
        }
        fn create_instance_storage(
            &self,
            capacity: usize,
        ) -> Result<InstanceStorage, ResourceError> {
            Ok(InstanceStorage {
                id: InstanceStorageId(7),
                capacity,
                transforms: None,
                colors: None,
            })
        }
        fn upload_instances(
            &self,
            _storage: &InstanceStorage,
            transforms: &[u8],
            _colors: &[u8],
        ) -> Result<(), ResourceError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            *self.last_upload.lock().unwrap() = transforms.to_vec();
            Ok(())
        }
        fn release_instance_storage(&self, storage: &InstanceStorage) {
            self.released.lock().unwrap().push(storage.id);
        }
        fn compute_device(&self) -> Option<Arc<dyn ComputeDevice>> {
            None
        }
        fn shutdown(&self) {}
    }

    fn batch(capacity: usize) -> (InstancedBatch, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::default());
        let descriptor = GeometryDescriptor::cuboid(1.0, 1.0, 1.0);
        let geometry = Geometry::new(descriptor, MeshData::from_descriptor(&descriptor), Arc::new(Blob));
        let material = Material::new(MaterialDescriptor::default(), Arc::new(Blob));
        let batch = InstancedBatch::new(geometry, material, capacity, backend.clone()).unwrap();
        (batch, backend)
    }

    #[test]
    fn transform_composes_translation_rotation_scale() {
        let update = InstanceUpdate::new(0)
            .with_position(Vec3::new(1.0, 2.0, 3.0))
            .with_rotation(Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0))
            .with_scale(Vec3::splat(2.0));
        let m = update.transform();
        // +X scaled by 2, rotated a quarter turn about Y, lands on -Z.
        let p = m.transform_point3(Vec3::X);
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn omitted_fields_are_identity() {
        assert_eq!(InstanceUpdate::new(3).transform(), Mat4::IDENTITY);
        let moved = InstanceUpdate::new(3).with_position(Vec3::Y).transform();
        assert_eq!(moved, Mat4::from_translation(Vec3::Y));
    }

    #[test]
    fn coalesce_keeps_last_update_per_index() {
        let updates = [
            InstanceUpdate::new(2).with_position(Vec3::X),
            InstanceUpdate::new(5),
            InstanceUpdate::new(2).with_position(Vec3::Z),
        ];
        let out = coalesce(&updates);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].index, 2);
        assert_eq!(out[0].position, Some(Vec3::Z));
        assert_eq!(out[1].index, 5);
    }

    #[test]
    fn host_update_changes_only_targeted_slots() {
        let (mut batch, _) = batch(8);
        batch.flush().unwrap();
        let updates = [
            InstanceUpdate::new(1).with_position(Vec3::X),
            InstanceUpdate::new(6).with_scale(Vec3::splat(3.0)),
        ];
        batch.apply_host(&updates).unwrap();
        assert_eq!(batch.dirty_flips(), 1);
        assert!(batch.is_dirty());
        let transforms = batch.transforms().to_vec();
        for (i, t) in transforms.iter().enumerate() {
            match i {
                1 => assert_eq!(*t, Mat4::from_translation(Vec3::X)),
                6 => assert_eq!(*t, Mat4::from_scale(Vec3::splat(3.0))),
                _ => assert_eq!(*t, Mat4::IDENTITY),
            }
        }
    }

    #[test]
    fn out_of_range_update_leaves_batch_untouched() {
        let (mut batch, _) = batch(4);
        let updates = [
            InstanceUpdate::new(0).with_position(Vec3::X),
            InstanceUpdate::new(4),
        ];
        let err = batch.apply_host(&updates).unwrap_err();
        assert_eq!(
            err,
            ResourceError::InvalidInstanceIndex {
                index: 4,
                capacity: 4
            }
        );
        assert_eq!(batch.dirty_flips(), 0);
        assert!(batch.transforms().iter().all(|t| *t == Mat4::IDENTITY));
    }

    #[test]
    fn color_is_written_only_when_present() {
        let (mut batch, _) = batch(2);
        batch
            .apply_host(&[InstanceUpdate::new(0).with_color(Vec3::new(1.0, 0.0, 0.0))])
            .unwrap();
        batch.apply_host(&[InstanceUpdate::new(0)]).unwrap();
        assert_eq!(batch.colors()[0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(batch.colors()[1], DEFAULT_INSTANCE_COLOR);
    }

    #[test]
    fn flush_uploads_once_and_clears_dirty() {
        let (mut batch, backend) = batch(16);
        let updates: Vec<_> = (0..16)
            .map(|i| InstanceUpdate::new(i).with_position(Vec3::splat(i as f32)))
            .collect();
        batch.apply_host(&updates).unwrap();
        assert!(batch.flush().unwrap());
        assert!(!batch.flush().unwrap());
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(backend.last_upload.lock().unwrap().len(), 16 * TRANSFORM_STRIDE);
    }

    #[test]
    fn device_updates_replay_lazily() {
        let (mut batch, backend) = batch(4);
        let pending = [InstanceUpdate::new(2).with_position(Vec3::Y)];
        assert!(batch.commit_device_update(coalesce(&pending)).is_err());

        batch.flush().unwrap();
        batch.commit_device_update(coalesce(&pending)).unwrap();
        assert_eq!(batch.dirty_flips(), 1);
        assert!(!batch.needs_upload());
        assert_eq!(batch.transform(2), Some(Mat4::from_translation(Vec3::Y)));
        // The device already holds the data, so flushing uploads nothing.
        assert!(batch.flush().unwrap());
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn live_count_and_capacity_limits() {
        let (mut batch, backend) = batch(10);
        assert_eq!(batch.live_count(), 10);
        batch.set_live_count(3).unwrap();
        assert!(batch.set_live_count(11).is_err());

        let descriptor = GeometryDescriptor::plane(1.0, 1.0);
        let geometry = Geometry::new(descriptor, MeshData::from_descriptor(&descriptor), Arc::new(Blob));
        let material = Material::new(MaterialDescriptor::default(), Arc::new(Blob));
        let err = InstancedBatch::new(geometry.clone(), material.clone(), 0, backend.clone())
            .unwrap_err();
        assert_eq!(err, ResourceError::ZeroCapacity);
        let err = InstancedBatch::new(geometry, material, 5000, backend).unwrap_err();
        assert!(matches!(err, ResourceError::CapacityTooLarge { .. }));
    }

    #[test]
    fn drop_releases_storage() {
        let (batch, backend) = batch(1);
        drop(batch);
        assert_eq!(*backend.released.lock().unwrap(), vec![InstanceStorageId(7)]);
    }
}
