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

//! Instance transform composition on the compute device.

use super::shaders::INSTANCE_COMPOSE_WGSL;
use super::ComputeDispatcher;
use bytemuck::{Pod, Zeroable};
use lumen_core::compute::{
    BindGroupEntry, BufferId, BufferUsage, ComputePipelineId, DEFAULT_WORKGROUP_SIZE,
};
use lumen_core::resource::{coalesce, InstanceUpdate, InstancedBatch};
use lumen_core::{ComputeError, ResourceError};
use std::sync::{Arc, Mutex};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ComposeUniforms {
    count: u32,
    _padding: [u32; 3],
}

/// Coalesced updates laid out as the compose kernel reads them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposePacket {
    /// Target slot of each update.
    pub indices: Vec<u32>,
    /// Translation, three floats per update.
    pub translations: Vec<f32>,
    /// Euler rotation, three floats per update.
    pub rotations: Vec<f32>,
    /// Scale, three floats per update.
    pub scales: Vec<f32>,
    /// RGB plus a flag in `w`: `1` writes the colour, `0` leaves the slot untouched.
    pub colors: Vec<[f32; 4]>,
}

impl ComposePacket {
    /// Packs already coalesced updates, filling in identity defaults.
    pub fn pack(updates: &[InstanceUpdate]) -> Result<Self, ResourceError> {
        let mut packet = Self {
            indices: Vec::with_capacity(updates.len()),
            translations: Vec::with_capacity(updates.len() * 3),
            rotations: Vec::with_capacity(updates.len() * 3),
            scales: Vec::with_capacity(updates.len() * 3),
            colors: Vec::with_capacity(updates.len()),
        };
        for update in updates {
            let index = u32::try_from(update.index).map_err(|_| {
                ResourceError::BackendError(format!(
                    "instance index {} does not fit a device index",
                    update.index
                ))
            })?;
            let (position, rotation, scale) = update.resolved_trs();
            packet.indices.push(index);
            packet.translations.extend_from_slice(&position.to_array());
            packet.rotations.extend_from_slice(&rotation.to_array());
            packet.scales.extend_from_slice(&scale.to_array());
            packet.colors.push(match update.color {
                Some(c) => c.extend(1.0).to_array(),
                None => [0.0; 4],
            });
        }
        Ok(packet)
    }

    /// Number of packed updates.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` if nothing is packed.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Device buffers holding one packet, reused across calls while large enough.
struct StagingBuffers {
    capacity: usize,
    indices: BufferId,
    translations: BufferId,
    rotations: BufferId,
    scales: BufferId,
    colors: BufferId,
    uniforms: BufferId,
}

fn grouped_ids(ids: Vec<BufferId>) -> Result<[BufferId; 6], ComputeError> {
    let got = ids.len();
    ids.try_into()
        .map_err(|_| ComputeError::Backend(format!("expected 6 staging buffers, got {got}")))
}

impl StagingBuffers {
    fn create(dispatcher: &ComputeDispatcher, capacity: usize) -> Result<Self, ComputeError> {
        let storage = BufferUsage::STORAGE | BufferUsage::COPY_DST;
        let n = capacity as u64;
        let plan = [
            ("compose indices", n * 4, storage),
            ("compose translations", n * 12, storage),
            ("compose rotations", n * 12, storage),
            ("compose scales", n * 12, storage),
            ("compose colors", n * 16, storage),
            (
                "compose params",
                std::mem::size_of::<ComposeUniforms>() as u64,
                BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            ),
        ];
        let mut created = Vec::with_capacity(plan.len());
        for (label, size, usage) in plan {
            match dispatcher.create_buffer(label, size, usage) {
                Ok(id) => created.push(id),
                Err(e) => {
                    for id in created {
                        let _ = dispatcher.destroy_buffer(id);
                    }
                    return Err(e);
                }
            }
        }
        let [indices, translations, rotations, scales, colors, uniforms] = grouped_ids(created)?;
        Ok(Self {
            capacity,
            indices,
            translations,
            rotations,
            scales,
            colors,
            uniforms,
        })
    }

    fn ids(&self) -> [BufferId; 6] {
        [
            self.indices,
            self.translations,
            self.rotations,
            self.scales,
            self.colors,
            self.uniforms,
        ]
    }

    fn release(&self, dispatcher: &ComputeDispatcher) {
        for id in self.ids() {
            let _ = dispatcher.destroy_buffer(id);
        }
    }
}

/// Applies batch updates by composing transforms on the compute device,
/// writing straight into the batch's instance storage.
///
/// Produces the same transforms and colours as [`InstancedBatch::apply_host`].
pub struct InstanceComposer {
    dispatcher: Arc<ComputeDispatcher>,
    pipeline: ComputePipelineId,
    staging: Mutex<Option<StagingBuffers>>,
}

impl InstanceComposer {
    /// Compiles the compose kernel.
    pub fn new(dispatcher: Arc<ComputeDispatcher>) -> Result<Self, ComputeError> {
        let pipeline = dispatcher.get_or_create_pipeline(
            "instance compose",
            INSTANCE_COMPOSE_WGSL,
            DEFAULT_WORKGROUP_SIZE,
        )?;
        Ok(Self {
            dispatcher,
            pipeline,
            staging: Mutex::new(None),
        })
    }

    /// Applies `updates` to `batch` on the device.
    ///
    /// Rejects the whole call if any index is out of range. Pending host
    /// changes are flushed first so the device copy is current. On error the
    /// batch is unchanged unless the error came from the final bookkeeping.
    pub fn compose(
        &self,
        batch: &mut InstancedBatch,
        updates: &[InstanceUpdate],
    ) -> Result<(), ResourceError> {
        batch.validate(updates)?;
        let storage = *batch.storage();
        let (Some(transforms), Some(colors)) = (storage.transforms, storage.colors) else {
            return Err(ResourceError::BackendError(format!(
                "instance storage {:?} is not visible to the compute device",
                storage.id
            )));
        };
        if batch.needs_upload() {
            batch.flush()?;
        }

        let coalesced = coalesce(updates);
        if !coalesced.is_empty() {
            let packet = ComposePacket::pack(&coalesced)?;
            self.run(&packet, transforms, colors)?;
        }
        batch.commit_device_update(coalesced)?;
        log::trace!(
            "Composed {} instance updates on the device for storage {:?}",
            updates.len(),
            storage.id
        );
        Ok(())
    }

    fn run(
        &self,
        packet: &ComposePacket,
        transforms: BufferId,
        colors: BufferId,
    ) -> Result<(), ComputeError> {
        let mut staging = self
            .staging
            .lock()
            .map_err(|e| ComputeError::Backend(format!("Failed to lock compose staging: {e}")))?;
        if staging.as_ref().map_or(true, |s| s.capacity < packet.len()) {
            if let Some(old) = staging.take() {
                old.release(&self.dispatcher);
            }
            *staging = Some(StagingBuffers::create(
                &self.dispatcher,
                packet.len().next_power_of_two(),
            )?);
        }
        let Some(buffers) = staging.as_ref() else {
            return Err(ComputeError::Backend("compose staging missing".to_string()));
        };

        let d = &self.dispatcher;
        d.write_buffer(buffers.indices, 0, bytemuck::cast_slice(&packet.indices))?;
        d.write_buffer(buffers.translations, 0, bytemuck::cast_slice(&packet.translations))?;
        d.write_buffer(buffers.rotations, 0, bytemuck::cast_slice(&packet.rotations))?;
        d.write_buffer(buffers.scales, 0, bytemuck::cast_slice(&packet.scales))?;
        d.write_buffer(buffers.colors, 0, bytemuck::cast_slice(&packet.colors))?;
        let uniforms = ComposeUniforms {
            count: packet.len() as u32,
            _padding: [0; 3],
        };
        d.write_buffer(buffers.uniforms, 0, bytemuck::bytes_of(&uniforms))?;

        let entries: Vec<BindGroupEntry> = buffers
            .ids()
            .into_iter()
            .take(5)
            .chain([transforms, colors, buffers.uniforms])
            .enumerate()
            .map(|(binding, buffer)| BindGroupEntry {
                binding: binding as u32,
                buffer,
            })
            .collect();
        let group = d.create_bind_group(self.pipeline, &entries)?;
        let result = d.dispatch_elements(
            self.pipeline,
            group,
            packet.len() as u32,
            DEFAULT_WORKGROUP_SIZE,
        );
        // The submitted pass keeps its own reference to the group.
        let _ = d.destroy_bind_group(group);
        result
    }

    /// Releases the staging buffers.
    pub fn dispose(&self) {
        if let Ok(mut staging) = self.staging.lock() {
            if let Some(old) = staging.take() {
                old.release(&self.dispatcher);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn packet_fills_identity_defaults_and_color_flags() {
        let updates = [
            InstanceUpdate::new(4),
            InstanceUpdate::new(9)
                .with_position(Vec3::new(1.0, 2.0, 3.0))
                .with_color(Vec3::new(0.5, 0.25, 1.0)),
        ];
        let packet = ComposePacket::pack(&updates).unwrap();
        assert_eq!(packet.len(), 2);
        assert_eq!(packet.indices, vec![4, 9]);
        assert_eq!(&packet.translations[..3], &[0.0, 0.0, 0.0]);
        assert_eq!(&packet.translations[3..], &[1.0, 2.0, 3.0]);
        assert_eq!(&packet.scales[..3], &[1.0, 1.0, 1.0]);
        assert_eq!(packet.colors[0], [0.0; 4]);
        assert_eq!(packet.colors[1], [0.5, 0.25, 1.0, 1.0]);
    }
}
