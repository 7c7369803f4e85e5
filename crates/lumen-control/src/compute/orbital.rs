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

//! Orbital motion of bodies around a central mass.

use super::shaders::ORBITAL_WGSL;
use super::{f32s_from_bytes, grouped_parts, vec3s_from_bytes, ComputeDispatcher};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use lumen_core::compute::{
    BindGroupEntry, BindGroupId, BufferId, BufferUsage, ComputePipelineId, DEFAULT_WORKGROUP_SIZE,
};
use lumen_core::ComputeError;
use std::sync::Arc;

/// Constants of the central body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalParams {
    /// The gravitational constant.
    pub gravitational_constant: f32,
    /// Mass of the central body.
    pub central_mass: f32,
}

impl Default for OrbitalParams {
    fn default() -> Self {
        Self {
            gravitational_constant: 1.0,
            central_mass: 100.0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct OrbitalUniforms {
    delta_time: f32,
    central_mass: f32,
    count: u32,
    gravitational_constant: f32,
}

/// Position of a body at `angle` on an orbit of radius `distance`.
pub fn orbital_position(angle: f32, distance: f32) -> Vec3 {
    Vec3::new(
        angle.cos() * distance,
        1.8 * (0.4 * distance + angle).sin(),
        angle.sin() * distance,
    )
}

/// Host copy of the bodies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrbitalState {
    /// Current angle of each body, in radians.
    pub angles: Vec<f32>,
    /// Orbit radius of each body. Never changes.
    pub distances: Vec<f32>,
    /// Current position of each body.
    pub positions: Vec<Vec3>,
}

impl OrbitalState {
    /// Places bodies at the given `(angle, distance)` pairs.
    ///
    /// Fails if a distance is not strictly positive.
    pub fn new(bodies: &[(f32, f32)]) -> Result<Self, ComputeError> {
        if let Some((_, d)) = bodies.iter().find(|(_, d)| !(*d > 0.0)) {
            return Err(ComputeError::InvalidDispatch(format!(
                "orbit distance must be positive, got {d}"
            )));
        }
        Ok(Self {
            angles: bodies.iter().map(|(a, _)| *a).collect(),
            distances: bodies.iter().map(|(_, d)| *d).collect(),
            positions: bodies
                .iter()
                .map(|(a, d)| orbital_position(*a, *d))
                .collect(),
        })
    }

    /// Number of bodies.
    pub fn len(&self) -> usize {
        self.angles.len()
    }

    /// Returns `true` if there are no bodies.
    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    /// Advances every body by `dt` seconds on the host.
    pub fn step(&mut self, params: &OrbitalParams, dt: f32) {
        for i in 0..self.len() {
            let d = self.distances[i];
            let speed = (params.gravitational_constant * params.central_mass / d).sqrt();
            self.angles[i] += speed * dt / d;
            self.positions[i] = orbital_position(self.angles[i], d);
        }
    }
}

struct DeviceOrbits {
    dispatcher: Arc<ComputeDispatcher>,
    pipeline: ComputePipelineId,
    angles: BufferId,
    distances: BufferId,
    positions: BufferId,
    uniforms: BufferId,
    bind_group: BindGroupId,
}

impl Drop for DeviceOrbits {
    fn drop(&mut self) {
        let _ = self.dispatcher.destroy_bind_group(self.bind_group);
        for id in [self.angles, self.distances, self.positions, self.uniforms] {
            let _ = self.dispatcher.destroy_buffer(id);
        }
    }
}

/// Bodies on circular orbits, stepped on the compute device when one is available.
pub struct OrbitalSystem {
    state: OrbitalState,
    params: OrbitalParams,
    device: Option<DeviceOrbits>,
}

impl OrbitalSystem {
    /// Creates the system, uploading `state` if `dispatcher` is given.
    pub fn new(
        state: OrbitalState,
        params: OrbitalParams,
        dispatcher: Option<Arc<ComputeDispatcher>>,
    ) -> Result<Self, ComputeError> {
        let device = match dispatcher {
            Some(dispatcher) if !state.is_empty() => Some(Self::upload(dispatcher, &state)?),
            _ => None,
        };
        Ok(Self {
            state,
            params,
            device,
        })
    }

    fn upload(
        dispatcher: Arc<ComputeDispatcher>,
        state: &OrbitalState,
    ) -> Result<DeviceOrbits, ComputeError> {
        let pipeline =
            dispatcher.get_or_create_pipeline("orbital mechanics", ORBITAL_WGSL, DEFAULT_WORKGROUP_SIZE)?;
        let usage = BufferUsage::STORAGE | BufferUsage::COPY_DST | BufferUsage::COPY_SRC;
        let angles = dispatcher.create_buffer("orbit angles", (state.len() * 4) as u64, usage)?;
        dispatcher.write_buffer(angles, 0, bytemuck::cast_slice(&state.angles))?;
        let distances =
            dispatcher.create_buffer("orbit distances", (state.len() * 4) as u64, usage)?;
        dispatcher.write_buffer(distances, 0, bytemuck::cast_slice(&state.distances))?;
        let positions =
            dispatcher.create_buffer("orbit positions", (state.len() * 12) as u64, usage)?;
        dispatcher.write_buffer(positions, 0, bytemuck::cast_slice(&state.positions))?;
        let uniforms = dispatcher.create_buffer(
            "orbit params",
            std::mem::size_of::<OrbitalUniforms>() as u64,
            BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        )?;
        let bind_group = dispatcher.create_bind_group(
            pipeline,
            &[
                BindGroupEntry { binding: 0, buffer: angles },
                BindGroupEntry { binding: 1, buffer: distances },
                BindGroupEntry { binding: 2, buffer: positions },
                BindGroupEntry { binding: 3, buffer: uniforms },
            ],
        )?;
        Ok(DeviceOrbits {
            dispatcher,
            pipeline,
            angles,
            distances,
            positions,
            uniforms,
            bind_group,
        })
    }

    /// Returns `true` if steps run on the compute device.
    pub fn is_gpu_driven(&self) -> bool {
        self.device.is_some()
    }

    /// Advances every body by `dt` seconds.
    pub fn step(&mut self, dt: f32) -> Result<(), ComputeError> {
        let Some(device) = &self.device else {
            self.state.step(&self.params, dt);
            return Ok(());
        };
        let count = self.state.len() as u32;
        let uniforms = OrbitalUniforms {
            delta_time: dt,
            central_mass: self.params.central_mass,
            count,
            gravitational_constant: self.params.gravitational_constant,
        };
        device
            .dispatcher
            .write_buffer(device.uniforms, 0, bytemuck::bytes_of(&uniforms))?;
        device.dispatcher.dispatch_elements(
            device.pipeline,
            device.bind_group,
            count,
            DEFAULT_WORKGROUP_SIZE,
        )
    }

    /// The host state. Lags the device until [`OrbitalSystem::sync`] on the device path.
    pub fn state(&self) -> &OrbitalState {
        &self.state
    }

    /// Reads angles and positions back from the device.
    pub async fn sync(&mut self) -> Result<&OrbitalState, ComputeError> {
        if let Some(device) = &self.device {
            let n = self.state.len() as u64;
            let read = device
                .dispatcher
                .read_buffers(&[(device.angles, n * 4), (device.positions, n * 12)]);
            let [angles, positions] = grouped_parts(read.await?)?;
            self.state.angles = f32s_from_bytes(&angles);
            self.state.positions = vec3s_from_bytes(&positions);
        }
        Ok(&self.state)
    }
}
