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

//! Particle simulation on the compute device, with a host fallback.

use super::shaders::PARTICLES_WGSL;
use super::{f32s_from_bytes, grouped_parts, vec3s_from_bytes, ComputeDispatcher};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use lumen_core::compute::{
    BindGroupEntry, BindGroupId, BufferId, BufferUsage, ComputePipelineId, DEFAULT_WORKGROUP_SIZE,
};
use lumen_core::ComputeError;
use std::sync::Arc;

/// Global forces applied to every particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleParams {
    /// Acceleration applied each step.
    pub gravity: Vec3,
    /// Velocity multiplier applied each step.
    pub damping: f32,
}

impl Default for ParticleParams {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            damping: 0.99,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ParticleUniforms {
    gravity: [f32; 3],
    damping: f32,
    delta_time: f32,
    count: u32,
    _padding: [u32; 2],
}

/// The respawn state of particle `i`: position, velocity, lifetime and size.
pub fn respawn_values(i: u32) -> (Vec3, Vec3, f32, f32) {
    let position = Vec3::new(
        ((i % 100) as f32 - 50.0) * 0.1,
        10.0,
        (((i / 100) % 100) as f32 - 50.0) * 0.1,
    );
    let velocity = Vec3::new(
        ((i.wrapping_mul(17) % 200) as f32 - 100.0) * 0.01,
        0.0,
        ((i.wrapping_mul(31) % 200) as f32 - 100.0) * 0.01,
    );
    let life = 5.0 + (i % 50) as f32 * 0.1;
    let size = 0.5 + (i % 10) as f32 * 0.1;
    (position, velocity, life, size)
}

/// Host copy of every particle, one entry per particle in each array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleState {
    /// Positions.
    pub positions: Vec<Vec3>,
    /// Velocities.
    pub velocities: Vec<Vec3>,
    /// Remaining lifetimes in seconds.
    pub lifetimes: Vec<f32>,
    /// Render sizes.
    pub sizes: Vec<f32>,
}

impl ParticleState {
    /// `count` particles, each in its respawn state.
    pub fn spawn(count: u32) -> Self {
        let mut state = Self::default();
        for i in 0..count {
            let (p, v, life, size) = respawn_values(i);
            state.positions.push(p);
            state.velocities.push(v);
            state.lifetimes.push(life);
            state.sizes.push(size);
        }
        state
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Advances every particle by `dt` seconds on the host.
    pub fn step(&mut self, params: &ParticleParams, dt: f32) {
        for i in 0..self.len() {
            let mut v = self.velocities[i] + params.gravity * dt;
            v *= params.damping;
            let mut p = self.positions[i] + v * dt;
            let mut life = self.lifetimes[i] - dt;
            if life <= 0.0 {
                let (rp, rv, rl, rs) = respawn_values(i as u32);
                p = rp;
                v = rv;
                life = rl;
                self.sizes[i] = rs;
            }
            self.positions[i] = p;
            self.velocities[i] = v;
            self.lifetimes[i] = life;
        }
    }
}

struct DeviceParticles {
    dispatcher: Arc<ComputeDispatcher>,
    pipeline: ComputePipelineId,
    positions: BufferId,
    velocities: BufferId,
    lifetimes: BufferId,
    sizes: BufferId,
    uniforms: BufferId,
    bind_group: BindGroupId,
}

impl DeviceParticles {
    fn upload(
        dispatcher: Arc<ComputeDispatcher>,
        state: &ParticleState,
    ) -> Result<Self, ComputeError> {
        let pipeline = dispatcher.get_or_create_pipeline(
            "particle integration",
            PARTICLES_WGSL,
            DEFAULT_WORKGROUP_SIZE,
        )?;
        let usage = BufferUsage::STORAGE | BufferUsage::COPY_DST | BufferUsage::COPY_SRC;
        let create = |label: &str, data: &[u8]| -> Result<BufferId, ComputeError> {
            let id = dispatcher.create_buffer(label, data.len() as u64, usage)?;
            dispatcher.write_buffer(id, 0, data)?;
            Ok(id)
        };
        let positions = create("particle positions", bytemuck::cast_slice(&state.positions))?;
        let velocities = create("particle velocities", bytemuck::cast_slice(&state.velocities))?;
        let lifetimes = create("particle lifetimes", bytemuck::cast_slice(&state.lifetimes))?;
        let sizes = create("particle sizes", bytemuck::cast_slice(&state.sizes))?;
        let uniforms = dispatcher.create_buffer(
            "particle params",
            std::mem::size_of::<ParticleUniforms>() as u64,
            BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        )?;
        let bind_group = dispatcher.create_bind_group(
            pipeline,
            &[
                BindGroupEntry { binding: 0, buffer: positions },
                BindGroupEntry { binding: 1, buffer: velocities },
                BindGroupEntry { binding: 2, buffer: lifetimes },
                BindGroupEntry { binding: 3, buffer: sizes },
                BindGroupEntry { binding: 4, buffer: uniforms },
            ],
        )?;
        Ok(Self {
            dispatcher,
            pipeline,
            positions,
            velocities,
            lifetimes,
            sizes,
            uniforms,
            bind_group,
        })
    }
}

impl Drop for DeviceParticles {
    fn drop(&mut self) {
        let _ = self.dispatcher.destroy_bind_group(self.bind_group);
        for id in [
            self.positions,
            self.velocities,
            self.lifetimes,
            self.sizes,
            self.uniforms,
        ] {
            let _ = self.dispatcher.destroy_buffer(id);
        }
    }
}

/// A particle system stepped on the compute device when one is available,
/// and on the host otherwise.
///
/// On the device path the host state only catches up on [`ParticleSystem::sync`].
pub struct ParticleSystem {
    state: ParticleState,
    params: ParticleParams,
    device: Option<DeviceParticles>,
}

impl ParticleSystem {
    /// Spawns `count` particles, uploading them if `dispatcher` is given.
    pub fn new(
        count: u32,
        params: ParticleParams,
        dispatcher: Option<Arc<ComputeDispatcher>>,
    ) -> Result<Self, ComputeError> {
        let state = ParticleState::spawn(count);
        let device = match dispatcher {
            Some(dispatcher) if count > 0 => Some(DeviceParticles::upload(dispatcher, &state)?),
            _ => None,
        };
        log::debug!(
            "Particle system of {count} particles on the {}",
            if device.is_some() { "device" } else { "host" }
        );
        Ok(Self {
            state,
            params,
            device,
        })
    }

    /// Returns `true` if steps run on the compute device.
    pub fn is_gpu_driven(&self) -> bool {
        self.device.is_some()
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Returns `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// The current forces.
    pub fn params(&self) -> ParticleParams {
        self.params
    }

    /// Changes the forces used by later steps.
    pub fn set_params(&mut self, params: ParticleParams) {
        self.params = params;
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) -> Result<(), ComputeError> {
        let Some(device) = &self.device else {
            self.state.step(&self.params, dt);
            return Ok(());
        };
        let count = self.state.len() as u32;
        let uniforms = ParticleUniforms {
            gravity: self.params.gravity.to_array(),
            damping: self.params.damping,
            delta_time: dt,
            count,
            _padding: [0; 2],
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

    /// The host state. Lags the device until [`ParticleSystem::sync`] on the device path.
    pub fn state(&self) -> &ParticleState {
        &self.state
    }

    /// Reads the device buffers back into the host state.
    pub async fn sync(&mut self) -> Result<&ParticleState, ComputeError> {
        if let Some(device) = &self.device {
            let n = self.state.len() as u64;
            let vec_bytes = n * std::mem::size_of::<Vec3>() as u64;
            let scalar_bytes = n * std::mem::size_of::<f32>() as u64;
            let read = device.dispatcher.read_buffers(&[
                (device.positions, vec_bytes),
                (device.velocities, vec_bytes),
                (device.lifetimes, scalar_bytes),
                (device.sizes, scalar_bytes),
            ]);
            let [positions, velocities, lifetimes, sizes] = grouped_parts(read.await?)?;
            self.state.positions = vec3s_from_bytes(&positions);
            self.state.velocities = vec3s_from_bytes(&velocities);
            self.state.lifetimes = f32s_from_bytes(&lifetimes);
            self.state.sizes = f32s_from_bytes(&sizes);
        }
        Ok(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn respawn_values_follow_particle_index() {
        let (p, v, life, size) = respawn_values(0);
        assert_relative_eq!(p.x, -5.0);
        assert_relative_eq!(p.y, 10.0);
        assert_relative_eq!(p.z, -5.0);
        assert_relative_eq!(v.x, -1.0);
        assert_relative_eq!(v.z, -1.0);
        assert_relative_eq!(life, 5.0);
        assert_relative_eq!(size, 0.5);

        let (p, v, life, size) = respawn_values(123);
        assert_relative_eq!(p.x, (23.0 - 50.0) * 0.1);
        assert_relative_eq!(p.z, (1.0 - 50.0) * 0.1);
        assert_relative_eq!(v.x, ((123 * 17 % 200) as f32 - 100.0) * 0.01);
        assert_relative_eq!(life, 5.0 + 23.0 * 0.1);
        assert_relative_eq!(size, 0.5 + 3.0 * 0.1);
    }

    #[test]
    fn host_step_integrates_gravity_and_damping() {
        let mut state = ParticleState::spawn(4);
        let before = state.clone();
        let params = ParticleParams {
            gravity: Vec3::new(0.0, -10.0, 0.0),
            damping: 0.5,
        };
        state.step(&params, 0.1);

        for i in 0..4 {
            let v = (before.velocities[i] + params.gravity * 0.1) * 0.5;
            assert_relative_eq!(state.velocities[i].y, v.y);
            assert_relative_eq!(state.positions[i].y, before.positions[i].y + v.y * 0.1);
            assert_relative_eq!(state.lifetimes[i], before.lifetimes[i] - 0.1);
        }
    }

    #[test]
    fn expired_particles_respawn() {
        let mut state = ParticleState::spawn(2);
        state.lifetimes[1] = 0.05;
        state.positions[1] = Vec3::splat(99.0);
        state.sizes[1] = 7.0;
        state.step(&ParticleParams::default(), 0.1);

        let (p, v, life, size) = respawn_values(1);
        assert_eq!(state.positions[1], p);
        assert_eq!(state.velocities[1], v);
        assert_relative_eq!(state.lifetimes[1], life);
        assert_relative_eq!(state.sizes[1], size);
    }

    #[test]
    fn system_without_dispatcher_runs_on_host() {
        let mut system = ParticleSystem::new(10, ParticleParams::default(), None).unwrap();
        assert!(!system.is_gpu_driven());
        let y = system.state().positions[0].y;
        system.step(0.016).unwrap();
        assert!(system.state().positions[0].y < y);
    }
}
