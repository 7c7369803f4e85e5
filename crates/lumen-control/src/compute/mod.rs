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

//! Compute dispatch on the modern backend and the built-in kernels that use it.
//!
//! [`ComputeDispatcher`] is the only entry point into the compute device. The
//! kernel wrappers ([`ParticleSystem`], [`OrbitalSystem`], [`InstanceComposer`])
//! each keep a host path with the same semantics, used when no dispatcher exists.

mod dispatcher;
mod instances;
mod orbital;
mod particles;
pub mod shaders;

pub use self::dispatcher::ComputeDispatcher;
pub use self::instances::{ComposePacket, InstanceComposer};
pub use self::orbital::{orbital_position, OrbitalParams, OrbitalState, OrbitalSystem};
pub use self::particles::{respawn_values, ParticleParams, ParticleState, ParticleSystem};

use glam::Vec3;
use lumen_core::ComputeError;

/// Decodes native-endian `f32`s from read-back bytes.
pub(crate) fn f32s_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Decodes tightly packed `Vec3`s from read-back bytes.
pub(crate) fn vec3s_from_bytes(bytes: &[u8]) -> Vec<Vec3> {
    f32s_from_bytes(bytes)
        .chunks_exact(3)
        .map(Vec3::from_slice)
        .collect()
}

/// Turns the result of a grouped read-back into exactly `N` byte vectors.
pub(crate) fn grouped_parts<const N: usize>(
    parts: Vec<Vec<u8>>,
) -> Result<[Vec<u8>; N], ComputeError> {
    let got = parts.len();
    parts.try_into().map_err(|_| {
        ComputeError::Backend(format!("grouped read-back returned {got} parts, expected {N}"))
    })
}
