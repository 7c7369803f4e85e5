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

//! Built-in compute kernels.
//!
//! Every kernel reads flat structure-of-arrays buffers and expects the compute
//! device to inject a `WORKGROUP_SIZE` constant; the dispatcher always compiles
//! them at [`DEFAULT_WORKGROUP_SIZE`](lumen_core::compute::DEFAULT_WORKGROUP_SIZE).

/// Particle integration: gravity, damping, position integration, lifetime
/// expiry and deterministic respawn.
///
/// Bindings: `0` positions, `1` velocities (both `3 * n` floats), `2` lifetimes,
/// `3` sizes, `4` a 32-byte uniform block.
pub const PARTICLES_WGSL: &str = include_str!("particles.wgsl");

/// Simplified two-body orbits.
///
/// Bindings: `0` angles, `1` distances, `2` positions (`3 * n` floats), `3` a
/// 16-byte uniform block.
pub const ORBITAL_WGSL: &str = include_str!("orbital.wgsl");

/// Instance transform composition for large batch updates.
///
/// Bindings `0..=4` hold the packed updates, `5` and `6` are the batch's
/// transform and colour storage, `7` is a 16-byte uniform block.
pub const INSTANCE_COMPOSE_WGSL: &str = include_str!("instance_compose.wgsl");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernels_use_injected_workgroup_size() {
        for source in [PARTICLES_WGSL, ORBITAL_WGSL, INSTANCE_COMPOSE_WGSL] {
            assert!(source.contains("@workgroup_size(WORKGROUP_SIZE)"));
            assert!(source.contains("fn main("));
            assert!(!source.contains("const WORKGROUP_SIZE"));
        }
    }
}
