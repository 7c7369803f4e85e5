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

//! Geometry and material handles handed out by the resource cache.

use super::descriptor::{GeometryDescriptor, MaterialDescriptor};
use super::material::MaterialUniforms;
use super::mesh::MeshData;
use crate::traits::GpuResource;
use std::sync::Arc;

/// A constructed geometry: host mesh data plus its uploaded buffers.
///
/// Cloning is cheap for the GPU side, which is immutable and shared, while the
/// host mesh is copied. Mutating a clone's mesh marks that clone stale and
/// never touches the cached prototype or any other clone.
#[derive(Debug, Clone)]
pub struct Geometry {
    descriptor: GeometryDescriptor,
    mesh: MeshData,
    gpu: Arc<dyn GpuResource>,
    stale: bool,
}

impl Geometry {
    /// Wraps freshly built geometry.
    pub fn new(descriptor: GeometryDescriptor, mesh: MeshData, gpu: Arc<dyn GpuResource>) -> Self {
        Self {
            descriptor,
            mesh,
            gpu,
            stale: false,
        }
    }

    /// The descriptor the geometry was built from.
    pub fn descriptor(&self) -> &GeometryDescriptor {
        &self.descriptor
    }

    /// The host mesh data.
    pub fn mesh(&self) -> &MeshData {
        &self.mesh
    }

    /// Mutable access to the host mesh. The GPU buffers become stale.
    pub fn mesh_mut(&mut self) -> &mut MeshData {
        self.stale = true;
        &mut self.mesh
    }

    /// The uploaded buffers.
    pub fn gpu(&self) -> &Arc<dyn GpuResource> {
        &self.gpu
    }

    /// Returns `true` if the host mesh changed since the last upload.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Installs re-uploaded buffers after a host-side edit.
    pub fn replace_gpu(&mut self, gpu: Arc<dyn GpuResource>) {
        self.gpu = gpu;
        self.stale = false;
    }
}

/// A constructed material: its descriptor, packed uniforms and uploaded block.
#[derive(Debug, Clone)]
pub struct Material {
    descriptor: MaterialDescriptor,
    uniforms: MaterialUniforms,
    gpu: Arc<dyn GpuResource>,
    stale: bool,
}

impl Material {
    /// Wraps a freshly built material.
    pub fn new(descriptor: MaterialDescriptor, gpu: Arc<dyn GpuResource>) -> Self {
        Self {
            uniforms: MaterialUniforms::from(&descriptor),
            descriptor,
            gpu,
            stale: false,
        }
    }

    /// The current descriptor.
    pub fn descriptor(&self) -> &MaterialDescriptor {
        &self.descriptor
    }

    /// The packed uniform block.
    pub fn uniforms(&self) -> &MaterialUniforms {
        &self.uniforms
    }

    /// Changes this material's parameters. The uploaded block becomes stale.
    pub fn set_descriptor(&mut self, descriptor: MaterialDescriptor) {
        self.uniforms = MaterialUniforms::from(&descriptor);
        self.descriptor = descriptor;
        self.stale = true;
    }

    /// The uploaded uniform block.
    pub fn gpu(&self) -> &Arc<dyn GpuResource> {
        &self.gpu
    }

    /// Returns `true` if the parameters changed since the last upload.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Installs a re-uploaded block after a parameter change.
    pub fn replace_gpu(&mut self, gpu: Arc<dyn GpuResource>) {
        self.gpu = gpu;
        self.stale = false;
    }
}
