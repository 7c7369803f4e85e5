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

//! Host-side mesh data and the primitive generators behind geometry descriptors.

use super::descriptor::{BoxParams, CylinderParams, GeometryDescriptor, PlaneParams, SphereParams};
use glam::{Vec2, Vec3};
use std::f32::consts::PI;

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// An empty box that any point expands.
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// The smallest box enclosing all points, or [`Aabb::EMPTY`].
    pub fn from_points(points: &[Vec3]) -> Self {
        points.iter().fold(Self::EMPTY, |acc, p| Aabb {
            min: acc.min.min(*p),
            max: acc.max.max(*p),
        })
    }

    /// Returns `true` if no point was ever added.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// The centre of the box.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// The size of the box along each axis.
    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }
}

/// A bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Centre of the sphere.
    pub center: Vec3,
    /// Radius of the sphere.
    pub radius: f32,
}

/// The width of the indices of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    Uint32,
}

/// Size in bytes of one interleaved vertex: position, normal, uv.
pub const VERTEX_STRIDE: usize = (3 + 3 + 2) * std::mem::size_of::<f32>();

/// Triangle-list mesh data in structure-of-arrays layout.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    /// Vertex positions.
    pub positions: Vec<Vec3>,
    /// Vertex normals.
    pub normals: Vec<Vec3>,
    /// Texture coordinates.
    pub uvs: Vec<Vec2>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
    bounding_box: Aabb,
    bounding_sphere: BoundingSphere,
}

impl MeshData {
    /// Builds mesh data and computes its bounding volumes.
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>, uvs: Vec<Vec2>, indices: Vec<u32>) -> Self {
        let mut mesh = Self {
            positions,
            normals,
            uvs,
            indices,
            bounding_box: Aabb::EMPTY,
            bounding_sphere: BoundingSphere {
                center: Vec3::ZERO,
                radius: 0.0,
            },
        };
        mesh.compute_bounds();
        mesh
    }

    /// Generates the mesh described by a geometry descriptor.
    pub fn from_descriptor(descriptor: &GeometryDescriptor) -> Self {
        match descriptor {
            GeometryDescriptor::Sphere(p) => sphere(p),
            GeometryDescriptor::Box(p) => cuboid(p),
            GeometryDescriptor::Plane(p) => plane(p),
            GeometryDescriptor::Cylinder(p) => cylinder(p),
        }
    }

    /// Recomputes the bounding box and bounding sphere after the positions changed.
    ///
    /// The sphere is centred on the box and encloses every vertex.
    pub fn compute_bounds(&mut self) {
        self.bounding_box = Aabb::from_points(&self.positions);
        let center = if self.bounding_box.is_empty() {
            Vec3::ZERO
        } else {
            self.bounding_box.center()
        };
        let radius_sq = self
            .positions
            .iter()
            .map(|p| center.distance_squared(*p))
            .fold(0.0f32, f32::max);
        self.bounding_sphere = BoundingSphere {
            center,
            radius: radius_sq.sqrt(),
        };
    }

    /// The axis-aligned bounding box.
    pub fn bounding_box(&self) -> Aabb {
        self.bounding_box
    }

    /// The bounding sphere.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        self.bounding_sphere
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// The narrowest index format that can address every vertex.
    pub fn preferred_index_format(&self) -> IndexFormat {
        if self.positions.len() <= usize::from(u16::MAX) + 1 {
            IndexFormat::Uint16
        } else {
            IndexFormat::Uint32
        }
    }

    /// Interleaves position, normal and uv into one vertex buffer.
    pub fn interleaved_vertices(&self) -> Vec<u8> {
        let mut floats = Vec::with_capacity(self.positions.len() * VERTEX_STRIDE / 4);
        for (i, position) in self.positions.iter().enumerate() {
            let normal = self.normals.get(i).copied().unwrap_or(Vec3::Y);
            let uv = self.uvs.get(i).copied().unwrap_or(Vec2::ZERO);
            floats.extend_from_slice(&position.to_array());
            floats.extend_from_slice(&normal.to_array());
            floats.extend_from_slice(&uv.to_array());
        }
        bytemuck::cast_slice(&floats).to_vec()
    }

    /// Encodes the indices in the requested format.
    ///
    /// `Uint16` silently truncates; callers pick it only from
    /// [`MeshData::preferred_index_format`].
    pub fn index_bytes(&self, format: IndexFormat) -> Vec<u8> {
        match format {
            IndexFormat::Uint16 => {
                let narrow: Vec<u16> = self.indices.iter().map(|i| *i as u16).collect();
                bytemuck::cast_slice(&narrow).to_vec()
            }
            IndexFormat::Uint32 => bytemuck::cast_slice(&self.indices).to_vec(),
        }
    }
}

fn sphere(p: &SphereParams) -> MeshData {
    let (ws, hs) = (p.width_segments, p.height_segments);
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut indices = Vec::new();

    let row = ws + 1;
    for iy in 0..=hs {
        let v = iy as f32 / hs as f32;
        for ix in 0..=ws {
            let u = ix as f32 / ws as f32;
            let position = Vec3::new(
                -p.radius * (u * 2.0 * PI).cos() * (v * PI).sin(),
                p.radius * (v * PI).cos(),
                p.radius * (u * 2.0 * PI).sin() * (v * PI).sin(),
            );
            positions.push(position);
            normals.push(position.normalize_or_zero());
            uvs.push(Vec2::new(u, 1.0 - v));
        }
    }

    for iy in 0..hs {
        for ix in 0..ws {
            let a = iy * row + ix + 1;
            let b = iy * row + ix;
            let c = (iy + 1) * row + ix;
            let d = (iy + 1) * row + ix + 1;
            // Poles collapse to a single triangle per quad.
            if iy != 0 {
                indices.extend_from_slice(&[a, b, d]);
            }
            if iy != hs - 1 {
                indices.extend_from_slice(&[b, c, d]);
            }
        }
    }

    MeshData::new(positions, normals, uvs, indices)
}

/// Appends one subdivided face of a box, `u`/`v`/`w` being axis indices.
#[allow(clippy::too_many_arguments)]
fn box_face(
    out: &mut (Vec<Vec3>, Vec<Vec3>, Vec<Vec2>, Vec<u32>),
    (u, v, w): (usize, usize, usize),
    (udir, vdir): (f32, f32),
    (width, height, depth): (f32, f32, f32),
    (grid_x, grid_y): (u32, u32),
) {
    let (positions, normals, uvs, indices) = out;
    let base = positions.len() as u32;
    let seg_w = width / grid_x as f32;
    let seg_h = height / grid_y as f32;

    for iy in 0..=grid_y {
        let y = iy as f32 * seg_h - height / 2.0;
        for ix in 0..=grid_x {
            let x = ix as f32 * seg_w - width / 2.0;
            let mut position = [0.0f32; 3];
            position[u] = x * udir;
            position[v] = y * vdir;
            position[w] = depth / 2.0;
            let mut normal = [0.0f32; 3];
            normal[w] = if depth > 0.0 { 1.0 } else { -1.0 };
            positions.push(Vec3::from_array(position));
            normals.push(Vec3::from_array(normal));
            uvs.push(Vec2::new(
                ix as f32 / grid_x as f32,
                1.0 - iy as f32 / grid_y as f32,
            ));
        }
    }

    let row = grid_x + 1;
    for iy in 0..grid_y {
        for ix in 0..grid_x {
            let a = base + ix + row * iy;
            let b = base + ix + row * (iy + 1);
            let c = base + ix + 1 + row * (iy + 1);
            let d = base + ix + 1 + row * iy;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }
}

fn cuboid(p: &BoxParams) -> MeshData {
    let (x, y, z) = (0, 1, 2);
    let mut out = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    let (w, h, d) = (p.width, p.height, p.depth);
    let (ws, hs, ds) = (p.width_segments, p.height_segments, p.depth_segments);

    box_face(&mut out, (z, y, x), (-1.0, -1.0), (d, h, w), (ds, hs)); // +x
    box_face(&mut out, (z, y, x), (1.0, -1.0), (d, h, -w), (ds, hs)); // -x
    box_face(&mut out, (x, z, y), (1.0, 1.0), (w, d, h), (ws, ds)); // +y
    box_face(&mut out, (x, z, y), (1.0, -1.0), (w, d, -h), (ws, ds)); // -y
    box_face(&mut out, (x, y, z), (1.0, -1.0), (w, h, d), (ws, hs)); // +z
    box_face(&mut out, (x, y, z), (-1.0, -1.0), (w, h, -d), (ws, hs)); // -z

    let (positions, normals, uvs, indices) = out;
    MeshData::new(positions, normals, uvs, indices)
}

fn plane(p: &PlaneParams) -> MeshData {
    let mut out = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    box_face(
        &mut out,
        (0, 1, 2),
        (1.0, -1.0),
        (p.width, p.height, 0.0),
        (p.width_segments, p.height_segments),
    );
    let (positions, mut normals, uvs, indices) = out;
    // A zero-depth face gets a -Z normal from the box rule; planes face +Z.
    normals.iter_mut().for_each(|n| *n = Vec3::Z);
    MeshData::new(positions, normals, uvs, indices)
}

fn cylinder(p: &CylinderParams) -> MeshData {
    let rs = p.radial_segments;
    let half = p.height / 2.0;
    let slope = (p.radius_bottom - p.radius_top) / p.height;
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut indices = Vec::new();

    // Side wall, one height segment.
    for row in 0..=1u32 {
        let v = row as f32;
        let radius = v * (p.radius_bottom - p.radius_top) + p.radius_top;
        for x in 0..=rs {
            let u = x as f32 / rs as f32;
            let theta = u * 2.0 * PI;
            let (sin, cos) = theta.sin_cos();
            positions.push(Vec3::new(radius * sin, -v * p.height + half, radius * cos));
            normals.push(Vec3::new(sin, slope, cos).normalize_or_zero());
            uvs.push(Vec2::new(u, 1.0 - v));
        }
    }
    let row = rs + 1;
    for x in 0..rs {
        let a = x;
        let b = row + x;
        let c = row + x + 1;
        let d = x + 1;
        indices.extend_from_slice(&[a, b, d, b, c, d]);
    }

    for top in [true, false] {
        let radius = if top { p.radius_top } else { p.radius_bottom };
        if radius <= 0.0 {
            continue;
        }
        let sign = if top { 1.0 } else { -1.0 };
        let center_start = positions.len() as u32;
        for _ in 0..rs {
            positions.push(Vec3::new(0.0, half * sign, 0.0));
            normals.push(Vec3::new(0.0, sign, 0.0));
            uvs.push(Vec2::splat(0.5));
        }
        let rim_start = positions.len() as u32;
        for x in 0..=rs {
            let theta = x as f32 / rs as f32 * 2.0 * PI;
            let (sin, cos) = theta.sin_cos();
            positions.push(Vec3::new(radius * sin, half * sign, radius * cos));
            normals.push(Vec3::new(0.0, sign, 0.0));
            uvs.push(Vec2::new(cos * 0.5 + 0.5, sin * 0.5 * sign + 0.5));
        }
        for x in 0..rs {
            let c = center_start + x;
            let i = rim_start + x;
            if top {
                indices.extend_from_slice(&[i, i + 1, c]);
            } else {
                indices.extend_from_slice(&[i + 1, i, c]);
            }
        }
    }

    MeshData::new(positions, normals, uvs, indices)
}
