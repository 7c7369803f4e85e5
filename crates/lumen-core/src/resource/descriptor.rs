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

//! Geometry and material descriptors, and the structural keys derived from them.

use crate::error::ResourceError;
use serde::{Deserialize, Serialize};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a hash of a byte slice.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut h = FNV_OFFSET_BASIS;
    for byte in bytes {
        h ^= u64::from(*byte);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// A structural cache key: the hash of a canonical serialization, plus the
/// serialization itself so collisions can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorKey {
    hash: u64,
    canonical: String,
}

impl DescriptorKey {
    fn of<T: Serialize>(value: &T) -> Result<Self, ResourceError> {
        let canonical = serde_json::to_string(value)
            .map_err(|e| ResourceError::InvalidDescriptor(e.to_string()))?;
        Ok(Self {
            hash: fnv1a_64(canonical.as_bytes()),
            canonical,
        })
    }

    /// The 64-bit hash of the canonical form.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// The canonical JSON form.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

fn check_extent(what: &str, value: f32) -> Result<(), ResourceError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ResourceError::InvalidDescriptor(format!(
            "{what} must be finite and positive, got {value}"
        )))
    }
}

fn check_segments(what: &str, value: u32, min: u32) -> Result<(), ResourceError> {
    if value >= min {
        Ok(())
    } else {
        Err(ResourceError::InvalidDescriptor(format!(
            "{what} must be at least {min}, got {value}"
        )))
    }
}

/// Parameters of a UV sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphereParams {
    /// Sphere radius.
    pub radius: f32,
    /// Segments around the equator.
    pub width_segments: u32,
    /// Segments from pole to pole.
    pub height_segments: u32,
}

impl Default for SphereParams {
    fn default() -> Self {
        Self {
            radius: 1.0,
            width_segments: 32,
            height_segments: 16,
        }
    }
}

/// Parameters of an axis-aligned box centred on the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxParams {
    /// Extent along X.
    pub width: f32,
    /// Extent along Y.
    pub height: f32,
    /// Extent along Z.
    pub depth: f32,
    /// Subdivisions along X.
    pub width_segments: u32,
    /// Subdivisions along Y.
    pub height_segments: u32,
    /// Subdivisions along Z.
    pub depth_segments: u32,
}

impl Default for BoxParams {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
            depth: 1.0,
            width_segments: 1,
            height_segments: 1,
            depth_segments: 1,
        }
    }
}

/// Parameters of a plane in the XY plane facing +Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneParams {
    /// Extent along X.
    pub width: f32,
    /// Extent along Y.
    pub height: f32,
    /// Subdivisions along X.
    pub width_segments: u32,
    /// Subdivisions along Y.
    pub height_segments: u32,
}

impl Default for PlaneParams {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
            width_segments: 1,
            height_segments: 1,
        }
    }
}

/// Parameters of a capped cylinder along Y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CylinderParams {
    /// Radius of the top cap.
    pub radius_top: f32,
    /// Radius of the bottom cap.
    pub radius_bottom: f32,
    /// Extent along Y.
    pub height: f32,
    /// Segments around the circumference.
    pub radial_segments: u32,
}

impl Default for CylinderParams {
    fn default() -> Self {
        Self {
            radius_top: 1.0,
            radius_bottom: 1.0,
            height: 1.0,
            radial_segments: 8,
        }
    }
}

/// Describes a geometry to build. Two equal descriptors always produce the same cache key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeometryDescriptor {
    /// A UV sphere.
    Sphere(SphereParams),
    /// A box.
    Box(BoxParams),
    /// A plane.
    Plane(PlaneParams),
    /// A cylinder (a cone when one radius is zero).
    Cylinder(CylinderParams),
}

impl GeometryDescriptor {
    /// A sphere of the given radius with default tessellation.
    pub fn sphere(radius: f32) -> Self {
        Self::Sphere(SphereParams {
            radius,
            ..Default::default()
        })
    }

    /// A box with the given extents and one segment per side.
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        Self::Box(BoxParams {
            width,
            height,
            depth,
            ..Default::default()
        })
    }

    /// A plane with the given extents.
    pub fn plane(width: f32, height: f32) -> Self {
        Self::Plane(PlaneParams {
            width,
            height,
            ..Default::default()
        })
    }

    /// A cylinder with equal cap radii.
    pub fn cylinder(radius: f32, height: f32) -> Self {
        Self::Cylinder(CylinderParams {
            radius_top: radius,
            radius_bottom: radius,
            height,
            ..Default::default()
        })
    }

    /// Rejects descriptors no backend can build.
    pub fn validate(&self) -> Result<(), ResourceError> {
        match self {
            GeometryDescriptor::Sphere(p) => {
                check_extent("sphere radius", p.radius)?;
                check_segments("sphere width segments", p.width_segments, 3)?;
                check_segments("sphere height segments", p.height_segments, 2)
            }
            GeometryDescriptor::Box(p) => {
                check_extent("box width", p.width)?;
                check_extent("box height", p.height)?;
                check_extent("box depth", p.depth)?;
                check_segments("box width segments", p.width_segments, 1)?;
                check_segments("box height segments", p.height_segments, 1)?;
                check_segments("box depth segments", p.depth_segments, 1)
            }
            GeometryDescriptor::Plane(p) => {
                check_extent("plane width", p.width)?;
                check_extent("plane height", p.height)?;
                check_segments("plane width segments", p.width_segments, 1)?;
                check_segments("plane height segments", p.height_segments, 1)
            }
            GeometryDescriptor::Cylinder(p) => {
                if !(p.radius_top.is_finite() && p.radius_top >= 0.0)
                    || !(p.radius_bottom.is_finite() && p.radius_bottom >= 0.0)
                    || (p.radius_top == 0.0 && p.radius_bottom == 0.0)
                {
                    return Err(ResourceError::InvalidDescriptor(format!(
                        "cylinder radii must be finite, non-negative and not both zero, got {} / {}",
                        p.radius_top, p.radius_bottom
                    )));
                }
                check_extent("cylinder height", p.height)?;
                check_segments("cylinder radial segments", p.radial_segments, 3)
            }
        }
    }

    /// The structural cache key of this descriptor.
    pub fn key(&self) -> Result<DescriptorKey, ResourceError> {
        DescriptorKey::of(self)
    }
}

/// The shading model of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    /// Metallic-roughness PBR.
    #[default]
    Standard,
    /// Unlit flat colour.
    Basic,
    /// PBR with the extended physical parameters.
    Physical,
}

/// Which faces a material renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Front faces only.
    #[default]
    Front,
    /// Back faces only.
    Back,
    /// Both faces.
    Double,
}

/// Describes a material to build.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDescriptor {
    /// The shading model.
    pub kind: MaterialKind,
    /// Base colour as `0xRRGGBB`.
    pub color: u32,
    /// Metalness in `[0, 1]`.
    pub metalness: f32,
    /// Roughness in `[0, 1]`.
    pub roughness: f32,
    /// Emissive colour as `0xRRGGBB`.
    pub emissive: u32,
    /// Multiplier of the emissive colour.
    pub emissive_intensity: f32,
    /// Whether the material is alpha blended.
    pub transparent: bool,
    /// Opacity in `[0, 1]`, only meaningful when transparent.
    pub opacity: f32,
    /// Rendered faces.
    pub side: Side,
    /// Render edges only.
    pub wireframe: bool,
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        Self {
            kind: MaterialKind::Standard,
            color: 0xffffff,
            metalness: 0.0,
            roughness: 1.0,
            emissive: 0x000000,
            emissive_intensity: 0.0,
            transparent: false,
            opacity: 1.0,
            side: Side::Front,
            wireframe: false,
        }
    }
}

impl MaterialDescriptor {
    /// A default material of the given kind and colour.
    pub fn new(kind: MaterialKind, color: u32) -> Self {
        Self {
            kind,
            color,
            ..Default::default()
        }
    }

    /// Rejects descriptors no backend can build.
    pub fn validate(&self) -> Result<(), ResourceError> {
        let unit = |what: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ResourceError::InvalidDescriptor(format!(
                    "{what} must be within [0, 1], got {v}"
                )))
            }
        };
        unit("metalness", self.metalness)?;
        unit("roughness", self.roughness)?;
        unit("opacity", self.opacity)?;
        if !(self.emissive_intensity.is_finite() && self.emissive_intensity >= 0.0) {
            return Err(ResourceError::InvalidDescriptor(format!(
                "emissive intensity must be finite and non-negative, got {}",
                self.emissive_intensity
            )));
        }
        if self.color > 0xffffff || self.emissive > 0xffffff {
            return Err(ResourceError::InvalidDescriptor(
                "colours must be 24-bit 0xRRGGBB values".to_string(),
            ));
        }
        Ok(())
    }

    /// The structural cache key of this descriptor.
    pub fn key(&self) -> Result<DescriptorKey, ResourceError> {
        DescriptorKey::of(self)
    }
}
