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

//! GPU-ready material parameters derived from a material descriptor.

use super::descriptor::{MaterialDescriptor, MaterialKind, Side};
use bytemuck::{Pod, Zeroable};

/// Converts a `0xRRGGBB` colour to linear `[r, g, b]` in `[0, 1]`.
pub fn rgb_from_hex(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}

/// Bit set in [`MaterialUniforms::flags`] for unlit materials.
pub const FLAG_UNLIT: u32 = 1 << 0;
/// Bit set in [`MaterialUniforms::flags`] for alpha-blended materials.
pub const FLAG_TRANSPARENT: u32 = 1 << 1;
/// Bit set in [`MaterialUniforms::flags`] for double-sided materials.
pub const FLAG_DOUBLE_SIDED: u32 = 1 << 2;
/// Bit set in [`MaterialUniforms::flags`] for back-face-only materials.
pub const FLAG_BACK_SIDE: u32 = 1 << 3;
/// Bit set in [`MaterialUniforms::flags`] for wireframe materials.
pub const FLAG_WIREFRAME: u32 = 1 << 4;

/// The uniform block uploaded for a material, 48 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    /// Base colour, alpha is the opacity.
    pub base_color: [f32; 4],
    /// Emissive colour, alpha is the emissive intensity.
    pub emissive: [f32; 4],
    /// Metalness.
    pub metalness: f32,
    /// Roughness.
    pub roughness: f32,
    /// `FLAG_*` bits.
    pub flags: u32,
    _padding: u32,
}

impl From<&MaterialDescriptor> for MaterialUniforms {
    fn from(desc: &MaterialDescriptor) -> Self {
        let [r, g, b] = rgb_from_hex(desc.color);
        let [er, eg, eb] = rgb_from_hex(desc.emissive);
        let opacity = if desc.transparent { desc.opacity } else { 1.0 };

        let mut flags = 0;
        if desc.kind == MaterialKind::Basic {
            flags |= FLAG_UNLIT;
        }
        if desc.transparent {
            flags |= FLAG_TRANSPARENT;
        }
        match desc.side {
            Side::Front => {}
            Side::Back => flags |= FLAG_BACK_SIDE,
            Side::Double => flags |= FLAG_DOUBLE_SIDED,
        }
        if desc.wireframe {
            flags |= FLAG_WIREFRAME;
        }

        Self {
            base_color: [r, g, b, opacity],
            emissive: [er, eg, eb, desc.emissive_intensity],
            metalness: desc.metalness,
            roughness: desc.roughness,
            flags,
            _padding: 0,
        }
    }
}
