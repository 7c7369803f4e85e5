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

//! Backend kinds, selection policy and the quality recommendation derived from a score.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two families of backend the subsystem can drive.
///
/// Downstream code branches on this tag, never on the concrete backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A low-level, explicit API with general-purpose compute (Vulkan, Metal, DX12).
    Modern,
    /// The universally supported fallback without general-purpose compute (GL).
    Legacy,
}

impl BackendKind {
    /// Returns `true` if compute pipelines can be used with this backend kind.
    pub fn supports_compute(self) -> bool {
        matches!(self, BackendKind::Modern)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Modern => write!(f, "modern"),
            BackendKind::Legacy => write!(f, "legacy"),
        }
    }
}

/// A backend-agnostic representation of the graphics API behind an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GraphicsApi {
    /// Vulkan API.
    Vulkan,
    /// Apple's Metal API.
    Metal,
    /// Microsoft's DirectX 12 API.
    Dx12,
    /// OpenGL / OpenGL ES.
    OpenGL,
    /// The browser's WebGPU implementation.
    WebGpu,
    /// An unknown or unsupported API.
    #[default]
    Unknown,
}

impl GraphicsApi {
    /// Returns a human-readable name for the API.
    pub fn name(self) -> &'static str {
        match self {
            GraphicsApi::Vulkan => "Vulkan",
            GraphicsApi::Metal => "Metal",
            GraphicsApi::Dx12 => "DirectX 12",
            GraphicsApi::OpenGL => "OpenGL",
            GraphicsApi::WebGpu => "WebGPU",
            GraphicsApi::Unknown => "Unknown",
        }
    }
}

/// The physical type of a graphics device (GPU).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RendererDeviceType {
    /// A GPU integrated into the CPU.
    IntegratedGpu,
    /// A discrete, dedicated GPU.
    DiscreteGpu,
    /// A virtualized GPU.
    VirtualGpu,
    /// A software renderer running on the CPU.
    Cpu,
    /// An unknown device type.
    #[default]
    Unknown,
}

/// Human-readable information about the active backend, logged on selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendDescription {
    /// The graphics API driving the backend.
    pub api: GraphicsApi,
    /// The adapter name reported by the driver.
    pub adapter_name: String,
    /// PCI vendor id, `0` when unknown.
    pub vendor_id: u32,
    /// The physical type of the adapter.
    pub device_type: RendererDeviceType,
    /// Maximum 2D texture dimension of the logical device.
    pub max_texture_size: u32,
    /// Maximum number of vertex attributes of the logical device.
    pub max_vertex_attributes: u32,
}

impl fmt::Display for BackendDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" via {} ({:?}, max texture {}, max vertex attributes {})",
            self.adapter_name,
            self.api.name(),
            self.device_type,
            self.max_texture_size,
            self.max_vertex_attributes
        )
    }
}

/// The caller's policy for backend selection and fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// Try the modern backend first when the capability report allows it.
    pub prefer_modern: bool,
    /// Minimum performance score the modern backend must reach to be chosen.
    pub min_performance_score: u8,
    /// Restart initialization on the legacy backend if any stage fails.
    pub fallback_to_legacy: bool,
}

impl SelectionPolicy {
    /// Returns a copy of this policy that never picks the modern backend.
    pub fn forcing_legacy(self) -> Self {
        Self {
            prefer_modern: false,
            ..self
        }
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            prefer_modern: true,
            min_performance_score: 60,
            fallback_to_legacy: true,
        }
    }
}

/// Coarse quality tier handed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Compute disabled entirely, small content ceilings.
    Low,
    /// Compute enabled with conservative ceilings.
    Medium,
    /// Compute-driven paths and large ceilings.
    High,
}

/// Application-facing sizing hints derived purely from a performance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedSettings {
    /// The quality tier.
    pub quality_tier: QualityTier,
    /// Whether compute-driven content paths should be used.
    pub enable_compute: bool,
    /// Whether optional, expensive features should be enabled.
    pub enable_advanced_features: bool,
    /// Upper bound for simulated particles.
    pub particle_count_ceiling: u32,
    /// Upper bound for instances across instanced batches.
    pub instance_count_ceiling: u32,
}

impl RecommendedSettings {
    /// Score at or above which the high tier is recommended.
    pub const HIGH_TIER_SCORE: u8 = 80;
    /// Score at or above which the medium tier is recommended.
    pub const MEDIUM_TIER_SCORE: u8 = 60;

    /// Derives the recommendation from a score in `0..=100`.
    pub fn from_score(score: u8) -> Self {
        if score >= Self::HIGH_TIER_SCORE {
            Self {
                quality_tier: QualityTier::High,
                enable_compute: true,
                enable_advanced_features: true,
                particle_count_ceiling: 50_000,
                instance_count_ceiling: 20_000,
            }
        } else if score >= Self::MEDIUM_TIER_SCORE {
            Self {
                quality_tier: QualityTier::Medium,
                enable_compute: true,
                enable_advanced_features: false,
                particle_count_ceiling: 20_000,
                instance_count_ceiling: 10_000,
            }
        } else {
            Self::low()
        }
    }

    /// The low tier, also used before initialization.
    pub fn low() -> Self {
        Self {
            quality_tier: QualityTier::Low,
            enable_compute: false,
            enable_advanced_features: false,
            particle_count_ceiling: 5_000,
            instance_count_ceiling: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_follow_score_thresholds() {
        assert_eq!(RecommendedSettings::from_score(100).quality_tier, QualityTier::High);
        assert_eq!(RecommendedSettings::from_score(80).quality_tier, QualityTier::High);
        assert_eq!(RecommendedSettings::from_score(79).quality_tier, QualityTier::Medium);
        assert_eq!(RecommendedSettings::from_score(60).quality_tier, QualityTier::Medium);
        assert_eq!(RecommendedSettings::from_score(59).quality_tier, QualityTier::Low);
        assert_eq!(RecommendedSettings::from_score(0), RecommendedSettings::low());
    }

    #[test]
    fn low_tier_disables_compute() {
        let low = RecommendedSettings::from_score(10);
        assert!(!low.enable_compute);
        assert!(!low.enable_advanced_features);
        assert_eq!(low.particle_count_ceiling, 5_000);

        let medium = RecommendedSettings::from_score(65);
        assert!(medium.enable_compute);
        assert!(!medium.enable_advanced_features);
        assert!(medium.instance_count_ceiling > low.instance_count_ceiling);
    }

    #[test]
    fn forcing_legacy_keeps_other_fields() {
        let policy = SelectionPolicy {
            prefer_modern: true,
            min_performance_score: 70,
            fallback_to_legacy: false,
        };
        let forced = policy.forcing_legacy();
        assert!(!forced.prefer_modern);
        assert_eq!(forced.min_performance_score, 70);
        assert!(!forced.fallback_to_legacy);
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: SelectionPolicy = serde_json::from_str(r#"{"prefer_modern": false}"#).unwrap();
        assert!(!policy.prefer_modern);
        assert_eq!(policy.min_performance_score, 60);
        assert!(policy.fallback_to_legacy);
    }
}
