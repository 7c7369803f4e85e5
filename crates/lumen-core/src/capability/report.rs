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

//! The immutable capability report produced by a probe.

use crate::backend::{GraphicsApi, RendererDeviceType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Canonical feature names recorded in a [`CapabilityReport`].
pub mod feature {
    /// GPU timestamp queries.
    pub const TIMESTAMP_QUERY: &str = "timestamp-query";
    /// BC (S3TC / DXT) texture compression.
    pub const TEXTURE_COMPRESSION_BC: &str = "texture-compression-bc";
    /// ETC2 texture compression.
    pub const TEXTURE_COMPRESSION_ETC2: &str = "texture-compression-etc2";
    /// ASTC texture compression.
    pub const TEXTURE_COMPRESSION_ASTC: &str = "texture-compression-astc";
    /// Indirect draws with a non-zero first instance.
    pub const INDIRECT_FIRST_INSTANCE: &str = "indirect-first-instance";
    /// Disabling depth clipping.
    pub const DEPTH_CLIP_CONTROL: &str = "depth-clip-control";
    /// The `depth32float-stencil8` texture format.
    pub const DEPTH32FLOAT_STENCIL8: &str = "depth32float-stencil8";
}

/// Canonical limit names recorded in a [`CapabilityReport`].
pub mod limit {
    /// Maximum width/height of a 2D texture.
    pub const MAX_TEXTURE_DIMENSION_2D: &str = "maxTextureDimension2D";
    /// Maximum number of bind groups in a pipeline layout.
    pub const MAX_BIND_GROUPS: &str = "maxBindGroups";
    /// Maximum uniform buffers per shader stage.
    pub const MAX_UNIFORM_BUFFERS_PER_SHADER_STAGE: &str = "maxUniformBuffersPerShaderStage";
    /// Maximum storage buffers per shader stage.
    pub const MAX_STORAGE_BUFFERS_PER_SHADER_STAGE: &str = "maxStorageBuffersPerShaderStage";
    /// Maximum size of a storage buffer binding.
    pub const MAX_STORAGE_BUFFER_BINDING_SIZE: &str = "maxStorageBufferBindingSize";
    /// Maximum size of any buffer.
    pub const MAX_BUFFER_SIZE: &str = "maxBufferSize";
    /// Maximum number of vertex attributes.
    pub const MAX_VERTEX_ATTRIBUTES: &str = "maxVertexAttributes";
    /// Maximum invocations in one compute workgroup.
    pub const MAX_COMPUTE_INVOCATIONS_PER_WORKGROUP: &str = "maxComputeInvocationsPerWorkgroup";
    /// Maximum X dimension of a compute workgroup.
    pub const MAX_COMPUTE_WORKGROUP_SIZE_X: &str = "maxComputeWorkgroupSizeX";
    /// Maximum workgroups per dispatch dimension.
    pub const MAX_COMPUTE_WORKGROUPS_PER_DIMENSION: &str = "maxComputeWorkgroupsPerDimension";
}

/// Identifying information about the adapter that produced a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    /// The adapter name reported by the driver.
    pub name: String,
    /// PCI vendor id, `0` when unknown.
    pub vendor: u32,
    /// PCI device id, `0` when unknown.
    pub device: u32,
    /// The physical type of the adapter.
    pub device_type: RendererDeviceType,
    /// The API the adapter is exposed through.
    pub api: GraphicsApi,
    /// Driver name and version, possibly empty.
    pub driver: String,
}

/// Named boolean view over the string feature set, computed once per report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSupport {
    /// General-purpose compute pipelines.
    pub compute: bool,
    /// GPU timestamp queries.
    pub timestamp_query: bool,
    /// BC texture compression.
    pub texture_compression_bc: bool,
    /// ETC2 texture compression.
    pub texture_compression_etc2: bool,
    /// ASTC texture compression.
    pub texture_compression_astc: bool,
    /// Depth clip control.
    pub depth_clip_control: bool,
    /// The `depth32float-stencil8` format.
    pub depth32float_stencil8: bool,
    /// Indirect draws with a first instance.
    pub indirect_first_instance: bool,
}

impl FeatureSupport {
    fn from_features(features: &BTreeSet<String>, compute: bool) -> Self {
        let has = |name: &str| features.contains(name);
        Self {
            compute,
            timestamp_query: has(feature::TIMESTAMP_QUERY),
            texture_compression_bc: has(feature::TEXTURE_COMPRESSION_BC),
            texture_compression_etc2: has(feature::TEXTURE_COMPRESSION_ETC2),
            texture_compression_astc: has(feature::TEXTURE_COMPRESSION_ASTC),
            depth_clip_control: has(feature::DEPTH_CLIP_CONTROL),
            depth32float_stencil8: has(feature::DEPTH32FLOAT_STENCIL8),
            indirect_first_instance: has(feature::INDIRECT_FIRST_INSTANCE),
        }
    }

    /// Number of texture compression families available.
    pub fn compression_formats(&self) -> u8 {
        [
            self.texture_compression_bc,
            self.texture_compression_etc2,
            self.texture_compression_astc,
        ]
        .into_iter()
        .filter(|present| *present)
        .count() as u8
    }
}

/// A structured, immutable description of what the GPU stack supports.
///
/// Reports are built once by the capability probe and shared behind an `Arc`.
/// Two reports built from the same inputs compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReport {
    supported: bool,
    features: BTreeSet<String>,
    limits: BTreeMap<String, u64>,
    error_message: Option<String>,
    adapter: Option<AdapterInfo>,
    support: FeatureSupport,
}

impl CapabilityReport {
    /// Builds the report of a runtime that can drive the modern backend.
    pub fn supported<F, S>(
        features: F,
        limits: BTreeMap<String, u64>,
        compute: bool,
        adapter: Option<AdapterInfo>,
    ) -> Self
    where
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let features: BTreeSet<String> = features.into_iter().map(Into::into).collect();
        let support = FeatureSupport::from_features(&features, compute);
        Self {
            supported: true,
            features,
            limits,
            error_message: None,
            adapter,
            support,
        }
    }

    /// Builds the report of a runtime that cannot drive the modern backend.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            supported: false,
            features: BTreeSet::new(),
            limits: BTreeMap::new(),
            error_message: Some(message.into()),
            adapter: None,
            support: FeatureSupport::default(),
        }
    }

    /// Whether the modern backend is available.
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// The adapter feature names.
    pub fn features(&self) -> &BTreeSet<String> {
        &self.features
    }

    /// Returns `true` if the named feature was reported.
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.contains(name)
    }

    /// The adapter limits, keyed by canonical limit name.
    pub fn limits(&self) -> &BTreeMap<String, u64> {
        &self.limits
    }

    /// Returns a limit, or `0` if it was not reported.
    pub fn limit(&self, name: &str) -> u64 {
        self.limits.get(name).copied().unwrap_or(0)
    }

    /// The diagnostic of an unsupported report.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// The adapter that produced the report, if any.
    pub fn adapter(&self) -> Option<&AdapterInfo> {
        self.adapter.as_ref()
    }

    /// The named feature flags of this report.
    pub fn support(&self) -> FeatureSupport {
        self.support
    }

    /// Shorthand for `support().compute`.
    pub fn supports_compute(&self) -> bool {
        self.support.compute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_report_is_empty() {
        let report = CapabilityReport::unsupported("no adapter");
        assert!(!report.is_supported());
        assert!(report.features().is_empty());
        assert_eq!(report.limit(limit::MAX_BIND_GROUPS), 0);
        assert_eq!(report.error_message(), Some("no adapter"));
        assert_eq!(report.support(), FeatureSupport::default());
    }

    #[test]
    fn feature_support_is_derived_from_names() {
        let report = CapabilityReport::supported(
            [feature::TIMESTAMP_QUERY, feature::TEXTURE_COMPRESSION_ASTC, "shader-f16"],
            BTreeMap::new(),
            true,
            None,
        );
        let support = report.support();
        assert!(support.compute);
        assert!(support.timestamp_query);
        assert!(support.texture_compression_astc);
        assert!(!support.texture_compression_bc);
        assert_eq!(support.compression_formats(), 1);
        assert!(report.has_feature("shader-f16"));
    }

    #[test]
    fn reports_compare_structurally() {
        let limits: BTreeMap<String, u64> = [(limit::MAX_BIND_GROUPS.to_string(), 4)].into();
        let a = CapabilityReport::supported([feature::TIMESTAMP_QUERY], limits.clone(), true, None);
        let b = CapabilityReport::supported(
            vec![feature::TIMESTAMP_QUERY.to_string()],
            limits,
            true,
            None,
        );
        assert_eq!(a, b);
    }
}
