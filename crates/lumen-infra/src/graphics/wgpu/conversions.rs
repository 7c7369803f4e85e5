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

//! Conversions between `wgpu` types and the backend-agnostic types of `lumen-core`.

use lumen_core::capability::{feature, limit, AdapterInfo};
use lumen_core::compute::BufferUsage;
use lumen_core::{GraphicsApi, RendererDeviceType};
use std::collections::BTreeMap;

/// Every optional feature we record, with its canonical name.
const FEATURE_TABLE: &[(wgpu::Features, &str)] = &[
    (wgpu::Features::TIMESTAMP_QUERY, feature::TIMESTAMP_QUERY),
    (wgpu::Features::TEXTURE_COMPRESSION_BC, feature::TEXTURE_COMPRESSION_BC),
    (wgpu::Features::TEXTURE_COMPRESSION_ETC2, feature::TEXTURE_COMPRESSION_ETC2),
    (wgpu::Features::TEXTURE_COMPRESSION_ASTC, feature::TEXTURE_COMPRESSION_ASTC),
    (wgpu::Features::INDIRECT_FIRST_INSTANCE, feature::INDIRECT_FIRST_INSTANCE),
    (wgpu::Features::DEPTH_CLIP_CONTROL, feature::DEPTH_CLIP_CONTROL),
    (wgpu::Features::DEPTH32FLOAT_STENCIL8, feature::DEPTH32FLOAT_STENCIL8),
    (wgpu::Features::SHADER_F16, "shader-f16"),
    (wgpu::Features::FLOAT32_FILTERABLE, "float32-filterable"),
    (wgpu::Features::RG11B10UFLOAT_RENDERABLE, "rg11b10ufloat-renderable"),
    (wgpu::Features::BGRA8UNORM_STORAGE, "bgra8unorm-storage"),
];

/// Returns a human-readable name for a backend.
pub fn backend_name(backend: wgpu::Backend) -> &'static str {
    graphics_api(backend).name()
}

/// Maps a `wgpu` backend onto the agnostic API enum.
pub fn graphics_api(backend: wgpu::Backend) -> GraphicsApi {
    match backend {
        wgpu::Backend::Vulkan => GraphicsApi::Vulkan,
        wgpu::Backend::Metal => GraphicsApi::Metal,
        wgpu::Backend::Dx12 => GraphicsApi::Dx12,
        wgpu::Backend::Gl => GraphicsApi::OpenGL,
        wgpu::Backend::BrowserWebGpu => GraphicsApi::WebGpu,
        #[allow(unreachable_patterns)]
        _ => GraphicsApi::Unknown,
    }
}

/// Maps a `wgpu` device type onto the agnostic enum.
pub fn device_type(device_type: wgpu::DeviceType) -> RendererDeviceType {
    match device_type {
        wgpu::DeviceType::IntegratedGpu => RendererDeviceType::IntegratedGpu,
        wgpu::DeviceType::DiscreteGpu => RendererDeviceType::DiscreteGpu,
        wgpu::DeviceType::VirtualGpu => RendererDeviceType::VirtualGpu,
        wgpu::DeviceType::Cpu => RendererDeviceType::Cpu,
        _ => RendererDeviceType::Unknown,
    }
}

/// Converts `wgpu` adapter info.
pub fn adapter_info(info: &wgpu::AdapterInfo) -> AdapterInfo {
    AdapterInfo {
        name: info.name.clone(),
        vendor: info.vendor,
        device: info.device,
        device_type: device_type(info.device_type),
        api: graphics_api(info.backend),
        driver: format!("{} {}", info.driver, info.driver_info)
            .trim()
            .to_string(),
    }
}

/// Canonical names of the recorded features present in `features`.
pub fn feature_names(features: wgpu::Features) -> Vec<String> {
    FEATURE_TABLE
        .iter()
        .filter(|(flag, _)| features.contains(*flag))
        .map(|(_, name)| (*name).to_string())
        .collect()
}

/// The subset of `features` the backends enable on their devices.
pub fn wanted_features(features: wgpu::Features) -> wgpu::Features {
    FEATURE_TABLE
        .iter()
        .map(|(flag, _)| *flag)
        .fold(wgpu::Features::empty(), |acc, flag| acc | flag)
        & features
}

/// The recorded limits keyed by canonical name.
pub fn limit_map(limits: &wgpu::Limits) -> BTreeMap<String, u64> {
    [
        (
            limit::MAX_TEXTURE_DIMENSION_2D,
            u64::from(limits.max_texture_dimension_2d),
        ),
        (limit::MAX_BIND_GROUPS, u64::from(limits.max_bind_groups)),
        (
            limit::MAX_UNIFORM_BUFFERS_PER_SHADER_STAGE,
            u64::from(limits.max_uniform_buffers_per_shader_stage),
        ),
        (
            limit::MAX_STORAGE_BUFFERS_PER_SHADER_STAGE,
            u64::from(limits.max_storage_buffers_per_shader_stage),
        ),
        (
            limit::MAX_STORAGE_BUFFER_BINDING_SIZE,
            u64::from(limits.max_storage_buffer_binding_size),
        ),
        (limit::MAX_BUFFER_SIZE, limits.max_buffer_size),
        (
            limit::MAX_VERTEX_ATTRIBUTES,
            u64::from(limits.max_vertex_attributes),
        ),
        (
            limit::MAX_COMPUTE_INVOCATIONS_PER_WORKGROUP,
            u64::from(limits.max_compute_invocations_per_workgroup),
        ),
        (
            limit::MAX_COMPUTE_WORKGROUP_SIZE_X,
            u64::from(limits.max_compute_workgroup_size_x),
        ),
        (
            limit::MAX_COMPUTE_WORKGROUPS_PER_DIMENSION,
            u64::from(limits.max_compute_workgroups_per_dimension),
        ),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
}

/// A local extension trait to convert our types into `wgpu` types.
pub trait IntoWgpu<T> {
    /// Consumes self and converts it into a `wgpu` type.
    fn into_wgpu(self) -> T;
}

impl IntoWgpu<wgpu::BufferUsages> for BufferUsage {
    fn into_wgpu(self) -> wgpu::BufferUsages {
        let mut usages = wgpu::BufferUsages::empty();
        if self.contains(BufferUsage::STORAGE) {
            usages |= wgpu::BufferUsages::STORAGE;
        }
        if self.contains(BufferUsage::UNIFORM) {
            usages |= wgpu::BufferUsages::UNIFORM;
        }
        if self.contains(BufferUsage::COPY_SRC) {
            usages |= wgpu::BufferUsages::COPY_SRC;
        }
        if self.contains(BufferUsage::COPY_DST) {
            usages |= wgpu::BufferUsages::COPY_DST;
        }
        if self.contains(BufferUsage::VERTEX) {
            usages |= wgpu::BufferUsages::VERTEX;
        }
        if self.contains(BufferUsage::MAP_READ) {
            usages |= wgpu::BufferUsages::MAP_READ;
        }
        usages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_names_follow_flags() {
        let names = feature_names(
            wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::TEXTURE_COMPRESSION_ASTC,
        );
        assert_eq!(names, vec!["timestamp-query", "texture-compression-astc"]);
        assert!(feature_names(wgpu::Features::empty()).is_empty());
    }

    #[test]
    fn wanted_features_masks_unknown_flags() {
        let adapter = wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::POLYGON_MODE_LINE;
        assert_eq!(wanted_features(adapter), wgpu::Features::TIMESTAMP_QUERY);
    }

    #[test]
    fn limit_map_uses_canonical_names() {
        let limits = wgpu::Limits::default();
        let map = limit_map(&limits);
        assert_eq!(map[limit::MAX_BIND_GROUPS], u64::from(limits.max_bind_groups));
        assert_eq!(
            map[limit::MAX_TEXTURE_DIMENSION_2D],
            u64::from(limits.max_texture_dimension_2d)
        );
    }

    #[test]
    fn buffer_usage_converts() {
        let usage = (BufferUsage::STORAGE | BufferUsage::COPY_SRC).into_wgpu();
        assert_eq!(
            usage,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC
        );
        assert_eq!(backend_name(wgpu::Backend::Gl), "OpenGL");
    }
}
