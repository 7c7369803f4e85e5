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

//! The logical device shared by the probe, the backends and the compute device.

use super::conversions;
use lumen_core::traits::GpuDevice;
use lumen_core::{BackendDescription, DetectionError};
use std::any::Any;
use std::sync::Arc;

/// Holds the core `wgpu` objects of one logical device.
#[derive(Debug)]
pub struct WgpuDeviceContext {
    /// The logical device.
    pub device: wgpu::Device,
    /// The queue of the logical device.
    pub queue: wgpu::Queue,
    /// Information about the adapter the device was created on.
    pub adapter_info: wgpu::AdapterInfo,
    /// The features enabled on the device.
    pub active_features: wgpu::Features,
    /// The limits the device was created with.
    pub limits: wgpu::Limits,
    /// Whether the adapter runs general-purpose compute shaders.
    pub compute_shaders: bool,
}

impl WgpuDeviceContext {
    /// Requests a logical device from `adapter`.
    ///
    /// Enables every recorded feature the adapter supports. `limits` defaults to
    /// the adapter's own limits.
    pub async fn request(
        adapter: &wgpu::Adapter,
        limits: Option<wgpu::Limits>,
        label: &str,
    ) -> Result<Self, DetectionError> {
        let adapter_info = adapter.get_info();
        let required_features = conversions::wanted_features(adapter.features());
        let required_limits = limits.unwrap_or_else(|| adapter.limits());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features,
                required_limits,
                ..Default::default()
            })
            .await
            .map_err(|e| DetectionError::DeviceCreationFailed(e.to_string()))?;
        log::info!(
            "Logical device created on \"{}\" ({})",
            adapter_info.name,
            conversions::backend_name(adapter_info.backend)
        );

        device.on_uncaptured_error(Box::new(|e| {
            log::error!("WGPU Uncaptured Error: {e:?}");
        }));

        let compute_shaders = adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);

        Ok(Self {
            active_features: device.features(),
            limits: device.limits(),
            device,
            queue,
            adapter_info,
            compute_shaders,
        })
    }

    /// Human-readable information about this device.
    pub fn description(&self) -> BackendDescription {
        BackendDescription {
            api: conversions::graphics_api(self.adapter_info.backend),
            adapter_name: self.adapter_info.name.clone(),
            vendor_id: self.adapter_info.vendor,
            device_type: conversions::device_type(self.adapter_info.device_type),
            max_texture_size: self.limits.max_texture_dimension_2d,
            max_vertex_attributes: self.limits.max_vertex_attributes,
        }
    }

    /// Returns `true` if the device was created with the canonically named feature.
    pub fn has_feature(&self, name: &str) -> bool {
        conversions::feature_names(self.active_features)
            .iter()
            .any(|f| f == name)
    }

    /// Blocks until all submitted work has completed.
    pub fn poll_blocking(&self) {
        if let Err(e) = self.device.poll(wgpu::PollType::Wait) {
            log::warn!("Failed to poll device: {e:?}");
        }
    }
}

impl GpuDevice for WgpuDeviceContext {
    fn label(&self) -> String {
        format!(
            "{} ({})",
            self.adapter_info.name,
            conversions::backend_name(self.adapter_info.backend)
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
