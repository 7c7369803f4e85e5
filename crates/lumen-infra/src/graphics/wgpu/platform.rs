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

//! The `wgpu` runtime: adapter probing and backend construction.

use super::backend::WgpuRenderBackend;
use super::context::WgpuDeviceContext;
use super::conversions;
use async_trait::async_trait;
use lumen_core::capability::AdapterInfo;
use lumen_core::traits::{BackendFactory, GpuAdapter, GpuDevice, GpuRuntime, RenderBackend};
use lumen_core::{BackendError, DetectionError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tuning of the `wgpu` platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformOptions {
    /// Adapter preference for both backends.
    pub power_preference: wgpu::PowerPreference,
    /// Use 16-bit indices on the legacy backend whenever a mesh allows it.
    pub legacy_index_u16: bool,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            legacy_index_u16: true,
        }
    }
}

/// A physical adapter on a modern backend.
pub struct WgpuAdapterProbe {
    adapter: wgpu::Adapter,
}

#[async_trait]
impl GpuAdapter for WgpuAdapterProbe {
    fn info(&self) -> AdapterInfo {
        conversions::adapter_info(&self.adapter.get_info())
    }

    fn features(&self) -> Vec<String> {
        conversions::feature_names(self.adapter.features())
    }

    fn limits(&self) -> BTreeMap<String, u64> {
        conversions::limit_map(&self.adapter.limits())
    }

    fn supports_compute(&self) -> bool {
        self.adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
    }

    async fn request_device(&self) -> Result<Arc<dyn GpuDevice>, DetectionError> {
        let context =
            WgpuDeviceContext::request(&self.adapter, None, "Lumen Modern Device").await?;
        Ok(Arc::new(context))
    }
}

/// Entry point into `wgpu`, implementing both the runtime and the backend factory.
pub struct WgpuPlatform {
    options: PlatformOptions,
    modern_instance: wgpu::Instance,
}

impl WgpuPlatform {
    /// Creates the platform. No adapter is requested until detection runs.
    pub fn new(options: PlatformOptions) -> Self {
        let modern_instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        Self {
            options,
            modern_instance,
        }
    }

    /// The options the platform was created with.
    pub fn options(&self) -> PlatformOptions {
        self.options
    }

    async fn request_modern_adapter(&self) -> Result<wgpu::Adapter, DetectionError> {
        let adapter = self
            .modern_instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: self.options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| DetectionError::AdapterUnavailable(e.to_string()))?;

        let info = adapter.get_info();
        if info.backend == wgpu::Backend::Gl {
            return Err(DetectionError::AdapterUnavailable(format!(
                "only a GL adapter is available (\"{}\")",
                info.name
            )));
        }
        log::info!(
            "Found modern adapter: \"{}\" (Backend: {}, Device: {:?})",
            info.name,
            conversions::backend_name(info.backend),
            info.device_type
        );
        Ok(adapter)
    }

    async fn create_legacy_context(&self) -> Result<WgpuDeviceContext, DetectionError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::GL,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: self.options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| DetectionError::AdapterUnavailable(e.to_string()))?;
        let limits = wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits());
        WgpuDeviceContext::request(&adapter, Some(limits), "Lumen Legacy Device").await
    }
}

impl Default for WgpuPlatform {
    fn default() -> Self {
        Self::new(PlatformOptions::default())
    }
}

#[async_trait]
impl GpuRuntime for WgpuPlatform {
    fn has_modern_entry_point(&self) -> bool {
        wgpu::Instance::enabled_backend_features().intersects(wgpu::Backends::PRIMARY)
    }

    async fn request_adapter(&self) -> Result<Box<dyn GpuAdapter>, DetectionError> {
        let adapter = self.request_modern_adapter().await?;
        Ok(Box::new(WgpuAdapterProbe { adapter }))
    }
}

impl BackendFactory for WgpuPlatform {
    fn create_modern(
        &self,
        device: Option<Arc<dyn GpuDevice>>,
    ) -> Result<Arc<dyn RenderBackend>, BackendError> {
        let context = match device.map(|d| d.as_any_arc().downcast::<WgpuDeviceContext>()) {
            Some(Ok(context)) => context,
            Some(Err(_)) => {
                return Err(BackendError::ConstructionFailed(
                    "detected device does not belong to the wgpu runtime".to_string(),
                ))
            }
            None => {
                log::debug!("No detected device to reuse, requesting a new modern device");
                let context = pollster::block_on(async {
                    let adapter = self.request_modern_adapter().await?;
                    WgpuDeviceContext::request(&adapter, None, "Lumen Modern Device").await
                })
                .map_err(|e| BackendError::ConstructionFailed(e.to_string()))?;
                Arc::new(context)
            }
        };
        if !context.compute_shaders {
            return Err(BackendError::ConstructionFailed(format!(
                "adapter \"{}\" lacks compute shaders",
                context.adapter_info.name
            )));
        }
        Ok(Arc::new(WgpuRenderBackend::modern(context)))
    }

    fn create_legacy(&self) -> Result<Arc<dyn RenderBackend>, BackendError> {
        let context = pollster::block_on(self.create_legacy_context())
            .map_err(|e| BackendError::LegacyConstructionFailed(e.to_string()))?;
        Ok(Arc::new(WgpuRenderBackend::legacy(
            Arc::new(context),
            self.options.legacy_index_u16,
        )))
    }
}
