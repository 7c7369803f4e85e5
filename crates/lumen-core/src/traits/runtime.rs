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

//! Contracts for querying the GPU runtime during capability detection.

use crate::capability::AdapterInfo;
use crate::error::DetectionError;
use async_trait::async_trait;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// The entry point into a GPU runtime.
///
/// A concrete implementation lives in `lumen-infra` and wraps `wgpu`. Tests
/// provide in-memory stubs.
#[async_trait]
pub trait GpuRuntime: Send + Sync {
    /// Synchronously checks whether a modern backend is exposed at all.
    fn has_modern_entry_point(&self) -> bool;

    /// Requests a high-performance adapter on a modern backend.
    ///
    /// Fails with [`DetectionError::AdapterUnavailable`] when there is none.
    async fn request_adapter(&self) -> Result<Box<dyn GpuAdapter>, DetectionError>;
}

/// A physical adapter returned by a [`GpuRuntime`].
#[async_trait]
pub trait GpuAdapter: Send + Sync {
    /// Identifying information about the adapter.
    fn info(&self) -> AdapterInfo;

    /// Canonical names of the optional features the adapter supports.
    fn features(&self) -> Vec<String>;

    /// The adapter limits keyed by canonical limit name.
    fn limits(&self) -> BTreeMap<String, u64>;

    /// Whether general-purpose compute shaders are available.
    fn supports_compute(&self) -> bool;

    /// Requests the logical device. Called at most once per adapter.
    async fn request_device(&self) -> Result<Arc<dyn GpuDevice>, DetectionError>;
}

/// A logical device acquired during detection, handed to the modern backend factory.
pub trait GpuDevice: Send + Sync + Debug {
    /// A short description of the device for logs.
    fn label(&self) -> String;

    /// Allows downcasting to the concrete device type.
    fn as_any(&self) -> &dyn Any;

    /// Allows downcasting a shared handle to the concrete device type.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}
