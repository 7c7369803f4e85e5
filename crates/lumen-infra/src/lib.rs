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

//! # Lumen Infrastructure
//!
//! Concrete implementations of the contracts defined in `lumen-core`, backed by
//! `wgpu`. The control layer only ever sees these types through trait objects;
//! applications construct a [`WgpuPlatform`] and hand it to the orchestrator as
//! both the GPU runtime and the backend factory.

#![warn(missing_docs)]

pub mod graphics;

pub use graphics::wgpu::{
    PlatformOptions, WgpuComputeDevice, WgpuDeviceContext, WgpuPlatform, WgpuRenderBackend,
};
