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

//! Defines the core architectural traits of the backend subsystem.
//!
//! These contracts decouple detection, selection and resource management from
//! any concrete GPU runtime.
//!
//! - [`GpuRuntime`], [`GpuAdapter`], [`GpuDevice`]: what the capability probe queries.
//! - [`BackendFactory`], [`RenderBackend`]: how backends are built and driven.
//! - [`ComputeDevice`]: pipelines, buffers and dispatches on the modern backend.

mod backend;
mod compute;
mod runtime;

pub use self::backend::*;
pub use self::compute::ComputeDevice;
pub use self::runtime::{GpuAdapter, GpuDevice, GpuRuntime};
