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

//! # Lumen Core
//!
//! Foundational crate containing the contracts of the rendering-backend layer:
//! the capability report and its scoring, backend kinds and selection policy,
//! backend-agnostic resource descriptors, instanced batches, compute API types
//! and the traits a concrete graphics runtime has to implement.
//!
//! Nothing in this crate talks to a GPU. Concrete implementations live in
//! `lumen-infra`; the services that sequence them live in `lumen-control`.

#![warn(missing_docs)]

pub mod backend;
pub mod capability;
pub mod compute;
pub mod error;
pub mod resource;
pub mod traits;

pub use backend::{
    BackendDescription, BackendKind, GraphicsApi, QualityTier, RecommendedSettings,
    RendererDeviceType, SelectionPolicy,
};
pub use capability::{AdapterInfo, CapabilityReport, FeatureSupport};
pub use error::{BackendError, ComputeError, DetectionError, ResourceError, SystemError};
