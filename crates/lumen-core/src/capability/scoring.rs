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

//! Pure, deterministic scoring of capability reports.

use super::report::{limit, CapabilityReport};

/// Minimum 2D texture dimension of the recommended profile.
pub const RECOMMENDED_MAX_TEXTURE_DIMENSION_2D: u64 = 8192;
/// Minimum bind group count of the recommended profile.
pub const RECOMMENDED_MAX_BIND_GROUPS: u64 = 4;
/// Minimum uniform buffers per stage of the recommended profile.
pub const RECOMMENDED_MAX_UNIFORM_BUFFERS_PER_STAGE: u64 = 12;

/// Computes the performance score of a report, in `0..=100`.
///
/// | criterion                                   | points |
/// |---------------------------------------------|--------|
/// | modern backend supported                    | 50     |
/// | max 2D texture ≥ 16384 / ≥ 8192             | 10 / 5 |
/// | max bind groups ≥ 8 / ≥ 4                   | 10 / 5 |
/// | compute                                     | 15     |
/// | each of BC, ETC2, ASTC compression          | 5      |
/// | timestamp query                             | 5      |
/// | indirect first instance                     | 5      |
///
/// An unsupported report always scores `0`.
pub fn performance_score(report: &CapabilityReport) -> u8 {
    if !report.is_supported() {
        return 0;
    }

    let mut score: u32 = 50;

    let texture = report.limit(limit::MAX_TEXTURE_DIMENSION_2D);
    if texture >= 16384 {
        score += 10;
    } else if texture >= 8192 {
        score += 5;
    }

    let bind_groups = report.limit(limit::MAX_BIND_GROUPS);
    if bind_groups >= 8 {
        score += 10;
    } else if bind_groups >= 4 {
        score += 5;
    }

    let support = report.support();
    if support.compute {
        score += 15;
    }
    score += 5 * u32::from(support.compression_formats());
    if support.timestamp_query {
        score += 5;
    }
    if support.indirect_first_instance {
        score += 5;
    }

    score.min(100) as u8
}

/// Returns `true` if the report meets the minimum profile for the modern backend.
pub fn is_recommended(report: &CapabilityReport) -> bool {
    report.is_supported()
        && report.limit(limit::MAX_TEXTURE_DIMENSION_2D) >= RECOMMENDED_MAX_TEXTURE_DIMENSION_2D
        && report.limit(limit::MAX_BIND_GROUPS) >= RECOMMENDED_MAX_BIND_GROUPS
        && report.limit(limit::MAX_UNIFORM_BUFFERS_PER_SHADER_STAGE)
            >= RECOMMENDED_MAX_UNIFORM_BUFFERS_PER_STAGE
        && report.supports_compute()
}

impl CapabilityReport {
    /// See [`performance_score`].
    pub fn performance_score(&self) -> u8 {
        performance_score(self)
    }

    /// See [`is_recommended`].
    pub fn is_recommended(&self) -> bool {
        is_recommended(self)
    }
}
