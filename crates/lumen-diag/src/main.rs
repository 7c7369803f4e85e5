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

//! `lumen-diag`: inspects the local GPU, brings the backend system up and
//! prints what was chosen and why.

use anyhow::{Context, Result};
use clap::Parser;
use lumen_control::compute::{ParticleParams, ParticleSystem};
use lumen_control::{OrchestratorConfig, SystemOrchestrator, SystemStatus};
use lumen_core::SelectionPolicy;
use lumen_infra::{PlatformOptions, WgpuPlatform};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Parser)]
#[command(name = "lumen-diag", version, about = "GPU backend diagnostics")]
struct Cli {
    /// Never use the modern backend.
    #[arg(long)]
    legacy: bool,

    /// Fail instead of restarting on the legacy backend.
    #[arg(long)]
    no_fallback: bool,

    /// Minimum performance score for the modern backend.
    #[arg(long, value_name = "SCORE")]
    min_score: Option<u8>,

    /// Read the selection policy from a JSON file. Flags override its fields.
    #[arg(long, value_name = "FILE")]
    policy: Option<PathBuf>,

    /// Skip capability detection entirely.
    #[arg(long)]
    no_detect: bool,

    /// Do not create a compute dispatcher on the modern backend.
    #[arg(long)]
    no_compute: bool,

    /// Prefer a low-power adapter.
    #[arg(long)]
    low_power: bool,

    /// Step a particle system of this size for one simulated second.
    #[arg(long, value_name = "COUNT")]
    particles: Option<u32>,

    /// Print machine-readable JSON instead of a report.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn selection_policy(&self) -> Result<SelectionPolicy> {
        let mut policy = match &self.policy {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading policy file {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing policy file {}", path.display()))?
            }
            None => SelectionPolicy::default(),
        };
        if self.legacy {
            policy = policy.forcing_legacy();
        }
        if self.no_fallback {
            policy.fallback_to_legacy = false;
        }
        if let Some(score) = self.min_score {
            policy.min_performance_score = score.min(100);
        }
        Ok(policy)
    }
}

struct ParticleRun {
    count: u32,
    gpu_driven: bool,
    steps: u32,
    elapsed_ms: f64,
    mean_height: f32,
}

fn run_particles(system: &SystemOrchestrator, count: u32) -> Result<ParticleRun> {
    let mut particles = ParticleSystem::new(count, ParticleParams::default(), system.compute())?;
    let steps = 60;
    let start = Instant::now();
    for _ in 0..steps {
        particles.step(1.0 / 60.0)?;
    }
    let state = pollster::block_on(particles.sync())?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let mean_height = if state.is_empty() {
        0.0
    } else {
        state.positions.iter().map(|p| p.y).sum::<f32>() / state.len() as f32
    };
    Ok(ParticleRun {
        count,
        gpu_driven: particles.is_gpu_driven(),
        steps,
        elapsed_ms,
        mean_height,
    })
}

fn print_report(status: &SystemStatus, policy: &SelectionPolicy, particles: Option<&ParticleRun>) {
    println!("Backend system");
    println!("  status:      {}", status.message);
    println!(
        "  policy:      prefer modern {}, min score {}, fallback {}",
        policy.prefer_modern, policy.min_performance_score, policy.fallback_to_legacy
    );
    if let Some(kind) = status.backend_kind {
        println!("  backend:     {kind}");
    }
    if let Some(description) = &status.backend {
        println!("  device:      {description}");
    }
    println!("  score:       {}", status.performance_score);

    let settings = status.recommended_settings;
    println!("Recommended settings");
    println!("  tier:        {:?}", settings.quality_tier);
    println!("  compute:     {}", settings.enable_compute);
    println!("  advanced:    {}", settings.enable_advanced_features);
    println!("  particles:   {}", settings.particle_count_ceiling);
    println!("  instances:   {}", settings.instance_count_ceiling);

    if let Some(report) = &status.capability_report {
        println!("Capabilities");
        println!("  supported:   {}", report.is_supported());
        println!("  recommended: {}", report.is_recommended());
        if let Some(message) = report.error_message() {
            println!("  diagnostic:  {message}");
        }
        if let Some(adapter) = report.adapter() {
            println!(
                "  adapter:     {} ({}, {:?}, driver {})",
                adapter.name,
                adapter.api.name(),
                adapter.device_type,
                adapter.driver
            );
        }
        for feature in report.features() {
            println!("  feature:     {feature}");
        }
        for (name, value) in report.limits() {
            println!("  limit:       {name} = {value}");
        }
    }

    if let Some(run) = particles {
        println!("Particles");
        println!(
            "  {} particles, {} steps on the {} in {:.2} ms, mean height {:.3}",
            run.count,
            run.steps,
            if run.gpu_driven { "GPU" } else { "CPU" },
            run.elapsed_ms,
            run.mean_height
        );
    }
}

fn status_json(
    status: &SystemStatus,
    policy: &SelectionPolicy,
    particles: Option<&ParticleRun>,
) -> serde_json::Value {
    json!({
        "initialized": status.initialized,
        "message": status.message,
        "policy": policy,
        "backendKind": status.backend_kind,
        "backend": status.backend,
        "performanceScore": status.performance_score,
        "recommendedSettings": status.recommended_settings,
        "capabilityReport": status.capability_report.as_deref(),
        "particles": particles.map(|run| json!({
            "count": run.count,
            "gpuDriven": run.gpu_driven,
            "steps": run.steps,
            "elapsedMs": run.elapsed_ms,
            "meanHeight": run.mean_height,
        })),
    })
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    let cli = Cli::parse();
    Builder::from_env(Env::default().default_filter_or(if cli.json { "warn" } else { "info" }))
        .filter_module("wgpu_hal", log::LevelFilter::Warn)
        .filter_module("wgpu_core", log::LevelFilter::Warn)
        .init();

    let policy = cli.selection_policy()?;
    let platform = Arc::new(WgpuPlatform::new(PlatformOptions {
        power_preference: if cli.low_power {
            wgpu::PowerPreference::LowPower
        } else {
            wgpu::PowerPreference::HighPerformance
        },
        ..PlatformOptions::default()
    }));
    let system = SystemOrchestrator::new(
        platform.clone(),
        platform,
        OrchestratorConfig {
            enable_auto_detection: !cli.no_detect,
            enable_compute: !cli.no_compute,
            log_performance_stats: !cli.json,
            ..OrchestratorConfig::default()
        },
    );

    let status = pollster::block_on(system.initialize(policy))
        .context("backend system failed to initialize")?;
    let particles = cli
        .particles
        .map(|count| run_particles(&system, count))
        .transpose()?;

    if cli.json {
        let value = status_json(&status, &policy, particles.as_ref());
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_report(&status, &policy, particles.as_ref());
    }

    system.dispose();
    Ok(())
}
