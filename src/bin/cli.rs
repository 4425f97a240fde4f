// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe Overlap CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use nalgebra::{Matrix4, Vector3};
use polyframe_overlap::geometry::{volume_checked, Bvh, SamplingRegion, Solid};
use polyframe_overlap::pipeline::{merge_world_geometry, JobParams, OutputMode, PipelineCoordinator};
use polyframe_overlap::session::ModelGroup;
use polyframe_overlap::{EngineConfig, IntersectionEstimator, Mesh, ShapeKind};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polyframe-overlap")]
#[command(about = "Mesh volume, intersection volume and silhouette extraction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to overlap.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ShapeArg {
    Box,
    Sphere,
}

impl From<ShapeArg> for ShapeKind {
    fn from(shape: ShapeArg) -> Self {
        match shape {
            ShapeArg::Box => ShapeKind::Box,
            ShapeArg::Sphere => ShapeKind::Sphere,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RegionArg {
    Overlap,
    Union,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Outline,
    Edges,
    Both,
}

#[derive(Subcommand)]
enum Commands {
    /// Volume of a built-in shape
    Volume {
        #[arg(value_enum, default_value = "box")]
        shape: ShapeArg,

        /// Uniform scale applied before measuring
        #[arg(short, long, default_value = "1.0")]
        scale: f64,
    },

    /// Estimate the shared volume of two built-in shapes
    Intersect {
        #[arg(value_enum, default_value = "box")]
        a: ShapeArg,

        #[arg(value_enum, default_value = "box")]
        b: ShapeArg,

        /// Translation of the second shape, as x,y,z
        #[arg(short, long, value_delimiter = ',', num_args = 3, default_values_t = vec![0.5, 0.0, 0.0])]
        offset: Vec<f64>,

        #[arg(long)]
        samples: Option<usize>,

        #[arg(long)]
        directions: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, value_enum)]
        region: Option<RegionArg>,
    },

    /// Project the mouse model onto the ground plane
    Silhouette {
        /// Refinement budget in milliseconds
        #[arg(short, long)]
        budget_ms: Option<u64>,

        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(short, long, value_name = "FILE")]
        write: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => {
            let mut config = EngineConfig::from_file(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => EngineConfig::load()?,
    };

    match &cli.command {
        Commands::Volume { shape, scale } => volume_command(*shape, *scale, cli.json),
        Commands::Intersect {
            a,
            b,
            offset,
            samples,
            directions,
            seed,
            region,
        } => {
            let mut config = config;
            if let Some(samples) = samples {
                config.intersection.samples = *samples;
            }
            if let Some(directions) = directions {
                config.intersection.directions = *directions;
            }
            if let Some(seed) = seed {
                config.intersection.seed = *seed;
            }
            if let Some(region) = region {
                config.intersection.region = match region {
                    RegionArg::Overlap => SamplingRegion::BoundsOverlap,
                    RegionArg::Union => SamplingRegion::BoundsUnion,
                };
            }
            let offset = Vector3::new(offset[0], offset[1], offset[2]);
            intersect_command(&config, *a, *b, offset, cli.json)
        }
        Commands::Silhouette { budget_ms, mode } => {
            let mut params = config.pipeline.job_params();
            if let Some(budget_ms) = budget_ms {
                params.time_budget_ms = *budget_ms;
            }
            if let Some(mode) = mode {
                params.output_mode = match mode {
                    ModeArg::Outline => OutputMode::Outline,
                    ModeArg::Edges => OutputMode::Edges,
                    ModeArg::Both => OutputMode::Both,
                };
            }
            silhouette_command(&config, params, cli.json)
        }
        Commands::Config { write } => config_command(&config, write.as_ref()),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn shape_mesh(shape: ShapeArg) -> Result<Mesh> {
    ShapeKind::from(shape)
        .mesh()
        .context("built-in shape has no mesh")
}

fn volume_command(shape: ShapeArg, scale: f64, json: bool) -> Result<()> {
    let mesh = shape_mesh(shape)?;
    let report = volume_checked(&mesh, &Matrix4::new_scaling(scale))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} {:.6}", "Volume:".bold(), report.volume);
    if let Some(warning) = report.warning {
        println!("{} {}", "Warning:".yellow(), warning);
    }
    Ok(())
}

fn intersect_command(
    config: &EngineConfig,
    a: ShapeArg,
    b: ShapeArg,
    offset: Vector3<f64>,
    json: bool,
) -> Result<()> {
    let mesh_a = shape_mesh(a)?;
    let mesh_b = shape_mesh(b)?;
    let bvh_a = Bvh::build_with(&mesh_a, &config.bvh)?;
    let bvh_b = Bvh::build_with(&mesh_b, &config.bvh)?;
    let solid_a = Solid::new(&bvh_a, &Matrix4::identity())?;
    let solid_b = Solid::new(&bvh_b, &Matrix4::new_translation(&offset))?;

    let start = Instant::now();
    let estimate = IntersectionEstimator::new(config.intersection).estimate(&solid_a, &solid_b)?;
    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&estimate)?);
        return Ok(());
    }

    println!(
        "{} {:.6} ± {:.6}",
        "Intersection volume:".bold(),
        estimate.volume,
        estimate.standard_error
    );
    println!(
        "  {} of {} samples inside both, region volume {:.6}",
        estimate.inside_both, estimate.samples, estimate.region_volume
    );
    println!("  Estimated in {:.2?}", elapsed);
    Ok(())
}

fn silhouette_command(config: &EngineConfig, params: JobParams, json: bool) -> Result<()> {
    let model = ModelGroup::mouse();
    let transforms = model.part_transforms();
    let parts: Vec<(&Mesh, &Matrix4<f64>)> = model
        .parts
        .iter()
        .zip(&transforms)
        .map(|(part, transform)| (part.mesh.as_ref(), transform))
        .collect();
    let geometry = merge_world_geometry(&parts);

    let mut coordinator = PipelineCoordinator::with_grid_backend(config.pipeline);
    let start = Instant::now();
    let output = coordinator.submit(geometry, params)?.wait()?;
    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(output.as_ref())?);
        return Ok(());
    }

    println!("{} {} ({} passes)", "Resolution:".bold(), output.resolution, output.iterations);
    println!("  Outline triangles: {}", output.outline.triangle_count());
    println!("  Edge segments: {}", output.edges.len());
    println!("  Generated in {:.2?}", elapsed);
    Ok(())
}

fn config_command(config: &EngineConfig, write: Option<&PathBuf>) -> Result<()> {
    match write {
        Some(path) => {
            config.save(path)?;
            println!("{} Wrote configuration: {}", "Success:".green(), path.display());
        }
        None => {
            let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
            print!("{content}");
        }
    }
    Ok(())
}
