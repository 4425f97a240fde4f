// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Stochastic intersection volume of two transformed solids
//!
//! Points are drawn uniformly from a box around the candidate overlap and
//! classified against each solid with a ray-crossing parity test: a point
//! is inside a closed mesh when a ray from it crosses the surface an odd
//! number of times. Several random directions vote per point, and a
//! direction whose ray grazes an edge, vertex or plane is re-drawn.
//!
//! The estimate `inside / samples * region_volume` is unbiased for closed
//! meshes and converges to the true intersection volume as the sample count
//! grows.

use super::bvh::{Bvh, Crossings};
use super::{BoundingBox, Mesh, Ray};
use crate::error::{GeometryError, GeometryResult};
use nalgebra::{Matrix4, Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Box the sample points are drawn from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingRegion {
    /// Overlap of the two world bounding boxes; contains the whole
    /// intersection, so no sample is wasted outside it
    #[default]
    BoundsOverlap,
    /// Box spanning both world bounding boxes
    BoundsUnion,
}

/// Estimator parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntersectionParams {
    pub samples: usize,
    /// Independent ray directions voting on each containment test
    pub directions: usize,
    pub seed: u64,
    pub region: SamplingRegion,
    /// Re-draws allowed per direction when a ray grazes the surface
    pub max_grazing_retries: usize,
}

impl Default for IntersectionParams {
    fn default() -> Self {
        Self {
            samples: 10_000,
            directions: 8,
            seed: 0x5eed,
            region: SamplingRegion::BoundsOverlap,
            max_grazing_retries: 8,
        }
    }
}

impl IntersectionParams {
    pub fn validate(&self) -> GeometryResult<()> {
        if self.samples == 0 {
            return Err(GeometryError::invalid_parameter("sample count must be positive"));
        }
        if self.directions == 0 {
            return Err(GeometryError::invalid_parameter(
                "directions per sample must be positive",
            ));
        }
        Ok(())
    }
}

/// Result of one estimation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntersectionEstimate {
    pub volume: f64,
    /// Samples classified inside both solids
    pub inside_both: usize,
    pub samples: usize,
    /// Volume of the box the samples were drawn from; zero when the world
    /// bounds are disjoint and sampling was skipped
    pub region_volume: f64,
    /// One standard deviation of the estimate
    pub standard_error: f64,
}

impl IntersectionEstimate {
    fn disjoint() -> Self {
        Self {
            volume: 0.0,
            inside_both: 0,
            samples: 0,
            region_volume: 0.0,
            standard_error: 0.0,
        }
    }
}

/// A BVH placed in the world by a transform
#[derive(Debug, Clone)]
pub struct Solid<'a> {
    bvh: &'a Bvh,
    inverse: Matrix4<f64>,
    world_bounds: BoundingBox,
}

impl<'a> Solid<'a> {
    pub fn new(bvh: &'a Bvh, transform: &Matrix4<f64>) -> GeometryResult<Self> {
        let inverse = transform
            .try_inverse()
            .ok_or(GeometryError::SingularTransform)?;

        let mut world_bounds = BoundingBox::empty();
        for t in 0..bvh.triangle_count() {
            for corner in bvh.triangle(t) {
                world_bounds.expand_to_include(&transform.transform_point(corner));
            }
        }

        Ok(Self {
            bvh,
            inverse,
            world_bounds,
        })
    }

    pub fn world_bounds(&self) -> &BoundingBox {
        &self.world_bounds
    }
}

/// Parity containment test for a world-space point
///
/// Each of `directions` random rays votes by crossing parity; the point is
/// inside when strictly more than half vote inside. A direction that keeps
/// grazing after `max_retries` re-draws votes outside.
pub fn is_inside<R: Rng + ?Sized>(
    solid: &Solid<'_>,
    point: &Point3<f64>,
    directions: usize,
    max_retries: usize,
    rng: &mut R,
) -> bool {
    let local = solid.inverse.transform_point(point);
    if !solid.bvh.bounds().contains_point(&local) {
        return false;
    }

    let mut inside_votes = 0;
    for _ in 0..directions {
        for _ in 0..=max_retries {
            let ray = Ray::new(local, random_unit_vector(rng));
            if let Crossings::Clean(count) = solid.bvh.count_crossings(&ray) {
                if count % 2 == 1 {
                    inside_votes += 1;
                }
                break;
            }
        }
    }

    inside_votes * 2 > directions
}

/// Uniform direction by rejection sampling the unit ball
fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vector3<f64> {
    loop {
        let v: Vector3<f64> = Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let norm_squared = v.norm_squared();
        if norm_squared > 1e-12 && norm_squared <= 1.0 {
            return v / norm_squared.sqrt();
        }
    }
}

fn sample_point<R: Rng + ?Sized>(region: &BoundingBox, rng: &mut R) -> Point3<f64> {
    Point3::new(
        lerp(region.min.x, region.max.x, rng.gen()),
        lerp(region.min.y, region.max.y, rng.gen()),
        lerp(region.min.z, region.max.z, rng.gen()),
    )
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Monte Carlo intersection volume estimator
#[derive(Debug, Clone, Default)]
pub struct IntersectionEstimator {
    params: IntersectionParams,
}

impl IntersectionEstimator {
    pub fn new(params: IntersectionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &IntersectionParams {
        &self.params
    }

    /// Estimate with an RNG seeded from the configured seed
    pub fn estimate(&self, a: &Solid<'_>, b: &Solid<'_>) -> GeometryResult<IntersectionEstimate> {
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        self.estimate_with_rng(a, b, &mut rng)
    }

    /// Estimate drawing all randomness from `rng`.
    ///
    /// Sample points and one child seed per sample are drawn sequentially,
    /// then samples are classified in parallel, so a given RNG state yields
    /// the same estimate on any number of threads.
    pub fn estimate_with_rng<R: Rng + ?Sized>(
        &self,
        a: &Solid<'_>,
        b: &Solid<'_>,
        rng: &mut R,
    ) -> GeometryResult<IntersectionEstimate> {
        self.params.validate()?;

        let Some(overlap) = a.world_bounds.intersection(&b.world_bounds) else {
            debug!("world bounds are disjoint, skipping sampling");
            return Ok(IntersectionEstimate::disjoint());
        };

        let region = match self.params.region {
            SamplingRegion::BoundsOverlap => overlap,
            SamplingRegion::BoundsUnion => a.world_bounds.union(&b.world_bounds),
        };

        let samples: Vec<(Point3<f64>, u64)> = (0..self.params.samples)
            .map(|_| (sample_point(&region, rng), rng.gen()))
            .collect();

        let directions = self.params.directions;
        let retries = self.params.max_grazing_retries;
        let inside_both = samples
            .par_iter()
            .filter(|(point, seed)| {
                let mut rng = StdRng::seed_from_u64(*seed);
                is_inside(a, point, directions, retries, &mut rng)
                    && is_inside(b, point, directions, retries, &mut rng)
            })
            .count();

        let n = samples.len() as f64;
        let fraction = inside_both as f64 / n;
        let region_volume = region.volume();
        let estimate = IntersectionEstimate {
            volume: fraction * region_volume,
            inside_both,
            samples: samples.len(),
            region_volume,
            standard_error: region_volume * (fraction * (1.0 - fraction) / n).sqrt(),
        };

        info!(
            volume = estimate.volume,
            inside_both,
            samples = estimate.samples,
            standard_error = estimate.standard_error,
            "estimated intersection volume"
        );
        Ok(estimate)
    }
}

/// Estimate the volume shared by two transformed meshes.
///
/// Builds a BVH for each mesh; prefer [`IntersectionEstimator`] with cached
/// BVHs when the meshes are reused.
pub fn intersection_volume(
    mesh_a: &Mesh,
    transform_a: &Matrix4<f64>,
    mesh_b: &Mesh,
    transform_b: &Matrix4<f64>,
    sample_count: usize,
    directions_per_sample: usize,
    rng_seed: u64,
) -> GeometryResult<f64> {
    let bvh_a = Bvh::build(mesh_a)?;
    let bvh_b = Bvh::build(mesh_b)?;
    let a = Solid::new(&bvh_a, transform_a)?;
    let b = Solid::new(&bvh_b, transform_b)?;

    let estimator = IntersectionEstimator::new(IntersectionParams {
        samples: sample_count,
        directions: directions_per_sample,
        seed: rng_seed,
        ..IntersectionParams::default()
    });
    Ok(estimator.estimate(&a, &b)?.volume)
}
