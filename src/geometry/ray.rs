// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Rays and ray/triangle intersection

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Minimum determinant before a ray counts as parallel to a triangle
const PARALLEL_EPS: f64 = 1e-12;

/// Barycentric margin inside which a hit is treated as touching an edge
const EDGE_EPS: f64 = 1e-9;

/// Distance below which a hit is treated as lying at the ray origin
const ORIGIN_EPS: f64 = 1e-10;

/// Half-line with a precomputed reciprocal direction for slab tests
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Vector3<f64>,
    pub inv_direction: Vector3<f64>,
}

impl Ray {
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.map(|d| 1.0 / d),
        }
    }

    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }
}

/// Nearest hit reported by a ray query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayHit {
    /// Index of the triangle in the source mesh
    pub triangle: usize,
    /// Parametric distance along the ray direction
    pub distance: f64,
    pub point: Point3<f64>,
}

/// Outcome of testing one ray against one triangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriangleHit {
    Miss,
    /// Clean crossing of the triangle interior at parametric distance `t`
    Hit(f64),
    /// Hit too close to an edge, vertex or the origin to count reliably
    /// for parity
    Grazing(f64),
    /// Ray runs inside the triangle's plane; no distance, ambiguous parity
    Coplanar,
}

impl TriangleHit {
    pub fn distance(&self) -> Option<f64> {
        match *self {
            TriangleHit::Miss | TriangleHit::Coplanar => None,
            TriangleHit::Hit(t) | TriangleHit::Grazing(t) => Some(t),
        }
    }
}

/// Möller–Trumbore intersection, forward hits only (`t >= 0`)
pub fn intersect_triangle(
    ray: &Ray,
    v0: &Point3<f64>,
    v1: &Point3<f64>,
    v2: &Point3<f64>,
) -> TriangleHit {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = ray.direction.cross(&edge2);
    let a = edge1.dot(&h);

    let scale = edge1.norm() * edge2.norm() * ray.direction.norm();
    if a.abs() <= PARALLEL_EPS * scale.max(f64::MIN_POSITIVE) {
        // Coplanar rays can still touch the triangle; parity cannot use that
        return if coplanar_touch(ray, v0, v1, v2) {
            TriangleHit::Coplanar
        } else {
            TriangleHit::Miss
        };
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(&h);
    if !(-EDGE_EPS..=1.0 + EDGE_EPS).contains(&u) {
        return TriangleHit::Miss;
    }

    let q = s.cross(&edge1);
    let v = f * ray.direction.dot(&q);
    if v < -EDGE_EPS || u + v > 1.0 + EDGE_EPS {
        return TriangleHit::Miss;
    }

    let t = f * edge2.dot(&q);
    let t_scale = ORIGIN_EPS * (1.0 + s.norm());
    if t < -t_scale {
        return TriangleHit::Miss;
    }

    let near_edge = u < EDGE_EPS || v < EDGE_EPS || u + v > 1.0 - EDGE_EPS;
    if near_edge || t.abs() <= t_scale {
        TriangleHit::Grazing(t.max(0.0))
    } else {
        TriangleHit::Hit(t)
    }
}

/// Whether a ray lying in the triangle's plane passes through it
fn coplanar_touch(ray: &Ray, v0: &Point3<f64>, v1: &Point3<f64>, v2: &Point3<f64>) -> bool {
    let normal = (v1 - v0).cross(&(v2 - v0));
    let extent = (v1 - v0).norm().max((v2 - v0).norm());
    if normal.norm() <= f64::EPSILON * extent * extent {
        // Degenerate triangle has no interior to cross
        return false;
    }
    let distance = normal.normalize().dot(&(ray.origin - v0)).abs();
    distance <= EDGE_EPS * (1.0 + extent)
}
