// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - mesh representation, spatial index and estimators

mod bbox;
pub mod bvh;
pub mod intersection;
mod mesh;
mod primitives;
mod ray;
pub mod volume;

pub use bbox::BoundingBox;
pub use bvh::{Bvh, BvhConfig, Crossings};
pub use intersection::{
    intersection_volume, is_inside, IntersectionEstimate, IntersectionEstimator, IntersectionParams,
    SamplingRegion, Solid,
};
pub use mesh::{Mesh, Triangle};
pub use primitives::Primitive;
pub use ray::{intersect_triangle, Ray, RayHit, TriangleHit};
pub use volume::{
    check_manifold, signed_volume, surface_area, volume, volume_checked, ManifoldReport,
    NonManifoldWarning, VolumeReport,
};
