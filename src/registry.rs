// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Append-only registry of placed shapes

use crate::error::{GeometryError, GeometryResult};
use crate::geometry::{
    volume, Bvh, BvhConfig, IntersectionEstimate, IntersectionEstimator, IntersectionParams, Mesh,
    Primitive, Solid,
};
use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Stable shape identity, assigned in insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(u64);

impl ShapeId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape#{}", self.0)
    }
}

/// What a shape was created from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    /// Unit cube centred on its origin
    Box,
    /// Unit-radius sphere
    Sphere,
    /// Mesh supplied by the caller
    Custom,
}

impl ShapeKind {
    /// Built-in mesh for this kind; `None` for [`ShapeKind::Custom`]
    pub fn mesh(self) -> Option<Mesh> {
        match self {
            ShapeKind::Box => Some(Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_mesh()),
            ShapeKind::Sphere => Some(Primitive::sphere(1.0, 32).to_mesh()),
            ShapeKind::Custom => None,
        }
    }
}

/// A mesh placed in the world
#[derive(Debug, Clone)]
pub struct Shape {
    pub id: ShapeId,
    pub kind: ShapeKind,
    pub mesh: Arc<Mesh>,
    /// Built once per mesh version in mesh-local space
    pub bvh: Arc<Bvh>,
    pub transform: Matrix4<f64>,
    pub visible: bool,
}

/// Registry configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub bvh: BvhConfig,
    pub intersection: IntersectionParams,
}

/// Effect of a registry mutation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegistryUpdate {
    pub shape: ShapeId,
    /// True when the tracked pair's intersection was recomputed
    pub intersection_recomputed: bool,
    pub intersection: Option<IntersectionEstimate>,
}

/// Append-only shape collection; tracks the intersection of the first two
/// shapes
#[derive(Debug, Default)]
pub struct ShapeRegistry {
    config: RegistryConfig,
    shapes: Vec<Shape>,
    intersection: Option<IntersectionEstimate>,
}

impl ShapeRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            shapes: Vec::new(),
            intersection: None,
        }
    }

    /// Add a caller-supplied mesh
    pub fn add(&mut self, mesh: Mesh, transform: Matrix4<f64>) -> GeometryResult<ShapeId> {
        self.insert(ShapeKind::Custom, mesh, transform)
    }

    /// Add a built-in shape
    pub fn add_kind(&mut self, kind: ShapeKind, transform: Matrix4<f64>) -> GeometryResult<ShapeId> {
        let mesh = kind
            .mesh()
            .ok_or_else(|| GeometryError::invalid_parameter("custom shapes need a mesh"))?;
        self.insert(kind, mesh, transform)
    }

    fn insert(&mut self, kind: ShapeKind, mesh: Mesh, transform: Matrix4<f64>) -> GeometryResult<ShapeId> {
        ensure_invertible(&transform)?;
        let bvh = Bvh::build_with(&mesh, &self.config.bvh)?;

        // The second shape completes the tracked pair; estimate before
        // committing so a failure leaves the registry untouched
        let intersection = match self.shapes.first() {
            Some(first) if self.shapes.len() == 1 => {
                Some(self.estimate_pair((&first.bvh, &first.transform), (&bvh, &transform))?)
            }
            _ => None,
        };

        let id = ShapeId(self.shapes.len() as u64);
        self.shapes.push(Shape {
            id,
            kind,
            mesh: Arc::new(mesh),
            bvh: Arc::new(bvh),
            transform,
            visible: true,
        });
        if intersection.is_some() {
            self.intersection = intersection;
        }
        debug!(%id, ?kind, "added shape");
        Ok(id)
    }

    /// Move a shape; recomputes the tracked intersection when the shape
    /// participates in it
    pub fn set_transform(&mut self, id: ShapeId, transform: Matrix4<f64>) -> GeometryResult<RegistryUpdate> {
        ensure_invertible(&transform)?;
        let index = self.index_of(id)?;

        let intersection_recomputed = index < 2 && self.shapes.len() >= 2;
        if intersection_recomputed {
            let (a, b) = (&self.shapes[0], &self.shapes[1]);
            let estimate = if index == 0 {
                self.estimate_pair((&a.bvh, &transform), (&b.bvh, &b.transform))?
            } else {
                self.estimate_pair((&a.bvh, &a.transform), (&b.bvh, &transform))?
            };
            self.intersection = Some(estimate);
        }
        self.shapes[index].transform = transform;

        Ok(RegistryUpdate {
            shape: id,
            intersection_recomputed,
            intersection: self.intersection,
        })
    }

    pub fn set_visible(&mut self, id: ShapeId, visible: bool) -> GeometryResult<()> {
        let index = self.index_of(id)?;
        self.shapes[index].visible = visible;
        Ok(())
    }

    fn estimate_pair(
        &self,
        (bvh_a, transform_a): (&Bvh, &Matrix4<f64>),
        (bvh_b, transform_b): (&Bvh, &Matrix4<f64>),
    ) -> GeometryResult<IntersectionEstimate> {
        let solid_a = Solid::new(bvh_a, transform_a)?;
        let solid_b = Solid::new(bvh_b, transform_b)?;
        IntersectionEstimator::new(self.config.intersection).estimate(&solid_a, &solid_b)
    }

    fn index_of(&self, id: ShapeId) -> GeometryResult<usize> {
        let index = id.0 as usize;
        if index < self.shapes.len() {
            Ok(index)
        } else {
            Err(GeometryError::UnknownShape(id))
        }
    }

    pub fn get(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.iter()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// World-space volume of one shape
    pub fn volume(&self, id: ShapeId) -> GeometryResult<f64> {
        let shape = self.get(id).ok_or(GeometryError::UnknownShape(id))?;
        volume(&shape.mesh, &shape.transform)
    }

    /// Intersection of the first two shapes, once both exist
    pub fn intersection(&self) -> Option<&IntersectionEstimate> {
        self.intersection.as_ref()
    }

    /// Visible shapes as explicit `(mesh, transform)` pairs
    pub fn world_geometry(&self) -> Vec<(&Mesh, &Matrix4<f64>)> {
        self.shapes
            .iter()
            .filter(|s| s.visible)
            .map(|s| (s.mesh.as_ref(), &s.transform))
            .collect()
    }
}

fn ensure_invertible(transform: &Matrix4<f64>) -> GeometryResult<()> {
    if transform.is_invertible() {
        Ok(())
    } else {
        Err(GeometryError::SingularTransform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ShapeRegistry {
        ShapeRegistry::new(RegistryConfig {
            intersection: IntersectionParams {
                samples: 2_000,
                directions: 3,
                ..IntersectionParams::default()
            },
            ..RegistryConfig::default()
        })
    }

    fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    #[test]
    fn test_intersection_tracked_from_second_shape() {
        let mut registry = registry();
        let a = registry.add_kind(ShapeKind::Box, Matrix4::identity()).unwrap();
        assert!(registry.intersection().is_none());

        registry.add_kind(ShapeKind::Box, translation(0.5, 0.0, 0.0)).unwrap();
        let first = *registry.intersection().unwrap();
        assert!((first.volume - 0.5).abs() < 0.05);

        let update = registry.set_transform(a, translation(5.0, 0.0, 0.0)).unwrap();
        assert!(update.intersection_recomputed);
        assert_eq!(update.intersection.unwrap().volume, 0.0);
    }

    #[test]
    fn test_third_shape_does_not_recompute() {
        let mut registry = registry();
        registry.add_kind(ShapeKind::Box, Matrix4::identity()).unwrap();
        registry.add_kind(ShapeKind::Sphere, translation(3.0, 0.0, 0.0)).unwrap();
        let c = registry.add_kind(ShapeKind::Box, Matrix4::identity()).unwrap();

        let update = registry.set_transform(c, translation(0.1, 0.0, 0.0)).unwrap();
        assert!(!update.intersection_recomputed);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_unknown_and_singular() {
        let mut registry = registry();
        let missing = ShapeId(7);
        assert_eq!(
            registry.set_transform(missing, Matrix4::identity()).unwrap_err(),
            GeometryError::UnknownShape(missing)
        );
        assert_eq!(
            registry.add_kind(ShapeKind::Box, Matrix4::zeros()).unwrap_err(),
            GeometryError::SingularTransform
        );
        assert!(registry.is_empty());
        assert!(registry.add_kind(ShapeKind::Custom, Matrix4::identity()).is_err());
    }

    #[test]
    fn test_failed_estimate_leaves_registry_unchanged() {
        let mut registry = ShapeRegistry::new(RegistryConfig {
            intersection: IntersectionParams {
                samples: 0,
                ..IntersectionParams::default()
            },
            ..RegistryConfig::default()
        });
        let a = registry.add_kind(ShapeKind::Box, Matrix4::identity()).unwrap();

        assert!(matches!(
            registry.add_kind(ShapeKind::Box, translation(0.5, 0.0, 0.0)),
            Err(GeometryError::InvalidParameter(_))
        ));
        assert_eq!(registry.len(), 1);
        assert!(registry.intersection().is_none());

        // A lone shape has no pair to estimate, so moving it succeeds
        registry.set_transform(a, translation(9.0, 0.0, 0.0)).unwrap();
        assert_eq!(registry.get(a).unwrap().transform, translation(9.0, 0.0, 0.0));
    }

    #[test]
    fn test_failed_move_keeps_previous_transform() {
        let mut registry = registry();
        let a = registry.add_kind(ShapeKind::Box, Matrix4::identity()).unwrap();
        registry.add_kind(ShapeKind::Box, translation(0.5, 0.0, 0.0)).unwrap();
        let before = *registry.intersection().unwrap();

        registry.config.intersection.directions = 0;
        assert!(registry.set_transform(a, translation(9.0, 0.0, 0.0)).is_err());
        assert_eq!(registry.get(a).unwrap().transform, Matrix4::identity());
        assert_eq!(*registry.intersection().unwrap(), before);
    }

    #[test]
    fn test_world_geometry_skips_hidden() {
        let mut registry = registry();
        let a = registry.add_kind(ShapeKind::Box, Matrix4::identity()).unwrap();
        registry.add_kind(ShapeKind::Sphere, Matrix4::identity()).unwrap();
        registry.set_visible(a, false).unwrap();

        let geometry = registry.world_geometry();
        assert_eq!(geometry.len(), 1);
        assert!((registry.volume(a).unwrap() - 1.0).abs() < 1e-12);
    }
}
