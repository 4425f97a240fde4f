// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Interactive session: model group, placed shapes and the silhouette
//! pipeline wired together
//!
//! Every call that changes world geometry submits a fresh silhouette job.
//! Results are picked up by [`Session::poll`].

use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::geometry::{BoundingBox, Mesh, Primitive};
use crate::pipeline::{
    merge_world_geometry, DrainReport, EdgeSegment, PipelineCoordinator, SilhouetteBackend,
};
use crate::registry::{RegistryUpdate, ShapeId, ShapeKind, ShapeRegistry};
use nalgebra::{Matrix4, Quaternion, Translation3, UnitQuaternion, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_4, FRAC_PI_8, TAU};
use std::sync::Arc;
use tracing::debug;

/// Which layers [`Session::displayed`] hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFlags {
    pub model: bool,
    pub silhouette: bool,
    pub outline: bool,
    pub wireframe: bool,
}

impl Default for DisplayFlags {
    fn default() -> Self {
        Self {
            model: true,
            silhouette: true,
            outline: false,
            wireframe: false,
        }
    }
}

/// One mesh of a preset model
#[derive(Debug, Clone)]
pub struct ModelPart {
    pub mesh: Arc<Mesh>,
    /// Placement inside the model
    pub local: Matrix4<f64>,
}

/// Preset parts under a shared group transform
#[derive(Debug, Clone)]
pub struct ModelGroup {
    pub name: String,
    pub parts: Vec<ModelPart>,
    /// Fixed orientation of the model inside its group
    pub base: Matrix4<f64>,
    rotation: UnitQuaternion<f64>,
    translation: Vector3<f64>,
}

impl ModelGroup {
    pub fn new(name: impl Into<String>, parts: Vec<ModelPart>, base: Matrix4<f64>) -> Self {
        Self {
            name: name.into(),
            parts,
            base,
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Body sphere with two ears, tilted by (π/4, 0, π/8)
    pub fn mouse() -> Self {
        let sphere = Arc::new(Primitive::sphere(1.0, 32).to_mesh());
        let part = |scale: f64, x: f64, y: f64| ModelPart {
            mesh: Arc::clone(&sphere),
            local: Matrix4::new_translation(&Vector3::new(x, y, 0.0)) * Matrix4::new_scaling(scale),
        };
        let parts = vec![part(0.85, 0.0, 0.0), part(0.5, -0.8, 1.0), part(0.5, 0.8, 1.0)];

        let tilt = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_4)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_8);
        Self::new("mouse", parts, tilt.to_homogeneous())
    }

    pub fn group_transform(&self) -> Matrix4<f64> {
        Translation3::from(self.translation).to_homogeneous() * self.rotation.to_homogeneous()
    }

    pub fn rotation(&self) -> &UnitQuaternion<f64> {
        &self.rotation
    }

    /// World transform of every part
    pub fn part_transforms(&self) -> Vec<Matrix4<f64>> {
        let group = self.group_transform() * self.base;
        self.parts.iter().map(|p| group * p.local).collect()
    }

    /// World bounds of all parts
    pub fn world_bounds(&self) -> BoundingBox {
        self.parts
            .iter()
            .zip(self.part_transforms())
            .fold(BoundingBox::empty(), |bbox, (part, transform)| {
                bbox.union(&part.mesh.world_bounding_box(&transform))
            })
    }

    /// Set the group rotation, then move the group so its bounds centre is
    /// over the origin and its lowest point sits at `y >= 1`
    pub fn orient(&mut self, rotation: UnitQuaternion<f64>) {
        self.rotation = rotation;
        self.translation = Vector3::zeros();

        let bounds = self.world_bounds();
        if bounds.is_empty() {
            return;
        }
        let center = bounds.center();
        self.translation = Vector3::new(-center.x, (-bounds.min.y).max(0.0) + 1.0, -center.z);
    }
}

/// Layers currently visible according to the display flags
#[derive(Debug, Clone)]
pub struct Displayed<'a> {
    /// Model parts with their world transforms
    pub model: Vec<(&'a Mesh, Matrix4<f64>)>,
    /// Visible registry shapes
    pub shapes: Vec<(&'a Mesh, &'a Matrix4<f64>)>,
    /// Projected outline mesh
    pub silhouette: Option<&'a Mesh>,
    /// Boundary edge segments
    pub outline: Option<&'a [EdgeSegment]>,
    pub wireframe: bool,
}

/// Owns the registry, the model group and the silhouette pipeline
pub struct Session {
    registry: ShapeRegistry,
    model: ModelGroup,
    flags: DisplayFlags,
    pipeline: PipelineCoordinator,
}

impl Session {
    /// Session around the mouse model on the default grid backend
    pub fn new(config: &EngineConfig) -> Result<Self, SessionError> {
        let pipeline = PipelineCoordinator::with_grid_backend(config.pipeline);
        Self::with_parts(config, ModelGroup::mouse(), pipeline)
    }

    pub fn with_backend(
        config: &EngineConfig,
        model: ModelGroup,
        backend: Arc<dyn SilhouetteBackend>,
    ) -> Result<Self, SessionError> {
        let pipeline = PipelineCoordinator::new(backend, config.pipeline);
        Self::with_parts(config, model, pipeline)
    }

    fn with_parts(
        config: &EngineConfig,
        model: ModelGroup,
        pipeline: PipelineCoordinator,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            registry: ShapeRegistry::new(config.registry_config()),
            model,
            flags: DisplayFlags::default(),
            pipeline,
        };
        session.regenerate()?;
        Ok(session)
    }

    /// Place a built-in shape at the origin
    pub fn add_shape(&mut self, kind: ShapeKind) -> Result<ShapeId, SessionError> {
        let id = self.registry.add_kind(kind, Matrix4::identity())?;
        self.regenerate()?;
        Ok(id)
    }

    pub fn set_transform(
        &mut self,
        id: ShapeId,
        transform: Matrix4<f64>,
    ) -> Result<RegistryUpdate, SessionError> {
        let update = self.registry.set_transform(id, transform)?;
        self.regenerate()?;
        Ok(update)
    }

    pub fn rotate_model(&mut self, rotation: UnitQuaternion<f64>) -> Result<(), SessionError> {
        self.model.orient(rotation);
        debug!(model = %self.model.name, "rotated model");
        self.regenerate()?;
        Ok(())
    }

    /// Rotate to a uniformly random orientation
    pub fn rotate_model_random<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<UnitQuaternion<f64>, SessionError> {
        let rotation = random_rotation(rng);
        self.rotate_model(rotation)?;
        Ok(rotation)
    }

    /// Submit the merged world geometry; returns the job's generation
    pub fn regenerate(&mut self) -> Result<u64, SessionError> {
        let geometry = self.merged_geometry();
        let handle = self.pipeline.submit_default(geometry)?;
        Ok(handle.generation())
    }

    /// Model parts and visible shapes as one world-space mesh
    pub fn merged_geometry(&self) -> Mesh {
        let transforms = self.model.part_transforms();
        let mut parts: Vec<(&Mesh, &Matrix4<f64>)> = self
            .model
            .parts
            .iter()
            .zip(&transforms)
            .map(|(part, transform)| (part.mesh.as_ref(), transform))
            .collect();
        parts.extend(self.registry.world_geometry());
        merge_world_geometry(&parts)
    }

    pub fn set_flags(&mut self, flags: DisplayFlags) {
        self.flags = flags;
    }

    pub fn flags(&self) -> DisplayFlags {
        self.flags
    }

    /// Apply finished silhouette jobs without blocking
    pub fn poll(&mut self) -> DrainReport {
        self.pipeline.drain()
    }

    /// Block until every submitted job has reported
    pub fn wait_idle(&mut self) -> DrainReport {
        self.pipeline.wait_idle()
    }

    pub fn displayed(&self) -> Displayed<'_> {
        let output = self.pipeline.current();
        let model = if self.flags.model {
            self.model
                .parts
                .iter()
                .zip(self.model.part_transforms())
                .map(|(part, transform)| (part.mesh.as_ref(), transform))
                .collect()
        } else {
            Vec::new()
        };

        Displayed {
            model,
            shapes: self.registry.world_geometry(),
            silhouette: output
                .filter(|_| self.flags.silhouette)
                .map(|o| &o.outline),
            outline: output
                .filter(|_| self.flags.outline)
                .map(|o| o.edges.as_slice()),
            wireframe: self.flags.wireframe,
        }
    }

    pub fn registry(&self) -> &ShapeRegistry {
        &self.registry
    }

    pub fn model(&self) -> &ModelGroup {
        &self.model
    }

    pub fn pipeline(&self) -> &PipelineCoordinator {
        &self.pipeline
    }
}

/// Uniform random rotation (Shoemake's subgroup algorithm)
fn random_rotation<R: Rng + ?Sized>(rng: &mut R) -> UnitQuaternion<f64> {
    let u1: f64 = rng.gen();
    let a = TAU * rng.gen::<f64>();
    let b = TAU * rng.gen::<f64>();
    let (s, t) = ((1.0 - u1).sqrt(), u1.sqrt());
    UnitQuaternion::new_normalize(Quaternion::new(t * b.cos(), s * a.sin(), s * a.cos(), t * b.sin()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::GridConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.pipeline.grid = GridConfig {
            initial_resolution: 8,
            max_resolution: 16,
        };
        config.intersection.samples = 500;
        config.intersection.directions = 3;
        config
    }

    #[test]
    fn test_orient_recentres_group() {
        let mut model = ModelGroup::mouse();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..5 {
            model.orient(random_rotation(&mut rng));
            let bounds = model.world_bounds();
            let center = bounds.center();
            assert!(center.x.abs() < 1e-9);
            assert!(center.z.abs() < 1e-9);
            assert!(bounds.min.y >= 1.0 - 1e-9);
        }
    }

    #[test]
    fn test_mouse_parts() {
        let model = ModelGroup::mouse();
        assert_eq!(model.parts.len(), 3);
        assert!(Arc::ptr_eq(&model.parts[0].mesh, &model.parts[1].mesh));
        assert!(!model.world_bounds().is_empty());
    }

    #[test]
    fn test_geometry_changes_resubmit() {
        let mut session = Session::new(&config()).unwrap();
        assert_eq!(session.pipeline().last_generation(), 1);

        let id = session.add_shape(ShapeKind::Box).unwrap();
        assert_eq!(session.pipeline().last_generation(), 2);

        session
            .set_transform(id, Matrix4::new_translation(&Vector3::new(3.0, 0.0, 0.0)))
            .unwrap();
        session.rotate_model(UnitQuaternion::identity()).unwrap();
        assert_eq!(session.pipeline().last_generation(), 4);

        // Rejected edits leave the pipeline alone
        assert!(session.set_transform(id, Matrix4::zeros()).is_err());
        assert_eq!(session.pipeline().last_generation(), 4);

        session.set_flags(DisplayFlags::default());
        assert_eq!(session.pipeline().last_generation(), 4);

        session.wait_idle();
        assert_eq!(session.pipeline().applied_generation(), 4);
    }

    #[test]
    fn test_displayed_follows_flags() {
        let mut session = Session::new(&config()).unwrap();
        session.wait_idle();

        let shown = session.displayed();
        assert_eq!(shown.model.len(), 3);
        assert!(shown.silhouette.is_some());
        assert!(shown.outline.is_none());

        session.set_flags(DisplayFlags {
            model: false,
            silhouette: false,
            outline: true,
            wireframe: true,
        });
        let shown = session.displayed();
        assert!(shown.model.is_empty());
        assert!(shown.silhouette.is_none());
        assert!(!shown.outline.unwrap().is_empty());
        assert!(shown.wireframe);
    }

    #[test]
    fn test_random_rotation_is_unit() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..16 {
            let q = random_rotation(&mut rng);
            assert!((q.quaternion().norm() - 1.0).abs() < 1e-12);
        }
    }
}
