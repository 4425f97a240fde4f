// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe Overlap
//!
//! Volume and intersection-volume estimation for triangle meshes placed by
//! affine transforms, backed by a BVH ray index, plus an asynchronous
//! silhouette and outline pipeline for interactive viewers.

pub mod config;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod registry;
pub mod session;

pub use config::EngineConfig;
pub use error::{GeometryError, GeometryResult, PipelineError, SessionError};
pub use geometry::{
    intersection_volume, volume, Bvh, IntersectionEstimate, IntersectionEstimator,
    IntersectionParams, Mesh, Primitive,
};
pub use pipeline::{PipelineCoordinator, SilhouetteBackend, SilhouetteOutput};
pub use registry::{ShapeId, ShapeKind, ShapeRegistry};
pub use session::{DisplayFlags, Session};
