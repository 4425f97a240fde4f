// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error types for geometry, pipeline and session operations

use crate::registry::ShapeId;
use thiserror::Error;

/// Result alias for geometry operations
pub type GeometryResult<T> = Result<T, GeometryError>;

/// Errors raised by mesh validation, BVH construction and the estimators
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// Mesh has no triangles
    #[error("mesh has no triangles")]
    EmptyMesh,

    /// A triangle references a vertex that does not exist
    #[error("triangle {triangle} references vertex {index}, but mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        triangle: usize,
        index: usize,
        vertex_count: usize,
    },

    /// Flat index buffer length is not a multiple of three
    #[error("index buffer length {0} is not a multiple of 3")]
    IndexCountNotMultipleOfThree(usize),

    /// World transform cannot be inverted
    #[error("transform is not invertible")]
    SingularTransform,

    /// Estimator or builder parameter out of range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No shape with this id in the registry
    #[error("unknown shape {0}")]
    UnknownShape(ShapeId),
}

impl GeometryError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(details: impl Into<String>) -> Self {
        Self::InvalidParameter(details.into())
    }

    /// True for the malformed-geometry class of errors
    pub fn is_invalid_geometry(&self) -> bool {
        matches!(
            self,
            Self::EmptyMesh | Self::IndexOutOfRange { .. } | Self::IndexCountNotMultipleOfThree(_)
        )
    }
}

/// Errors raised by silhouette jobs and the pipeline coordinator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Merged geometry has nothing to project
    #[error("merged geometry is empty")]
    EmptyGeometry,

    /// Backend rejected the job
    #[error("silhouette backend failed: {0}")]
    Backend(String),

    /// Worker thread panicked before producing a result
    #[error("silhouette worker panicked")]
    WorkerPanicked,

    /// Worker thread could not be started
    #[error("failed to spawn silhouette worker: {0}")]
    Spawn(String),

    /// Worker dropped its result channel without answering
    #[error("silhouette worker disconnected")]
    Disconnected,

    /// Result superseded by a newer applied generation
    #[error("job {generation} superseded by generation {current}")]
    Cancelled { generation: u64, current: u64 },
}

impl PipelineError {
    /// Create a backend error
    pub fn backend(details: impl Into<String>) -> Self {
        Self::Backend(details.into())
    }
}

/// Errors surfaced by session actions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
