// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Silhouette job parameters and results

use crate::geometry::{BoundingBox, Mesh};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which parts of the silhouette a job produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Projected polygon mesh only
    Outline,
    /// Boundary edge segments only
    Edges,
    #[default]
    Both,
}

impl OutputMode {
    pub fn wants_outline(self) -> bool {
        matches!(self, Self::Outline | Self::Both)
    }

    pub fn wants_edges(self) -> bool {
        matches!(self, Self::Edges | Self::Both)
    }
}

/// Parameters supplied with each submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    /// Refinement budget; does not bound the job's wall-clock lifetime
    pub time_budget_ms: u64,
    pub output_mode: OutputMode,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            time_budget_ms: 30,
            output_mode: OutputMode::Both,
        }
    }
}

/// Options handed to a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    pub output_mode: OutputMode,
    pub time_budget: Duration,
}

impl From<JobParams> for GenerateOptions {
    fn from(params: JobParams) -> Self {
        Self {
            output_mode: params.output_mode,
            time_budget: Duration::from_millis(params.time_budget_ms),
        }
    }
}

/// One boundary segment of the outline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSegment {
    pub start: Point3<f64>,
    pub end: Point3<f64>,
}

/// Outline mesh and boundary edges of an aggregate model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SilhouetteOutput {
    /// Projected polygon mesh, empty unless the mode asks for it
    pub outline: Mesh,
    /// Boundary segments, empty unless the mode asks for them
    pub edges: Vec<EdgeSegment>,
    /// Grid cells along the longer projected side at the final refinement
    pub resolution: usize,
    /// Refinement passes completed within the budget
    pub iterations: usize,
}

impl SilhouetteOutput {
    /// Segment endpoints as a flat line list, two points per segment
    pub fn edge_positions(&self) -> Vec<Point3<f64>> {
        self.edges.iter().flat_map(|e| [e.start, e.end]).collect()
    }

    /// Bounds of everything produced
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = self.outline.bounding_box();
        for edge in &self.edges {
            bbox.expand_to_include(&edge.start);
            bbox.expand_to_include(&edge.end);
        }
        bbox
    }
}

/// Observable state of a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Complete,
    Failed,
}
