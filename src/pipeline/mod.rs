// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Asynchronous silhouette and edge extraction

mod backend;
mod coordinator;
mod types;

pub use backend::{GridConfig, GridSilhouette, SilhouetteBackend};
pub use coordinator::{
    merge_world_geometry, DrainReport, JobHandle, JobOutcome, PipelineConfig, PipelineCoordinator,
    PipelineStats,
};
pub use types::{EdgeSegment, GenerateOptions, JobParams, JobStatus, OutputMode, SilhouetteOutput};
