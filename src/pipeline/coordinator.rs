// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Pipeline coordinator - offloads silhouette jobs and applies their results
//!
//! Every submission is stamped with a generation number and runs on its own
//! worker thread, owning its geometry. Results come back over channels in
//! completion order; a result older than the generation already on display
//! is dropped as [`PipelineError::Cancelled`].

use super::backend::{GridConfig, GridSilhouette, SilhouetteBackend};
use super::types::{GenerateOptions, JobParams, JobStatus, OutputMode, SilhouetteOutput};
use crate::error::PipelineError;
use crate::geometry::Mesh;
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome delivered to a job handle
pub type JobOutcome = Result<Arc<SilhouetteOutput>, PipelineError>;

/// Pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Refinement budget used by [`PipelineCoordinator::submit_default`]
    pub time_budget_ms: u64,
    pub output_mode: OutputMode,
    /// Limits for the default grid backend
    pub grid: GridConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: 30,
            output_mode: OutputMode::Both,
            grid: GridConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn job_params(&self) -> JobParams {
        JobParams {
            time_budget_ms: self.time_budget_ms,
            output_mode: self.output_mode,
        }
    }
}

/// Future-like handle resolved exactly once by the worker
#[derive(Debug)]
pub struct JobHandle {
    generation: u64,
    receiver: Receiver<JobOutcome>,
    outcome: Option<JobOutcome>,
}

impl JobHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Non-blocking check; the outcome is cached once received
    pub fn poll(&mut self) -> Option<&JobOutcome> {
        if self.outcome.is_none() {
            match self.receiver.try_recv() {
                Ok(outcome) => self.outcome = Some(outcome),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    self.outcome = Some(Err(PipelineError::Disconnected))
                }
            }
        }
        self.outcome.as_ref()
    }

    pub fn status(&mut self) -> JobStatus {
        match self.poll() {
            None => JobStatus::Pending,
            Some(Ok(_)) => JobStatus::Complete,
            Some(Err(_)) => JobStatus::Failed,
        }
    }

    /// Block until the worker answers
    pub fn wait(mut self) -> JobOutcome {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        self.receiver
            .recv()
            .unwrap_or(Err(PipelineError::Disconnected))
    }
}

/// Message from a worker back to the coordinator
struct Completion {
    generation: u64,
    outcome: JobOutcome,
    elapsed_ms: f64,
}

/// What a drain applied, dropped or surfaced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Generation now on display, if this drain changed it
    pub applied: Option<u64>,
    /// Stale results dropped by generation comparison
    pub superseded: Vec<u64>,
    /// Current-or-newer jobs that failed; the previous outline is kept
    pub failures: Vec<(u64, PipelineError)>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.applied.is_none() && self.superseded.is_empty() && self.failures.is_empty()
    }

    fn absorb(&mut self, other: DrainReport) {
        if other.applied.is_some() {
            self.applied = other.applied;
        }
        self.superseded.extend(other.superseded);
        self.failures.extend(other.failures);
    }
}

/// Running totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub submitted: u64,
    pub applied: u64,
    pub superseded: u64,
    pub failed: u64,
}

/// Drives silhouette jobs and owns the displayed outline
pub struct PipelineCoordinator {
    backend: Arc<dyn SilhouetteBackend>,
    config: PipelineConfig,
    results_tx: Sender<Completion>,
    results_rx: Receiver<Completion>,
    last_generation: u64,
    applied_generation: u64,
    /// Newest generation that has reported, successfully or not
    reported_generation: u64,
    in_flight: usize,
    current: Option<Arc<SilhouetteOutput>>,
    stats: PipelineStats,
}

impl PipelineCoordinator {
    pub fn new(backend: Arc<dyn SilhouetteBackend>, config: PipelineConfig) -> Self {
        let (results_tx, results_rx) = mpsc::channel();
        Self {
            backend,
            config,
            results_tx,
            results_rx,
            last_generation: 0,
            applied_generation: 0,
            reported_generation: 0,
            in_flight: 0,
            current: None,
            stats: PipelineStats::default(),
        }
    }

    /// Coordinator over the default grid backend
    pub fn with_grid_backend(config: PipelineConfig) -> Self {
        Self::new(Arc::new(GridSilhouette::new(config.grid)), config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Submit with the configured budget and output mode
    pub fn submit_default(&mut self, geometry: Mesh) -> Result<JobHandle, PipelineError> {
        let params = self.config.job_params();
        self.submit(geometry, params)
    }

    /// Hand merged geometry to a fresh worker; returns immediately
    pub fn submit(&mut self, geometry: Mesh, params: JobParams) -> Result<JobHandle, PipelineError> {
        if geometry.is_empty() {
            return Err(PipelineError::EmptyGeometry);
        }

        let generation = self.last_generation + 1;
        let (handle_tx, handle_rx) = mpsc::channel();
        let results_tx = self.results_tx.clone();
        let backend = Arc::clone(&self.backend);
        let options = GenerateOptions::from(params);

        thread::Builder::new()
            .name(format!("silhouette-{generation}"))
            .spawn(move || {
                let started = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    backend.generate(&geometry, &options)
                }))
                .unwrap_or(Err(PipelineError::WorkerPanicked))
                .map(Arc::new);

                // Either receiver may be gone; the job has nobody left to tell
                let _ = handle_tx.send(outcome.clone());
                let _ = results_tx.send(Completion {
                    generation,
                    outcome,
                    elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                });
            })
            .map_err(|err| PipelineError::Spawn(err.to_string()))?;

        self.last_generation = generation;
        self.in_flight += 1;
        self.stats.submitted += 1;
        debug!(
            generation,
            time_budget_ms = params.time_budget_ms,
            "submitted silhouette job"
        );

        Ok(JobHandle {
            generation,
            receiver: handle_rx,
            outcome: None,
        })
    }

    /// Apply every result that has arrived, without blocking
    pub fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        while let Ok(completion) = self.results_rx.try_recv() {
            report.absorb(self.apply(completion));
        }
        report
    }

    /// Block until no job is in flight, applying results as they arrive
    pub fn wait_idle(&mut self) -> DrainReport {
        let mut report = self.drain();
        while self.in_flight > 0 {
            // The coordinator holds a sender, so recv cannot disconnect
            match self.results_rx.recv() {
                Ok(completion) => report.absorb(self.apply(completion)),
                Err(_) => break,
            }
        }
        report
    }

    /// Block until `generation` has reported, or nothing is left in flight
    pub fn wait_for_generation(&mut self, generation: u64) -> DrainReport {
        let mut report = self.drain();
        while generation > self.reported_generation && self.in_flight > 0 {
            match self.results_rx.recv() {
                Ok(completion) => {
                    let reported = completion.generation;
                    report.absorb(self.apply(completion));
                    if reported == generation {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        report
    }

    fn apply(&mut self, completion: Completion) -> DrainReport {
        let Completion {
            generation,
            outcome,
            elapsed_ms,
        } = completion;
        self.in_flight = self.in_flight.saturating_sub(1);

        let mut report = DrainReport::default();
        // Anything older than the newest report is stale, even when that
        // report was a failure
        if generation <= self.reported_generation {
            let stale = PipelineError::Cancelled {
                generation,
                current: self.reported_generation,
            };
            debug!(%stale, "dropping stale silhouette result");
            self.stats.superseded += 1;
            report.superseded.push(generation);
            return report;
        }
        self.reported_generation = generation;

        match outcome {
            Ok(output) => {
                info!(
                    generation,
                    elapsed_ms,
                    outline_triangles = output.outline.triangle_count(),
                    edges = output.edges.len(),
                    "applied silhouette"
                );
                self.current = Some(output);
                self.applied_generation = generation;
                self.stats.applied += 1;
                report.applied = Some(generation);
            }
            Err(err) => {
                warn!(generation, error = %err, "silhouette job failed, keeping previous outline");
                self.stats.failed += 1;
                report.failures.push((generation, err));
            }
        }
        report
    }

    /// Outline currently on display
    pub fn current(&self) -> Option<&SilhouetteOutput> {
        self.current.as_deref()
    }

    pub fn applied_generation(&self) -> u64 {
        self.applied_generation
    }

    pub fn last_generation(&self) -> u64 {
        self.last_generation
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}

/// Merge meshes into one world-space, position-only mesh
pub fn merge_world_geometry(parts: &[(&Mesh, &Matrix4<f64>)]) -> Mesh {
    let mut merged = Mesh::new();
    for (mesh, transform) in parts {
        let mut world = mesh.positions_only();
        world.transform(transform);
        merged.merge(&world);
    }
    merged
}
