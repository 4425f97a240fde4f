// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Silhouette backends
//!
//! [`GridSilhouette`] projects the aggregate mesh straight down onto the
//! ground plane and rasterizes the union of the projected triangles into an
//! occupancy grid. The grid starts coarse and doubles in resolution while
//! the time budget allows, so longer budgets give tighter outlines.

use super::types::{EdgeSegment, GenerateOptions, SilhouetteOutput};
use crate::error::PipelineError;
use crate::geometry::{Mesh, Triangle};
use nalgebra::Point3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Computes an outline for a merged, world-space, position-only mesh
pub trait SilhouetteBackend: Send + Sync + 'static {
    fn generate(
        &self,
        mesh: &Mesh,
        options: &GenerateOptions,
    ) -> Result<SilhouetteOutput, PipelineError>;
}

/// Refinement limits for [`GridSilhouette`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Cells along the longer projected side on the first pass
    pub initial_resolution: usize,
    /// Refinement stops once this resolution is reached
    pub max_resolution: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            initial_resolution: 16,
            max_resolution: 512,
        }
    }
}

/// Triangle projected onto the XZ plane
#[derive(Debug, Clone, Copy)]
struct Flat {
    a: [f64; 2],
    b: [f64; 2],
    c: [f64; 2],
}

impl Flat {
    fn contains(&self, p: [f64; 2]) -> bool {
        let d0 = edge(self.a, self.b, p);
        let d1 = edge(self.b, self.c, p);
        let d2 = edge(self.c, self.a, p);
        let has_neg = d0 < 0.0 || d1 < 0.0 || d2 < 0.0;
        let has_pos = d0 > 0.0 || d1 > 0.0 || d2 > 0.0;
        !(has_neg && has_pos)
    }

    fn centroid(&self) -> [f64; 2] {
        [
            (self.a[0] + self.b[0] + self.c[0]) / 3.0,
            (self.a[1] + self.b[1] + self.c[1]) / 3.0,
        ]
    }

    fn min(&self) -> [f64; 2] {
        [
            self.a[0].min(self.b[0]).min(self.c[0]),
            self.a[1].min(self.b[1]).min(self.c[1]),
        ]
    }

    fn max(&self) -> [f64; 2] {
        [
            self.a[0].max(self.b[0]).max(self.c[0]),
            self.a[1].max(self.b[1]).max(self.c[1]),
        ]
    }
}

fn edge(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

/// Occupancy grid over the projected bounds
struct Grid {
    origin: [f64; 2],
    cell: f64,
    nx: usize,
    nz: usize,
    occupied: Vec<bool>,
}

impl Grid {
    fn is_occupied(&self, i: isize, j: isize) -> bool {
        i >= 0
            && j >= 0
            && (i as usize) < self.nx
            && (j as usize) < self.nz
            && self.occupied[j as usize * self.nx + i as usize]
    }

    fn point(&self, i: usize, j: usize) -> Point3<f64> {
        Point3::new(
            self.origin[0] + i as f64 * self.cell,
            0.0,
            self.origin[1] + j as f64 * self.cell,
        )
    }
}

/// Default backend: iteratively refined occupancy-grid projection
#[derive(Debug, Clone, Default)]
pub struct GridSilhouette {
    config: GridConfig,
}

impl GridSilhouette {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    fn project(mesh: &Mesh) -> Vec<Flat> {
        mesh.triangles
            .iter()
            .map(|t| {
                let [a, b, c] = t.indices.map(|i| mesh.vertices[i]);
                Flat {
                    a: [a.x, a.z],
                    b: [b.x, b.z],
                    c: [c.x, c.z],
                }
            })
            .filter(|f| {
                // Triangles seen edge-on cover no area
                let area2 = edge(f.a, f.b, f.c).abs();
                let extent = (f.max()[0] - f.min()[0]).max(f.max()[1] - f.min()[1]);
                area2 > 1e-12 * extent * extent
            })
            .collect()
    }

    fn rasterize(flats: &[Flat], min: [f64; 2], extent: [f64; 2], resolution: usize) -> Grid {
        let cell = extent[0].max(extent[1]) / resolution as f64;
        let nx = ((extent[0] / cell).ceil() as usize).max(1);
        let nz = ((extent[1] / cell).ceil() as usize).max(1);
        let mut occupied = vec![false; nx * nz];

        let to_cell = |v: f64, origin: f64, n: usize| -> usize {
            (((v - origin) / cell).floor().max(0.0) as usize).min(n - 1)
        };

        occupied
            .par_chunks_mut(nx)
            .enumerate()
            .for_each(|(j, row)| {
                let z = min[1] + (j as f64 + 0.5) * cell;
                for flat in flats {
                    let (lo, hi) = (flat.min(), flat.max());
                    if z < lo[1] || z > hi[1] {
                        continue;
                    }
                    let i0 = to_cell(lo[0], min[0], nx);
                    let i1 = to_cell(hi[0], min[0], nx);
                    for (i, cell_occupied) in row.iter_mut().enumerate().take(i1 + 1).skip(i0) {
                        if !*cell_occupied {
                            let x = min[0] + (i as f64 + 0.5) * cell;
                            *cell_occupied = flat.contains([x, z]);
                        }
                    }
                }
            });

        // Slivers thinner than a cell still claim the cell under their centroid
        for flat in flats {
            let [x, z] = flat.centroid();
            let i = to_cell(x, min[0], nx);
            let j = to_cell(z, min[1], nz);
            occupied[j * nx + i] = true;
        }

        Grid {
            origin: min,
            cell,
            nx,
            nz,
            occupied,
        }
    }

    fn outline_mesh(grid: &Grid) -> Mesh {
        let mut mesh = Mesh::new();
        let mut lattice: Vec<Option<usize>> = vec![None; (grid.nx + 1) * (grid.nz + 1)];
        let mut corner = |mesh: &mut Mesh, i: usize, j: usize| -> usize {
            let slot = &mut lattice[j * (grid.nx + 1) + i];
            *slot.get_or_insert_with(|| mesh.add_vertex(grid.point(i, j)))
        };

        for j in 0..grid.nz {
            for i in 0..grid.nx {
                if !grid.occupied[j * grid.nx + i] {
                    continue;
                }
                let p00 = corner(&mut mesh, i, j);
                let p10 = corner(&mut mesh, i + 1, j);
                let p11 = corner(&mut mesh, i + 1, j + 1);
                let p01 = corner(&mut mesh, i, j + 1);
                // Wound so the outline faces +Y
                mesh.add_triangle(Triangle::new([p00, p01, p11]));
                mesh.add_triangle(Triangle::new([p00, p11, p10]));
            }
        }

        mesh
    }

    fn boundary_edges(grid: &Grid) -> Vec<EdgeSegment> {
        let mut edges = Vec::new();
        for j in 0..grid.nz {
            for i in 0..grid.nx {
                if !grid.occupied[j * grid.nx + i] {
                    continue;
                }
                let (ii, jj) = (i as isize, j as isize);
                let sides = [
                    (ii, jj - 1, (i, j), (i + 1, j)),
                    (ii + 1, jj, (i + 1, j), (i + 1, j + 1)),
                    (ii, jj + 1, (i + 1, j + 1), (i, j + 1)),
                    (ii - 1, jj, (i, j + 1), (i, j)),
                ];
                for (ni, nj, start, end) in sides {
                    if !grid.is_occupied(ni, nj) {
                        edges.push(EdgeSegment {
                            start: grid.point(start.0, start.1),
                            end: grid.point(end.0, end.1),
                        });
                    }
                }
            }
        }
        edges
    }
}

impl SilhouetteBackend for GridSilhouette {
    fn generate(
        &self,
        mesh: &Mesh,
        options: &GenerateOptions,
    ) -> Result<SilhouetteOutput, PipelineError> {
        if mesh.is_empty() {
            return Err(PipelineError::EmptyGeometry);
        }
        mesh.validate()
            .map_err(|err| PipelineError::backend(err.to_string()))?;
        if self.config.initial_resolution == 0 {
            return Err(PipelineError::backend("initial resolution must be positive"));
        }

        let flats = Self::project(mesh);
        if flats.is_empty() {
            return Err(PipelineError::EmptyGeometry);
        }

        let min = flats.iter().fold([f64::INFINITY; 2], |acc, f| {
            let m = f.min();
            [acc[0].min(m[0]), acc[1].min(m[1])]
        });
        let max = flats.iter().fold([f64::NEG_INFINITY; 2], |acc, f| {
            let m = f.max();
            [acc[0].max(m[0]), acc[1].max(m[1])]
        });
        let extent = [max[0] - min[0], max[1] - min[1]];

        let started = Instant::now();
        let max_resolution = self.config.max_resolution.max(self.config.initial_resolution);
        let mut resolution = self.config.initial_resolution;
        let mut iterations = 0;
        let grid = loop {
            let pass_started = Instant::now();
            let grid = Self::rasterize(&flats, min, extent, resolution);
            iterations += 1;
            let pass_time = pass_started.elapsed();

            if resolution >= max_resolution {
                break grid;
            }
            // Doubling the resolution roughly quadruples the next pass
            let projected = started.elapsed() + pass_time * 4;
            if projected >= options.time_budget {
                break grid;
            }
            resolution = (resolution * 2).min(max_resolution);
        };

        debug!(
            resolution,
            iterations,
            elapsed_ms = duration_ms(started.elapsed()),
            "silhouette refined"
        );

        let outline = if options.output_mode.wants_outline() {
            Self::outline_mesh(&grid)
        } else {
            Mesh::new()
        };
        let edges = if options.output_mode.wants_edges() {
            Self::boundary_edges(&grid)
        } else {
            Vec::new()
        };

        Ok(SilhouetteOutput {
            outline,
            edges,
            resolution,
            iterations,
        })
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;
    use crate::pipeline::OutputMode;
    use nalgebra::Vector3;

    fn options(mode: OutputMode, budget_ms: u64) -> GenerateOptions {
        GenerateOptions {
            output_mode: mode,
            time_budget: Duration::from_millis(budget_ms),
        }
    }

    #[test]
    fn test_cube_projects_to_square() {
        let mesh = Primitive::cube(Vector3::new(2.0, 2.0, 2.0), true).to_mesh();
        let backend = GridSilhouette::new(GridConfig {
            initial_resolution: 8,
            max_resolution: 8,
        });
        let output = backend.generate(&mesh, &options(OutputMode::Both, 1000)).unwrap();

        // Full 8x8 block: 64 cells, 128 triangles, lattice of 81 points
        assert_eq!(output.outline.triangle_count(), 128);
        assert_eq!(output.outline.vertex_count(), 81);
        assert_eq!(output.edges.len(), 32);
        assert_eq!(output.resolution, 8);

        let bbox = output.bounding_box();
        assert!((bbox.min.x + 1.0).abs() < 1e-12 && (bbox.max.z - 1.0).abs() < 1e-12);
        assert_eq!(bbox.min.y, 0.0);
        assert_eq!(bbox.max.y, 0.0);
    }

    #[test]
    fn test_output_mode_selects_parts() {
        let mesh = Primitive::sphere(1.0, 12).to_mesh();
        let backend = GridSilhouette::default();

        let outline = backend.generate(&mesh, &options(OutputMode::Outline, 5)).unwrap();
        assert!(!outline.outline.is_empty());
        assert!(outline.edges.is_empty());

        let edges = backend.generate(&mesh, &options(OutputMode::Edges, 5)).unwrap();
        assert!(edges.outline.is_empty());
        assert!(!edges.edges.is_empty());
    }

    #[test]
    fn test_edge_on_geometry_is_empty() {
        // Vertical triangle projects to a line
        let mesh = Mesh::from_buffers(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[0, 1, 2]).unwrap();
        let result = GridSilhouette::default().generate(&mesh, &options(OutputMode::Both, 5));
        assert_eq!(result, Err(PipelineError::EmptyGeometry));
        assert_eq!(
            GridSilhouette::default().generate(&Mesh::new(), &options(OutputMode::Both, 5)),
            Err(PipelineError::EmptyGeometry)
        );
    }

    #[test]
    fn test_refinement_stops_at_cap() {
        let mesh = Primitive::sphere(1.0, 16).to_mesh();
        let backend = GridSilhouette::new(GridConfig {
            initial_resolution: 4,
            max_resolution: 32,
        });
        let output = backend.generate(&mesh, &options(OutputMode::Both, 60_000)).unwrap();
        assert_eq!(output.resolution, 32);
        assert_eq!(output.iterations, 4);
    }

    #[test]
    fn test_longer_budget_gives_finer_outline() {
        let mesh = Primitive::sphere(1.0, 16).to_mesh();
        let backend = GridSilhouette::new(GridConfig {
            initial_resolution: 4,
            max_resolution: 32,
        });

        let coarse = backend.generate(&mesh, &options(OutputMode::Both, 0)).unwrap();
        assert_eq!(coarse.iterations, 1);
        assert_eq!(coarse.resolution, 4);

        let fine = backend.generate(&mesh, &options(OutputMode::Both, 60_000)).unwrap();
        assert!(fine.iterations > coarse.iterations);
        assert!(fine.resolution > coarse.resolution);
        assert!(fine.edges.len() > coarse.edges.len());
    }
}
