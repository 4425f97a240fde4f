// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesh representation and utilities

use super::BoundingBox;
use crate::error::{GeometryError, GeometryResult};
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Triangle defined by three vertex indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangle {
    pub indices: [usize; 3],
}

impl Triangle {
    pub fn new(indices: [usize; 3]) -> Self {
        Self { indices }
    }

    /// Directed edges in winding order
    pub fn edges(&self) -> [(usize, usize); 3] {
        let [a, b, c] = self.indices;
        [(a, b), (b, c), (c, a)]
    }
}

/// Triangular mesh
///
/// Positions are the only attribute the estimators read. Normals are kept
/// for display collaborators and are dropped by [`Mesh::positions_only`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<Triangle>,
    /// Per-vertex normals, empty when absent
    #[serde(default)]
    pub normals: Vec<Vector3<f64>>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertex_count: usize, triangle_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            triangles: Vec::with_capacity(triangle_count),
            normals: Vec::new(),
        }
    }

    /// Build from flat vertex and index buffers, validating both
    pub fn from_buffers(positions: &[[f64; 3]], indices: &[usize]) -> GeometryResult<Self> {
        if indices.len() % 3 != 0 {
            return Err(GeometryError::IndexCountNotMultipleOfThree(indices.len()));
        }

        let mesh = Self {
            vertices: positions.iter().map(|p| Point3::from(*p)).collect(),
            triangles: indices
                .chunks_exact(3)
                .map(|c| Triangle::new([c[0], c[1], c[2]]))
                .collect(),
            normals: Vec::new(),
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Add a vertex and return its index
    pub fn add_vertex(&mut self, position: Point3<f64>) -> usize {
        let index = self.vertices.len();
        self.vertices.push(position);
        index
    }

    /// Add a triangle
    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    /// Check that the mesh has triangles and every index is in range
    pub fn validate(&self) -> GeometryResult<()> {
        if self.triangles.is_empty() {
            return Err(GeometryError::EmptyMesh);
        }

        let vertex_count = self.vertices.len();
        for (triangle, tri) in self.triangles.iter().enumerate() {
            if let Some(&index) = tri.indices.iter().find(|&&i| i >= vertex_count) {
                return Err(GeometryError::IndexOutOfRange {
                    triangle,
                    index,
                    vertex_count,
                });
            }
        }

        Ok(())
    }

    /// Corner positions of a triangle; the mesh must be valid
    pub fn triangle_points(&self, triangle: usize) -> [Point3<f64>; 3] {
        let [a, b, c] = self.triangles[triangle].indices;
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    /// Transform all vertices by a matrix
    pub fn transform(&mut self, matrix: &Matrix4<f64>) {
        for vertex in &mut self.vertices {
            *vertex = matrix.transform_point(vertex);
        }

        if !self.normals.is_empty() {
            // Transform normals with the inverse transpose
            let normal_matrix = matrix
                .try_inverse()
                .map(|m| m.transpose())
                .unwrap_or(*matrix);
            for normal in &mut self.normals {
                *normal = normal_matrix.transform_vector(normal).normalize();
            }
        }
    }

    /// Copy of the mesh with a transform applied
    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Mesh {
        let mut mesh = self.clone();
        mesh.transform(matrix);
        mesh
    }

    /// Copy holding positions and triangles only
    pub fn positions_only(&self) -> Mesh {
        Mesh {
            vertices: self.vertices.clone(),
            triangles: self.triangles.clone(),
            normals: Vec::new(),
        }
    }

    /// Compute bounding box
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.vertices)
    }

    /// Bounding box of the mesh after applying `matrix`
    pub fn world_bounding_box(&self, matrix: &Matrix4<f64>) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        for vertex in &self.vertices {
            bbox.expand_to_include(&matrix.transform_point(vertex));
        }
        bbox
    }

    /// Get vertex count
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get triangle count
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Append another mesh's positions and triangles
    pub fn merge(&mut self, other: &Mesh) {
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);

        for triangle in &other.triangles {
            self.triangles.push(Triangle::new([
                triangle.indices[0] + offset,
                triangle.indices[1] + offset,
                triangle.indices[2] + offset,
            ]));
        }

        // Normals survive only when both sides carry them
        if self.normals.len() + other.normals.len() == self.vertices.len() {
            self.normals.extend_from_slice(&other.normals);
        } else {
            self.normals.clear();
        }
    }
}
