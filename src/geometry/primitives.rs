// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Closed, outward-wound primitive meshes

use super::{Mesh, Triangle};
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;

/// Geometric primitives
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Cube { size: Vector3<f64>, center: bool },
    Sphere { r: f64, segments: u32 },
}

impl Primitive {
    pub fn cube(size: Vector3<f64>, center: bool) -> Self {
        Self::Cube { size, center }
    }

    /// Sphere with `segments` slices and `segments` stacks (minimum 3)
    pub fn sphere(r: f64, segments: u32) -> Self {
        let segments = if segments > 0 { segments.max(3) } else { 32 };
        Self::Sphere { r, segments }
    }

    pub fn to_mesh(&self) -> Mesh {
        match self {
            Self::Cube { size, center } => generate_cube_mesh(*size, *center),
            Self::Sphere { r, segments } => generate_sphere_mesh(*r, *segments),
        }
    }
}

fn generate_cube_mesh(size: Vector3<f64>, center: bool) -> Mesh {
    let mut mesh = Mesh::with_capacity(8, 12);

    let min = if center { -size / 2.0 } else { Vector3::zeros() };
    let max = min + size;

    let positions = [
        Point3::new(min.x, min.y, min.z),
        Point3::new(max.x, min.y, min.z),
        Point3::new(max.x, max.y, min.z),
        Point3::new(min.x, max.y, min.z),
        Point3::new(min.x, min.y, max.z),
        Point3::new(max.x, min.y, max.z),
        Point3::new(max.x, max.y, max.z),
        Point3::new(min.x, max.y, max.z),
    ];
    for position in positions {
        mesh.add_vertex(position);
    }

    // Shared corners keep the cube closed; winding faces outward
    let faces = [
        [4, 5, 6],
        [4, 6, 7], // z+
        [1, 0, 3],
        [1, 3, 2], // z-
        [5, 1, 2],
        [5, 2, 6], // x+
        [0, 4, 7],
        [0, 7, 3], // x-
        [7, 6, 2],
        [7, 2, 3], // y+
        [0, 1, 5],
        [0, 5, 4], // y-
    ];
    for indices in faces {
        mesh.add_triangle(Triangle::new(indices));
    }

    mesh
}

fn generate_sphere_mesh(radius: f64, segments: u32) -> Mesh {
    // Fewer than three stacks leaves no ring between the poles
    let segments = segments.max(3);
    let stacks = segments as usize;
    let slices = segments as usize;
    let ring_count = stacks - 1;
    let mut mesh = Mesh::with_capacity(2 + ring_count * slices, 2 * slices * ring_count);

    let top = mesh.add_vertex(Point3::new(0.0, radius, 0.0));
    for i in 1..stacks {
        let phi = PI * i as f64 / stacks as f64;
        let y = radius * phi.cos();
        let r = radius * phi.sin();

        for j in 0..slices {
            let theta = 2.0 * PI * j as f64 / slices as f64;
            mesh.add_vertex(Point3::new(r * theta.cos(), y, r * theta.sin()));
        }
    }
    let bottom = mesh.add_vertex(Point3::new(0.0, -radius, 0.0));

    let ring = |i: usize, j: usize| 1 + i * slices + (j % slices);

    for j in 0..slices {
        mesh.add_triangle(Triangle::new([top, ring(0, j + 1), ring(0, j)]));
    }

    for i in 0..ring_count - 1 {
        for j in 0..slices {
            let a = ring(i, j);
            let b = ring(i, j + 1);
            let c = ring(i + 1, j);
            let d = ring(i + 1, j + 1);
            mesh.add_triangle(Triangle::new([a, b, c]));
            mesh.add_triangle(Triangle::new([b, d, c]));
        }
    }

    let last = ring_count - 1;
    for j in 0..slices {
        mesh.add_triangle(Triangle::new([bottom, ring(last, j), ring(last, j + 1)]));
    }

    mesh.normals = mesh
        .vertices
        .iter()
        .map(|p| p.coords.normalize())
        .collect();
    mesh
}
