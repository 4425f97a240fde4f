// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Enclosed volume, surface area and manifold checks

use super::Mesh;
use crate::error::GeometryResult;
use ahash::AHashMap;
use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Edge usage summary of a mesh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifoldReport {
    /// Edges used by exactly one triangle
    pub boundary_edges: usize,
    /// Edges used by more than two triangles
    pub non_manifold_edges: usize,
    /// Two-triangle edges traversed in the same direction by both
    pub inconsistent_edges: usize,
}

impl ManifoldReport {
    pub fn is_closed_manifold(&self) -> bool {
        self.boundary_edges == 0 && self.non_manifold_edges == 0 && self.inconsistent_edges == 0
    }
}

/// Advisory attached to a volume computed from a suspect mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonManifoldWarning {
    pub report: ManifoldReport,
}

impl std::fmt::Display for NonManifoldWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mesh is not a closed manifold ({} boundary, {} non-manifold, {} inconsistently wound edges); volume is not meaningful",
            self.report.boundary_edges, self.report.non_manifold_edges, self.report.inconsistent_edges
        )
    }
}

/// Volume plus the result of the optional manifold check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeReport {
    pub volume: f64,
    pub warning: Option<NonManifoldWarning>,
}

/// Enclosed volume of a closed, consistently wound mesh in world space.
///
/// Closedness is not checked; use [`volume_checked`] when the mesh comes
/// from an untrusted source.
pub fn volume(mesh: &Mesh, transform: &Matrix4<f64>) -> GeometryResult<f64> {
    Ok(signed_volume(mesh, transform)?.abs())
}

/// Signed enclosed volume; negative for inward winding or a reflecting
/// transform
pub fn signed_volume(mesh: &Mesh, transform: &Matrix4<f64>) -> GeometryResult<f64> {
    mesh.validate()?;

    let world: Vec<Point3<f64>> = mesh
        .vertices
        .iter()
        .map(|v| transform.transform_point(v))
        .collect();

    // Apex at the bounds centre instead of the origin; same sum for a
    // closed mesh, far less cancellation when the mesh sits far away
    let apex = super::BoundingBox::from_points(&world).center();

    let mut total = 0.0;
    for triangle in &mesh.triangles {
        let [a, b, c] = triangle.indices;
        let p0 = world[a] - apex;
        let p1 = world[b] - apex;
        let p2 = world[c] - apex;

        // Signed volume of tetrahedron formed by triangle and apex
        total += p0.dot(&p1.cross(&p2)) / 6.0;
    }

    Ok(total)
}

/// Volume with an opt-in manifold validation pass
pub fn volume_checked(mesh: &Mesh, transform: &Matrix4<f64>) -> GeometryResult<VolumeReport> {
    let volume = volume(mesh, transform)?;
    let report = check_manifold(mesh);

    let warning = if report.is_closed_manifold() {
        None
    } else {
        let warning = NonManifoldWarning { report };
        warn!(
            boundary_edges = report.boundary_edges,
            non_manifold_edges = report.non_manifold_edges,
            inconsistent_edges = report.inconsistent_edges,
            volume,
            "volume computed from non-manifold mesh"
        );
        Some(warning)
    };

    Ok(VolumeReport { volume, warning })
}

/// Total surface area in world space
pub fn surface_area(mesh: &Mesh, transform: &Matrix4<f64>) -> GeometryResult<f64> {
    mesh.validate()?;

    let mut area = 0.0;
    for triangle in &mesh.triangles {
        let [a, b, c] = triangle.indices;
        let v0 = transform.transform_point(&mesh.vertices[a]);
        let v1 = transform.transform_point(&mesh.vertices[b]);
        let v2 = transform.transform_point(&mesh.vertices[c]);
        area += (v1 - v0).cross(&(v2 - v0)).norm() / 2.0;
    }

    Ok(area)
}

/// Check whether every edge is shared by exactly two triangles that
/// traverse it in opposite directions
pub fn check_manifold(mesh: &Mesh) -> ManifoldReport {
    let mut directed: AHashMap<(usize, usize), usize> = AHashMap::new();
    let mut undirected: AHashMap<(usize, usize), usize> = AHashMap::new();

    for triangle in &mesh.triangles {
        for (a, b) in triangle.edges() {
            *directed.entry((a, b)).or_insert(0) += 1;
            let key = if a < b { (a, b) } else { (b, a) };
            *undirected.entry(key).or_insert(0) += 1;
        }
    }

    let mut report = ManifoldReport::default();
    for (&(a, b), &count) in &undirected {
        match count {
            1 => report.boundary_edges += 1,
            2 => {
                let forward = directed.get(&(a, b)).copied().unwrap_or(0);
                if forward != 1 {
                    report.inconsistent_edges += 1;
                }
            }
            _ => report.non_manifold_edges += 1,
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeometryError;
    use crate::geometry::{Primitive, Triangle};
    use nalgebra::Vector3;

    fn unit_cube() -> Mesh {
        Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false).to_mesh()
    }

    #[test]
    fn test_cube_volume_and_area() {
        let mesh = Primitive::cube(Vector3::new(10.0, 10.0, 10.0), true).to_mesh();
        let identity = Matrix4::identity();

        assert!((volume(&mesh, &identity).unwrap() - 1000.0).abs() < 1e-9);
        assert!((surface_area(&mesh, &identity).unwrap() - 600.0).abs() < 1e-9);
        assert!(signed_volume(&mesh, &identity).unwrap() > 0.0);
    }

    #[test]
    fn test_far_from_origin() {
        let translation = Matrix4::new_translation(&Vector3::new(1.0e7, -3.0e7, 2.0e7));
        let v = volume(&unit_cube(), &translation).unwrap();
        assert!((v - 1.0).abs() < 1e-6, "volume {v}");
    }

    #[test]
    fn test_reflection_flips_sign() {
        let mirror = Matrix4::new_nonuniform_scaling(&Vector3::new(-1.0, 1.0, 1.0));
        let signed = signed_volume(&unit_cube(), &mirror).unwrap();
        assert!((signed + 1.0).abs() < 1e-12);
        assert!((volume(&unit_cube(), &mirror).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_mesh_rejected() {
        assert_eq!(volume(&Mesh::new(), &Matrix4::identity()), Err(GeometryError::EmptyMesh));
    }

    #[test]
    fn test_open_mesh_warns() {
        let mut mesh = unit_cube();
        mesh.triangles.pop();
        let report = volume_checked(&mesh, &Matrix4::identity()).unwrap();
        let warning = report.warning.expect("open mesh should warn");
        assert_eq!(warning.report.boundary_edges, 3);
        assert!(warning.to_string().contains("not a closed manifold"));

        let closed = volume_checked(&unit_cube(), &Matrix4::identity()).unwrap();
        assert!(closed.warning.is_none());
    }

    #[test]
    fn test_flipped_triangle_is_inconsistent() {
        let mut mesh = unit_cube();
        let [a, b, c] = mesh.triangles[0].indices;
        mesh.triangles[0] = Triangle::new([a, c, b]);

        let report = check_manifold(&mesh);
        assert_eq!(report.boundary_edges, 0);
        assert_eq!(report.inconsistent_edges, 3);
    }
}
