// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Bounding Volume Hierarchy (BVH) for spatial acceleration
//! Used to accelerate ray queries and parity containment tests

use super::ray::{intersect_triangle, Ray, RayHit, TriangleHit};
use super::{BoundingBox, Mesh};
use crate::error::{GeometryError, GeometryResult};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// Number of centroid bins evaluated per SAH split
const SAH_BINS: usize = 12;

/// BVH build parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BvhConfig {
    /// Leaves hold at most this many triangles unless `max_depth` is hit
    pub max_leaf_size: usize,
    pub max_depth: usize,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            max_leaf_size: 4,
            max_depth: 48,
        }
    }
}

/// BVH node
#[derive(Debug, Clone)]
pub struct BvhNode {
    /// Bounding box of this node
    pub bbox: BoundingBox,
    /// Left child (None for leaf)
    pub left: Option<Box<BvhNode>>,
    /// Right child (None for leaf)
    pub right: Option<Box<BvhNode>>,
    /// Range into the BVH triangle order (only for leaf nodes)
    pub triangles: Range<usize>,
}

impl BvhNode {
    /// Create a leaf node
    fn leaf(bbox: BoundingBox, triangles: Range<usize>) -> Self {
        Self {
            bbox,
            left: None,
            right: None,
            triangles,
        }
    }

    /// Create an internal node
    fn internal(left: Box<BvhNode>, right: Box<BvhNode>) -> Self {
        Self {
            bbox: left.bbox.union(&right.bbox),
            left: Some(left),
            right: Some(right),
            triangles: 0..0,
        }
    }

    /// Check if this is a leaf node
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    fn children(&self) -> Option<(&BvhNode, &BvhNode)> {
        match (&self.left, &self.right) {
            (Some(left), Some(right)) => Some((left, right)),
            _ => None,
        }
    }
}

/// Result of counting surface crossings along a ray
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossings {
    /// Every hit crossed a triangle interior cleanly
    Clean(usize),
    /// At least one hit touched an edge, vertex or plane; parity unreliable
    Grazing,
}

/// Per-triangle data gathered before the build
struct BuildTriangle {
    bbox: BoundingBox,
    centroid: Point3<f64>,
}

#[derive(Clone, Copy)]
struct Bin {
    bbox: BoundingBox,
    count: usize,
}

/// Bounding Volume Hierarchy over one mesh's triangles, in mesh-local space
#[derive(Debug, Clone)]
pub struct Bvh {
    root: BvhNode,
    /// Triangle indices permuted so each leaf owns a contiguous range
    order: Vec<usize>,
    /// Triangle corner positions copied out of the mesh
    corners: Vec<[Point3<f64>; 3]>,
}

impl Bvh {
    /// Build with default parameters
    pub fn build(mesh: &Mesh) -> GeometryResult<Self> {
        Self::build_with(mesh, &BvhConfig::default())
    }

    /// Build BVH from a mesh's triangles
    pub fn build_with(mesh: &Mesh, config: &BvhConfig) -> GeometryResult<Self> {
        mesh.validate()?;
        if config.max_leaf_size == 0 {
            return Err(GeometryError::invalid_parameter("max_leaf_size must be positive"));
        }

        let corners: Vec<[Point3<f64>; 3]> = (0..mesh.triangle_count())
            .map(|t| mesh.triangle_points(t))
            .collect();
        let triangles: Vec<BuildTriangle> = corners
            .iter()
            .map(|points| {
                let bbox = BoundingBox::from_points(points);
                let centroid = Point3::from((points[0].coords + points[1].coords + points[2].coords) / 3.0);
                BuildTriangle { bbox, centroid }
            })
            .collect();

        let mut order: Vec<usize> = (0..triangles.len()).collect();
        let root = Self::build_recursive(&triangles, &mut order, 0, 0, config);

        let bvh = Self { root, order, corners };
        debug!(
            triangles = bvh.triangle_count(),
            nodes = bvh.node_count(),
            depth = bvh.depth(),
            "built BVH"
        );
        Ok(bvh)
    }

    /// Recursively build BVH node over `order[offset..offset + len]`
    fn build_recursive(
        triangles: &[BuildTriangle],
        order: &mut [usize],
        offset: usize,
        depth: usize,
        config: &BvhConfig,
    ) -> BvhNode {
        let count = order.len();
        let bbox = order
            .iter()
            .fold(BoundingBox::empty(), |acc, &t| acc.union(&triangles[t].bbox));
        let leaf = || BvhNode::leaf(bbox, offset..offset + count);

        if count <= 1 || depth >= config.max_depth {
            return leaf();
        }

        let centroid_bounds = BoundingBox::from_points(order.iter().map(|&t| &triangles[t].centroid));
        let axis = centroid_bounds.longest_axis();
        let extent = centroid_bounds.size()[axis];
        if extent <= 0.0 {
            // All centroids coincide; no split separates them
            return leaf();
        }

        let split = match Self::sah_split(triangles, order, &bbox, &centroid_bounds, axis) {
            Some((cost, mid)) if cost < count as f64 || count > config.max_leaf_size => Some(mid),
            None if count > config.max_leaf_size => {
                // SAH found no separating plane; fall back to the median
                let mid = count / 2;
                order.select_nth_unstable_by(mid, |&a, &b| {
                    triangles[a].centroid[axis].total_cmp(&triangles[b].centroid[axis])
                });
                Some(mid)
            }
            _ => None,
        };

        let Some(mid) = split else {
            return leaf();
        };

        let (left_order, right_order) = order.split_at_mut(mid);
        let left = Box::new(Self::build_recursive(triangles, left_order, offset, depth + 1, config));
        let right = Box::new(Self::build_recursive(
            triangles,
            right_order,
            offset + mid,
            depth + 1,
            config,
        ));

        BvhNode::internal(left, right)
    }

    /// Binned SAH; on success partitions `order` and returns
    /// `(cost, split index)` with cost in units of one triangle test
    fn sah_split(
        triangles: &[BuildTriangle],
        order: &mut [usize],
        bbox: &BoundingBox,
        centroid_bounds: &BoundingBox,
        axis: usize,
    ) -> Option<(f64, usize)> {
        let min = centroid_bounds.min[axis];
        let extent = centroid_bounds.size()[axis];
        let bin_of = |t: usize| {
            let relative = (triangles[t].centroid[axis] - min) / extent;
            ((relative * SAH_BINS as f64) as usize).min(SAH_BINS - 1)
        };

        let mut bins = [Bin {
            bbox: BoundingBox::empty(),
            count: 0,
        }; SAH_BINS];
        for &t in order.iter() {
            let bin = &mut bins[bin_of(t)];
            bin.bbox = bin.bbox.union(&triangles[t].bbox);
            bin.count += 1;
        }

        // Sweep from the right to get suffix areas and counts
        let mut right_area = [0.0; SAH_BINS];
        let mut right_count = [0usize; SAH_BINS];
        let mut acc = BoundingBox::empty();
        let mut acc_count = 0;
        for i in (1..SAH_BINS).rev() {
            acc = acc.union(&bins[i].bbox);
            acc_count += bins[i].count;
            right_area[i] = acc.half_area();
            right_count[i] = acc_count;
        }

        let parent_area = bbox.half_area().max(f64::MIN_POSITIVE);
        let mut best: Option<(f64, usize)> = None;
        let mut left = BoundingBox::empty();
        let mut left_count = 0;
        for i in 1..SAH_BINS {
            left = left.union(&bins[i - 1].bbox);
            left_count += bins[i - 1].count;
            if left_count == 0 || right_count[i] == 0 {
                continue;
            }
            let cost = 1.0
                + (left.half_area() * left_count as f64 + right_area[i] * right_count[i] as f64)
                    / parent_area;
            if best.map_or(true, |(c, _)| cost < c) {
                best = Some((cost, i));
            }
        }

        let (cost, boundary) = best?;

        // Partition in place: bins below the boundary to the left
        let mut mid = 0;
        for i in 0..order.len() {
            if bin_of(order[i]) < boundary {
                order.swap(i, mid);
                mid += 1;
            }
        }

        Some((cost, mid))
    }

    /// Nearest forward hit along the ray
    pub fn query_ray(&self, ray: &Ray) -> Option<RayHit> {
        let mut best: Option<(usize, f64)> = None;
        self.nearest_recursive(&self.root, ray, &mut best);
        best.map(|(triangle, distance)| RayHit {
            triangle,
            distance,
            point: ray.at(distance),
        })
    }

    fn nearest_recursive(&self, node: &BvhNode, ray: &Ray, best: &mut Option<(usize, f64)>) {
        let limit = best.map_or(f64::INFINITY, |(_, d)| d);
        if node.bbox.ray_entry(ray, limit).is_none() {
            return;
        }

        match node.children() {
            None => {
                for &t in &self.order[node.triangles.clone()] {
                    let [v0, v1, v2] = &self.corners[t];
                    if let Some(d) = intersect_triangle(ray, v0, v1, v2).distance() {
                        // Ties go to the lowest triangle index
                        let closer = match *best {
                            None => true,
                            Some((bt, bd)) => d < bd || (d == bd && t < bt),
                        };
                        if closer {
                            *best = Some((t, d));
                        }
                    }
                }
            }
            Some((left, right)) => {
                // Visit the nearer child first so the far one prunes harder
                let dl = left.bbox.ray_entry(ray, limit);
                let dr = right.bbox.ray_entry(ray, limit);
                let (first, second) = match (dl, dr) {
                    (Some(a), Some(b)) if b < a => (right, left),
                    _ => (left, right),
                };
                self.nearest_recursive(first, ray, best);
                self.nearest_recursive(second, ray, best);
            }
        }
    }

    /// Whether the ray hits any triangle
    pub fn query_ray_any(&self, ray: &Ray) -> bool {
        self.any_recursive(&self.root, ray)
    }

    fn any_recursive(&self, node: &BvhNode, ray: &Ray) -> bool {
        if node.bbox.ray_entry(ray, f64::INFINITY).is_none() {
            return false;
        }

        match node.children() {
            None => self.order[node.triangles.clone()].iter().any(|&t| {
                let [v0, v1, v2] = &self.corners[t];
                intersect_triangle(ray, v0, v1, v2).distance().is_some()
            }),
            Some((left, right)) => self.any_recursive(left, ray) || self.any_recursive(right, ray),
        }
    }

    /// Count every forward surface crossing, for parity tests
    pub fn count_crossings(&self, ray: &Ray) -> Crossings {
        let mut count = 0;
        if self.crossings_recursive(&self.root, ray, &mut count) {
            Crossings::Clean(count)
        } else {
            Crossings::Grazing
        }
    }

    /// Returns false as soon as a grazing hit is found
    fn crossings_recursive(&self, node: &BvhNode, ray: &Ray, count: &mut usize) -> bool {
        if node.bbox.ray_entry(ray, f64::INFINITY).is_none() {
            return true;
        }

        match node.children() {
            None => {
                for &t in &self.order[node.triangles.clone()] {
                    let [v0, v1, v2] = &self.corners[t];
                    match intersect_triangle(ray, v0, v1, v2) {
                        TriangleHit::Miss => {}
                        TriangleHit::Hit(_) => *count += 1,
                        TriangleHit::Grazing(_) | TriangleHit::Coplanar => return false,
                    }
                }
                true
            }
            Some((left, right)) => {
                self.crossings_recursive(left, ray, count) && self.crossings_recursive(right, ray, count)
            }
        }
    }

    /// Bounds of the whole triangle set
    pub fn bounds(&self) -> BoundingBox {
        self.root.bbox
    }

    pub fn triangle_count(&self) -> usize {
        self.order.len()
    }

    /// Corner positions of a triangle by its mesh index
    pub fn triangle(&self, index: usize) -> &[Point3<f64>; 3] {
        &self.corners[index]
    }

    pub fn root(&self) -> &BvhNode {
        &self.root
    }

    pub fn node_count(&self) -> usize {
        fn count(node: &BvhNode) -> usize {
            1 + node.children().map_or(0, |(l, r)| count(l) + count(r))
        }
        count(&self.root)
    }

    pub fn depth(&self) -> usize {
        fn depth(node: &BvhNode) -> usize {
            1 + node.children().map_or(0, |(l, r)| depth(l).max(depth(r)))
        }
        depth(&self.root)
    }

    /// Leaf boxes with the mesh triangle indices they own
    pub fn leaves(&self) -> Vec<(BoundingBox, &[usize])> {
        let mut leaves = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node.children() {
                None => leaves.push((node.bbox, &self.order[node.triangles.clone()])),
                Some((left, right)) => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        leaves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;
    use nalgebra::Vector3;

    fn nodes_contain_children(node: &BvhNode) -> bool {
        match node.children() {
            None => true,
            Some((l, r)) => {
                node.bbox.contains_box(&l.bbox)
                    && node.bbox.contains_box(&r.bbox)
                    && nodes_contain_children(l)
                    && nodes_contain_children(r)
            }
        }
    }

    #[test]
    fn test_bvh_build() {
        let mesh = Primitive::sphere(1.0, 24).to_mesh();
        let bvh = Bvh::build(&mesh).unwrap();

        assert!(!bvh.root().is_leaf());
        assert_eq!(bvh.triangle_count(), mesh.triangle_count());
        assert!(nodes_contain_children(bvh.root()));
        assert!(bvh.bounds().approx_eq(&mesh.bounding_box(), 1e-12));
    }

    #[test]
    fn test_leaves_cover_each_triangle_once() {
        let mesh = Primitive::sphere(1.0, 20).to_mesh();
        let config = BvhConfig::default();
        let bvh = Bvh::build_with(&mesh, &config).unwrap();

        let mut seen = vec![0usize; mesh.triangle_count()];
        for (bbox, triangles) in bvh.leaves() {
            assert!(triangles.len() <= config.max_leaf_size);
            // Leaf boxes are the exact union of their triangles
            let tight = BoundingBox::from_points(triangles.iter().flat_map(|&t| bvh.triangle(t).iter()));
            assert_eq!(bbox, tight);
            for &t in triangles {
                seen[t] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_empty_mesh_is_invalid() {
        assert!(Bvh::build(&Mesh::new()).unwrap_err().is_invalid_geometry());
    }

    #[test]
    fn test_query_ray_hits_cube_face() {
        let mesh = Primitive::cube(Vector3::new(2.0, 2.0, 2.0), true).to_mesh();
        let bvh = Bvh::build(&mesh).unwrap();

        let ray = Ray::new(Point3::new(-5.0, 0.3, 0.2), Vector3::new(1.0, 0.0, 0.0));
        let hit = bvh.query_ray(&ray).unwrap();
        assert!((hit.distance - 4.0).abs() < 1e-12);
        assert!((hit.point.x + 1.0).abs() < 1e-12);
        assert!(bvh.query_ray_any(&ray));

        let miss = Ray::new(Point3::new(-5.0, 3.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(bvh.query_ray(&miss).is_none());
        assert!(!bvh.query_ray_any(&miss));
    }

    #[test]
    fn test_count_crossings_parity() {
        let mesh = Primitive::cube(Vector3::new(2.0, 2.0, 2.0), true).to_mesh();
        let bvh = Bvh::build(&mesh).unwrap();
        let direction = Vector3::new(0.3, 0.5, 0.81).normalize();

        let inside = Ray::new(Point3::new(0.1, -0.2, 0.05), direction);
        assert_eq!(bvh.count_crossings(&inside), Crossings::Clean(1));

        let outside = Ray::new(Point3::new(-3.0, -0.2, 0.05), Vector3::new(1.0, 0.01, 0.02).normalize());
        assert_eq!(bvh.count_crossings(&outside), Crossings::Clean(2));

        // Straight through the diagonal shared by two face triangles
        let diagonal = Ray::new(Point3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, -1.0));
        assert_eq!(bvh.count_crossings(&diagonal), Crossings::Grazing);
    }
}
