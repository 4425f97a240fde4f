// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Bounding box utilities

use super::Ray;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoundingBox {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Self {
        let mut bbox = Self::empty();
        for point in points {
            bbox.expand_to_include(point);
        }
        bbox
    }

    /// True until at least one point has been included
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand_to_include(&mut self, point: &Point3<f64>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(self.min.inf(&other.min), self.max.sup(&other.max))
    }

    /// Overlapping region, `None` when the boxes share no volume
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let min = self.min.sup(&other.min);
        let max = self.max.inf(&other.max);
        if min.x < max.x && min.y < max.y && min.z < max.z {
            Some(BoundingBox::new(min, max))
        } else {
            None
        }
    }

    pub fn contains_point(&self, point: &Point3<f64>) -> bool {
        (0..3).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }

    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn volume(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let size = self.size();
        size.x * size.y * size.z
    }

    /// Half the surface area, enough for SAH cost ratios
    pub fn half_area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let size = self.size();
        size.x * size.y + size.y * size.z + size.z * size.x
    }

    /// Index of the longest axis
    pub fn longest_axis(&self) -> usize {
        let size = self.size();
        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }

    /// Slab test; returns the parametric entry distance when the ray
    /// reaches the box within `[0, max_distance]`
    pub fn ray_entry(&self, ray: &Ray, max_distance: f64) -> Option<f64> {
        let mut t_min = 0.0_f64;
        let mut t_max = max_distance;

        for axis in 0..3 {
            let inv = ray.inv_direction[axis];
            let mut t0 = (self.min[axis] - ray.origin[axis]) * inv;
            let mut t1 = (self.max[axis] - ray.origin[axis]) * inv;
            // 0 * inf yields NaN when the origin sits on a slab plane of a
            // parallel axis; treat it as inside that slab
            if t0.is_nan() || t1.is_nan() {
                if ray.origin[axis] < self.min[axis] || ray.origin[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }

    /// Check if two bounding boxes are approximately equal within tolerance
    pub fn approx_eq(&self, other: &BoundingBox, tolerance: f64) -> bool {
        (self.min - other.min).abs().max() < tolerance && (self.max - other.max).abs().max() < tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box() {
        let mut bbox = BoundingBox::empty();
        assert!(bbox.is_empty());
        bbox.expand_to_include(&Point3::new(1.0, 2.0, 3.0));
        bbox.expand_to_include(&Point3::new(-1.0, -2.0, -3.0));

        assert_eq!(bbox.min, Point3::new(-1.0, -2.0, -3.0));
        assert_eq!(bbox.max, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(bbox.center(), Point3::new(0.0, 0.0, 0.0));
        assert_eq!(bbox.volume(), 48.0);
        assert_eq!(bbox.longest_axis(), 2);
    }

    #[test]
    fn test_intersection_and_union() {
        let a = BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = BoundingBox::new(Point3::new(0.5, 0.0, 0.0), Point3::new(1.5, 1.0, 1.0));
        let c = BoundingBox::new(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));

        let overlap = a.intersection(&b).unwrap();
        assert!((overlap.volume() - 0.5).abs() < 1e-12);
        assert!((a.union(&b).volume() - 1.5).abs() < 1e-12);

        // Touching faces share no volume
        assert!(a.intersection(&c).is_none());
    }

    #[test]
    fn test_ray_entry() {
        let bbox = BoundingBox::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));

        let hit = Ray::new(Point3::new(-5.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!((bbox.ray_entry(&hit, f64::INFINITY).unwrap() - 4.0).abs() < 1e-12);
        assert!(bbox.ray_entry(&hit, 3.0).is_none());

        let inside = Ray::new(Point3::origin(), Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(bbox.ray_entry(&inside, f64::INFINITY), Some(0.0));

        let miss = Ray::new(Point3::new(-5.0, 2.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(bbox.ray_entry(&miss, f64::INFINITY).is_none());

        let behind = Ray::new(Point3::new(5.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(bbox.ray_entry(&behind, f64::INFINITY).is_none());
    }
}
