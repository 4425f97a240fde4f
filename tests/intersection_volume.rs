// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Monte Carlo intersection volume verification tests

use anyhow::Result;
use nalgebra::{Matrix4, Rotation3, Vector3};
use polyframe_overlap::geometry::{
    intersection_volume, volume, Bvh, IntersectionEstimator, IntersectionParams, Mesh, Primitive,
    SamplingRegion, Solid,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_4};

fn unit_cube() -> Mesh {
    Primitive::cube(Vector3::new(1.0, 1.0, 1.0), true).to_mesh()
}

fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    Matrix4::new_translation(&Vector3::new(x, y, z))
}

#[test]
fn test_offset_cubes_in_both_regions() -> Result<()> {
    let cube = unit_cube();
    let bvh = Bvh::build(&cube)?;
    let identity = Matrix4::identity();
    let shifted = translation(0.5, 0.0, 0.0);
    let a = Solid::new(&bvh, &identity)?;
    let b = Solid::new(&bvh, &shifted)?;

    for region in [SamplingRegion::BoundsOverlap, SamplingRegion::BoundsUnion] {
        let estimator = IntersectionEstimator::new(IntersectionParams {
            samples: 10_000,
            directions: 8,
            region,
            ..IntersectionParams::default()
        });
        let estimate = estimator.estimate(&a, &b)?;
        println!(
            "{:?}: {:.4} ± {:.4} over region {:.3}",
            region, estimate.volume, estimate.standard_error, estimate.region_volume
        );
        assert!(
            (estimate.volume - 0.5).abs() < 0.05,
            "Intersection {} not close to 0.5",
            estimate.volume
        );
    }
    Ok(())
}

#[test]
fn test_disjoint_is_exactly_zero() -> Result<()> {
    let cube = unit_cube();
    let far = translation(3.0, 0.0, 0.0);
    assert_eq!(intersection_volume(&cube, &Matrix4::identity(), &cube, &far, 1_000, 4, 1)?, 0.0);

    let bvh = Bvh::build(&cube)?;
    let identity = Matrix4::identity();
    let a = Solid::new(&bvh, &identity)?;
    let b = Solid::new(&bvh, &far)?;
    let estimate = IntersectionEstimator::default().estimate(&a, &b)?;
    assert_eq!(estimate.samples, 0);
    assert_eq!(estimate.inside_both, 0);
    Ok(())
}

#[test]
fn test_touching_faces_give_zero() -> Result<()> {
    let cube = unit_cube();
    let touching = translation(1.0, 0.0, 0.0);
    let estimate = intersection_volume(&cube, &Matrix4::identity(), &cube, &touching, 2_000, 5, 9)?;
    assert!(estimate.abs() < 1e-3, "touching cubes overlap by {}", estimate);
    Ok(())
}

#[test]
fn test_touching_rotated_cubes_give_zero() -> Result<()> {
    // Diamonds in the XY plane sharing one face; their world boxes overlap
    // in a quarter-unit prism, so sampling runs but nothing is inside both
    let cube = unit_cube();
    let spin = Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_4).to_homogeneous();
    let offset = FRAC_1_SQRT_2;
    let bvh = Bvh::build(&cube)?;
    let a = Solid::new(&bvh, &spin)?;
    let b = Solid::new(&bvh, &(translation(offset, offset, 0.0) * spin))?;

    let estimator = IntersectionEstimator::new(IntersectionParams {
        samples: 10_000,
        directions: 8,
        seed: 21,
        ..IntersectionParams::default()
    });
    let estimate = estimator.estimate(&a, &b)?;
    assert_eq!(estimate.samples, 10_000);
    assert!(estimate.region_volume > 0.4);
    assert!(estimate.volume < 0.01, "touching cubes overlap by {}", estimate.volume);
    Ok(())
}

#[test]
fn test_identical_meshes_converge_to_volume() -> Result<()> {
    let sphere = Primitive::sphere(1.0, 32).to_mesh();
    let placement = translation(4.0, -2.0, 1.0) * Rotation3::from_euler_angles(0.4, 0.1, 1.2).to_homogeneous();
    let expected = volume(&sphere, &placement)?;

    let estimate = intersection_volume(&sphere, &placement, &sphere, &placement, 10_000, 5, 17)?;
    assert!(
        (estimate - expected).abs() < 0.15,
        "Intersection {} not close to volume {}",
        estimate,
        expected
    );
    Ok(())
}

#[test]
fn test_nested_gives_inner_volume() -> Result<()> {
    let cube = unit_cube();
    let inner = translation(0.1, 0.0, -0.1) * Matrix4::new_scaling(0.5);
    let estimate = intersection_volume(&cube, &Matrix4::identity(), &cube, &inner, 5_000, 5, 3)?;
    assert!((estimate - 0.125).abs() < 0.005, "nested intersection {}", estimate);
    Ok(())
}

#[test]
fn test_injected_rng_is_reproducible() -> Result<()> {
    let sphere = Primitive::sphere(1.0, 16).to_mesh();
    let bvh = Bvh::build(&sphere)?;
    let identity = Matrix4::identity();
    let shifted = translation(0.7, 0.3, 0.0);
    let a = Solid::new(&bvh, &identity)?;
    let b = Solid::new(&bvh, &shifted)?;
    let estimator = IntersectionEstimator::new(IntersectionParams {
        samples: 3_000,
        directions: 3,
        ..IntersectionParams::default()
    });

    let first = estimator.estimate_with_rng(&a, &b, &mut StdRng::seed_from_u64(99))?;
    let second = estimator.estimate_with_rng(&a, &b, &mut StdRng::seed_from_u64(99))?;
    assert_eq!(first, second);
    assert_eq!(first.samples, 3_000);
    Ok(())
}
