//! Cross-model transform behavior tests.

use fluidreg_core::spatial::{Bounds2, Vec2f};
use fluidreg_core::transform::{
    AffineFactory, BsplineFactory, GridFactory, RigidFactory, Transform2, TransformFactory,
    TranslationFactory,
};
use proptest::prelude::*;

fn factories() -> Vec<Box<dyn TransformFactory>> {
    vec![
        Box::new(TranslationFactory),
        Box::new(RigidFactory),
        Box::new(AffineFactory),
        Box::new(BsplineFactory::default()),
        Box::new(GridFactory),
    ]
}

#[test]
fn test_identity_creation_maps_identity() {
    let size = Bounds2::new(24, 24);
    for factory in factories() {
        let t = factory.create(size);
        let p = Vec2f::new(7.0, 11.0);
        assert!(
            (t.map(p) - p).norm() < 1e-6,
            "{} does not start at identity",
            factory.name()
        );
        assert_eq!(t.parameters().len(), t.degrees_of_freedom());
    }
}

#[test]
fn test_parameter_roundtrip_all_models() {
    let size = Bounds2::new(16, 16);
    for factory in factories() {
        let mut t = factory.create(size);
        let dof = t.degrees_of_freedom();
        let params: Vec<f32> = (0..dof).map(|i| ((i % 7) as f32 - 3.0) * 0.1).collect();
        t.set_parameters(&params).unwrap();
        assert_eq!(t.parameters(), params, "{}", factory.name());
    }
}

#[test]
fn test_wrong_parameter_count_is_rejected() {
    let size = Bounds2::new(16, 16);
    for factory in factories() {
        let mut t = factory.create(size);
        let too_few = vec![0.0; t.degrees_of_freedom().saturating_sub(1)];
        assert!(t.set_parameters(&too_few).is_err(), "{}", factory.name());
    }
}

#[test]
fn test_upscale_keeps_relative_displacement() {
    // A displacement spanning a fixed fraction of the grid must span the
    // same fraction after upscaling.
    let small = Bounds2::new(16, 16);
    let large = Bounds2::new(32, 32);
    for factory in factories() {
        let mut t = factory.create(small);
        let dof = t.degrees_of_freedom();
        // A small uniform x-shift expressed in each model's parameters.
        let params: Vec<f32> = match factory.name() {
            "translate" => vec![2.0, 0.0],
            "rigid" => vec![2.0, 0.0, 0.0],
            "affine" => vec![1.0, 0.0, 2.0, 0.0, 1.0, 0.0],
            _ => (0..dof)
                .map(|i| if i % 2 == 0 { 2.0 } else { 0.0 })
                .collect(),
        };
        t.set_parameters(&params).unwrap();
        let up = t.upscale(large);
        let p_small = Vec2f::new(8.0, 8.0);
        let p_large = Vec2f::new(16.0, 16.0);
        let d_small = t.map(p_small) - p_small;
        let d_large = up.map(p_large) - p_large;
        assert!(
            (d_large - d_small * 2.0).norm() < 0.1,
            "{}: {:?} vs {:?}",
            factory.name(),
            d_small,
            d_large
        );
    }
}

#[test]
fn test_apply_identity_preserves_image() {
    use fluidreg_core::image::Image2;
    use fluidreg_core::interpolation::Linear;

    let size = Bounds2::new(12, 12);
    let mut img = Image2::new(size);
    for y in 0..size.y {
        for x in 0..size.x {
            img[(x, y)] = (x * y) as f32;
        }
    }
    for factory in factories() {
        let t = factory.create(size);
        let warped = t.apply(&img, &Linear);
        for (a, b) in warped.iter().zip(img.iter()) {
            assert!((a - b).abs() < 1e-5, "{}", factory.name());
        }
    }
}

proptest! {
    #[test]
    fn prop_rigid_invert_is_inverse(
        tx in -4.0f32..4.0,
        ty in -4.0f32..4.0,
        angle in -0.8f32..0.8,
        px in 4.0f32..28.0,
        py in 4.0f32..28.0,
    ) {
        let mut t = RigidFactory.create(Bounds2::new(32, 32));
        t.set_parameters(&[tx, ty, angle]).unwrap();
        let inv = t.invert().unwrap();
        let p = Vec2f::new(px, py);
        prop_assert!((inv.map(t.map(p)) - p).norm() < 1e-3);
    }

    #[test]
    fn prop_translation_upscale_scales_parameters(
        tx in -4.0f32..4.0,
        ty in -4.0f32..4.0,
    ) {
        let mut t = TranslationFactory.create(Bounds2::new(16, 16));
        t.set_parameters(&[tx, ty]).unwrap();
        let up = t.upscale(Bounds2::new(48, 32));
        let p = up.parameters();
        prop_assert!((p[0] - 3.0 * tx).abs() < 1e-4);
        prop_assert!((p[1] - 2.0 * ty).abs() < 1e-4);
    }
}
