use fluidreg_core::image::Image2;
use fluidreg_core::spatial::{Bounds2, Vec2f};
use fluidreg_core::vectorfield::VectorField2;
use fluidreg_registration::{CgSolver, NavierSolver};
use proptest::prelude::*;

fn smooth_force(size: Bounds2, amplitude: f32) -> VectorField2 {
    let mut f = VectorField2::new(size);
    for y in 4..size.y - 4 {
        for x in 4..size.x - 4 {
            f[(x, y)] = Vec2f::new(
                amplitude * ((x as f32) * 0.4).sin() * ((y as f32) * 0.3).cos(),
                amplitude * ((x as f32) * 0.2).cos() * ((y as f32) * 0.5).sin(),
            );
        }
    }
    f
}

#[test]
fn test_navier_solution_is_linear_in_the_force() {
    let size = Bounds2::new(24, 24);
    let solver = NavierSolver {
        max_iter: 1000,
        epsilon: 1e-6,
        ..NavierSolver::default()
    };
    let b1 = smooth_force(size, 0.05);
    let mut b2 = b1.clone();
    for v in b2.iter_mut() {
        *v *= 2.0;
    }

    let mut v1 = VectorField2::new(size);
    let mut v2 = VectorField2::new(size);
    solver.solve(&b1, &mut v1).unwrap();
    solver.solve(&b2, &mut v2).unwrap();

    let max1 = v1.max_norm();
    assert!(max1 > 0.0);
    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((2.0 * a - b).norm() < 0.02 * max1);
    }
}

#[test]
fn test_navier_dense_and_sparse_agree_on_smooth_forces() {
    let size = Bounds2::new(32, 32);
    let dense = NavierSolver {
        max_iter: 2000,
        epsilon: 1e-6,
        ..NavierSolver::default()
    };
    let sparse = NavierSolver {
        sparse: true,
        ..dense.clone()
    };
    let b = smooth_force(size, 0.1);
    let mut vd = VectorField2::new(size);
    let mut vs = VectorField2::new(size);
    dense.solve(&b, &mut vd).unwrap();
    sparse.solve(&b, &mut vs).unwrap();

    let max_val = vd.max_norm();
    for (a, b) in vd.iter().zip(vs.iter()) {
        assert!((a - b).norm() < 0.05 * max_val.max(1e-6));
    }
}

#[test]
fn test_cg_residual_shrinks_with_more_iterations() {
    let size = Bounds2::new(24, 24);
    let weight = Image2::from_vec(size, vec![1.0; size.product()]);
    let mut f = Image2::new(size);
    f[(12, 12)] = 100.0;
    let gain = Image2::new(size);

    let short = CgSolver {
        lambda1: 1.0,
        lambda2: 1.0,
        min_res: 1e-12,
        rel_res: 1e-12,
        max_iter: 3,
    };
    let long = CgSolver {
        max_iter: 300,
        ..short.clone()
    };

    let mut first = 1.0;
    let coarse = short.solve_scalar(&weight, &f, &gain, &mut first).unwrap();
    let mut first = 1.0;
    let fine = long.solve_scalar(&weight, &f, &gain, &mut first).unwrap();
    assert!(fine.residual < coarse.residual);
    assert!(fine.iterations > coarse.iterations);
}

#[test]
fn test_cg_keeps_border_at_initial_estimate() {
    let size = Bounds2::new(20, 20);
    let weight = Image2::from_vec(size, vec![1.0; size.product()]);
    let mut f = Image2::new(size);
    f[(10, 10)] = 40.0;
    let mut gain = Image2::new(size);
    for y in 0..size.y {
        for x in 0..size.x {
            if x < 2 || x > size.x - 3 || y < 2 || y > size.y - 3 {
                gain[(x, y)] = 7.0;
            }
        }
    }
    let solver = CgSolver {
        lambda1: 1.0,
        lambda2: 1.0,
        min_res: 1e-8,
        rel_res: 1e-10,
        max_iter: 500,
    };
    let mut first = 1.0;
    let out = solver.solve_scalar(&weight, &f, &gain, &mut first).unwrap();
    assert!((out.solution[(0, 0)] - 7.0).abs() < 1e-4);
    assert!((out.solution[(1, 10)] - 7.0).abs() < 1e-4);
    assert!((out.solution[(19, 19)] - 7.0).abs() < 1e-4);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_navier_solution_stays_finite(
        fx in -1.0f32..1.0,
        fy in -1.0f32..1.0,
        px in 5usize..15,
        py in 5usize..15,
    ) {
        let size = Bounds2::new(20, 20);
        let mut b = VectorField2::new(size);
        b[(px, py)] = Vec2f::new(fx, fy);
        let solver = NavierSolver {
            max_iter: 200,
            ..NavierSolver::default()
        };
        let mut v = VectorField2::new(size);
        solver.solve(&b, &mut v).unwrap();
        prop_assert!(v.iter().all(|x| x.x.is_finite() && x.y.is_finite()));
        prop_assert!(v.max_norm() <= b.max_norm() * 400.0);
    }

    #[test]
    fn prop_cg_zero_force_zero_gain_stays_zero(
        lambda1 in 0.1f64..10.0,
        lambda2 in 0.1f64..10.0,
    ) {
        let size = Bounds2::new(16, 16);
        let weight = Image2::from_vec(size, vec![1.0; size.product()]);
        let zero = Image2::new(size);
        let solver = CgSolver {
            lambda1,
            lambda2,
            ..CgSolver::default()
        };
        let mut first = 1.0;
        let out = solver.solve_scalar(&weight, &zero, &zero, &mut first).unwrap();
        prop_assert!(out.solution.iter().all(|&v| v.abs() < 1e-6));
    }
}
