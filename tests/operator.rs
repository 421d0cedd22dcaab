//! End-to-end checks of the spatial operator driver: boundary handling,
//! Jacobian/RHS consistency, conservation, symmetry, and restart.

#![cfg(feature = "sprs")]

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use xolotl::checkpoint::CheckpointData;
use xolotl::{
    DomainShape, Error, FillMaps, LocalBox, NoComm, Options, SpatialOperator, SurfacePosition,
    TripletAssembler,
};

fn operator_1d(nx: usize, extra: &str) -> (SpatialOperator<NoComm>, FillMaps) {
    let options = Options::parse_str(&format!(
        "netParam=3 0 0 1 1\nmaterial=W100\nstartTemp=1000\n{extra}"
    ))
    .unwrap();
    let shape = DomainShape::new(nx, 1, 1, 1.0, 1.0);
    let sub = LocalBox::whole(nx, 1, 1);
    SpatialOperator::setup(&options, shape, sub, NoComm).unwrap()
}

fn ghosted(op: &SpatialOperator<NoComm>, nx: usize) -> Vec<f64> {
    vec![0.0; (nx + 2) * 3 * 3 * op.stride()]
}

/// Ghosted index of an owned 1D point: the field is laid out as
/// `(zm + 2) x (ym + 2) x (xm + 2)` rows with one ghost layer all
/// around, so the owned row sits in the middle y/z planes.
fn at(op: &SpatialOperator<NoComm>, nx: usize, xi: usize) -> usize {
    ((3 + 1) * (nx + 2) + 1 + xi) * op.stride()
}

#[test]
fn test_points_left_of_surface_contribute_nothing() {
    let nx = 8;
    let (mut op, _) = operator_1d(nx, "initialVConc=0.1\nfluxAmplitude=1e3");
    let stride = op.stride();
    let mut c = ghosted(&op, nx);
    op.initialize_concentration(&mut c, None).unwrap();

    let mut f = vec![0.0; nx * stride];
    op.rhs(0.0, &c, &mut f).unwrap();

    // The surface point and the right boundary are outside the domain.
    assert!(f[..stride].iter().all(|&v| v == 0.0));
    assert!(f[(nx - 1) * stride..].iter().all(|&v| v == 0.0));
    // Interior points see the incident flux.
    assert!(f[stride..2 * stride].iter().any(|&v| v != 0.0));
}

#[test]
fn test_rhs_rejects_wrong_shapes() {
    let (mut op, _) = operator_1d(6, "");
    let c = vec![0.0; 7];
    let mut f = vec![0.0; 6 * op.stride()];
    assert!(matches!(
        op.rhs(0.0, &c, &mut f),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_jacobian_matches_finite_differences() {
    let nx = 8;
    let (mut op, _) = operator_1d(nx, "");
    let stride = op.stride();
    let dof = op.network().dof();

    let mut c = ghosted(&op, nx);
    op.initialize_concentration(&mut c, None).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    for xi in 0..nx {
        let base = at(&op, nx, xi);
        for cl in 0..dof {
            c[base + cl] = 1.0e-4 * rng.gen_range(0.5..1.5);
        }
    }

    let mut f0 = vec![0.0; nx * stride];
    op.rhs(0.0, &c, &mut f0).unwrap();

    let mut assembler = TripletAssembler::new(nx, 1, 1, stride);
    op.jacobian(0.0, &c, &mut assembler).unwrap();
    let jac = assembler.into_csr();

    // Random direction supported away from the boundary columns.
    let mut delta = vec![0.0; nx * stride];
    for xi in 1..nx - 1 {
        for cl in 0..dof {
            delta[xi * stride + cl] = rng.gen_range(-1.0..1.0) * 1.0e-4;
        }
    }

    let eps = 1.0e-6;
    let mut c1 = c.clone();
    for xi in 0..nx {
        let base = at(&op, nx, xi);
        for cl in 0..dof {
            c1[base + cl] += eps * delta[xi * stride + cl];
        }
    }
    let mut f1 = vec![0.0; nx * stride];
    op.rhs(0.0, &c1, &mut f1).unwrap();

    let fd: Vec<f64> = f0
        .iter()
        .zip(f1.iter())
        .map(|(a, b)| (b - a) / eps)
        .collect();
    let mut jd = vec![0.0; nx * stride];
    for (&v, (r, col)) in jac.iter() {
        jd[r] += v * delta[col];
    }

    let norm: f64 = jd.iter().map(|v| v * v).sum::<f64>().sqrt();
    let err: f64 = jd
        .iter()
        .zip(fd.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    assert!(norm > 0.0);
    assert!(
        err <= 1.0e-4 * norm,
        "relative consistency error {} too large",
        err / norm
    );
}

#[test]
fn test_every_jacobian_entry_is_declared() {
    let nx = 8;
    let options = Options::parse_str(
        "netParam=8 0 0 2 2\n\
         material=W111\n\
         startTemp=1000\n\
         surfaceAdvection=true\n\
         process=reaction diffusion advection modifiedTM\n",
    )
    .unwrap();
    let shape = DomainShape::new(nx, 1, 1, 1.0, 1.0);
    let sub = LocalBox::whole(nx, 1, 1);
    let (mut op, fill) = SpatialOperator::setup(&options, shape, sub, NoComm).unwrap();
    let stride = op.stride();
    let dof = op.network().dof();

    let mut c = ghosted(&op, nx);
    op.initialize_concentration(&mut c, None).unwrap();
    for xi in 0..nx {
        let base = at(&op, nx, xi);
        for cl in 0..dof {
            c[base + cl] = 1.0e-5 * (cl as f64 + 1.0);
        }
    }

    let mut assembler = TripletAssembler::new(nx, 1, 1, stride);
    op.jacobian(0.0, &c, &mut assembler).unwrap();
    let jac = assembler.into_csr();

    for (_, (row, col)) in jac.iter() {
        let (xr, cr) = (row / stride, row % stride);
        let (xc, cc) = (col / stride, col % stride);
        let declared = if xr == xc {
            fill.dfill.get(&cr).map_or(false, |cols| cols.contains(&cc))
        } else {
            fill.ofill.get(&cr).map_or(false, |cols| cols.contains(&cc))
        };
        assert!(
            declared,
            "undeclared coupling row ({xr},{cr}) col ({xc},{cc})"
        );
    }
}

#[test]
fn test_diffusion_only_rhs_conserves_content() {
    let nx = 10;
    let (mut op, _) = operator_1d(nx, "process=diffusion");
    let stride = op.stride();
    let dof = op.network().dof();

    let mut c = ghosted(&op, nx);
    op.initialize_concentration(&mut c, None).unwrap();
    // Zero-flux edges: the boundary pair on each side holds equal
    // values, so nothing crosses into the frozen points.
    let values: Vec<f64> = (0..nx)
        .map(|xi| 1.0 + (xi as f64 * 0.7).sin().abs())
        .collect();
    for xi in 0..nx {
        let base = at(&op, nx, xi);
        let v = match xi {
            0 => values[1],
            x if x == nx - 1 => values[nx - 2],
            x => values[x],
        };
        for cl in 0..dof {
            c[base + cl] = v * (cl as f64 + 1.0);
        }
    }

    let mut f = vec![0.0; nx * stride];
    op.rhs(0.0, &c, &mut f).unwrap();

    for cl in 0..dof {
        let total: f64 = (0..nx).map(|xi| f[xi * stride + cl]).sum();
        let scale: f64 = (0..nx).map(|xi| f[xi * stride + cl].abs()).sum();
        assert!(
            total.abs() <= 1.0e-10 * scale.max(1.0),
            "cluster {cl} leaks {total}"
        );
    }
}

#[test]
fn test_symmetric_field_stays_symmetric() {
    let nx = 9;
    let (mut op, _) = operator_1d(nx, "");
    let stride = op.stride();
    let dof = op.network().dof();

    let mut c = ghosted(&op, nx);
    op.initialize_concentration(&mut c, None).unwrap();
    for xi in 0..nx {
        let base = at(&op, nx, xi);
        let mirrored = (nx - 1 - xi).min(xi) as f64;
        for cl in 0..dof {
            c[base + cl] = 1.0e-4 * (mirrored + 1.0) * (cl as f64 + 1.0);
        }
    }

    let mut f = vec![0.0; nx * stride];
    op.rhs(0.0, &c, &mut f).unwrap();

    for xi in 0..nx {
        let xj = nx - 1 - xi;
        for cl in 0..dof {
            assert_relative_eq!(
                f[xi * stride + cl],
                f[xj * stride + cl],
                max_relative = 1.0e-10,
                epsilon = 1.0e-12,
            );
        }
    }
}

#[test]
fn test_diffusion_relaxes_to_the_boundary_level() {
    let nx = 10;
    let options =
        Options::parse_str("netParam=1 0 0 0 0\nmaterial=W100\nstartTemp=1000\nprocess=diffusion")
            .unwrap();
    let shape = DomainShape::new(nx, 1, 1, 1.0, 1.0);
    let sub = LocalBox::whole(nx, 1, 1);
    let (mut op, _) = SpatialOperator::setup(&options, shape, sub, NoComm).unwrap();
    let stride = op.stride();
    let he1 = 0usize;

    let mut c = ghosted(&op, nx);
    op.initialize_concentration(&mut c, None).unwrap();
    let level = 1.0;
    for xi in 0..nx {
        let base = at(&op, nx, xi);
        c[base + he1] = if xi == nx / 2 { 2.0 } else { level };
    }

    let d = op.network().diffusion_coefficient(0, 1);
    let dt = 1.0 / (4.0 * d);
    let initial_dev = 1.0;
    let mut f = vec![0.0; nx * stride];
    for _ in 0..2000 {
        op.rhs(0.0, &c, &mut f).unwrap();
        for xi in 0..nx {
            let base = at(&op, nx, xi);
            c[base + he1] += dt * f[xi * stride + he1];
        }
    }
    let final_dev: f64 = (0..nx)
        .map(|xi| (c[at(&op, nx, xi) + he1] - level).abs())
        .fold(0.0, f64::max);
    assert!(
        final_dev < initial_dev / 100.0,
        "deviation {final_dev} did not relax"
    );
}

#[test]
fn test_surface_advance_empties_the_new_vacuum() {
    let nx = 8;
    let (mut op, _) = operator_1d(nx, "initialVConc=0.5");
    let stride = op.stride();
    let vacancy = op.network().single_vacancy().unwrap() as usize;

    let mut c = ghosted(&op, nx);
    op.initialize_concentration(&mut c, None).unwrap();
    // At t = 0 the domain cells carry the initial vacancy concentration.
    for xi in 1..nx - 1 {
        assert_relative_eq!(c[at(&op, nx, xi) + vacancy], 0.5);
    }
    assert_relative_eq!(c[at(&op, nx, 0) + vacancy], 0.0);

    // The surface moves to index 2: everything left of it is vacuum in
    // the next assembly.
    op.advance_surface(SurfacePosition::flat(1, 1, 2)).unwrap();
    let mut f = vec![0.0; nx * stride];
    op.rhs(0.0, &c, &mut f).unwrap();
    for xi in 0..3 {
        assert!(f[xi * stride..(xi + 1) * stride].iter().all(|&v| v == 0.0));
    }
    assert!(f[3 * stride..4 * stride].iter().any(|&v| v != 0.0));
}

#[test]
fn test_restart_reproduces_the_checkpoint_field() {
    let nx = 6;
    let (mut op, _) = operator_1d(nx, "");
    let stride = op.stride();
    let dof = op.network().dof();

    let mut concentrations = vec![0.0; nx * stride];
    for (i, v) in concentrations.iter_mut().enumerate() {
        if i % stride != dof && i % 2 == 0 {
            *v = 1.0e-3 + i as f64 * 1.0e-6;
        }
    }
    for xi in 0..nx {
        concentrations[xi * stride + dof] = 1000.0;
    }
    let data = CheckpointData {
        nx,
        ny: 1,
        nz: 1,
        dof,
        concentrations: concentrations.clone(),
        surface: vec![vec![0]],
    };

    let mut c = ghosted(&op, nx);
    op.initialize_concentration(&mut c, Some(&data)).unwrap();
    for xi in 0..nx {
        let base = at(&op, nx, xi);
        for s in 0..stride {
            assert_eq!(
                c[base + s].to_bits(),
                concentrations[xi * stride + s].to_bits()
            );
        }
    }
}

#[test]
fn test_2d_uniform_field_gives_uniform_rows() {
    let (nx, ny) = (6, 4);
    let options =
        Options::parse_str("netParam=2 0 0 1 0\nmaterial=W100\nstartTemp=1000").unwrap();
    let shape = DomainShape::new(nx, ny, 1, 1.0, 1.0);
    let sub = LocalBox::whole(nx, ny, 1);
    let (mut op, _) = SpatialOperator::setup(&options, shape, sub, NoComm).unwrap();
    let stride = op.stride();
    let dof = op.network().dof();

    // Fill every row, ghosts included, with the same concentrations.
    let mut c = vec![0.0; (nx + 2) * (ny + 2) * 3 * stride];
    for row in c.chunks_mut(stride) {
        for (cl, v) in row.iter_mut().enumerate().take(dof) {
            *v = 1.0e-4 * (cl as f64 + 1.0);
        }
        row[dof] = 1000.0;
    }

    let mut f = vec![0.0; nx * ny * stride];
    op.rhs(0.0, &c, &mut f).unwrap();

    // Diffusion vanishes on the uniform field; reactions act equally at
    // every in-domain point.
    let reference = &f[(ny / 2 * nx + 2) * stride..(ny / 2 * nx + 3) * stride];
    assert!(reference.iter().any(|&v| v != 0.0));
    for yj in 0..ny {
        for xi in 1..nx - 1 {
            let row = &f[(yj * nx + xi) * stride..(yj * nx + xi + 1) * stride];
            for (a, b) in row.iter().zip(reference) {
                assert_relative_eq!(*a, *b, max_relative = 1.0e-12);
            }
        }
    }
}

#[test]
fn test_fe_material_is_rejected() {
    let options = Options::parse_str("netParam=2 0 0 1 0\nmaterial=Fe").unwrap();
    let shape = DomainShape::new(4, 1, 1, 1.0, 1.0);
    let sub = LocalBox::whole(4, 1, 1);
    let err = SpatialOperator::setup(&options, shape, sub, NoComm).unwrap_err();
    assert!(matches!(err, Error::OptionError(_)));
}
