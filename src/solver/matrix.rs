//! Integrator-facing contracts: the sparse-matrix collaborator the
//! Jacobian sweep writes through, and the one collective the core is
//! allowed to issue.
//!
//! The stencil addressing mirrors the integrator's
//! `MatSetValuesStencil` with additive semantics: rows and columns are
//! `(i, j, k, component)` grid stencils, and repeated writes to the
//! same entry accumulate.

use crate::error::Result;

/// A `(i, j, k, component)` matrix index. `i`, `j`, `k` may point one
/// cell outside the domain; the assembler applies the boundary rules
/// (mirror on the left in X, free on the right, periodic in Y and Z).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridStencil {
    pub i: i64,
    pub j: i64,
    pub k: i64,
    pub c: usize,
}

impl GridStencil {
    pub fn new(i: i64, j: i64, k: i64, c: usize) -> Self {
        Self { i, j, k, c }
    }
}

/// The sparse-matrix collaborator. `add_values` adds `values[n]` at
/// `(row, cols[n])` for every column.
pub trait JacobianAssembler {
    fn add_values(&mut self, row: GridStencil, cols: &[GridStencil], values: &[f64]) -> Result<()>;
}

/// The only collective the core issues: an all-reduce sum, used for the
/// trapped-helium attenuation total. Callers must enter RHS/Jacobian in
/// lock-step across processes.
pub trait Collective: Sync {
    fn sum_all(&self, local: f64) -> f64;
}

/// Single-process reduction.
#[derive(Debug)]
pub struct NoComm;

impl Collective for NoComm {
    fn sum_all(&self, local: f64) -> f64 {
        local
    }
}

/// Reference assembler backed by a sprs triplet matrix; duplicate
/// entries are summed when exporting to CSR, matching the additive
/// contract.
#[cfg(feature = "sprs")]
pub struct TripletAssembler {
    nx: usize,
    ny: usize,
    nz: usize,
    stride: usize,
    triplets: sprs::TriMat<f64>,
}

#[cfg(feature = "sprs")]
impl TripletAssembler {
    /// `stride` is the per-point block width (`dof + 1`).
    pub fn new(nx: usize, ny: usize, nz: usize, stride: usize) -> Self {
        let n = nx * ny * nz * stride;
        Self {
            nx,
            ny,
            nz,
            stride,
            triplets: sprs::TriMat::new((n, n)),
        }
    }

    /// Flat matrix index for a stencil, or `None` when the boundary
    /// rules drop it (free right edge in X).
    fn flat(&self, s: &GridStencil) -> Option<usize> {
        let i = if s.i < 0 { -(s.i + 1) } else { s.i };
        if i >= self.nx as i64 {
            return None;
        }
        let j = s.j.rem_euclid(self.ny as i64) as usize;
        let k = s.k.rem_euclid(self.nz as i64) as usize;
        Some(((k * self.ny + j) * self.nx + i as usize) * self.stride + s.c)
    }

    pub fn into_csr(self) -> sprs::CsMat<f64> {
        self.triplets.to_csr()
    }

    pub fn n_rows(&self) -> usize {
        self.nx * self.ny * self.nz * self.stride
    }
}

#[cfg(feature = "sprs")]
impl JacobianAssembler for TripletAssembler {
    fn add_values(&mut self, row: GridStencil, cols: &[GridStencil], values: &[f64]) -> Result<()> {
        let r = match self.flat(&row) {
            Some(r) => r,
            None => return Ok(()),
        };
        for (col, &v) in cols.iter().zip(values) {
            if v == 0.0 {
                continue;
            }
            if let Some(c) = self.flat(col) {
                self.triplets.add_triplet(r, c, v);
            }
        }
        Ok(())
    }
}
