//! Fickian diffusion stencil for mobile clusters.
//!
//! Second-order centered differences on the non-uniform X grid, uniform
//! Y and Z. A per-point, per-cluster mask deactivates diffusion inside
//! the sink regions claimed by advection handlers: a cluster diffuses or
//! advects at a point, never both.

use crate::advection::AdvectionHandler;
use crate::geometry::{Grid, GridPosition};
use crate::network::cluster::ClusterId;
use crate::network::ReactionNetwork;
use crate::sparsity::{add_coupling, SparseFillMap};

#[derive(Debug)]
pub struct DiffusionHandler {
    migration_threshold: f64,
    active: bool,
    diffusing: Vec<ClusterId>,
    /// `[point][diffusing slot]`, flattened; empty until the grid is
    /// initialized, in which case every point is active.
    mask: Vec<bool>,
    mask_dims: (usize, usize, usize),
    dim: usize,
}

impl DiffusionHandler {
    /// Clusters with migration energy at or above the threshold are not
    /// diffusing.
    pub fn new(migration_threshold: f64) -> Self {
        Self {
            migration_threshold,
            active: true,
            diffusing: Vec::new(),
            mask: Vec::new(),
            mask_dims: (0, 0, 0),
            dim: 1,
        }
    }

    /// The inactive variant: registers nothing and contributes nothing.
    pub fn dummy() -> Self {
        Self {
            active: false,
            ..Self::new(0.0)
        }
    }

    /// Record the diffusing clusters and add their self-couplings to the
    /// off-diagonal map. Idempotent under re-invocation.
    pub fn initialize_off_fill(&mut self, network: &ReactionNetwork, ofill: &mut SparseFillMap) {
        self.diffusing.clear();
        if !self.active {
            return;
        }
        for cl in network.clusters() {
            if cl.is_mobile() && cl.migration_energy < self.migration_threshold {
                self.diffusing.push(cl.id);
                add_coupling(ofill, cl.id as usize, cl.id as usize);
            }
        }
    }

    pub fn n_diffusing(&self) -> usize {
        self.diffusing.len()
    }

    pub fn diffusing(&self) -> &[ClusterId] {
        &self.diffusing
    }

    /// Number of stencil couplings per cluster: 3 in 1D, 5 in 2D, 7 in 3D.
    pub fn stencil_len(&self) -> usize {
        1 + 2 * self.dim
    }

    /// Build the per-point activity mask. Points claimed as sinks by an
    /// advection handler lose diffusion for that handler's advecting
    /// clusters.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize_diffusion_grid(
        &mut self,
        advection_handlers: &[AdvectionHandler],
        grid: &Grid,
        nx: usize,
        xs: usize,
        ny: usize,
        hy: f64,
        ys: usize,
        nz: usize,
        hz: f64,
        zs: usize,
    ) {
        self.dim = 1 + usize::from(ny > 0) + usize::from(nz > 0);
        let (mx, my, mz) = (nx + 2, ny.max(1) + 2, nz.max(1) + 2);
        self.mask_dims = (mx, my, mz);
        let nd = self.diffusing.len();
        self.mask = vec![true; mx * my * mz * nd];

        for handler in advection_handlers {
            for iz in 0..mz {
                for iy in 0..my {
                    for ix in 0..mx {
                        let xi = xs as i64 + ix as i64 - 1;
                        if xi < 0 || xi as usize >= grid.n_points() {
                            continue;
                        }
                        let pos = GridPosition::new(
                            grid.cell_center(xi as usize) - grid.vertices()[1],
                            (ys as f64 + iy as f64 - 1.0) * hy,
                            (zs as f64 + iz as f64 - 1.0) * hz,
                        );
                        if !handler.is_point_on_sink(&pos) {
                            continue;
                        }
                        for (slot, id) in self.diffusing.iter().enumerate() {
                            if handler.advecting().contains(id) {
                                let at = ((iz * my + iy) * mx + ix) * nd + slot;
                                self.mask[at] = false;
                            }
                        }
                    }
                }
            }
        }
    }

    fn is_active(&self, ix: usize, iy: usize, iz: usize, slot: usize) -> bool {
        if self.mask.is_empty() {
            return true;
        }
        let (mx, my, _) = self.mask_dims;
        self.mask[((iz * my + iy) * mx + ix) * self.diffusing.len() + slot]
    }

    /// Add the Fickian contribution at one interior point. `conc_vector`
    /// holds the per-point concentration rows in the fixed order
    /// `[center, left, right, bottom, top, front, back]`, truncated to
    /// the dimensionality; `sy = 1/hY^2`, `sz = 1/hZ^2`.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_diffusion(
        &self,
        network: &ReactionNetwork,
        conc_vector: &[&[f64]],
        updated: &mut [f64],
        hx_left: f64,
        hx_right: f64,
        ix: usize,
        sy: f64,
        iy: usize,
        sz: f64,
        iz: usize,
    ) {
        for (slot, &id) in self.diffusing.iter().enumerate() {
            if !self.is_active(ix + 1, iy + 1, iz + 1, slot) {
                continue;
            }
            let d = network.diffusion_coefficient(id, ix + 1);
            let c = id as usize;
            let c0 = conc_vector[0][c];

            let mut rate = d
                * 2.0
                * (hx_left * conc_vector[2][c] + hx_right * conc_vector[1][c]
                    - (hx_left + hx_right) * c0)
                / (hx_left * hx_right * (hx_left + hx_right));
            if conc_vector.len() > 3 {
                rate += d * sy * (conc_vector[3][c] - 2.0 * c0 + conc_vector[4][c]);
            }
            if conc_vector.len() > 5 {
                rate += d * sz * (conc_vector[5][c] - 2.0 * c0 + conc_vector[6][c]);
            }
            updated[c] += rate;
        }
    }

    /// Write the stencil partials per diffusing cluster in the fixed
    /// order `{center, xL, xR, yB, yT, zF, zK}` truncated to the
    /// dimensionality. `values` holds `stencil_len()` entries per
    /// cluster; `indices` receives the cluster ids.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_partials_for_diffusion(
        &self,
        network: &ReactionNetwork,
        values: &mut [f64],
        indices: &mut [ClusterId],
        hx_left: f64,
        hx_right: f64,
        ix: usize,
        sy: f64,
        iy: usize,
        sz: f64,
        iz: usize,
    ) {
        let n = self.stencil_len();
        for (slot, &id) in self.diffusing.iter().enumerate() {
            indices[slot] = id;
            let vals = &mut values[slot * n..(slot + 1) * n];
            vals.fill(0.0);
            if !self.is_active(ix + 1, iy + 1, iz + 1, slot) {
                continue;
            }
            let d = network.diffusion_coefficient(id, ix + 1);

            vals[0] = -2.0 * d / (hx_left * hx_right);
            vals[1] = 2.0 * d / (hx_left * (hx_left + hx_right));
            vals[2] = 2.0 * d / (hx_right * (hx_left + hx_right));
            if self.dim > 1 {
                vals[0] -= 2.0 * d * sy;
                vals[3] = d * sy;
                vals[4] = d * sy;
            }
            if self.dim > 2 {
                vals[0] -= 2.0 * d * sz;
                vals[5] = d * sz;
                vals[6] = d * sz;
            }
        }
    }
}
