//! Modified trap mutation: spontaneous `He_n -> He_nV_m + I_m` in a
//! material-defined depth window under the surface.
//!
//! The rate is pinned well above every ordinary reaction rate so that
//! mutation wins wherever it is active, and is globally damped by the
//! attenuation factor derived from the trapped-helium total shared
//! across processes.

use tracing::debug;

use crate::advection::TungstenOrientation;
use crate::constants::{ATTENUATION_STRENGTH, TRAP_MUTATION_RATE_FACTOR};
use crate::error::{Error, Result};
use crate::geometry::{Grid, LocalBox, SurfacePosition};
use crate::network::cluster::Composition;
use crate::network::ReactionNetwork;
use crate::sparsity::{add_coupling, SparseFillMap};

/// Depth windows (nm) and created vacancy counts per He size 1..7. A
/// negative depth disables that size.
fn depth_and_size(orientation: TungstenOrientation) -> ([f64; 7], [u32; 7]) {
    match orientation {
        TungstenOrientation::W100 => (
            [-0.1, 0.5, 0.6, 0.6, 0.8, 0.8, 0.8],
            [1, 1, 1, 1, 1, 2, 2],
        ),
        TungstenOrientation::W110 => (
            [-0.1, 0.6, 0.8, 0.8, 0.8, 0.8, 0.8],
            [1, 1, 1, 1, 1, 2, 2],
        ),
        TungstenOrientation::W111 => (
            [0.6, 0.8, 0.8, 0.8, 0.8, 1.0, 1.0],
            [1, 1, 1, 1, 2, 2, 2],
        ),
    }
}

/// One enabled mutation channel: the helium row, the bubble it becomes
/// and the emitted interstitial.
#[derive(Debug, Clone, Copy)]
struct Channel {
    he: usize,
    hev: usize,
    interstitial: usize,
    depth: f64,
}

#[derive(Debug)]
pub struct TrapMutationHandler {
    active: bool,
    attenuation: bool,
    depths: [f64; 7],
    vacancies: [u32; 7],
    channels: Vec<Channel>,
    /// Enabled channels per owned grid point, rebuilt when the surface
    /// moves.
    index: Vec<Vec<Channel>>,
    dims: (usize, usize, usize),
    k_mutation: f64,
    disappearing: f64,
}

impl TrapMutationHandler {
    pub fn tungsten(orientation: TungstenOrientation, attenuation: bool) -> Self {
        let (depths, vacancies) = depth_and_size(orientation);
        Self {
            active: true,
            attenuation,
            depths,
            vacancies,
            channels: Vec::new(),
            index: Vec::new(),
            dims: (0, 0, 0),
            k_mutation: 0.0,
            disappearing: 1.0,
        }
    }

    /// The inactive variant: declares nothing and contributes nothing.
    pub fn dummy() -> Self {
        Self {
            active: false,
            attenuation: false,
            depths: [-1.0; 7],
            vacancies: [0; 7],
            channels: Vec::new(),
            index: Vec::new(),
            dims: (0, 0, 0),
            k_mutation: 0.0,
            disappearing: 1.0,
        }
    }

    pub fn uses_attenuation(&self) -> bool {
        self.active && self.attenuation
    }

    /// Declare connectivity: three rows (He, HeV, I) coupled to the He
    /// column per enabled size. Mutation products missing from the
    /// network are configuration errors.
    pub fn initialize(
        &mut self,
        network: &ReactionNetwork,
        dfill: &mut SparseFillMap,
    ) -> Result<()> {
        self.channels.clear();
        if !self.active {
            return Ok(());
        }
        for (i, &depth) in self.depths.iter().enumerate() {
            if depth < 0.0 {
                continue;
            }
            let size = i as u32 + 1;
            let he = match network.find_cluster(&Composition([size, 0, 0, 0, 0])) {
                Some(cl) => cl.id as usize,
                // Sizes beyond the network box are simply not tracked.
                None => continue,
            };
            let m = self.vacancies[i];
            let hev = network
                .find_cluster(&Composition([size, 0, 0, m, 0]))
                .ok_or(Error::MissingCluster {
                    name: format!("He{size}_V"),
                    size: m,
                })?
                .id as usize;
            let interstitial = network
                .find_cluster(&Composition([0, 0, 0, 0, m]))
                .ok_or(Error::MissingCluster {
                    name: "I".to_string(),
                    size: m,
                })?
                .id as usize;

            add_coupling(dfill, he, he);
            add_coupling(dfill, hev, he);
            add_coupling(dfill, interstitial, he);
            self.channels.push(Channel {
                he,
                hev,
                interstitial,
                depth,
            });
        }
        Ok(())
    }

    /// Number of helium sizes that can mutate somewhere.
    pub fn n_mutating(&self) -> usize {
        self.channels.len()
    }

    /// Rebuild the per-point channel lists from the current surface
    /// position: a channel is enabled where the point depth falls inside
    /// its window.
    pub fn initialize_index(
        &mut self,
        surface: &SurfacePosition,
        grid: &Grid,
        sub: &LocalBox,
    ) {
        self.dims = (sub.xm, sub.ym, sub.zm);
        self.index = vec![Vec::new(); sub.xm * sub.ym * sub.zm];
        if !self.active {
            return;
        }
        for zk in sub.zs..sub.zs + sub.zm {
            for yj in sub.ys..sub.ys + sub.ym {
                let surf = surface.get(yj, zk);
                for xi in sub.xs..sub.xs + sub.xm {
                    if xi >= grid.n_points() {
                        continue;
                    }
                    let depth = grid.depth(xi, surf);
                    if depth <= 0.0 {
                        continue;
                    }
                    let at = ((zk - sub.zs) * sub.ym + (yj - sub.ys)) * sub.xm + (xi - sub.xs);
                    for ch in &self.channels {
                        if depth <= ch.depth {
                            self.index[at].push(*ch);
                        }
                    }
                }
            }
        }
    }

    /// Pin the mutation rate above the largest network rate.
    pub fn update_trap_mutation_rate(&mut self, largest_rate: f64) {
        self.k_mutation = TRAP_MUTATION_RATE_FACTOR * largest_rate;
        debug!(k_mutation = self.k_mutation, "trap-mutation rate updated");
    }

    /// Damp the rate from the trapped-helium total of the all-reduce.
    pub fn update_disappearing_rate(&mut self, total_trapped: f64) {
        if self.attenuation {
            self.disappearing = (-ATTENUATION_STRENGTH * total_trapped).exp();
        }
    }

    fn rate(&self) -> f64 {
        self.k_mutation * self.disappearing
    }

    fn point(&self, ix: usize, iy: usize, iz: usize) -> &[Channel] {
        let (xm, ym, _) = self.dims;
        &self.index[(iz * ym + iy) * xm + ix]
    }

    /// Add the mutation source terms at one owned grid point.
    pub fn compute_trap_mutation(
        &self,
        _network: &ReactionNetwork,
        conc: &[f64],
        updated: &mut [f64],
        ix: usize,
        iy: usize,
        iz: usize,
    ) {
        if !self.active {
            return;
        }
        let rate = self.rate();
        for ch in self.point(ix, iy, iz) {
            let f = rate * conc[ch.he];
            updated[ch.he] -= f;
            updated[ch.hev] += f;
            updated[ch.interstitial] += f;
        }
    }

    /// Write up to `3 * n_mutating()` Jacobian entries: per mutating
    /// helium, the He, HeV and I rows, all against the He column.
    /// Returns the number of mutating sizes at this point.
    pub fn compute_partials_for_trap_mutation(
        &self,
        _network: &ReactionNetwork,
        values: &mut [f64],
        indices: &mut [usize],
        ix: usize,
        iy: usize,
        iz: usize,
    ) -> usize {
        if !self.active {
            return 0;
        }
        let rate = self.rate();
        let channels = self.point(ix, iy, iz);
        for (i, ch) in channels.iter().enumerate() {
            values[3 * i] = -rate;
            values[3 * i + 1] = rate;
            values[3 * i + 2] = rate;
            indices[3 * i] = ch.he;
            indices[3 * i + 1] = ch.hev;
            indices[3 * i + 2] = ch.interstitial;
        }
        channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GridKind;
    use crate::network::psi;

    fn setup() -> (ReactionNetwork, Grid, SurfacePosition, LocalBox) {
        let network = psi::tungsten(8, 0, 0, 2, 2);
        let grid = Grid::generate(10, 0.25, 0, GridKind::Uniform).unwrap();
        let surface = SurfacePosition::flat(1, 1, 0);
        let sub = LocalBox::whole(10, 1, 1);
        (network, grid, surface, sub)
    }

    #[test]
    fn test_initialize_declares_three_rows_per_size() {
        let (network, _, _, _) = setup();
        let mut handler = TrapMutationHandler::tungsten(TungstenOrientation::W100, false);
        let mut dfill = SparseFillMap::new();
        handler.initialize(&network, &mut dfill).unwrap();
        // W100 disables He1 (negative depth); He2..He7 mutate.
        assert_eq!(handler.n_mutating(), 6);
        let he2 = network
            .find_cluster(&Composition([2, 0, 0, 0, 0]))
            .unwrap()
            .id as usize;
        let he2v1 = network
            .find_cluster(&Composition([2, 0, 0, 1, 0]))
            .unwrap()
            .id as usize;
        assert!(dfill[&he2v1].contains(&he2));
    }

    #[test]
    fn test_missing_product_is_an_error() {
        // maxV = 1 cannot hold the V2 bubbles required by He6/He7.
        let network = psi::tungsten(8, 0, 0, 1, 1);
        let mut handler = TrapMutationHandler::tungsten(TungstenOrientation::W100, false);
        let mut dfill = SparseFillMap::new();
        let err = handler.initialize(&network, &mut dfill).unwrap_err();
        assert!(matches!(err, Error::MissingCluster { size: 2, .. }));
    }

    #[test]
    fn test_mutation_moves_helium_into_bubbles() {
        let (mut network, grid, surface, sub) = setup();
        network.set_temperatures(&vec![1000.0; 12]);
        let mut handler = TrapMutationHandler::tungsten(TungstenOrientation::W100, false);
        let mut dfill = SparseFillMap::new();
        handler.initialize(&network, &mut dfill).unwrap();
        handler.initialize_index(&surface, &grid, &sub);
        handler.update_trap_mutation_rate(network.largest_rate());

        let dof = network.dof();
        let mut conc = vec![1.0e-3; dof + 1];
        let mut updated = vec![0.0; dof + 1];
        // First grid point past the surface: depth 0.125 nm, inside the
        // He2 window (0.5 nm).
        handler.compute_trap_mutation(&network, &conc, &mut updated, 1, 0, 0);
        let he2 = network
            .find_cluster(&Composition([2, 0, 0, 0, 0]))
            .unwrap()
            .id as usize;
        let he2v1 = network
            .find_cluster(&Composition([2, 0, 0, 1, 0]))
            .unwrap()
            .id as usize;
        assert!(updated[he2] < 0.0);
        assert!(updated[he2v1] > 0.0);
        assert_ulps_eq!(updated[he2], -updated[he2v1]);

        // Deep in the bulk nothing mutates.
        conc.fill(1.0e-3);
        updated.fill(0.0);
        handler.compute_trap_mutation(&network, &conc, &mut updated, 9, 0, 0);
        assert!(updated.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_attenuation_damps_the_rate() {
        let (network, grid, surface, sub) = setup();
        let mut handler = TrapMutationHandler::tungsten(TungstenOrientation::W110, true);
        let mut dfill = SparseFillMap::new();
        handler.initialize(&network, &mut dfill).unwrap();
        handler.initialize_index(&surface, &grid, &sub);
        handler.update_trap_mutation_rate(1.0);
        let full = handler.rate();
        handler.update_disappearing_rate(0.5);
        assert!(handler.rate() < full);
        assert_relative_eq!(
            handler.rate(),
            full * (-ATTENUATION_STRENGTH * 0.5).exp(),
            max_relative = 1.0e-12
        );
    }

    #[test]
    fn test_partials_layout() {
        let (mut network, grid, surface, sub) = setup();
        network.set_temperatures(&vec![1000.0; 12]);
        let mut handler = TrapMutationHandler::tungsten(TungstenOrientation::W111, false);
        let mut dfill = SparseFillMap::new();
        handler.initialize(&network, &mut dfill).unwrap();
        handler.initialize_index(&surface, &grid, &sub);
        handler.update_trap_mutation_rate(network.largest_rate());

        let mut values = vec![0.0; 3 * handler.n_mutating()];
        let mut indices = vec![0usize; 3 * handler.n_mutating()];
        let n = handler.compute_partials_for_trap_mutation(
            &network,
            &mut values,
            &mut indices,
            1,
            0,
            0,
        );
        assert!(n > 0);
        for i in 0..n {
            assert!(values[3 * i] < 0.0);
            assert_ulps_eq!(values[3 * i + 1], -values[3 * i]);
            assert_ulps_eq!(values[3 * i + 2], -values[3 * i]);
        }
    }
}
