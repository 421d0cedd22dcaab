//! Heterogeneous nucleation of small xenon clusters in fuel.
//!
//! At masked points a constant source converts single gas atoms into
//! di-atomic clusters at the rate `fission_yield * nucleation_rate`. The
//! dummy variant satisfies the same interface and contributes nothing,
//! so the driver stays material-agnostic.

use crate::error::{Error, Result};
use crate::geometry::{Grid, LocalBox, SurfacePosition};
use crate::network::cluster::Composition;
use crate::network::ReactionNetwork;
use crate::sparsity::{add_coupling, SparseFillMap};

#[derive(Debug)]
pub struct NucleationHandler {
    active: bool,
    fission_yield: f64,
    nucleation_rate: f64,
    xe1: usize,
    xe2: usize,
    /// Owned points where nucleation applies; empty until indexed.
    mask: Vec<bool>,
    dims: (usize, usize, usize),
}

impl NucleationHandler {
    pub fn heterogeneous(fission_yield: f64) -> Self {
        Self {
            active: true,
            fission_yield,
            nucleation_rate: 0.0,
            xe1: 0,
            xe2: 0,
            mask: Vec::new(),
            dims: (0, 0, 0),
        }
    }

    pub fn dummy() -> Self {
        Self {
            active: false,
            fission_yield: 0.0,
            nucleation_rate: 0.0,
            xe1: 0,
            xe2: 0,
            mask: Vec::new(),
            dims: (0, 0, 0),
        }
    }

    /// Declare the Xe1 and Xe2 couplings. The dummy variant leaves the
    /// map untouched.
    pub fn initialize(
        &mut self,
        network: &ReactionNetwork,
        dfill: &mut SparseFillMap,
    ) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.xe1 = network
            .find_cluster(&Composition([1, 0, 0, 0, 0]))
            .ok_or(Error::MissingCluster {
                name: "Xe".to_string(),
                size: 1,
            })?
            .id as usize;
        self.xe2 = network
            .find_cluster(&Composition([2, 0, 0, 0, 0]))
            .ok_or(Error::MissingCluster {
                name: "Xe".to_string(),
                size: 2,
            })?
            .id as usize;
        add_coupling(dfill, self.xe1, self.xe1);
        add_coupling(dfill, self.xe2, self.xe1);
        Ok(())
    }

    pub fn set_fission_yield(&mut self, fission_yield: f64) {
        self.fission_yield = fission_yield;
    }

    pub fn update_heterogeneous_nucleation_rate(&mut self, rate: f64) {
        self.nucleation_rate = rate;
    }

    /// Mark the owned points inside the material where the source
    /// applies.
    pub fn initialize_index(
        &mut self,
        surface: &SurfacePosition,
        grid: &Grid,
        sub: &LocalBox,
    ) {
        self.dims = (sub.xm, sub.ym, sub.zm);
        self.mask = vec![false; sub.xm * sub.ym * sub.zm];
        if !self.active {
            return;
        }
        for zk in sub.zs..sub.zs + sub.zm {
            for yj in sub.ys..sub.ys + sub.ym {
                let surf = surface.get(yj, zk);
                for xi in sub.xs..sub.xs + sub.xm {
                    if xi < grid.n_points() && grid.depth(xi, surf) > 0.0 {
                        let at =
                            ((zk - sub.zs) * sub.ym + (yj - sub.ys)) * sub.xm + (xi - sub.xs);
                        self.mask[at] = true;
                    }
                }
            }
        }
    }

    fn applies(&self, ix: usize, iy: usize, iz: usize) -> bool {
        if !self.active {
            return false;
        }
        if self.mask.is_empty() {
            return true;
        }
        let (xm, ym, _) = self.dims;
        self.mask[(iz * ym + iy) * xm + ix]
    }

    /// Add the nucleation source at one owned point: two gas atoms are
    /// consumed per created pair.
    pub fn compute_heterogeneous_nucleation(
        &self,
        _network: &ReactionNetwork,
        conc: &[f64],
        updated: &mut [f64],
        ix: usize,
        iy: usize,
        iz: usize,
    ) {
        if !self.applies(ix, iy, iz) {
            return;
        }
        let rate = self.fission_yield * self.nucleation_rate;
        if conc[self.xe1] <= 0.0 || rate <= 0.0 {
            return;
        }
        updated[self.xe1] -= 2.0 * rate;
        updated[self.xe2] += rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ne;

    /// Dummy nucleation on the UO2 network of `netParam=1000 0 0 0 0`:
    /// nothing is declared, nothing is produced.
    #[test]
    fn test_dummy_nucleation_is_inert() {
        let mut network = ne::uranium_dioxide(1000);
        network.set_temperatures(&vec![1800.0; 3]);
        let dof = network.dof();

        let mut handler = NucleationHandler::dummy();
        let mut dfill = SparseFillMap::new();
        handler.initialize(&network, &mut dfill).unwrap();
        handler.set_fission_yield(0.5);
        handler.update_heterogeneous_nucleation_rate(1.0);

        assert!(dfill.is_empty());

        let conc: Vec<f64> = (0..3 * dof).map(|i| (i * i) as f64).collect();
        let mut updated = vec![0.0; dof];
        handler.compute_heterogeneous_nucleation(
            &network,
            &conc[dof..2 * dof],
            &mut updated,
            1,
            0,
            0,
        );
        assert_ulps_eq!(updated[0], 0.0);
        assert_ulps_eq!(updated[1], 0.0);
    }

    #[test]
    fn test_heterogeneous_source_feeds_pairs() {
        let mut network = ne::uranium_dioxide(50);
        network.set_temperatures(&vec![1800.0; 3]);
        let dof = network.dof();

        let mut handler = NucleationHandler::heterogeneous(0.5);
        let mut dfill = SparseFillMap::new();
        handler.initialize(&network, &mut dfill).unwrap();
        handler.update_heterogeneous_nucleation_rate(1.0);

        assert_eq!(dfill[&0], vec![0]);
        assert_eq!(dfill[&1], vec![0]);

        let mut conc = vec![0.0; dof + 1];
        conc[0] = 1.0;
        let mut updated = vec![0.0; dof + 1];
        handler.compute_heterogeneous_nucleation(&network, &conc, &mut updated, 0, 0, 0);
        assert_ulps_eq!(updated[0], -1.0);
        assert_ulps_eq!(updated[1], 0.5);
    }

    #[test]
    fn test_missing_xenon_is_an_error() {
        let network = ne::uranium_dioxide(1);
        let mut handler = NucleationHandler::heterogeneous(0.25);
        let mut dfill = SparseFillMap::new();
        let err = handler.initialize(&network, &mut dfill).unwrap_err();
        assert!(matches!(err, Error::MissingCluster { size: 2, .. }));
    }
}
