//! Drift of mobile clusters toward a sink: the free surface or an
//! internal grain boundary.
//!
//! The drift velocity derives from the elastic interaction between a
//! mobile cluster and the sink, `v = 3 sigma D / (kB T r^4)` with
//! `sigma` the sink strength in eV nm^3 and `r` the distance to the
//! sink. Off the sink the stencil is one-sided `(center, next-away)`;
//! on a grain-boundary sink both sides feed the center.

use approx::relative_eq;

use crate::constants::K_BOLTZMANN;
use crate::geometry::GridPosition;
use crate::network::cluster::{ClusterId, Composition};
use crate::network::ReactionNetwork;
use crate::error::{Error, Result};
use crate::sparsity::{add_coupling, SparseFillMap};

/// Tungsten surface orientation, selecting the sink-strength table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TungstenOrientation {
    W100,
    W110,
    W111,
}

/// Sink strengths in eV nm^3 for mobile He1..He7.
fn sink_strengths(orientation: TungstenOrientation) -> [f64; 7] {
    match orientation {
        TungstenOrientation::W100 => [
            2.28e-3, 5.06e-3, 7.26e-3, 15.87e-3, 16.95e-3, 27.16e-3, 35.56e-3,
        ],
        TungstenOrientation::W110 => [
            5.13e-3, 3.64e-3, 2.71e-3, 4.54e-3, 5.07e-3, 5.86e-3, 7.24e-3,
        ],
        TungstenOrientation::W111 => [
            3.65e-3, 6.40e-3, 16.38e-3, 9.84e-3, 44.40e-3, 52.12e-3, 81.57e-3,
        ],
    }
}

/// Uniform grain-boundary sink strength in eV nm^3.
const GB_SINK_STRENGTH: f64 = 5.0e-3;

/// Which plane the handler drives clusters toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// The material surface on the left of the X grid.
    Surface(TungstenOrientation),
    /// An internal plane orthogonal to the given axis (0 = X, 1 = Y,
    /// 2 = Z).
    GrainBoundary(usize),
}

#[derive(Debug)]
pub struct AdvectionHandler {
    kind: SinkKind,
    advecting: Vec<ClusterId>,
    sink_strength_vector: Vec<f64>,
    location: f64,
}

const SINK_TOLERANCE: f64 = 1.0e-4;

impl AdvectionHandler {
    pub fn surface(orientation: TungstenOrientation) -> Self {
        Self {
            kind: SinkKind::Surface(orientation),
            advecting: Vec::new(),
            sink_strength_vector: Vec::new(),
            location: 0.0,
        }
    }

    pub fn grain_boundary(axis: usize, location: f64) -> Self {
        Self {
            kind: SinkKind::GrainBoundary(axis),
            advecting: Vec::new(),
            sink_strength_vector: Vec::new(),
            location,
        }
    }

    pub fn kind(&self) -> SinkKind {
        self.kind
    }

    /// Move the sink plane, e.g. when the surface advances.
    pub fn set_location(&mut self, location: f64) {
        self.location = location;
    }

    pub fn location(&self) -> f64 {
        self.location
    }

    /// Collect the advecting helium clusters and declare their
    /// self-couplings in the off-diagonal map. A helium cluster missing
    /// from the network is a configuration error.
    pub fn initialize(
        &mut self,
        network: &ReactionNetwork,
        ofill: &mut SparseFillMap,
    ) -> Result<()> {
        self.advecting.clear();
        self.sink_strength_vector.clear();

        for size in 1..=7u32 {
            let comp = Composition([size, 0, 0, 0, 0]);
            let cluster = network.find_cluster(&comp).ok_or(Error::MissingCluster {
                name: "He".to_string(),
                size,
            })?;
            if relative_eq!(cluster.diffusion_factor, 0.0) {
                continue;
            }
            let strength = match self.kind {
                SinkKind::Surface(orientation) => sink_strengths(orientation)[size as usize - 1],
                SinkKind::GrainBoundary(_) => GB_SINK_STRENGTH,
            };
            if relative_eq!(strength, 0.0) {
                continue;
            }
            self.advecting.push(cluster.id);
            self.sink_strength_vector.push(strength);
            add_coupling(ofill, cluster.id as usize, cluster.id as usize);
        }
        Ok(())
    }

    pub fn n_advecting(&self) -> usize {
        self.advecting.len()
    }

    pub fn advecting(&self) -> &[ClusterId] {
        &self.advecting
    }

    pub fn sink_strength_vector(&self) -> &[f64] {
        &self.sink_strength_vector
    }

    /// Whether this grid position lies on the sink plane. The surface is
    /// outside the domain, so surface handlers never claim a point.
    pub fn is_point_on_sink(&self, pos: &GridPosition) -> bool {
        match self.kind {
            SinkKind::Surface(_) => false,
            SinkKind::GrainBoundary(axis) => (pos[axis] - self.location).abs() < SINK_TOLERANCE,
        }
    }

    /// Offset of the neighbor used by the one-sided stencil, pointing
    /// away from the sink, one slot per dimension.
    pub fn stencil_for_advection(&self, pos: &GridPosition) -> [i64; 3] {
        let mut stencil = [0i64; 3];
        match self.kind {
            SinkKind::Surface(_) => stencil[0] = 1,
            SinkKind::GrainBoundary(axis) => {
                stencil[axis] = if pos[axis] > self.location { 1 } else { -1 };
            }
        }
        stencil
    }

    fn axis_step(&self, hx_right: f64, hy: f64, hz: f64) -> f64 {
        match self.kind {
            SinkKind::Surface(_) | SinkKind::GrainBoundary(0) => hx_right,
            SinkKind::GrainBoundary(1) => hy,
            SinkKind::GrainBoundary(_) => hz,
        }
    }

    fn neighbor_slot(stencil: &[i64; 3]) -> usize {
        // conc_vector layout: center, left, right, bottom, top, front,
        // back.
        match (stencil[0], stencil[1], stencil[2]) {
            (-1, _, _) => 1,
            (1, _, _) => 2,
            (_, -1, _) => 3,
            (_, 1, _) => 4,
            (_, _, -1) => 5,
            _ => 6,
        }
    }

    /// Add the advection contribution at one grid point. Sign-consistent
    /// with `compute_partials_for_advection`.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_advection(
        &self,
        network: &ReactionNetwork,
        pos: &GridPosition,
        conc_vector: &[&[f64]],
        updated: &mut [f64],
        _hx_left: f64,
        hx_right: f64,
        ix: usize,
        hy: f64,
        _iy: usize,
        hz: f64,
        _iz: usize,
    ) {
        let temp = network.temperature(ix + 1);
        let step = self.axis_step(hx_right, hy, hz);
        let stencil = self.stencil_for_advection(pos);
        let on_sink = self.is_point_on_sink(pos);
        let axis = match self.kind {
            SinkKind::Surface(_) => 0,
            SinkKind::GrainBoundary(axis) => axis,
        };
        let dist = (pos[axis] - self.location).abs();
        if !on_sink && dist <= 0.0 {
            return;
        }

        for (slot, &id) in self.advecting.iter().enumerate() {
            let d = network.diffusion_coefficient(id, ix + 1);
            let sigma = self.sink_strength_vector[slot];
            let c = id as usize;
            let factor = 3.0 * sigma * d / (K_BOLTZMANN * temp * step);

            if on_sink {
                // Both sides feed the sink plane.
                let toward = Self::neighbor_slot(&stencil);
                let mirrored = [-stencil[0], -stencil[1], -stencil[2]];
                let away = Self::neighbor_slot(&mirrored);
                updated[c] += factor
                    * (conc_vector[toward][c] + conc_vector[away][c])
                    / step.powi(4);
            } else {
                let away = Self::neighbor_slot(&stencil);
                updated[c] += factor
                    * (conc_vector[away][c] / (dist + step).powi(4) - conc_vector[0][c] / dist.powi(4));
            }
        }
    }

    /// Write two stencil partials per advecting cluster: `(center,
    /// next-away)` off the sink, `(one side, other side)` on it.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_partials_for_advection(
        &self,
        network: &ReactionNetwork,
        pos: &GridPosition,
        values: &mut [f64],
        indices: &mut [ClusterId],
        _hx_left: f64,
        hx_right: f64,
        ix: usize,
        hy: f64,
        _iy: usize,
        hz: f64,
        _iz: usize,
    ) {
        let temp = network.temperature(ix + 1);
        let step = self.axis_step(hx_right, hy, hz);
        let on_sink = self.is_point_on_sink(pos);
        let axis = match self.kind {
            SinkKind::Surface(_) => 0,
            SinkKind::GrainBoundary(axis) => axis,
        };
        let dist = (pos[axis] - self.location).abs();

        for (slot, &id) in self.advecting.iter().enumerate() {
            indices[slot] = id;
            let d = network.diffusion_coefficient(id, ix + 1);
            let sigma = self.sink_strength_vector[slot];
            let factor = 3.0 * sigma * d / (K_BOLTZMANN * temp * step);

            if on_sink {
                values[2 * slot] = factor / step.powi(4);
                values[2 * slot + 1] = factor / step.powi(4);
            } else if dist > 0.0 {
                values[2 * slot] = -factor / dist.powi(4);
                values[2 * slot + 1] = factor / (dist + step).powi(4);
            } else {
                values[2 * slot] = 0.0;
                values[2 * slot + 1] = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::psi;

    fn network() -> ReactionNetwork {
        let mut network = psi::tungsten(8, 0, 0, 1, 0);
        network.set_temperatures(&vec![1000.0; 5]);
        network
    }

    #[test]
    fn test_w111_advecting_clusters_and_strengths() {
        let network = network();
        let mut handler = AdvectionHandler::surface(TungstenOrientation::W111);
        let mut ofill = SparseFillMap::new();
        handler.initialize(&network, &mut ofill).unwrap();

        // He1..He7 in composition order; all have non-zero diffusion.
        assert_eq!(handler.advecting(), &[1, 3, 5, 7, 9, 11, 13]);
        let expected = [
            3.65e-3, 6.40e-3, 16.38e-3, 9.84e-3, 44.40e-3, 52.12e-3, 81.57e-3,
        ];
        for (got, want) in handler.sink_strength_vector().iter().zip(expected) {
            assert_ulps_eq!(*got, want);
        }
        for &id in handler.advecting() {
            assert!(ofill[&(id as usize)].contains(&(id as usize)));
        }
    }

    #[test]
    fn test_missing_helium_is_a_configuration_error() {
        let mut no_helium = psi::tungsten(0, 0, 0, 2, 1);
        no_helium.set_temperatures(&[1000.0; 2]);
        let mut handler = AdvectionHandler::surface(TungstenOrientation::W100);
        let mut ofill = SparseFillMap::new();
        let err = handler.initialize(&no_helium, &mut ofill).unwrap_err();
        assert!(matches!(err, Error::MissingCluster { size: 1, .. }));
    }

    #[test]
    fn test_surface_stencil_points_away_from_surface() {
        let handler = AdvectionHandler::surface(TungstenOrientation::W100);
        let pos = GridPosition::new(1.5, 0.0, 0.0);
        assert_eq!(handler.stencil_for_advection(&pos), [1, 0, 0]);
        assert!(!handler.is_point_on_sink(&pos));
    }

    #[test]
    fn test_grain_boundary_sink_detection() {
        let mut handler = AdvectionHandler::grain_boundary(1, 2.0);
        handler.set_location(2.0);
        assert!(handler.is_point_on_sink(&GridPosition::new(0.0, 2.0, 0.0)));
        assert!(!handler.is_point_on_sink(&GridPosition::new(0.0, 2.5, 0.0)));
        assert_eq!(
            handler.stencil_for_advection(&GridPosition::new(0.0, 2.5, 0.0)),
            [0, 1, 0]
        );
        assert_eq!(
            handler.stencil_for_advection(&GridPosition::new(0.0, 1.5, 0.0)),
            [0, -1, 0]
        );
    }

    #[test]
    fn test_advection_drains_the_center_toward_the_surface() {
        let network = network();
        let dof = network.dof();
        let mut handler = AdvectionHandler::surface(TungstenOrientation::W111);
        let mut ofill = SparseFillMap::new();
        handler.initialize(&network, &mut ofill).unwrap();

        // Uniform concentration: the gradient of 1/r^4 drains the center.
        let row = vec![1.0; dof];
        let conc_vector: Vec<&[f64]> = vec![&row, &row, &row];
        let mut updated = vec![0.0; dof];
        let pos = GridPosition::new(1.0, 0.0, 0.0);
        handler.compute_advection(
            &network,
            &pos,
            &conc_vector,
            &mut updated,
            1.0,
            1.0,
            0,
            0.0,
            0,
            0.0,
            0,
        );
        for &id in handler.advecting() {
            assert!(updated[id as usize] < 0.0);
        }

        // Partials carry the same signs.
        let n = handler.n_advecting();
        let mut values = vec![0.0; 2 * n];
        let mut indices = vec![0; n];
        handler.compute_partials_for_advection(
            &network,
            &pos,
            &mut values,
            &mut indices,
            1.0,
            1.0,
            0,
            0.0,
            0,
            0.0,
            0,
        );
        for slot in 0..n {
            assert!(values[2 * slot] < 0.0);
            assert!(values[2 * slot + 1] > 0.0);
        }
    }
}
