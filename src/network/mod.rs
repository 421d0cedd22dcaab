//! The reaction network: cluster catalog, rate laws, and per-point flux
//! and Jacobian contributions over the species degrees of freedom.
//!
//! Clusters and reactions live in parallel dense arrays owned by the
//! network; cross-references are `u32` ids. The reaction list is fixed
//! after construction; the only mutation afterwards is the per-point
//! temperature cache (`set_temperatures`) and the rate tables derived
//! from it.

pub mod cluster;
pub mod ne;
pub mod psi;
pub mod reaction;
pub mod zr;

use std::collections::HashMap;

use tracing::info;

use crate::constants::{CORE_RADIUS, K_BOLTZMANN, MIN_BINDING_ENERGY};
use crate::error::{Error, Result};
use crate::sparsity::{add_coupling, SparseFillMap};

use cluster::{Cluster, ClusterId, Composition, Region, SpeciesBasis, INVALID_CLUSTER};
use reaction::{
    dissociation_coefs, production_coefs, trivial_coefs, Reaction, ReactionKind,
};

/// Flat offsets into the partial-derivative buffer, precomputed per
/// reaction so the hot loop never touches a map.
#[derive(Debug, Clone)]
enum ReactionSlots {
    Production {
        aa: usize,
        ab: usize,
        ba: usize,
        bb: usize,
        products: Vec<(usize, usize)>,
    },
    Dissociation {
        pp: usize,
        p1p: usize,
        p2p: usize,
    },
    Sink {
        aa: usize,
    },
}

#[derive(Debug)]
pub struct ReactionNetwork {
    basis: SpeciesBasis,
    clusters: Vec<Cluster>,
    lookup: HashMap<Composition, ClusterId>,
    reactions: Vec<Reaction>,
    dfill: SparseFillMap,
    atomic_volume: f64,
    sink_strength: f64,

    // Temperature-derived caches, indexed by local grid point.
    temperatures: Vec<f64>,
    diff_coeffs: Vec<f64>,
    rates: Vec<f64>,
    largest_rate: f64,
    grid_size: usize,

    // Partial-derivative layout, fixed by `finalize_partials`.
    n_partials: usize,
    slots: Vec<ReactionSlots>,
}

/// Assembles a network from a cluster catalog produced by one of the
/// material generators. `build` derives the reaction list and the
/// diagonal connectivity.
pub struct NetworkBuilder {
    basis: SpeciesBasis,
    clusters: Vec<Cluster>,
    atomic_volume: f64,
    sink_strength: f64,
}

impl NetworkBuilder {
    pub fn new(basis: SpeciesBasis, atomic_volume: f64, sink_strength: f64) -> Self {
        Self {
            basis,
            clusters: Vec::new(),
            atomic_volume,
            sink_strength,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        region: Region,
        radius: f64,
        diffusion_factor: f64,
        migration_energy: f64,
        formation_energy: f64,
        anisotropy: f64,
    ) {
        let id = self.clusters.len() as ClusterId;
        self.clusters.push(Cluster {
            id,
            region,
            radius,
            diffusion_factor,
            migration_energy,
            formation_energy,
            anisotropy,
        });
    }

    pub fn build(self) -> ReactionNetwork {
        let mut lookup = HashMap::new();
        for cl in &self.clusters {
            if !cl.region.is_grouped() {
                lookup.insert(cl.composition(), cl.id);
            }
        }

        let mut network = ReactionNetwork {
            basis: self.basis,
            clusters: self.clusters,
            lookup,
            reactions: Vec::new(),
            dfill: SparseFillMap::new(),
            atomic_volume: self.atomic_volume,
            sink_strength: self.sink_strength,
            temperatures: Vec::new(),
            diff_coeffs: Vec::new(),
            rates: Vec::new(),
            largest_rate: 0.0,
            grid_size: 0,
            n_partials: 0,
            slots: Vec::new(),
        };
        network.generate_reactions();
        network.generate_connectivity();
        info!(
            clusters = network.clusters.len(),
            reactions = network.reactions.len(),
            "reaction network built"
        );
        network
    }
}

impl ReactionNetwork {
    /// Number of cluster degrees of freedom. The explicit temperature
    /// degree of freedom sits at this index, so the per-point stride is
    /// `dof() + 1`.
    pub fn dof(&self) -> usize {
        self.clusters.len()
    }

    pub fn basis(&self) -> SpeciesBasis {
        self.basis
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, id: ClusterId) -> &Cluster {
        &self.clusters[id as usize]
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn atomic_volume(&self) -> f64 {
        self.atomic_volume
    }

    /// Find the cluster holding a composition, exact match first, then
    /// grouped-region containment.
    pub fn find_cluster(&self, comp: &Composition) -> Option<&Cluster> {
        if let Some(&id) = self.lookup.get(comp) {
            return Some(self.cluster(id));
        }
        self.clusters.iter().find(|cl| cl.region.contains(comp))
    }

    /// The single-vacancy cluster, when the basis has a vacancy axis.
    pub fn single_vacancy(&self) -> Option<ClusterId> {
        let axis = self.vacancy_axis()?;
        let mut comp = Composition::default();
        comp.0[axis] = 1;
        self.lookup.get(&comp).copied()
    }

    fn vacancy_axis(&self) -> Option<usize> {
        match self.basis {
            SpeciesBasis::Psi => Some(3),
            SpeciesBasis::AlphaZr => Some(0),
            SpeciesBasis::Ne => None,
        }
    }

    fn interstitial_axis(&self) -> Option<usize> {
        match self.basis {
            SpeciesBasis::Psi => Some(4),
            SpeciesBasis::AlphaZr => Some(1),
            SpeciesBasis::Ne => None,
        }
    }

    // ---- reaction list construction -------------------------------------

    fn generate_reactions(&mut self) {
        let n = self.clusters.len();
        let mut reactions = Vec::new();

        for a in 0..n {
            for b in a..n {
                let (ca, cb) = (&self.clusters[a], &self.clusters[b]);
                if !ca.is_mobile() && !cb.is_mobile() {
                    continue;
                }
                if let Some(r) = self.annihilation(ca, cb) {
                    reactions.push(r);
                    continue;
                }
                // Additive productions: every cluster whose tile overlaps
                // the composition sums of the pair.
                for p in &self.clusters {
                    if let Some(coefs) =
                        production_coefs(&ca.region, &cb.region, &p.region)
                    {
                        reactions.push(Reaction::production(ca.id, cb.id, &[p.id], coefs));
                    }
                }
            }
        }

        // Dissociations: the reverse of every monomer-assisted production.
        let mut dissociations = Vec::new();
        for r in &reactions {
            if r.kind != ReactionKind::Production || r.products[0] == INVALID_CLUSTER {
                continue;
            }
            let (a, b) = (self.cluster(r.reactants[0]), self.cluster(r.reactants[1]));
            let parent = self.cluster(r.products[0]);
            let monomer_involved = |cl: &Cluster| {
                !cl.region.is_grouped() && cl.composition().total() == 1
            };
            if !monomer_involved(a) && !monomer_involved(b) {
                continue;
            }
            // Annihilation channels have no additive reverse.
            if let Some(coefs) = dissociation_coefs(&parent.region, &a.region, &b.region) {
                let binding = (a.formation_energy + b.formation_energy
                    - parent.formation_energy)
                    .max(MIN_BINDING_ENERGY);
                dissociations.push(Reaction::dissociation(parent.id, a.id, b.id, binding, coefs));
            }
        }
        reactions.extend(dissociations);

        // Dislocation sinks for mobile single-species defects.
        if self.sink_strength > 0.0 {
            let v_axis = self.vacancy_axis();
            let i_axis = self.interstitial_axis();
            for cl in &self.clusters {
                if !cl.is_mobile() {
                    continue;
                }
                let comp = cl.composition();
                let on_axis = |axis: Option<usize>| {
                    axis.map_or(false, |ax| comp.0[ax] > 0 && comp.total() == comp.0[ax])
                };
                if on_axis(v_axis) || on_axis(i_axis) {
                    reactions.push(Reaction::sink(cl.id));
                }
            }
        }

        self.reactions = reactions;
    }

    /// Vacancy-interstitial recombination, which is not expressible as a
    /// composition sum. Returns `None` for pairs that are not a pure
    /// interstitial against a vacancy-bearing cluster.
    fn annihilation(&self, ca: &Cluster, cb: &Cluster) -> Option<Reaction> {
        let v_axis = self.vacancy_axis()?;
        let i_axis = self.interstitial_axis()?;
        let pure_i = |cl: &Cluster| {
            let comp = cl.composition();
            comp.0[i_axis] > 0 && comp.total() == comp.0[i_axis] && !cl.region.is_grouped()
        };
        let (inter, other) = if pure_i(ca) && !pure_i(cb) {
            (ca, cb)
        } else if pure_i(cb) && !pure_i(ca) {
            (cb, ca)
        } else {
            return None;
        };
        if other.region.is_grouped() {
            return None;
        }
        let m = inter.composition().0[i_axis];
        let comp = other.composition();
        let v = comp.0[v_axis];
        if v == 0 {
            return None;
        }

        let mut result = comp;
        if v >= m {
            result.0[v_axis] = v - m;
        } else if comp.total() == v {
            // Pure vacancy swallowed whole, leftover interstitials.
            result = Composition::default();
            result.0[i_axis] = m - v;
        } else {
            return None;
        }

        let products: Vec<ClusterId> = if result.total() == 0 {
            Vec::new()
        } else {
            match self.lookup.get(&result) {
                Some(&id) => vec![id],
                None => return None,
            }
        };
        Some(Reaction::production(
            inter.id.min(other.id),
            inter.id.max(other.id),
            &products,
            trivial_coefs(),
        ))
    }

    fn generate_connectivity(&mut self) {
        for i in 0..self.clusters.len() {
            add_coupling(&mut self.dfill, i, i);
        }
        for r in &self.reactions {
            match r.kind {
                ReactionKind::Production => {
                    let (a, b) = (r.reactants[0] as usize, r.reactants[1] as usize);
                    let mut rows = vec![a, b];
                    for &p in &r.products {
                        if p != INVALID_CLUSTER {
                            rows.push(p as usize);
                        }
                    }
                    for row in rows {
                        add_coupling(&mut self.dfill, row, a);
                        add_coupling(&mut self.dfill, row, b);
                    }
                }
                ReactionKind::Dissociation => {
                    let parent = r.reactants[0] as usize;
                    add_coupling(&mut self.dfill, parent, parent);
                    for &p in &r.products {
                        add_coupling(&mut self.dfill, p as usize, parent);
                    }
                }
                ReactionKind::Sink => {
                    let a = r.reactants[0] as usize;
                    add_coupling(&mut self.dfill, a, a);
                }
            }
        }
    }

    /// Merge the reaction connectivity into `map` and return the total
    /// number of diagonal couplings, which is the length of the flat
    /// buffer `compute_all_partials` fills.
    pub fn get_diagonal_fill(&self, map: &mut SparseFillMap) -> usize {
        for (&row, cols) in &self.dfill {
            for &col in cols {
                add_coupling(map, row, col);
            }
        }
        map.values().map(Vec::len).sum()
    }

    /// Fix the flat partial-derivative layout dictated by the merged
    /// diagonal fill. Must be called once after all handlers have
    /// declared their connectivity.
    pub fn finalize_partials(&mut self, map: &SparseFillMap) {
        let mut index = HashMap::new();
        let mut offset = 0usize;
        for (&row, cols) in map {
            for &col in cols {
                index.insert((row, col), offset);
                offset += 1;
            }
        }
        self.n_partials = offset;

        self.slots = self
            .reactions
            .iter()
            .map(|r| match r.kind {
                ReactionKind::Production => {
                    let (a, b) = (r.reactants[0] as usize, r.reactants[1] as usize);
                    ReactionSlots::Production {
                        aa: index[&(a, a)],
                        ab: index[&(a, b)],
                        ba: index[&(b, a)],
                        bb: index[&(b, b)],
                        products: r
                            .products
                            .iter()
                            .filter(|&&p| p != INVALID_CLUSTER)
                            .map(|&p| {
                                (index[&(p as usize, a)], index[&(p as usize, b)])
                            })
                            .collect(),
                    }
                }
                ReactionKind::Dissociation => {
                    let parent = r.reactants[0] as usize;
                    ReactionSlots::Dissociation {
                        pp: index[&(parent, parent)],
                        p1p: index[&(r.products[0] as usize, parent)],
                        p2p: index[&(r.products[1] as usize, parent)],
                    }
                }
                ReactionKind::Sink => {
                    let a = r.reactants[0] as usize;
                    ReactionSlots::Sink { aa: index[&(a, a)] }
                }
            })
            .collect();
    }

    pub fn n_partials(&self) -> usize {
        self.n_partials
    }

    // ---- temperature and rate caches ------------------------------------

    /// Tell the network how many local grid points (with ghosts) the
    /// per-point caches must cover.
    pub fn set_grid_size(&mut self, n: usize) {
        self.grid_size = n;
        self.temperatures = vec![0.0; n];
        self.diff_coeffs = vec![0.0; n * self.clusters.len()];
        self.rates = vec![0.0; n * self.reactions.len()];
    }

    /// Update the per-point temperatures and re-derive diffusion
    /// coefficients and reaction rates.
    pub fn set_temperatures(&mut self, temps: &[f64]) {
        self.grid_size = temps.len();
        self.temperatures = temps.to_vec();
        let nc = self.clusters.len();
        let nr = self.reactions.len();
        self.diff_coeffs = vec![0.0; self.grid_size * nc];
        self.rates = vec![0.0; self.grid_size * nr];
        let mut largest = 0.0f64;

        for pt in 0..self.grid_size {
            let temp = self.temperatures[pt];
            for (c, cl) in self.clusters.iter().enumerate() {
                self.diff_coeffs[pt * nc + c] = if cl.diffusion_factor > 0.0 {
                    cl.diffusion_factor * (-cl.migration_energy / (K_BOLTZMANN * temp)).exp()
                } else {
                    0.0
                };
            }
            for (ri, r) in self.reactions.iter().enumerate() {
                let rate = match r.kind {
                    ReactionKind::Production => {
                        self.production_rate(r.reactants[0], r.reactants[1], pt)
                    }
                    ReactionKind::Dissociation => {
                        let k_plus =
                            self.production_rate(r.products[0], r.products[1], pt);
                        k_plus * (-r.binding_energy / (K_BOLTZMANN * temp)).exp()
                            / self.atomic_volume
                    }
                    ReactionKind::Sink => {
                        let a = r.reactants[0];
                        self.sink_strength * self.diff_coeffs[pt * nc + a as usize]
                    }
                };
                self.rates[pt * nr + ri] = rate;
                largest = largest.max(rate);
            }
        }
        self.largest_rate = largest;
    }

    pub fn temperature(&self, point: usize) -> f64 {
        self.temperatures[point]
    }

    /// Diffusion coefficient of a cluster at a local grid point.
    pub fn diffusion_coefficient(&self, id: ClusterId, point: usize) -> f64 {
        self.diff_coeffs[point * self.clusters.len() + id as usize]
    }

    /// Largest instantaneous reaction rate over the cached points.
    pub fn largest_rate(&self) -> f64 {
        self.largest_rate
    }

    fn production_rate(&self, a: ClusterId, b: ClusterId, point: usize) -> f64 {
        let nc = self.clusters.len();
        let (ca, cb) = (self.cluster(a), self.cluster(b));
        let d_sum =
            self.diff_coeffs[point * nc + a as usize] + self.diff_coeffs[point * nc + b as usize];
        if self.basis == SpeciesBasis::AlphaZr {
            if let Some(rate) = zr::loop_capture_rate(ca, cb, d_sum) {
                return rate;
            }
        }
        4.0 * std::f64::consts::PI * (ca.radius + cb.radius + CORE_RADIUS) * d_sum
    }

    // ---- per-point evaluation -------------------------------------------

    fn check_stride(&self, len: usize) -> Result<()> {
        if len < self.dof() + 1 {
            return Err(Error::ShapeMismatch {
                expected: self.dof() + 1,
                actual: len,
            });
        }
        Ok(())
    }

    /// Add the reaction contribution of every species at one grid point
    /// into `fluxes`. `conc` is the local concentration vector of length
    /// `dof() + 1`, the last entry being the temperature.
    pub fn compute_all_fluxes(
        &self,
        conc: &[f64],
        fluxes: &mut [f64],
        point: usize,
    ) -> Result<()> {
        self.check_stride(conc.len())?;
        self.check_stride(fluxes.len())?;
        let nr = self.reactions.len();

        for (ri, r) in self.reactions.iter().enumerate() {
            let rate = self.rates[point * nr + ri];
            match r.kind {
                ReactionKind::Production => {
                    let (a, b) = (r.reactants[0] as usize, r.reactants[1] as usize);
                    let f = rate * r.overlap() * conc[a] * conc[b];
                    let vol_a = self.clusters[a].region.volume();
                    if a == b {
                        fluxes[a] -= 2.0 * f / vol_a;
                    } else {
                        let vol_b = self.clusters[b].region.volume();
                        fluxes[a] -= f / vol_a;
                        fluxes[b] -= f / vol_b;
                    }
                    for &p in r.products.iter().filter(|&&p| p != INVALID_CLUSTER) {
                        fluxes[p as usize] += f / self.clusters[p as usize].region.volume();
                    }
                }
                ReactionKind::Dissociation => {
                    let parent = r.reactants[0] as usize;
                    let f = rate * r.overlap() * conc[parent];
                    fluxes[parent] -= f / self.clusters[parent].region.volume();
                    for &p in &r.products {
                        fluxes[p as usize] += f / self.clusters[p as usize].region.volume();
                    }
                }
                ReactionKind::Sink => {
                    let a = r.reactants[0] as usize;
                    fluxes[a] -= rate * conc[a];
                }
            }
        }
        Ok(())
    }

    /// Write the reaction partial derivatives at one grid point into the
    /// flat buffer whose layout is dictated by the merged diagonal fill.
    pub fn compute_all_partials(
        &self,
        conc: &[f64],
        values: &mut [f64],
        point: usize,
    ) -> Result<()> {
        self.check_stride(conc.len())?;
        if values.len() < self.n_partials {
            return Err(Error::ShapeMismatch {
                expected: self.n_partials,
                actual: values.len(),
            });
        }
        values[..self.n_partials].fill(0.0);
        let nr = self.reactions.len();

        for (ri, (r, slots)) in self.reactions.iter().zip(self.slots.iter()).enumerate() {
            let rate = self.rates[point * nr + ri];
            match (r.kind, slots) {
                (
                    ReactionKind::Production,
                    ReactionSlots::Production {
                        aa,
                        ab,
                        ba,
                        bb,
                        products,
                    },
                ) => {
                    let (a, b) = (r.reactants[0] as usize, r.reactants[1] as usize);
                    let vol_a = self.clusters[a].region.volume();
                    if a == b {
                        // f = k c_a^2 scaled by the overlap; the loss term
                        // counts both consumed reactants.
                        let df = 2.0 * rate * r.overlap() * conc[a];
                        values[*aa] -= 2.0 * df / vol_a;
                        for (slot, &p) in products
                            .iter()
                            .zip(r.products.iter().filter(|&&p| p != INVALID_CLUSTER))
                        {
                            values[slot.0] += df / self.clusters[p as usize].region.volume();
                        }
                    } else {
                        let vol_b = self.clusters[b].region.volume();
                        let dfa = rate * r.overlap() * conc[b];
                        let dfb = rate * r.overlap() * conc[a];
                        values[*aa] -= dfa / vol_a;
                        values[*ab] -= dfb / vol_a;
                        values[*ba] -= dfa / vol_b;
                        values[*bb] -= dfb / vol_b;
                        for (slot, &p) in products
                            .iter()
                            .zip(r.products.iter().filter(|&&p| p != INVALID_CLUSTER))
                        {
                            let vol_p = self.clusters[p as usize].region.volume();
                            values[slot.0] += dfa / vol_p;
                            values[slot.1] += dfb / vol_p;
                        }
                    }
                }
                (ReactionKind::Dissociation, ReactionSlots::Dissociation { pp, p1p, p2p }) => {
                    let parent = r.reactants[0] as usize;
                    let df = rate * r.overlap();
                    values[*pp] -= df / self.clusters[parent].region.volume();
                    values[*p1p] += df / self.clusters[r.products[0] as usize].region.volume();
                    values[*p2p] += df / self.clusters[r.products[1] as usize].region.volume();
                }
                (ReactionKind::Sink, ReactionSlots::Sink { aa }) => {
                    values[*aa] -= rate;
                }
                _ => unreachable!("slots built from the same reaction list"),
            }
        }
        Ok(())
    }

    /// Total gas content held in vacancy-bearing clusters, per unit
    /// volume, used by the trap-mutation attenuation.
    pub fn total_trapped_atom_concentration(&self, conc: &[f64], gas_axis: usize) -> f64 {
        let v_axis = match self.vacancy_axis() {
            Some(ax) => ax,
            None => return 0.0,
        };
        self.clusters
            .iter()
            .filter(|cl| cl.region.0[v_axis].begin > 0)
            .map(|cl| {
                conc[cl.id as usize] * cl.region.0[gas_axis].mid() * cl.region.volume()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tungsten() -> ReactionNetwork {
        psi::tungsten(3, 0, 0, 1, 1)
    }

    #[test]
    fn test_cluster_ordering_is_lexicographic() {
        let network = psi::tungsten(8, 0, 0, 1, 0);
        // V1, then He_n and He_nV1 interleaved, He8V1 last.
        assert_eq!(network.dof(), 17);
        assert_eq!(network.cluster(0).composition(), Composition([0, 0, 0, 1, 0]));
        assert_eq!(network.cluster(1).composition(), Composition([1, 0, 0, 0, 0]));
        assert_eq!(network.cluster(2).composition(), Composition([1, 0, 0, 1, 0]));
        assert_eq!(network.cluster(15).composition(), Composition([8, 0, 0, 0, 0]));
        assert_eq!(network.cluster(16).composition(), Composition([8, 0, 0, 1, 0]));
    }

    #[test]
    fn test_single_vacancy_and_find() {
        let network = small_tungsten();
        let v1 = network.single_vacancy().unwrap();
        assert_eq!(
            network.cluster(v1).composition(),
            Composition([0, 0, 0, 1, 0])
        );
        assert!(network.find_cluster(&Composition([2, 0, 0, 0, 0])).is_some());
        assert!(network.find_cluster(&Composition([9, 0, 0, 0, 0])).is_none());
    }

    #[test]
    fn test_reaction_list_contains_expected_channels() {
        let network = small_tungsten();
        let id = |he: u32, v: u32, i: u32| {
            network
                .find_cluster(&Composition([he, 0, 0, v, i]))
                .unwrap()
                .id
        };
        let (he1, he2, v1, i1) = (id(1, 0, 0), id(2, 0, 0), id(0, 1, 0), id(0, 0, 1));
        // He1 + He1 -> He2.
        assert!(network.reactions().iter().any(|r| {
            r.kind == ReactionKind::Production
                && r.reactants == [he1, he1]
                && r.products[0] == he2
        }));
        // V1 + I1 recombination has no product.
        assert!(network.reactions().iter().any(|r| {
            r.kind == ReactionKind::Production
                && r.reactants == [v1.min(i1), v1.max(i1)]
                && r.products[0] == INVALID_CLUSTER
        }));
        // He2 dissociates back to He1 + He1.
        assert!(network.reactions().iter().any(|r| {
            r.kind == ReactionKind::Dissociation && r.reactants[0] == he2
        }));
        // Mobile point defects feed dislocation sinks.
        assert!(network.reactions().iter().any(|r| {
            r.kind == ReactionKind::Sink && r.reactants[0] == v1
        }));
    }

    #[test]
    fn test_fluxes_conserve_helium_content() {
        let mut network = small_tungsten();
        network.set_temperatures(&[1000.0; 3]);
        let mut dfill = SparseFillMap::new();
        network.get_diagonal_fill(&mut dfill);
        network.finalize_partials(&dfill);

        let dof = network.dof();
        let mut conc = vec![1.0e-4; dof + 1];
        conc[dof] = 1000.0;
        let mut fluxes = vec![0.0; dof + 1];
        network.compute_all_fluxes(&conc, &mut fluxes, 1).unwrap();

        // Reactions shuffle helium between clusters but never create or
        // destroy it (no incident flux here).
        let he_rate: f64 = network
            .clusters()
            .iter()
            .map(|cl| fluxes[cl.id as usize] * cl.region.0[0].mid() * cl.region.volume())
            .sum();
        let scale: f64 = network
            .clusters()
            .iter()
            .map(|cl| fluxes[cl.id as usize].abs() * cl.region.0[0].mid())
            .sum();
        assert!(he_rate.abs() <= 1e-12 * scale.max(1.0));
    }

    #[test]
    fn test_partials_match_flux_finite_difference() {
        let mut network = small_tungsten();
        network.set_temperatures(&[1000.0; 3]);
        let mut dfill = SparseFillMap::new();
        network.get_diagonal_fill(&mut dfill);
        network.finalize_partials(&dfill);

        let dof = network.dof();
        let mut conc = vec![0.0; dof + 1];
        for (i, c) in conc.iter_mut().enumerate().take(dof) {
            *c = 1.0e-5 * (i as f64 + 1.0);
        }
        conc[dof] = 1000.0;

        let mut values = vec![0.0; network.n_partials()];
        network.compute_all_partials(&conc, &mut values, 1).unwrap();

        // Compare a handful of diagonal entries against finite differences.
        let eps = 1.0e-12;
        let mut offset = 0usize;
        for (&row, cols) in dfill.iter() {
            for (j, &col) in cols.iter().enumerate() {
                if row < dof && col < dof && row == col {
                    let mut up = conc.clone();
                    up[col] += eps;
                    let mut f0 = vec![0.0; dof + 1];
                    let mut f1 = vec![0.0; dof + 1];
                    network.compute_all_fluxes(&conc, &mut f0, 1).unwrap();
                    network.compute_all_fluxes(&up, &mut f1, 1).unwrap();
                    let fd = (f1[row] - f0[row]) / eps;
                    let got = values[offset + j];
                    assert_relative_eq!(got, fd, max_relative = 1.0e-4, epsilon = 1.0e-3);
                }
            }
            offset += cols.len();
        }
    }

    #[test]
    fn test_largest_rate_tracks_temperature() {
        let mut network = small_tungsten();
        network.set_temperatures(&[500.0; 2]);
        let cold = network.largest_rate();
        network.set_temperatures(&[1500.0; 2]);
        let hot = network.largest_rate();
        assert!(hot > cold);
    }

    #[test]
    fn test_trapped_atom_concentration_counts_bubbles_only() {
        let network = small_tungsten();
        let dof = network.dof();
        let mut conc = vec![0.0; dof + 1];
        let he1v1 = network
            .find_cluster(&Composition([1, 0, 0, 1, 0]))
            .unwrap()
            .id as usize;
        let he1 = network
            .find_cluster(&Composition([1, 0, 0, 0, 0]))
            .unwrap()
            .id as usize;
        conc[he1v1] = 2.0;
        conc[he1] = 5.0;
        assert_ulps_eq!(network.total_trapped_atom_concentration(&conc, 0), 2.0);
    }
}
