//! Jacobian sparsity maps.
//!
//! Two maps describe the coupling structure of the per-point Jacobian
//! blocks: `dfill` for same-point coupling and `ofill` for
//! nearest-neighbor coupling. Each physics component declares its
//! connectivity into these maps during setup; the integrator converts the
//! finalized pair to its native block-fill format. One `ofill` entry per
//! directional coupling is recorded regardless of dimension; the
//! integrator replicates it per neighbor.

use std::collections::BTreeMap;

/// Map from a cluster row id to the ordered column ids coupled to it.
pub type SparseFillMap = BTreeMap<usize, Vec<usize>>;

/// Insert a coupling, keeping insertion order and ignoring duplicates.
pub fn add_coupling(map: &mut SparseFillMap, row: usize, col: usize) {
    let cols = map.entry(row).or_default();
    if !cols.contains(&col) {
        cols.push(col);
    }
}

/// The finalized pair of sparsity maps emitted by `setup`.
#[derive(Debug, Clone, Default)]
pub struct FillMaps {
    pub dfill: SparseFillMap,
    pub ofill: SparseFillMap,
}

impl FillMaps {
    /// Total number of non-zero diagonal couplings, which is also the
    /// length of the flat partial-derivative buffer filled by
    /// `ReactionNetwork::compute_all_partials`.
    pub fn diagonal_len(&self) -> usize {
        self.dfill.values().map(Vec::len).sum()
    }

    /// Dense per-row column sets over `dof` rows, in the layout external
    /// block-fill converters expect. Rows without any coupling come out
    /// empty.
    pub fn row_sets(map: &SparseFillMap, dof: usize) -> Vec<Vec<usize>> {
        (0..dof)
            .map(|row| map.get(&row).cloned().unwrap_or_default())
            .collect()
    }
}
