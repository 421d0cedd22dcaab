//! Cluster identity: composition regions and per-cluster physical data.
//!
//! A cluster is one tracked species of the reaction network. Its
//! composition is an axis-aligned tile (region) in composition space;
//! ordinary clusters are width-1 tiles, grouped super-clusters span wider
//! tiles and their degree of freedom is the tile average.

use std::fmt;

/// Number of composition axes carried by every network. Unused axes have
/// width-1 `[0, 1)` intervals.
pub const N_AXES: usize = 5;

/// Dense cluster index into the network's cluster pool.
pub type ClusterId = u32;

/// Sentinel for an absent reactant or product slot.
pub const INVALID_CLUSTER: ClusterId = ClusterId::MAX;

/// Meaning of the composition axes, per material family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeciesBasis {
    /// Tungsten plasma-surface interaction: He, D, T, V, I.
    Psi,
    /// Uranium dioxide fuel: Xe.
    Ne,
    /// Alpha-zirconium cladding: V, I, Basal.
    AlphaZr,
}

impl SpeciesBasis {
    pub fn axis_names(&self) -> &'static [&'static str] {
        match self {
            SpeciesBasis::Psi => &["He", "D", "T", "V", "I"],
            SpeciesBasis::Ne => &["Xe"],
            SpeciesBasis::AlphaZr => &["V", "I", "Basal"],
        }
    }

    pub fn n_axes(&self) -> usize {
        self.axis_names().len()
    }

    /// Human-readable cluster name, used in diagnostics.
    pub fn format(&self, comp: &Composition) -> String {
        let mut name = String::new();
        for (axis, label) in self.axis_names().iter().enumerate() {
            let n = comp.0[axis];
            if n > 0 {
                if !name.is_empty() {
                    name.push('_');
                }
                name.push_str(label);
                name.push_str(&n.to_string());
            }
        }
        if name.is_empty() {
            name.push('0');
        }
        name
    }
}

/// A point in composition space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Composition(pub [u32; N_AXES]);

impl Composition {
    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

/// A half-open interval `[begin, end)` along one composition axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub begin: u32,
    pub end: u32,
}

impl Interval {
    pub fn point(v: u32) -> Self {
        Self { begin: v, end: v + 1 }
    }

    pub fn new(begin: u32, end: u32) -> Self {
        debug_assert!(end > begin);
        Self { begin, end }
    }

    pub fn width(&self) -> u32 {
        self.end - self.begin
    }

    /// Mid-point of the tile along this axis.
    pub fn mid(&self) -> f64 {
        (self.end as f64 - 1.0 + self.begin as f64) / 2.0
    }

    pub fn contains(&self, v: u32) -> bool {
        v >= self.begin && v < self.end
    }
}

/// An axis-aligned tile in composition space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region(pub [Interval; N_AXES]);

impl Region {
    /// The width-1 region of a single composition.
    pub fn single(comp: Composition) -> Self {
        let mut axes = [Interval::point(0); N_AXES];
        for (axis, iv) in axes.iter_mut().enumerate() {
            *iv = Interval::point(comp.0[axis]);
        }
        Self(axes)
    }

    /// The lower corner of the tile.
    pub fn origin(&self) -> Composition {
        let mut comp = Composition::default();
        for (axis, iv) in self.0.iter().enumerate() {
            comp.0[axis] = iv.begin;
        }
        comp
    }

    /// Number of lattice compositions covered by the tile.
    pub fn volume(&self) -> f64 {
        self.0.iter().map(|iv| iv.width() as f64).product()
    }

    pub fn contains(&self, comp: &Composition) -> bool {
        self.0
            .iter()
            .zip(comp.0.iter())
            .all(|(iv, &v)| iv.contains(v))
    }

    pub fn is_grouped(&self) -> bool {
        self.0.iter().any(|iv| iv.width() > 1)
    }

    /// Average total content of the tile, summed over axes.
    pub fn mean_size(&self) -> f64 {
        self.0.iter().map(Interval::mid).sum()
    }
}

/// One species tracked by the network.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: ClusterId,
    pub region: Region,
    /// Reaction (capture) radius in nm.
    pub radius: f64,
    /// Diffusion pre-factor in nm^2/s; zero for immobile clusters.
    pub diffusion_factor: f64,
    /// Migration energy in eV.
    pub migration_energy: f64,
    /// Formation energy in eV, feeding binding energies.
    pub formation_energy: f64,
    /// Anisotropy ratio of the mobile cluster, used by the Zr capture
    /// laws; 1.0 elsewhere.
    pub anisotropy: f64,
}

impl Cluster {
    pub fn composition(&self) -> Composition {
        self.region.origin()
    }

    pub fn is_mobile(&self) -> bool {
        self.diffusion_factor > 0.0
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster {}", self.id)
    }
}
