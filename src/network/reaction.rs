//! Reactions between clusters and their grouping coefficients.
//!
//! Reactions over region clusters carry a coefficient tensor
//! `coefs[i][j][d][k]` indexed by (distance axis of reactant 0, distance
//! axis of reactant 1, derivative target, distance axis of the target)
//! so that the average-rate law over a tile is exact under grouping. The
//! coefficients are closed-form first/second/third-order sums over the
//! integer lattice intersection of the reactant and product tiles; index 0
//! is the zeroth order, indices 1..5 are the distances along the first
//! four composition axes.

use crate::network::cluster::{ClusterId, Interval, Region, INVALID_CLUSTER};

/// `coefs[i][j][d][k]`: i, j, k in 0..5, d in {flux, d/d_reactant0,
/// d/d_reactant1}.
pub type CoefTensor = Box<[[[[f64; 5]; 3]; 5]; 5]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    /// `A + B -> P` (one or two products, or none for recombination).
    Production,
    /// `A -> P1 + P2` with a binding-energy-dependent rate.
    Dissociation,
    /// `A -> 0` with a material sink strength.
    Sink,
}

/// One reaction of the network's fixed reaction list. Cross-references
/// are dense ids into the cluster pool.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub kind: ReactionKind,
    pub reactants: [ClusterId; 2],
    pub products: [ClusterId; 2],
    /// Binding energy in eV; only meaningful for dissociations.
    pub binding_energy: f64,
    pub coefs: CoefTensor,
}

impl Reaction {
    pub fn production(a: ClusterId, b: ClusterId, products: &[ClusterId], coefs: CoefTensor) -> Self {
        let mut prods = [INVALID_CLUSTER; 2];
        for (slot, &p) in prods.iter_mut().zip(products.iter()) {
            *slot = p;
        }
        Self {
            kind: ReactionKind::Production,
            reactants: [a, b],
            products: prods,
            binding_energy: 0.0,
            coefs,
        }
    }

    pub fn dissociation(parent: ClusterId, p1: ClusterId, p2: ClusterId, binding_energy: f64, coefs: CoefTensor) -> Self {
        Self {
            kind: ReactionKind::Dissociation,
            reactants: [parent, INVALID_CLUSTER],
            products: [p1, p2],
            binding_energy,
            coefs,
        }
    }

    pub fn sink(a: ClusterId) -> Self {
        Self {
            kind: ReactionKind::Sink,
            reactants: [a, INVALID_CLUSTER],
            products: [INVALID_CLUSTER; 2],
            binding_energy: 0.0,
            coefs: trivial_coefs(),
        }
    }

    /// Zeroth-order grouping coefficient (the tile overlap).
    pub fn overlap(&self) -> f64 {
        self.coefs[0][0][0][0]
    }
}

/// Tensor of a width-1 reaction: overlap 1, no moment coupling.
pub fn trivial_coefs() -> CoefTensor {
    let mut c = Box::new([[[[0.0f64; 5]; 3]; 5]; 5]);
    c[0][0][0][0] = 1.0;
    c
}

/// `sum_{l=a..b} (l - mu)`, zero on an empty range.
pub fn first_order_sum(a: i64, b: i64, mu: f64) -> f64 {
    if b < a {
        return 0.0;
    }
    let (a, b) = (a as f64, b as f64);
    (b * (b + 1.0) / 2.0 - a * (a - 1.0) / 2.0) - mu * (b - a + 1.0)
}

/// `sum_{l=a..b} (l - mu)^2`, zero on an empty range.
pub fn second_order_sum(a: i64, b: i64, mu: f64) -> f64 {
    if b < a {
        return 0.0;
    }
    let (a, b) = (a as f64, b as f64);
    (b * (b + 1.0) * (2.0 * b + 1.0) / 6.0 - a * (a - 1.0) * (2.0 * a - 1.0) / 6.0)
        - 2.0 * mu * (b * (b + 1.0) / 2.0 - a * (a - 1.0) / 2.0)
        + mu * mu * (b - a + 1.0)
}

/// `sum_{l=a..b} (l - mu)(l + off - nu)`, zero on an empty range. Used
/// when the target distance is measured around a different tile center.
pub fn second_order_offset_sum(a: i64, b: i64, mu: f64, nu: f64, off: f64) -> f64 {
    if b < a {
        return 0.0;
    }
    let (a, b) = (a as f64, b as f64);
    (b * (b + 1.0) * (2.0 * b + 1.0) / 6.0 - a * (a - 1.0) * (2.0 * a - 1.0) / 6.0)
        + (off - nu - mu) * (b * (b + 1.0) / 2.0 - a * (a - 1.0) / 2.0)
        + mu * (nu - off) * (b - a + 1.0)
}

fn begin(iv: &Interval) -> i64 {
    iv.begin as i64
}

fn end(iv: &Interval) -> i64 {
    iv.end as i64
}

/// Per-axis width of a production `cl0 + cl1 -> prod`: the number of tile
/// pairs for which the reaction is possible along this axis. For
/// `X_1 + X_[3,5) -> X_[5,7)` only 4 + 1 = 5 works so the width is 1;
/// `X_[3,5) + X_[5,7) -> X_[9,11)` allows 3+6, 4+5, 4+6 so the width is 3.
fn production_width(cl0: &Interval, cl1: &Interval, prod: &Interval) -> i64 {
    let mut width = 0;
    for j in begin(cl0)..end(cl0) {
        width += (end(prod) - 1).min(end(cl1) - 1 + j) - begin(prod).max(begin(cl1) + j) + 1;
    }
    width
}

/// Per-axis width of a dissociation `cl -> prod1 + prod2`.
fn dissociation_width(cl: &Interval, prod1: &Interval, prod2: &Interval) -> i64 {
    let mut width = 0;
    for j in begin(prod1)..end(prod1) {
        width += (end(cl) - 1).min(end(prod2) - 1 + j) - begin(cl).max(begin(prod2) + j) + 1;
    }
    width
}

/// Total overlap of a production, or `None` when the reaction is not
/// possible over these tiles. Feasibility is checked on every axis; the
/// moment coefficients only range over the first four.
pub fn production_overlap(cl0: &Region, cl1: &Region, prod: &Region) -> Option<f64> {
    let mut n_overlap = 1i64;
    for axis in 0..crate::network::cluster::N_AXES {
        let w = production_width(&cl0.0[axis], &cl1.0[axis], &prod.0[axis]);
        if w <= 0 {
            return None;
        }
        n_overlap *= w;
    }
    Some(n_overlap as f64)
}

/// Grouping coefficients of a production `cl0 + cl1 -> prod`. Marginal
/// (single-axis) coefficients are filled first so the composite branches
/// always read finished entries.
pub fn production_coefs(cl0: &Region, cl1: &Region, prod: &Region) -> Option<CoefTensor> {
    let nov = production_overlap(cl0, cl1, prod)?;
    let mut c = Box::new([[[[0.0f64; 5]; 3]; 5]; 5]);
    c[0][0][0][0] = nov;

    // First-order marginals along each distance axis.
    for i in 1..5 {
        let ax = i - 1;
        let (r0, r1, p) = (&cl0.0[ax], &cl1.0[ax], &prod.0[ax]);
        for l in begin(r1)..end(r1) {
            c[i][0][0][0] += first_order_sum(
                (begin(p) - l).max(begin(r0)),
                (end(p) - 1 - l).min(end(r0) - 1),
                r0.mid(),
            );
        }
        for l in begin(r0)..end(r0) {
            c[0][i][0][0] += first_order_sum(
                (begin(p) - l).max(begin(r1)),
                (end(p) - 1 - l).min(end(r1) - 1),
                r1.mid(),
            );
        }
    }

    // Remaining flux coefficients.
    for i in 1..5 {
        for j in 1..5 {
            if i == j {
                let ax = i - 1;
                let (r0, r1, p) = (&cl0.0[ax], &cl1.0[ax], &prod.0[ax]);
                for l in begin(r0)..end(r0) {
                    c[i][j][0][0] += (l as f64 - r0.mid())
                        * first_order_sum(
                            (begin(p) - l).max(begin(r1)),
                            (end(p) - 1 - l).min(end(r1) - 1),
                            r1.mid(),
                        );
                }
            } else {
                c[i][j][0][0] = c[i][0][0][0] * c[0][j][0][0] / nov;
            }
        }
    }

    // Product partials.
    for i in 0..5 {
        for j in 0..5 {
            for k in 1..5 {
                let ax = k - 1;
                if i + j == 0 {
                    let (r1, p) = (&cl1.0[ax], &prod.0[ax]);
                    for l in begin(&cl0.0[ax])..end(&cl0.0[ax]) {
                        c[0][0][0][k] += first_order_sum(
                            begin(p).max(begin(r1) + l),
                            (end(p) - 1).min(end(r1) - 1 + l),
                            p.mid(),
                        );
                    }
                } else if j == 0 {
                    if i == k {
                        let (r0, p) = (&cl0.0[ax], &prod.0[ax]);
                        for l in begin(&cl1.0[ax])..end(&cl1.0[ax]) {
                            c[i][0][0][k] += second_order_offset_sum(
                                (begin(p) - l).max(begin(r0)),
                                (end(p) - 1 - l).min(end(r0) - 1),
                                r0.mid(),
                                p.mid(),
                                l as f64,
                            );
                        }
                    } else {
                        c[i][0][0][k] = c[i][0][0][0] * c[0][0][0][k] / nov;
                    }
                } else if i == 0 {
                    if j == k {
                        let (r1, p) = (&cl1.0[ax], &prod.0[ax]);
                        for l in begin(&cl0.0[ax])..end(&cl0.0[ax]) {
                            c[0][j][0][k] += second_order_offset_sum(
                                (begin(p) - l).max(begin(r1)),
                                (end(p) - 1 - l).min(end(r1) - 1),
                                r1.mid(),
                                p.mid(),
                                l as f64,
                            );
                        }
                    } else {
                        c[0][j][0][k] = c[0][j][0][0] * c[0][0][0][k] / nov;
                    }
                } else if i == j && j == k {
                    let (r0, r1, p) = (&cl0.0[ax], &cl1.0[ax], &prod.0[ax]);
                    for l in begin(r0)..end(r0) {
                        c[i][j][0][k] += (l as f64 - r0.mid())
                            * second_order_offset_sum(
                                (begin(p) - l).max(begin(r1)),
                                (end(p) - 1 - l).min(end(r1) - 1),
                                r1.mid(),
                                p.mid(),
                                l as f64,
                            );
                    }
                } else if j == k {
                    c[i][j][0][k] = c[i][0][0][0] * c[0][j][0][k] / nov;
                } else if i == k {
                    c[i][j][0][k] = c[0][j][0][0] * c[i][0][0][k] / nov;
                } else {
                    c[i][j][0][k] = c[i][0][0][0] * c[0][j][0][0] * c[0][0][0][k] / nov;
                }
            }
        }
    }

    // First reactant partials.
    for i in 0..5 {
        for j in 0..5 {
            for k in 1..5 {
                let ax = k - 1;
                if i + j == 0 {
                    c[0][0][1][k] = c[k][0][0][0];
                } else if j == 0 {
                    if i == k {
                        let (r0, p) = (&cl0.0[ax], &prod.0[ax]);
                        for l in begin(&cl1.0[ax])..end(&cl1.0[ax]) {
                            c[i][0][1][k] += second_order_sum(
                                (begin(p) - l).max(begin(r0)),
                                (end(p) - 1 - l).min(end(r0) - 1),
                                r0.mid(),
                            );
                        }
                    } else {
                        c[i][0][1][k] = c[i][0][0][0] * c[k][0][0][0] / nov;
                    }
                } else if i == 0 {
                    c[0][j][1][k] = c[k][j][0][0];
                } else if i == j && j == k {
                    let (r0, r1, p) = (&cl0.0[ax], &cl1.0[ax], &prod.0[ax]);
                    for l in begin(r0)..end(r0) {
                        let d = l as f64 - r0.mid();
                        c[i][j][1][k] += d
                            * d
                            * first_order_sum(
                                (begin(p) - l).max(begin(r1)),
                                (end(p) - 1 - l).min(end(r1) - 1),
                                r1.mid(),
                            );
                    }
                } else if i == k {
                    c[i][j][1][k] = c[0][j][0][0] * c[i][0][1][k] / nov;
                } else if j == k {
                    c[i][j][1][k] = c[i][0][0][0] * c[0][j][1][k] / nov;
                } else {
                    c[i][j][1][k] = c[i][0][0][0] * c[0][j][0][0] * c[k][0][0][0] / nov;
                }
            }
        }
    }

    // Second reactant partials.
    for i in 0..5 {
        for j in 0..5 {
            for k in 1..5 {
                let ax = k - 1;
                if i + j == 0 {
                    c[0][0][2][k] = c[0][k][0][0];
                } else if i == 0 {
                    if j == k {
                        let (r1, p) = (&cl1.0[ax], &prod.0[ax]);
                        for l in begin(&cl0.0[ax])..end(&cl0.0[ax]) {
                            c[0][j][2][k] += second_order_sum(
                                (begin(p) - l).max(begin(r1)),
                                (end(p) - 1 - l).min(end(r1) - 1),
                                r1.mid(),
                            );
                        }
                    } else {
                        c[0][j][2][k] = c[0][j][0][0] * c[0][k][0][0] / nov;
                    }
                } else if j == 0 {
                    c[i][0][2][k] = c[i][k][0][0];
                } else if i == j && j == k {
                    let (r0, r1, p) = (&cl0.0[ax], &cl1.0[ax], &prod.0[ax]);
                    for l in begin(r1)..end(r1) {
                        let d = l as f64 - r1.mid();
                        c[i][j][2][k] += d
                            * d
                            * first_order_sum(
                                (begin(p) - l).max(begin(r0)),
                                (end(p) - 1 - l).min(end(r0) - 1),
                                r0.mid(),
                            );
                    }
                } else if i == k {
                    c[i][j][2][k] = c[0][j][0][0] * c[i][0][2][k] / nov;
                } else if j == k {
                    c[i][j][2][k] = c[i][0][0][0] * c[0][j][2][k] / nov;
                } else {
                    c[i][j][2][k] = c[i][0][0][0] * c[0][j][0][0] * c[0][k][0][0] / nov;
                }
            }
        }
    }

    Some(c)
}

/// Grouping coefficients of a dissociation `cl -> prod1 + prod2`: one
/// overlap computation over the phase space, then a flat pass over the
/// distance axes.
pub fn dissociation_coefs(cl: &Region, prod1: &Region, prod2: &Region) -> Option<CoefTensor> {
    let mut n_overlap = 1i64;
    for axis in 0..crate::network::cluster::N_AXES {
        let w = dissociation_width(&cl.0[axis], &prod1.0[axis], &prod2.0[axis]);
        if w <= 0 {
            return None;
        }
        n_overlap *= w;
    }
    let nov = n_overlap as f64;
    let mut c = Box::new([[[[0.0f64; 5]; 3]; 5]; 5]);
    c[0][0][0][0] = nov;

    // Reactant marginals.
    for i in 1..5 {
        let ax = i - 1;
        let (r, p2) = (&cl.0[ax], &prod2.0[ax]);
        for l in begin(&prod1.0[ax])..end(&prod1.0[ax]) {
            c[i][0][0][0] += first_order_sum(
                begin(r).max(begin(p2) + l),
                (end(r) - 1).min(end(p2) - 1 + l),
                r.mid(),
            );
        }
    }

    for i in 0..5 {
        // Reactant partials.
        for k in 1..5 {
            let ax = k - 1;
            if i == 0 {
                c[0][0][0][k] = c[k][0][0][0];
            } else if i == k {
                let (r, p2) = (&cl.0[ax], &prod2.0[ax]);
                for l in begin(&prod1.0[ax])..end(&prod1.0[ax]) {
                    c[i][0][0][k] += second_order_sum(
                        begin(r).max(begin(p2) + l),
                        (end(r) - 1).min(end(p2) - 1 + l),
                        r.mid(),
                    );
                }
            } else {
                c[i][0][0][k] = c[i][0][0][0] * c[k][0][0][0] / nov;
            }
        }

        // First product partials.
        for k in 1..5 {
            let ax = k - 1;
            if i == 0 {
                let (r, p1) = (&cl.0[ax], &prod1.0[ax]);
                for l in begin(&prod2.0[ax])..end(&prod2.0[ax]) {
                    c[0][0][1][k] += first_order_sum(
                        (begin(r) - l).max(begin(p1)),
                        (end(r) - 1 - l).min(end(p1) - 1),
                        p1.mid(),
                    );
                }
            } else if i == k {
                let (r, p1) = (&cl.0[ax], &prod1.0[ax]);
                for l in begin(&prod2.0[ax])..end(&prod2.0[ax]) {
                    c[i][0][1][k] += second_order_offset_sum(
                        begin(r).max(begin(p1) + l),
                        (end(r) - 1).min(end(p1) - 1 + l),
                        r.mid(),
                        p1.mid(),
                        -(l as f64),
                    );
                }
            } else {
                c[i][0][1][k] = c[i][0][0][0] * c[0][0][1][k] / nov;
            }
        }

        // Second product partials.
        for k in 1..5 {
            let ax = k - 1;
            if i == 0 {
                let (r, p2) = (&cl.0[ax], &prod2.0[ax]);
                for l in begin(&prod1.0[ax])..end(&prod1.0[ax]) {
                    c[0][0][2][k] += first_order_sum(
                        (begin(r) - l).max(begin(p2)),
                        (end(r) - 1 - l).min(end(p2) - 1),
                        p2.mid(),
                    );
                }
            } else if i == k {
                let (r, p2) = (&cl.0[ax], &prod2.0[ax]);
                for l in begin(&prod1.0[ax])..end(&prod1.0[ax]) {
                    c[i][0][2][k] += second_order_offset_sum(
                        begin(r).max(begin(p2) + l),
                        (end(r) - 1).min(end(p2) - 1 + l),
                        r.mid(),
                        p2.mid(),
                        -(l as f64),
                    );
                }
            } else {
                c[i][0][2][k] = c[i][0][0][0] * c[0][0][2][k] / nov;
            }
        }
    }

    Some(c)
}
