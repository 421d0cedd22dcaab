//! Uranium-dioxide (fuel) network generation: xenon clusters.
//!
//! Small sizes are tracked one by one; above the grouping threshold the
//! sizes are packed into width-doubling region clusters whose degree of
//! freedom is the tile average, exercising the grouping coefficients of
//! the reaction module.

use crate::constants::UO2_ATOMIC_VOLUME;
use crate::network::cluster::{Composition, Interval, Region, SpeciesBasis};
use crate::network::{NetworkBuilder, ReactionNetwork};

/// Largest xenon size tracked individually.
pub const GROUPING_THRESHOLD: u32 = 32;

/// Build the UO2 network for `netParam = maxXe 0 0 0 0`.
pub fn uranium_dioxide(max_xe: u32) -> ReactionNetwork {
    let mut builder = NetworkBuilder::new(SpeciesBasis::Ne, UO2_ATOMIC_VOLUME, 0.0);

    for n in 1..=max_xe.min(GROUPING_THRESHOLD) {
        push_region(&mut builder, Interval::point(n));
    }
    let mut begin = GROUPING_THRESHOLD + 1;
    let mut width = GROUPING_THRESHOLD;
    while begin <= max_xe {
        let end = (begin + width).min(max_xe + 1);
        push_region(&mut builder, Interval::new(begin, end));
        begin = end;
        width *= 2;
    }

    builder.build()
}

fn push_region(builder: &mut NetworkBuilder, sizes: Interval) {
    let mut region = Region::single(Composition::default());
    region.0[0] = sizes;
    let mean = sizes.mid();
    let (d0, em) = if sizes.begin == 1 && sizes.width() == 1 {
        // Only the single gas atom migrates through the lattice.
        (1.0e8, 1.0)
    } else {
        (0.0, 0.0)
    };
    builder.push(region, radius(mean), d0, em, formation_energy(mean), 1.0);
}

fn radius(n: f64) -> f64 {
    0.3 + 0.11 * (n.cbrt() - 1.0)
}

fn formation_energy(n: f64) -> f64 {
    7.0 * n.powf(2.0 / 3.0)
}
