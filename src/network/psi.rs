//! Tungsten (plasma-surface interaction) network generation.
//!
//! Clusters cover the composition box over He, D, T and V plus pure
//! interstitials: the box is enumerated in ascending lexicographic order
//! and the interstitial block comes last. Only single-species clusters
//! are mobile; the transport data below is the tungsten set used by the
//! diffusion and advection handlers.

use itertools::iproduct;

use crate::constants::{TUNGSTEN_ATOMIC_VOLUME, TUNGSTEN_SINK_STRENGTH};
use crate::network::cluster::{Composition, Region, SpeciesBasis};
use crate::network::{NetworkBuilder, ReactionNetwork};

/// Build the tungsten network for `netParam = maxHe maxD maxT maxV maxI`.
pub fn tungsten(max_he: u32, max_d: u32, max_t: u32, max_v: u32, max_i: u32) -> ReactionNetwork {
    let mut builder = NetworkBuilder::new(
        SpeciesBasis::Psi,
        TUNGSTEN_ATOMIC_VOLUME,
        TUNGSTEN_SINK_STRENGTH,
    );

    for (he, d, t, v) in iproduct!(0..=max_he, 0..=max_d, 0..=max_t, 0..=max_v) {
        if he + d + t + v == 0 {
            continue;
        }
        let comp = Composition([he, d, t, v, 0]);
        let (d0, em) = transport(&comp);
        builder.push(
            Region::single(comp),
            radius(&comp),
            d0,
            em,
            formation_energy(&comp),
            1.0,
        );
    }
    for i in 1..=max_i {
        let comp = Composition([0, 0, 0, 0, i]);
        let (d0, em) = transport(&comp);
        builder.push(
            Region::single(comp),
            radius(&comp),
            d0,
            em,
            formation_energy(&comp),
            1.0,
        );
    }

    builder.build()
}

/// Diffusion pre-factor (nm^2/s) and migration energy (eV). Mixed
/// clusters do not migrate.
fn transport(comp: &Composition) -> (f64, f64) {
    let [he, d, t, v, i] = comp.0;
    let total = comp.total();
    if total == he {
        match he {
            1 => (2.9e10, 0.13),
            2 => (3.2e10, 0.2),
            3 => (2.3e10, 0.25),
            4 => (1.7e10, 0.2),
            5 => (5.0e9, 0.12),
            6 => (1.0e9, 0.3),
            7 => (5.0e8, 0.4),
            _ => (0.0, 0.0),
        }
    } else if total == d && d == 1 {
        (2.83e11, 0.38)
    } else if total == t && t == 1 {
        (2.31e11, 0.38)
    } else if total == v && v == 1 {
        (1.8e12, 1.30)
    } else if total == i && i == 1 {
        (8.8e10, 0.013)
    } else {
        (0.0, 0.0)
    }
}

fn spherical_radius(n: u32) -> f64 {
    (3.0 * n as f64 * TUNGSTEN_ATOMIC_VOLUME / (4.0 * std::f64::consts::PI)).cbrt()
}

/// Reaction radius (nm). Vacancy content dominates for bubbles.
fn radius(comp: &Composition) -> f64 {
    let [he, d, t, v, i] = comp.0;
    if v > 0 {
        spherical_radius(v)
    } else if i > 0 {
        spherical_radius(i)
    } else if he > 0 {
        0.25 * (he as f64).cbrt()
    } else {
        0.11 * ((d + t) as f64).cbrt()
    }
}

const HE_FORMATION: [f64; 8] = [6.15, 11.44, 16.35, 21.0, 25.6, 30.1, 34.6, 38.8];

/// Formation energy (eV), feeding the binding energies of dissociations.
fn formation_energy(comp: &Composition) -> f64 {
    let [he, d, t, v, i] = comp.0;
    let total = comp.total();
    if total == he {
        let n = he as usize;
        if n <= HE_FORMATION.len() {
            HE_FORMATION[n - 1]
        } else {
            HE_FORMATION[HE_FORMATION.len() - 1] + 4.5 * (n - HE_FORMATION.len()) as f64
        }
    } else if total == v {
        3.6 + 3.0 * ((v as f64).powf(2.0 / 3.0) - 1.0)
    } else if total == i {
        10.4 + 6.0 * (i as f64 - 1.0)
    } else if total == d + t {
        (d + t) as f64
    } else {
        // Bubble: helium and hydrogen bound to the vacancy core.
        3.6 + 3.0 * ((v as f64).powf(2.0 / 3.0) - 1.0) + 1.2 * he as f64 + 1.0 * (d + t) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::K_BOLTZMANN;

    #[test]
    fn test_psi_full_species_count() {
        // netParam=8 0 0 1 0: the box gives He1..8, V1 and the mixed
        // bubbles; 17 clusters in total.
        let network = tungsten(8, 0, 0, 1, 0);
        assert_eq!(network.dof(), 17);
    }

    #[test]
    fn test_mobile_set() {
        let network = tungsten(8, 0, 0, 1, 1);
        let mobile: Vec<u32> = network
            .clusters()
            .iter()
            .filter(|cl| cl.is_mobile())
            .map(|cl| cl.id)
            .collect();
        // V1 and He1..He7 (He8 and the bubbles are immobile) plus I1.
        assert_eq!(mobile.len(), 9);
        assert!(network.cluster(mobile[0]).composition().0[3] == 1);
    }

    #[test]
    fn test_helium_diffusion_coefficient_at_1000k() {
        let mut network = tungsten(8, 0, 0, 1, 0);
        network.set_temperatures(&[1000.0; 2]);
        let he1 = network
            .find_cluster(&Composition([1, 0, 0, 0, 0]))
            .unwrap()
            .id;
        let expected = 2.9e10 * (-0.13f64 / (K_BOLTZMANN * 1000.0)).exp();
        assert_relative_eq!(
            network.diffusion_coefficient(he1, 0),
            expected,
            max_relative = 1.0e-12
        );
        // Matches the tabulated tungsten value.
        assert_relative_eq!(expected, 6.4154e9, max_relative = 1.0e-4);
    }
}
