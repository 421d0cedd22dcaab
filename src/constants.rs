//! Physical constants and material parameters shared across the core.
//!
//! Lengths are in nanometers, energies in electron-volts, times in seconds,
//! concentrations in nm^-3. Temperature is in Kelvin.

/// Boltzmann constant in eV/K.
pub const K_BOLTZMANN: f64 = 8.617_332_4e-5;

/// Lattice parameter of tungsten (nm).
pub const TUNGSTEN_LATTICE: f64 = 0.317;

/// Atomic volume of tungsten (nm^3), two atoms per bcc cell.
pub const TUNGSTEN_ATOMIC_VOLUME: f64 =
    0.5 * TUNGSTEN_LATTICE * TUNGSTEN_LATTICE * TUNGSTEN_LATTICE;

/// Lattice parameter of uranium dioxide (nm).
pub const UO2_LATTICE: f64 = 0.547;

/// Atomic volume of uranium dioxide (nm^3), four U atoms per fcc cell.
pub const UO2_ATOMIC_VOLUME: f64 = 0.25 * UO2_LATTICE * UO2_LATTICE * UO2_LATTICE;

/// Lattice parameter of alpha-zirconium (nm), basal plane.
pub const ALPHA_ZR_LATTICE: f64 = 0.323;

/// Atomic volume of alpha-zirconium (nm^3).
pub const ALPHA_ZR_ATOMIC_VOLUME: f64 = 0.023;

/// Capture-core radius added to the reactant radii in the production rate
/// (nm).
pub const CORE_RADIUS: f64 = 0.3;

/// Lower bound applied to binding energies so dissociation rates stay
/// finite (eV).
pub const MIN_BINDING_ENERGY: f64 = 0.1;

/// Multiplier applied to the largest network rate to obtain the
/// trap-mutation rate, so mutation outcompetes ordinary reactions.
pub const TRAP_MUTATION_RATE_FACTOR: f64 = 1.0e3;

/// Exponential damping constant of the trap-mutation attenuation,
/// per (nm^-2) of trapped helium.
pub const ATTENUATION_STRENGTH: f64 = 4.0;

/// Depth below the surface within which helium counts as trapped for the
/// attenuation all-reduce (nm).
pub const ATTENUATION_DEPTH: f64 = 2.0;

/// Decay length of the incident-flux implantation profile (nm).
pub const FLUX_PROFILE_LAMBDA: f64 = 0.3;

/// Thermal diffusivity of tungsten (nm^2/s), used by the heat-equation
/// temperature handler.
pub const TUNGSTEN_HEAT_DIFFUSIVITY: f64 = 6.8e13;

/// Volumetric heat capacity of tungsten (eV nm^-3 K^-1).
pub const TUNGSTEN_HEAT_CAPACITY: f64 = 16.0;

/// Dislocation sink strength for mobile defects in tungsten (nm^-2).
pub const TUNGSTEN_SINK_STRENGTH: f64 = 1.0e-4;

/// Temperature change (K) above which the driver republishes temperatures
/// to the network and refreshes derived rates.
pub const TEMPERATURE_THRESHOLD: f64 = 0.1;

/// Cluster size above which a Zr cluster is treated as a dislocation loop.
pub const ZR_LOOP_TRANSITION: u32 = 9;

/// Basal cluster size above which the basal loop leaves the faulted-pyramid
/// regime.
pub const ZR_BASAL_TRANSITION: u32 = 91;
