//! A cluster-dynamics simulator core for irradiated materials.
//!
//! Xolotl tracks the concentrations of point-defect and gas-cluster
//! species on a distributed structured grid and assembles, for an
//! external implicit time integrator, the right-hand side and the
//! sparse Jacobian of the spatial operator: diffusion, advection toward
//! sinks, incident particle flux, temperature-dependent reactions and
//! dissociations, and material-specific trap mutation and nucleation.
//!
//! # Crate Layout
//!
//! The [`ReactionNetwork`] owns the cluster catalog and the rate laws;
//! material generators live in [`network::psi`] (tungsten),
//! [`network::ne`] (uranium dioxide) and [`network::zr`]
//! (alpha-zirconium). Each transport or source process is a handler
//! with a fixed capability set (declare connectivity, initialize over
//! the grid, contribute to the RHS, contribute to the Jacobian); the
//! [`SpatialOperator`] driver composes them per grid point and never
//! names a concrete variant.
//!
//! The integrator supplies the domain decomposition ([`LocalBox`]), the
//! halo-exchanged concentration field, a sparse-matrix collaborator
//! ([`JacobianAssembler`]) and the all-reduce ([`Collective`]); the
//! pair of sparsity maps ([`FillMaps`]) produced by `setup` describes
//! the per-point Jacobian coupling.
//!
//! # Example
//!
//! ```rust
//! use xolotl::{DomainShape, LocalBox, NoComm, Options, SpatialOperator};
//!
//! let options = Options::parse_str(
//!     "netParam=2 0 0 1 0\n\
//!      material=W100\n\
//!      startTemp=1000",
//! )
//! .unwrap();
//!
//! // One process owning the whole 1D grid of 8 points.
//! let shape = DomainShape::new(8, 1, 1, 1.0, 1.0);
//! let sub = LocalBox::whole(8, 1, 1);
//! let (mut op, fill) = SpatialOperator::setup(&options, shape, sub, NoComm).unwrap();
//!
//! let stride = op.stride();
//! let mut c = vec![0.0; 10 * 3 * 3 * stride];
//! op.initialize_concentration(&mut c, None).unwrap();
//!
//! let mut f = vec![0.0; 8 * stride];
//! op.rhs(0.0, &c, &mut f).unwrap();
//!
//! // Every cluster couples at least to itself on the diagonal.
//! assert!(fill.dfill.len() >= op.network().dof());
//! ```

#[cfg(test)]
#[macro_use]
extern crate approx;
#[cfg(not(test))]
extern crate approx;

pub mod advection;
pub mod checkpoint;
pub mod constants;
pub mod diffusion;
pub mod error;
pub mod flux;
pub mod geometry;
pub mod network;
pub mod nucleation;
pub mod options;
pub mod solver;
pub mod sparsity;
pub mod temperature;
pub mod trap_mutation;

// API

pub use advection::{AdvectionHandler, SinkKind, TungstenOrientation};
pub use checkpoint::CheckpointData;
pub use diffusion::DiffusionHandler;
pub use error::{Error, Result};
pub use flux::FluxHandler;
pub use geometry::{DomainShape, Grid, GridKind, GridPosition, LocalBox, SurfacePosition};
pub use network::{ne, psi, zr, ReactionNetwork};
pub use nucleation::NucleationHandler;
pub use options::{Material, Options, ProcessFlags, TemperatureKind};
#[cfg(feature = "sprs")]
pub use solver::matrix::TripletAssembler;
pub use solver::matrix::{Collective, GridStencil, JacobianAssembler, NoComm};
pub use solver::SpatialOperator;
pub use sparsity::{FillMaps, SparseFillMap};
pub use temperature::TemperatureHandler;
pub use trap_mutation::TrapMutationHandler;
