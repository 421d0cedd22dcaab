//! The spatial operator driver.
//!
//! Orchestrates the per-point assembly of the right-hand side and the
//! sparse Jacobian for the external implicit integrator. Per call the
//! driver sweeps the owned box: a temperature pass over the X ghost
//! range first, the optional attenuation all-reduce, then the owned
//! points where contributions compose in the fixed order incident flux,
//! diffusion, advection, trap mutation, nucleation, network reactions.
//!
//! The RHS point sweep is data-parallel across grid points: every point
//! writes its own output row, so no synchronization is needed. The
//! Jacobian sweep is sequential and deterministic.

pub mod matrix;

use rayon::prelude::*;
use tracing::info;

use crate::advection::{AdvectionHandler, SinkKind, TungstenOrientation};
use crate::checkpoint::CheckpointData;
use crate::constants::{ATTENUATION_DEPTH, TEMPERATURE_THRESHOLD};
use crate::diffusion::DiffusionHandler;
use crate::error::{Error, Result};
use crate::flux::FluxHandler;
use crate::geometry::{DomainShape, Grid, GridPosition, LocalBox, SurfacePosition};
use crate::network::cluster::ClusterId;
use crate::network::{ne, psi, zr, ReactionNetwork};
use crate::nucleation::NucleationHandler;
use crate::options::{Material, Options, TemperatureKind};
use crate::sparsity::{FillMaps, SparseFillMap};
use crate::temperature::TemperatureHandler;
use crate::trap_mutation::TrapMutationHandler;

use matrix::{Collective, GridStencil, JacobianAssembler};

#[derive(Debug)]
pub struct SpatialOperator<R: Collective> {
    network: ReactionNetwork,
    grid: Grid,
    shape: DomainShape,
    sub: LocalBox,
    dim: usize,
    surface: SurfacePosition,

    diffusion: DiffusionHandler,
    advection: Vec<AdvectionHandler>,
    mutation: TrapMutationHandler,
    nucleation: NucleationHandler,
    flux: FluxHandler,
    temp_handler: TemperatureHandler,

    /// Last published temperature per local X point (with ghosts).
    temperature: Vec<f64>,

    fill: FillMaps,
    /// Reaction rows of the merged diagonal fill: (row, flat offset,
    /// columns), used to scatter `compute_all_partials` output.
    dfill_rows: Vec<(usize, usize, Vec<usize>)>,

    left_offset: usize,
    right_offset: usize,
    bottom_offset: usize,
    top_offset: usize,
    front_offset: usize,
    back_offset: usize,
    gb_points: Vec<(usize, usize, usize)>,
    initial_v_conc: f64,
    reactions_enabled: bool,
    reducer: R,
}

impl<R: Collective> SpatialOperator<R> {
    /// Build the network, the grid and every handler from the parsed
    /// options, declare all connectivity, and return the finalized fill
    /// maps alongside the operator.
    pub fn setup(
        options: &Options,
        shape: DomainShape,
        sub: LocalBox,
        reducer: R,
    ) -> Result<(Self, FillMaps)> {
        let [p0, p1, p2, p3, p4] = options.net_param;
        let mut network = match options.material {
            Material::W100 | Material::W110 | Material::W111 => {
                psi::tungsten(p0, p1, p2, p3, p4)
            }
            Material::UO2 => ne::uranium_dioxide(p0),
            Material::AlphaZr => zr::alpha_zirconium(p0, p1, p2),
            Material::Fe => {
                return Err(Error::OptionError(
                    "material Fe requires iron cluster data that is not bundled".to_string(),
                ))
            }
        };
        let dof = network.dof();
        let dim = shape.dim();
        let orientation = match options.material {
            Material::W110 => Some(TungstenOrientation::W110),
            Material::W111 => Some(TungstenOrientation::W111),
            Material::W100 => Some(TungstenOrientation::W100),
            _ => None,
        };

        let surface = SurfacePosition::flat(shape.ny, shape.nz, 0);
        let grid = Grid::generate(shape.nx, options.hx, surface.get(0, 0), options.grid_type)?;

        let mut dfill = SparseFillMap::new();
        let mut ofill = SparseFillMap::new();

        let mut temp_handler = match options.temperature {
            TemperatureKind::Constant => TemperatureHandler::constant(options.start_temp),
            TemperatureKind::Profile => {
                TemperatureHandler::profile(&[(0.0, options.start_temp)])
            }
            TemperatureKind::Heat => {
                TemperatureHandler::heat_equation(options.heat_flux, options.start_temp)
            }
        };
        temp_handler.initialize(dof, &mut dfill, &mut ofill);

        let mut diffusion = if options.process.diffusion {
            DiffusionHandler::new(options.migration_threshold)
        } else {
            DiffusionHandler::dummy()
        };
        diffusion.initialize_off_fill(&network, &mut ofill);

        let mut advection = Vec::new();
        if options.process.advection {
            if options.surface_advection {
                if let Some(orientation) = orientation {
                    let mut handler = AdvectionHandler::surface(orientation);
                    handler.initialize(&network, &mut ofill)?;
                    handler
                        .set_location(grid.surface_edge(surface.get(0, 0)) - grid.vertices()[1]);
                    advection.push(handler);
                }
            }
            if dim > 1 {
                let mut planes: Vec<usize> =
                    options.grain_boundaries.iter().map(|gb| gb.1).collect();
                planes.sort_unstable();
                planes.dedup();
                for yj in planes {
                    let mut handler =
                        AdvectionHandler::grain_boundary(1, yj as f64 * shape.hy);
                    handler.initialize(&network, &mut ofill)?;
                    advection.push(handler);
                }
            }
        }

        let mut mutation = match (options.process.modified_tm, orientation) {
            (true, Some(orientation)) => {
                TrapMutationHandler::tungsten(orientation, options.process.attenuation)
            }
            _ => TrapMutationHandler::dummy(),
        };
        mutation.initialize(&network, &mut dfill)?;
        mutation.initialize_index(&surface, &grid, &sub);

        let mut nucleation =
            if options.process.nucleation && options.material == Material::UO2 {
                NucleationHandler::heterogeneous(options.fission_yield)
            } else {
                NucleationHandler::dummy()
            };
        nucleation.initialize(&network, &mut dfill)?;
        nucleation.update_heterogeneous_nucleation_rate(options.nucleation_rate);
        nucleation.initialize_index(&surface, &grid, &sub);

        let n_partials = network.get_diagonal_fill(&mut dfill);
        network.finalize_partials(&dfill);
        network.set_grid_size(sub.xm + 2);

        diffusion.initialize_diffusion_grid(
            &advection,
            &grid,
            sub.xm,
            sub.xs,
            if dim > 1 { shape.ny } else { 0 },
            shape.hy,
            sub.ys,
            if dim > 2 { shape.nz } else { 0 },
            shape.hz,
            sub.zs,
        );

        let mut flux = FluxHandler::new(options.flux_amplitude);
        flux.initialize(&network, surface.get(0, 0), &grid)?;

        let mut offset = 0usize;
        let mut dfill_rows = Vec::new();
        for (&row, cols) in &dfill {
            if row < dof {
                dfill_rows.push((row, offset, cols.clone()));
            }
            offset += cols.len();
        }

        let fill = FillMaps { dfill, ofill };
        info!(
            dof,
            n_partials,
            diffusing = diffusion.n_diffusing(),
            advection_handlers = advection.len(),
            "spatial operator set up"
        );

        let operator = Self {
            network,
            grid,
            shape,
            sub,
            dim,
            surface,
            diffusion,
            advection,
            mutation,
            nucleation,
            flux,
            temp_handler,
            temperature: vec![0.0; sub.xm + 2],
            fill: fill.clone(),
            dfill_rows,
            left_offset: 1,
            right_offset: 1,
            bottom_offset: 0,
            top_offset: 0,
            front_offset: 0,
            back_offset: 0,
            gb_points: options.grain_boundaries.clone(),
            initial_v_conc: options.initial_v_conc,
            reactions_enabled: options.process.reaction,
            reducer,
        };
        Ok((operator, fill))
    }

    pub fn network(&self) -> &ReactionNetwork {
        &self.network
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn surface(&self) -> &SurfacePosition {
        &self.surface
    }

    pub fn fill(&self) -> &FillMaps {
        &self.fill
    }

    pub fn local_box(&self) -> LocalBox {
        self.sub
    }

    /// Per-point stride: cluster DOF plus the temperature.
    pub fn stride(&self) -> usize {
        self.network.dof() + 1
    }

    fn ghosted_len(&self) -> usize {
        (self.sub.xm + 2) * (self.sub.ym + 2) * (self.sub.zm + 2) * self.stride()
    }

    fn owned_len(&self) -> usize {
        self.sub.n_owned() * self.stride()
    }

    fn conc_at(&self, xi: i64, yj: i64, zk: i64) -> usize {
        let lx = (xi - self.sub.xs as i64 + 1) as usize;
        let ly = (yj - self.sub.ys as i64 + 1) as usize;
        let lz = (zk - self.sub.zs as i64 + 1) as usize;
        ((lz * (self.sub.ym + 2) + ly) * (self.sub.xm + 2) + lx) * self.stride()
    }

    fn conc_row<'a>(&self, c: &'a [f64], xi: i64, yj: i64, zk: i64) -> &'a [f64] {
        let at = self.conc_at(xi, yj, zk);
        &c[at..at + self.stride()]
    }

    /// Stencil rows `[center, left, right, (bottom, top, (front,
    /// back))]` for an owned point.
    fn stencil<'a>(&self, c: &'a [f64], xi: i64, yj: i64, zk: i64) -> Vec<&'a [f64]> {
        let mut rows = vec![
            self.conc_row(c, xi, yj, zk),
            self.conc_row(c, xi - 1, yj, zk),
            self.conc_row(c, xi + 1, yj, zk),
        ];
        if self.dim > 1 {
            rows.push(self.conc_row(c, xi, yj - 1, zk));
            rows.push(self.conc_row(c, xi, yj + 1, zk));
        }
        if self.dim > 2 {
            rows.push(self.conc_row(c, xi, yj, zk - 1));
            rows.push(self.conc_row(c, xi, yj, zk + 1));
        }
        rows
    }

    fn sy(&self) -> f64 {
        if self.dim > 1 {
            1.0 / (self.shape.hy * self.shape.hy)
        } else {
            0.0
        }
    }

    fn sz(&self) -> f64 {
        if self.dim > 2 {
            1.0 / (self.shape.hz * self.shape.hz)
        } else {
            0.0
        }
    }

    fn in_domain(&self, xi: i64, yj: usize, zk: usize, surf: usize) -> bool {
        xi >= (surf + self.left_offset) as i64
            && xi <= (self.shape.nx - 1 - self.right_offset) as i64
            && yj >= self.bottom_offset
            && yj <= self.shape.ny - 1 - self.top_offset
            && zk >= self.front_offset
            && zk <= self.shape.nz - 1 - self.back_offset
    }

    fn is_gb_point(&self, xi: usize, yj: usize, zk: usize) -> bool {
        self.gb_points.contains(&(xi, yj, zk))
    }

    fn owns_x(&self, xi: i64) -> bool {
        xi >= self.sub.xs as i64 && xi < (self.sub.xs + self.sub.xm) as i64
    }

    fn check_rhs_shapes(&self, c: &[f64], f: &[f64]) -> Result<()> {
        if c.len() != self.ghosted_len() {
            return Err(Error::ShapeMismatch {
                expected: self.ghosted_len(),
                actual: c.len(),
            });
        }
        if f.len() != self.owned_len() {
            return Err(Error::ShapeMismatch {
                expected: self.owned_len(),
                actual: f.len(),
            });
        }
        Ok(())
    }

    /// Fill the local field with the initial state: zero concentrations,
    /// the initial vacancy concentration inside the domain, and the
    /// temperature degree of freedom; or the checkpoint contents when
    /// restarting.
    pub fn initialize_concentration(
        &mut self,
        c: &mut [f64],
        restart: Option<&CheckpointData>,
    ) -> Result<()> {
        if c.len() != self.ghosted_len() {
            return Err(Error::ShapeMismatch {
                expected: self.ghosted_len(),
                actual: c.len(),
            });
        }
        let stride = self.stride();
        let dof = self.network.dof();

        if let Some(data) = restart {
            if data.dof != dof {
                return Err(Error::ShapeMismatch {
                    expected: dof,
                    actual: data.dof,
                });
            }
            self.advance_surface(SurfacePosition::from_matrix(data.surface.clone()))?;
        }

        let vacancy = self.network.single_vacancy();
        let sub = self.sub;
        for zk in sub.zs..sub.zs + sub.zm {
            for yj in sub.ys..sub.ys + sub.ym {
                let surf = self.surface.get(yj, zk);
                for xi in (sub.xs as i64 - 1)..=(sub.xs + sub.xm) as i64 {
                    let pos = GridPosition::new(self.grid.depth_fraction(xi, surf), 0.0, 0.0);
                    let temp = self.temp_handler.get_temperature(&pos, 0.0);
                    self.temperature[(xi + 1 - sub.xs as i64) as usize] = temp;
                    if !self.owns_x(xi) {
                        continue;
                    }
                    let at = self.conc_at(xi, yj as i64, zk as i64);
                    let xi = xi as usize;
                    let row = &mut c[at..at + stride];
                    row.fill(0.0);
                    row[dof] = temp;

                    match (restart, vacancy) {
                        (None, Some(v)) if self.in_domain(xi as i64, yj, zk, surf) => {
                            row[v as usize] = self.initial_v_conc;
                        }
                        (Some(data), _) => {
                            row.copy_from_slice(data.point(xi, yj, zk));
                            self.temperature[xi + 1 - sub.xs] = row[dof];
                        }
                        _ => {}
                    }
                }
            }
        }

        self.network.set_temperatures(&self.temperature);
        self.mutation
            .update_trap_mutation_rate(self.network.largest_rate());
        Ok(())
    }

    /// Move the surface and refresh everything that depends on it: the
    /// trap-mutation index, the nucleation mask, the flux profile and
    /// the surface-advection sink location.
    pub fn advance_surface(&mut self, surface: SurfacePosition) -> Result<()> {
        self.surface = surface;
        self.mutation
            .initialize_index(&self.surface, &self.grid, &self.sub);
        self.nucleation
            .initialize_index(&self.surface, &self.grid, &self.sub);
        let surf = self.surface.get(self.sub.ys, self.sub.zs);
        self.flux.initialize(&self.network, surf, &self.grid)?;
        let location = self.grid.surface_edge(surf) - self.grid.vertices()[1];
        for handler in &mut self.advection {
            if matches!(handler.kind(), SinkKind::Surface(_)) {
                handler.set_location(location);
            }
        }
        Ok(())
    }

    /// Ghost sweep in X updating the temperature degree of freedom and
    /// the cached per-point temperatures; republishes to the network
    /// when any owned point moved beyond the threshold.
    fn temperature_pass(&mut self, t: f64, c: &[f64], mut f: Option<&mut [f64]>) {
        let sub = self.sub;
        let stride = self.stride();
        let (sy, sz) = (self.sy(), self.sz());
        for zk in sub.zs..sub.zs + sub.zm {
            for yj in sub.ys..sub.ys + sub.ym {
                let surf = self.surface.get(yj, zk);
                self.temp_handler.update_surface_position(surf);
                let mut dirty = false;
                for xi in (sub.xs as i64 - 1)..=(sub.xs + sub.xm) as i64 {
                    let (hxl, hxr) = self.grid.steps(xi);

                    // Heat condition at the surface point.
                    if xi >= 0 && xi as usize == surf && self.owns_x(xi) {
                        if let Some(f) = f.as_deref_mut() {
                            let stencil = self.stencil(c, xi, yj as i64, zk as i64);
                            let at =
                                (((zk - sub.zs) * sub.ym + (yj - sub.ys)) * sub.xm
                                    + (xi as usize - sub.xs))
                                    * stride;
                            self.temp_handler.compute_temperature(
                                &stencil,
                                &mut f[at..at + stride],
                                hxl,
                                hxr,
                                xi,
                                sy,
                                yj - sub.ys,
                                sz,
                                zk - sub.zs,
                            );
                        }
                    }

                    if !self.in_domain(xi, yj, zk, surf) {
                        continue;
                    }
                    if self.is_gb_point(xi as usize, yj, zk) {
                        continue;
                    }

                    let row = self.conc_row(c, xi, yj as i64, zk as i64);
                    self.temp_handler.load_point(row, stride - 1);
                    let pos =
                        GridPosition::new(self.grid.depth_fraction(xi, surf), 0.0, 0.0);
                    let temp = self.temp_handler.get_temperature(&pos, t);
                    let slot = (xi + 1 - sub.xs as i64) as usize;
                    if (self.temperature[slot] - temp).abs() > TEMPERATURE_THRESHOLD {
                        self.temperature[slot] = temp;
                        dirty = true;
                    }

                    if self.owns_x(xi) {
                        if let Some(f) = f.as_deref_mut() {
                            let stencil = self.stencil(c, xi, yj as i64, zk as i64);
                            let at =
                                (((zk - sub.zs) * sub.ym + (yj - sub.ys)) * sub.xm
                                    + (xi as usize - sub.xs))
                                    * stride;
                            self.temp_handler.compute_temperature(
                                &stencil,
                                &mut f[at..at + stride],
                                hxl,
                                hxr,
                                xi,
                                sy,
                                yj - sub.ys,
                                sz,
                                zk - sub.zs,
                            );
                        }
                    }
                }
                if dirty {
                    self.network.set_temperatures(&self.temperature);
                    self.mutation
                        .update_trap_mutation_rate(self.network.largest_rate());
                }
            }
        }
    }

    /// Sum the near-surface trapped helium over the owned box, share it
    /// with every process, and hand the total to the trap-mutation
    /// attenuation.
    fn attenuation_pass(&mut self, c: &[f64]) {
        if !self.mutation.uses_attenuation() {
            return;
        }
        let sub = self.sub;
        let mut local = 0.0;
        for zk in sub.zs..sub.zs + sub.zm {
            for yj in sub.ys..sub.ys + sub.ym {
                let surf = self.surface.get(yj, zk);
                for xi in sub.xs..sub.xs + sub.xm {
                    if !self.in_domain(xi as i64, yj, zk, surf) {
                        continue;
                    }
                    let depth = self.grid.depth(xi, surf);
                    if depth > ATTENUATION_DEPTH {
                        continue;
                    }
                    let row = self.conc_row(c, xi, yj, zk);
                    local += self.network.total_trapped_atom_concentration(row, 0)
                        * self.grid.cell_width(xi);
                }
            }
        }
        let total = self.reducer.sum_all(local);
        self.mutation.update_disappearing_rate(total);
    }

    /// All per-point contributions for one owned, in-domain point.
    #[allow(clippy::too_many_arguments)]
    fn rhs_point(
        &self,
        t: f64,
        c: &[f64],
        frow: &mut [f64],
        xi: usize,
        yj: usize,
        zk: usize,
        surf: usize,
    ) -> Result<()> {
        let sub = self.sub;
        let (sy, sz) = (self.sy(), self.sz());
        let (hxl, hxr) = self.grid.steps(xi as i64);
        let stencil = self.stencil(c, xi, yj, zk);

        self.flux.compute_incident_flux(t, frow, xi, surf);

        self.diffusion.compute_diffusion(
            &self.network,
            &stencil,
            frow,
            hxl,
            hxr,
            xi - sub.xs,
            sy,
            yj - sub.ys,
            sz,
            zk - sub.zs,
        );

        let pos = GridPosition::new(
            self.grid.cell_center(xi) - self.grid.vertices()[1],
            yj as f64 * self.shape.hy,
            zk as f64 * self.shape.hz,
        );
        for handler in &self.advection {
            handler.compute_advection(
                &self.network,
                &pos,
                &stencil,
                frow,
                hxl,
                hxr,
                xi - sub.xs,
                self.shape.hy,
                yj - sub.ys,
                self.shape.hz,
                zk - sub.zs,
            );
        }

        self.mutation.compute_trap_mutation(
            &self.network,
            stencil[0],
            frow,
            xi - sub.xs,
            yj - sub.ys,
            zk - sub.zs,
        );

        self.nucleation.compute_heterogeneous_nucleation(
            &self.network,
            stencil[0],
            frow,
            xi - sub.xs,
            yj - sub.ys,
            zk - sub.zs,
        );

        if self.reactions_enabled {
            // Marshal a contiguous copy of the local concentrations for
            // the network kernel.
            let local = stencil[0].to_vec();
            self.network
                .compute_all_fluxes(&local, frow, xi + 1 - sub.xs)?;
        }
        Ok(())
    }

    /// Assemble the right-hand side for the owned box. `c` is the local
    /// field with up-to-date ghosts; `f` receives one row per owned
    /// point.
    pub fn rhs(&mut self, t: f64, c: &[f64], f: &mut [f64]) -> Result<()> {
        self.check_rhs_shapes(c, f)?;
        f.fill(0.0);
        let stride = self.stride();
        let sub = self.sub;

        self.temperature_pass(t, c, Some(&mut *f));
        self.attenuation_pass(c);

        for zk in sub.zs..sub.zs + sub.zm {
            for yj in sub.ys..sub.ys + sub.ym {
                let surf = self.surface.get(yj, zk);
                if self.flux.surface() != surf {
                    self.flux.initialize(&self.network, surf, &self.grid)?;
                }
                let location = self.grid.surface_edge(surf) - self.grid.vertices()[1];
                for handler in &mut self.advection {
                    if matches!(handler.kind(), SinkKind::Surface(_)) {
                        handler.set_location(location);
                    }
                }

                let op = &*self;
                let start = ((zk - sub.zs) * sub.ym + (yj - sub.ys)) * sub.xm * stride;
                let slab = &mut f[start..start + sub.xm * stride];
                slab.par_chunks_mut(stride)
                    .enumerate()
                    .try_for_each(|(dx, frow)| {
                        let xi = sub.xs + dx;
                        if !op.in_domain(xi as i64, yj, zk, surf)
                            || op.is_gb_point(xi, yj, zk)
                        {
                            return Ok(());
                        }
                        op.rhs_point(t, c, frow, xi, yj, zk, surf)
                    })?;
            }
        }
        Ok(())
    }

    fn stencil_cols(&self, xi: i64, yj: usize, zk: usize, comp: usize) -> Vec<GridStencil> {
        let (yj, zk) = (yj as i64, zk as i64);
        let mut cols = vec![
            GridStencil::new(xi, yj, zk, comp),
            GridStencil::new(xi - 1, yj, zk, comp),
            GridStencil::new(xi + 1, yj, zk, comp),
        ];
        if self.dim > 1 {
            cols.push(GridStencil::new(xi, yj - 1, zk, comp));
            cols.push(GridStencil::new(xi, yj + 1, zk, comp));
        }
        if self.dim > 2 {
            cols.push(GridStencil::new(xi, yj, zk - 1, comp));
            cols.push(GridStencil::new(xi, yj, zk + 1, comp));
        }
        cols
    }

    /// Assemble the Jacobian through the sparse-matrix collaborator.
    /// Stencil rows are written first, then reactions, then trap
    /// mutation; ordering is deterministic.
    pub fn jacobian(
        &mut self,
        t: f64,
        c: &[f64],
        assembler: &mut dyn JacobianAssembler,
    ) -> Result<()> {
        if c.len() != self.ghosted_len() {
            return Err(Error::ShapeMismatch {
                expected: self.ghosted_len(),
                actual: c.len(),
            });
        }
        let sub = self.sub;
        let dof = self.network.dof();
        let (sy, sz) = (self.sy(), self.sz());
        let stencil_len = 1 + 2 * self.dim;

        self.temperature_pass(t, c, None);

        // One temperature-partial emission per owned point.
        let mut temp_vals = [0.0; 7];
        for zk in sub.zs..sub.zs + sub.zm {
            for yj in sub.ys..sub.ys + sub.ym {
                let surf = self.surface.get(yj, zk);
                self.temp_handler.update_surface_position(surf);
                for xi in sub.xs..sub.xs + sub.xm {
                    let emit = xi == surf
                        || (self.in_domain(xi as i64, yj, zk, surf)
                            && !self.is_gb_point(xi, yj, zk));
                    if !emit {
                        continue;
                    }
                    let (hxl, hxr) = self.grid.steps(xi as i64);
                    let mut heat_index = 0usize;
                    if self.temp_handler.compute_partials_for_temperature(
                        &mut temp_vals,
                        &mut heat_index,
                        hxl,
                        hxr,
                        xi as i64,
                        sy,
                        yj - sub.ys,
                        sz,
                        zk - sub.zs,
                        self.dim,
                    ) {
                        let row = GridStencil::new(xi as i64, yj as i64, zk as i64, heat_index);
                        let cols = self.stencil_cols(xi as i64, yj, zk, heat_index);
                        assembler.add_values(row, &cols, &temp_vals[..stencil_len])?;
                    }
                }
            }
        }

        self.attenuation_pass(c);

        let n_diff = self.diffusion.n_diffusing();
        let mut diff_vals = vec![0.0; stencil_len * n_diff];
        let mut diff_idx: Vec<ClusterId> = vec![0; n_diff];
        let n_advec = self
            .advection
            .iter()
            .map(AdvectionHandler::n_advecting)
            .max()
            .unwrap_or(0);
        let mut advec_vals = vec![0.0; 2 * n_advec];
        let mut advec_idx: Vec<ClusterId> = vec![0; n_advec];
        let mut reaction_vals = vec![0.0; self.network.n_partials()];
        let n_mutating = self.mutation.n_mutating();
        let mut mutation_vals = vec![0.0; 3 * n_mutating];
        let mut mutation_idx = vec![0usize; 3 * n_mutating];

        for zk in sub.zs..sub.zs + sub.zm {
            for yj in sub.ys..sub.ys + sub.ym {
                let surf = self.surface.get(yj, zk);
                let location = self.grid.surface_edge(surf) - self.grid.vertices()[1];
                for handler in &mut self.advection {
                    if matches!(handler.kind(), SinkKind::Surface(_)) {
                        handler.set_location(location);
                    }
                }

                for xi in sub.xs..sub.xs + sub.xm {
                    if !self.in_domain(xi as i64, yj, zk, surf)
                        || self.is_gb_point(xi, yj, zk)
                    {
                        continue;
                    }
                    let (hxl, hxr) = self.grid.steps(xi as i64);
                    let (yi, zi) = (yj as i64, zk as i64);

                    // Diffusion stencil rows.
                    self.diffusion.compute_partials_for_diffusion(
                        &self.network,
                        &mut diff_vals,
                        &mut diff_idx,
                        hxl,
                        hxr,
                        xi - sub.xs,
                        sy,
                        yj - sub.ys,
                        sz,
                        zk - sub.zs,
                    );
                    for (slot, &id) in diff_idx.iter().enumerate() {
                        let comp = id as usize;
                        let row = GridStencil::new(xi as i64, yi, zi, comp);
                        let cols = self.stencil_cols(xi as i64, yj, zk, comp);
                        assembler.add_values(
                            row,
                            &cols,
                            &diff_vals[slot * stencil_len..(slot + 1) * stencil_len],
                        )?;
                    }

                    // Advection stencil rows.
                    let pos = GridPosition::new(
                        self.grid.cell_center(xi) - self.grid.vertices()[1],
                        yj as f64 * self.shape.hy,
                        zk as f64 * self.shape.hz,
                    );
                    for handler in &self.advection {
                        handler.compute_partials_for_advection(
                            &self.network,
                            &pos,
                            &mut advec_vals,
                            &mut advec_idx,
                            hxl,
                            hxr,
                            xi - sub.xs,
                            self.shape.hy,
                            yj - sub.ys,
                            self.shape.hz,
                            zk - sub.zs,
                        );
                        let stencil = handler.stencil_for_advection(&pos);
                        let on_sink = handler.is_point_on_sink(&pos);
                        for (slot, &id) in
                            handler.advecting().iter().enumerate()
                        {
                            let comp = id as usize;
                            let row = GridStencil::new(xi as i64, yi, zi, comp);
                            let cols = if on_sink {
                                [
                                    GridStencil::new(
                                        xi as i64 - stencil[0],
                                        yi - stencil[1],
                                        zi - stencil[2],
                                        comp,
                                    ),
                                    GridStencil::new(
                                        xi as i64 + stencil[0],
                                        yi + stencil[1],
                                        zi + stencil[2],
                                        comp,
                                    ),
                                ]
                            } else {
                                [
                                    GridStencil::new(xi as i64, yi, zi, comp),
                                    GridStencil::new(
                                        xi as i64 + stencil[0],
                                        yi + stencil[1],
                                        zi + stencil[2],
                                        comp,
                                    ),
                                ]
                            };
                            assembler.add_values(
                                row,
                                &cols,
                                &advec_vals[2 * slot..2 * slot + 2],
                            )?;
                        }
                    }

                    // Reaction rows, scattered per the merged diagonal
                    // fill.
                    if self.reactions_enabled {
                        let local = self.conc_row(c, xi, yj, zk).to_vec();
                        self.network.compute_all_partials(
                            &local,
                            &mut reaction_vals,
                            xi + 1 - sub.xs,
                        )?;
                        for (row_id, offset, cols) in &self.dfill_rows {
                            if *row_id >= dof {
                                continue;
                            }
                            let row = GridStencil::new(xi as i64, yi, zi, *row_id);
                            let col_stencils: Vec<GridStencil> = cols
                                .iter()
                                .map(|&col| GridStencil::new(xi as i64, yi, zi, col))
                                .collect();
                            assembler.add_values(
                                row,
                                &col_stencils,
                                &reaction_vals[*offset..*offset + cols.len()],
                            )?;
                        }
                    }

                    // Trap-mutation rows: He, HeV and I against the He
                    // column.
                    let n = self.mutation.compute_partials_for_trap_mutation(
                        &self.network,
                        &mut mutation_vals,
                        &mut mutation_idx,
                        xi - sub.xs,
                        yj - sub.ys,
                        zk - sub.zs,
                    );
                    for i in 0..n {
                        let col =
                            [GridStencil::new(xi as i64, yi, zi, mutation_idx[3 * i])];
                        for slot in 0..3 {
                            let row = GridStencil::new(
                                xi as i64,
                                yi,
                                zi,
                                mutation_idx[3 * i + slot],
                            );
                            assembler.add_values(
                                row,
                                &col,
                                &mutation_vals[3 * i + slot..3 * i + slot + 1],
                            )?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
