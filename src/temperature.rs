//! Temperature handlers: owners of the heat degree of freedom.
//!
//! `T(x, t)` is either constant, interpolated from a time profile, or
//! solved through a diffusive heat equation whose stencil mirrors the
//! diffusion contract but operates on the single heat degree of freedom
//! at index `dof`.

use crate::constants::{TUNGSTEN_HEAT_CAPACITY, TUNGSTEN_HEAT_DIFFUSIVITY};
use crate::geometry::GridPosition;
use crate::sparsity::{add_coupling, SparseFillMap};

/// Piecewise-linear `(t, T)` table.
#[derive(Debug, Clone)]
pub struct TimeProfile {
    times: Vec<f64>,
    temperatures: Vec<f64>,
}

impl TimeProfile {
    pub fn new(points: &[(f64, f64)]) -> Self {
        let mut points = points.to_vec();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            times: points.iter().map(|p| p.0).collect(),
            temperatures: points.iter().map(|p| p.1).collect(),
        }
    }

    fn at(&self, t: f64) -> f64 {
        match self.times.iter().position(|&x| x > t) {
            Some(0) => self.temperatures[0],
            Some(i) => {
                let f = (t - self.times[i - 1]) / (self.times[i] - self.times[i - 1]);
                self.temperatures[i - 1] + f * (self.temperatures[i] - self.temperatures[i - 1])
            }
            None => *self.temperatures.last().unwrap_or(&0.0),
        }
    }
}

#[derive(Debug)]
pub enum TemperatureHandler {
    Constant(f64),
    Profile(TimeProfile),
    HeatEquation(HeatEquation),
}

#[derive(Debug)]
pub struct HeatEquation {
    /// Incident heat flux at the surface, eV nm^-2 s^-1.
    pub heat_flux: f64,
    /// Far-field temperature used as the initial heat value.
    pub bulk_temperature: f64,
    surface: usize,
    local: f64,
    heat_index: usize,
}

impl TemperatureHandler {
    pub fn constant(temperature: f64) -> Self {
        Self::Constant(temperature)
    }

    pub fn profile(points: &[(f64, f64)]) -> Self {
        Self::Profile(TimeProfile::new(points))
    }

    pub fn heat_equation(heat_flux: f64, bulk_temperature: f64) -> Self {
        Self::HeatEquation(HeatEquation {
            heat_flux,
            bulk_temperature,
            surface: 0,
            local: bulk_temperature,
            heat_index: 0,
        })
    }

    /// Declare the heat-row connectivity: same-point always, the
    /// nearest-neighbor coupling only when the heat equation is solved.
    pub fn initialize(&mut self, dof: usize, dfill: &mut SparseFillMap, ofill: &mut SparseFillMap) {
        add_coupling(dfill, dof, dof);
        if let Self::HeatEquation(heat) = self {
            heat.heat_index = dof;
            add_coupling(ofill, dof, dof);
        }
    }

    pub fn update_surface_position(&mut self, surface: usize) {
        if let Self::HeatEquation(heat) = self {
            heat.surface = surface;
        }
    }

    /// Read the heat degree of freedom out of a per-point concentration
    /// row before `get_temperature` is asked for that point.
    pub fn load_point(&mut self, conc: &[f64], dof: usize) {
        if let Self::HeatEquation(heat) = self {
            heat.local = conc[dof];
        }
    }

    /// Evaluate `T(x, t)`.
    pub fn get_temperature(&self, _pos: &GridPosition, t: f64) -> f64 {
        match self {
            Self::Constant(k) => *k,
            Self::Profile(profile) => profile.at(t),
            Self::HeatEquation(heat) => heat.local,
        }
    }

    /// Add the heat-equation contribution for the heat degree of
    /// freedom; a no-op for algebraic handlers.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_temperature(
        &self,
        conc_vector: &[&[f64]],
        updated: &mut [f64],
        hx_left: f64,
        hx_right: f64,
        xi: i64,
        sy: f64,
        _iy: usize,
        sz: f64,
        _iz: usize,
    ) {
        let heat = match self {
            Self::HeatEquation(heat) => heat,
            _ => return,
        };
        let c = heat.heat_index;
        let alpha = TUNGSTEN_HEAT_DIFFUSIVITY;
        let c0 = conc_vector[0][c];

        let mut rate = alpha
            * 2.0
            * (hx_left * conc_vector[2][c] + hx_right * conc_vector[1][c]
                - (hx_left + hx_right) * c0)
            / (hx_left * hx_right * (hx_left + hx_right));
        if conc_vector.len() > 3 {
            rate += alpha * sy * (conc_vector[3][c] - 2.0 * c0 + conc_vector[4][c]);
        }
        if conc_vector.len() > 5 {
            rate += alpha * sz * (conc_vector[5][c] - 2.0 * c0 + conc_vector[6][c]);
        }
        if xi >= 0 && xi as usize == heat.surface {
            // Incident heat deposited over the surface cell.
            rate += heat.heat_flux / (TUNGSTEN_HEAT_CAPACITY * (hx_left + hx_right) / 2.0);
        }
        updated[c] += rate;
    }

    /// Write the heat stencil partials `{center, xL, xR, yB, yT, zF,
    /// zK}` and the heat row index; returns false when this handler has
    /// no stencil.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_partials_for_temperature(
        &self,
        values: &mut [f64],
        index: &mut usize,
        hx_left: f64,
        hx_right: f64,
        _xi: i64,
        sy: f64,
        _iy: usize,
        sz: f64,
        _iz: usize,
        dim: usize,
    ) -> bool {
        let heat = match self {
            Self::HeatEquation(heat) => heat,
            _ => return false,
        };
        *index = heat.heat_index;
        let alpha = TUNGSTEN_HEAT_DIFFUSIVITY;
        values[..1 + 2 * dim].fill(0.0);
        values[0] = -2.0 * alpha / (hx_left * hx_right);
        values[1] = 2.0 * alpha / (hx_left * (hx_left + hx_right));
        values[2] = 2.0 * alpha / (hx_right * (hx_left + hx_right));
        if dim > 1 {
            values[0] -= 2.0 * alpha * sy;
            values[3] = alpha * sy;
            values[4] = alpha * sy;
        }
        if dim > 2 {
            values[0] -= 2.0 * alpha * sz;
            values[5] = alpha * sz;
            values[6] = alpha * sz;
        }
        true
    }
}
