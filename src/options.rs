//! Plain-text run options.
//!
//! The recognized file format is one `key=value` pair per line, with `#`
//! starting a comment. Unrecognized keys are errors, except for
//! `petscArgs` whose value is passed through to the integrator
//! untouched.

use std::path::Path;
use std::str::FromStr;

use num_traits::Num;

use crate::error::{Error, Result};
use crate::geometry::GridKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Material {
    W100,
    W110,
    W111,
    UO2,
    Fe,
    AlphaZr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureKind {
    Constant,
    Profile,
    Heat,
}

/// Which physics processes participate in the assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessFlags {
    pub reaction: bool,
    pub diffusion: bool,
    pub advection: bool,
    pub modified_tm: bool,
    pub attenuation: bool,
    pub nucleation: bool,
}

impl Default for ProcessFlags {
    fn default() -> Self {
        Self {
            reaction: true,
            diffusion: true,
            advection: false,
            modified_tm: false,
            attenuation: false,
            nucleation: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    /// `maxHe maxD maxT maxV maxI` (material-specific meaning).
    pub net_param: [u32; 5],
    pub material: Material,
    pub temperature: TemperatureKind,
    pub start_temp: f64,
    pub grid_type: GridKind,
    pub hx: f64,
    pub surface_advection: bool,
    pub grain_boundaries: Vec<(usize, usize, usize)>,
    pub migration_threshold: f64,
    pub flux_amplitude: f64,
    pub process: ProcessFlags,
    pub initial_v_conc: f64,
    pub fission_yield: f64,
    pub nucleation_rate: f64,
    pub heat_flux: f64,
    /// Integrator pass-through, not interpreted here.
    pub petsc_args: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            net_param: [0; 5],
            material: Material::W100,
            temperature: TemperatureKind::Constant,
            start_temp: 1000.0,
            grid_type: GridKind::Uniform,
            hx: 0.5,
            surface_advection: false,
            grain_boundaries: Vec::new(),
            migration_threshold: f64::INFINITY,
            flux_amplitude: 0.0,
            process: ProcessFlags::default(),
            initial_v_conc: 0.0,
            fission_yield: 0.25,
            nucleation_rate: 0.0,
            heat_flux: 0.0,
            petsc_args: Vec::new(),
        }
    }
}

fn parse_scalar<T: FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::OptionError(format!("invalid value '{value}' for key '{key}'")))
}

fn parse_list<T: FromStr + Num>(value: &str, key: &str) -> Result<Vec<T>> {
    value
        .split_whitespace()
        .map(|token| {
            token
                .parse()
                .map_err(|_| Error::OptionError(format!("invalid entry '{token}' for key '{key}'")))
        })
        .collect()
}

impl Options {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_str(&contents)
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        let mut options = Self::default();
        for line in contents.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::OptionError(format!("malformed line '{line}'")))?;
            options.apply(key.trim(), value.trim())?;
        }
        Ok(options)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "netParam" => {
                let list: Vec<u32> = parse_list(value, key)?;
                if list.len() != 5 {
                    return Err(Error::OptionError(format!(
                        "netParam expects 5 entries, got {}",
                        list.len()
                    )));
                }
                self.net_param.copy_from_slice(&list);
            }
            "material" => {
                self.material = match value {
                    "W100" => Material::W100,
                    "W110" => Material::W110,
                    "W111" => Material::W111,
                    "UO2" => Material::UO2,
                    "Fe" => Material::Fe,
                    "AlphaZr" => Material::AlphaZr,
                    other => {
                        return Err(Error::OptionError(format!("unknown material '{other}'")))
                    }
                };
            }
            "tempHandler" => {
                self.temperature = match value {
                    "constant" => TemperatureKind::Constant,
                    "profile" => TemperatureKind::Profile,
                    "heat" => TemperatureKind::Heat,
                    other => {
                        return Err(Error::OptionError(format!(
                            "unknown temperature handler '{other}'"
                        )))
                    }
                };
            }
            "startTemp" => self.start_temp = parse_scalar(value, key)?,
            "gridType" => {
                self.grid_type = match value {
                    "uniform" => GridKind::Uniform,
                    "nonuniform" => GridKind::RefinedSurface,
                    other => {
                        return Err(Error::OptionError(format!("unknown grid type '{other}'")))
                    }
                };
            }
            "hxGridStep" => self.hx = parse_scalar(value, key)?,
            "surfaceAdvection" => self.surface_advection = parse_scalar(value, key)?,
            "grainBoundaries" => {
                let list: Vec<usize> = parse_list(value, key)?;
                if list.len() % 3 != 0 {
                    return Err(Error::OptionError(
                        "grainBoundaries expects (i, j, k) triplets".to_string(),
                    ));
                }
                self.grain_boundaries = list.chunks(3).map(|c| (c[0], c[1], c[2])).collect();
            }
            "migrationThreshold" => self.migration_threshold = parse_scalar(value, key)?,
            "fluxAmplitude" => self.flux_amplitude = parse_scalar(value, key)?,
            "process" => {
                let mut flags = ProcessFlags {
                    reaction: false,
                    diffusion: false,
                    advection: false,
                    modified_tm: false,
                    attenuation: false,
                    nucleation: false,
                };
                for token in value.split_whitespace() {
                    match token {
                        "reaction" => flags.reaction = true,
                        "diffusion" => flags.diffusion = true,
                        "advection" => flags.advection = true,
                        "modifiedTM" => flags.modified_tm = true,
                        "attenuation" => flags.attenuation = true,
                        "nucleation" => flags.nucleation = true,
                        other => {
                            return Err(Error::OptionError(format!(
                                "unknown process '{other}'"
                            )))
                        }
                    }
                }
                self.process = flags;
            }
            "initialVConc" => self.initial_v_conc = parse_scalar(value, key)?,
            "fissionYield" => self.fission_yield = parse_scalar(value, key)?,
            "nucleationRate" => self.nucleation_rate = parse_scalar(value, key)?,
            "heatFlux" => self.heat_flux = parse_scalar(value, key)?,
            "petscArgs" => {
                self.petsc_args = value.split_whitespace().map(str::to_string).collect();
            }
            other => {
                return Err(Error::OptionError(format!(
                    "unrecognized option key '{other}'"
                )))
            }
        }
        Ok(())
    }
}
