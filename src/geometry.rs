//! Spatial grid and domain decomposition.
//!
//! The X direction carries a non-uniform vertex grid of length `nX + 2`
//! (one ghost vertex on each end); a grid point `xi` lives in the cell
//! between vertices `xi` and `xi + 1`. Y and Z are uniform with constant
//! steps. Each process owns a contiguous box of grid points with a
//! one-deep ghost layer all around, supplied by the integrator's
//! decomposition.

use nalgebra::Point3;

use crate::error::{Error, Result};

/// Position of a grid point in physical space (nm).
pub type GridPosition = Point3<f64>;

/// Kind of X grid produced by [`Grid::generate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    /// Constant step `hX` everywhere.
    Uniform,
    /// Step `hX / 4` for the first cells past the surface, linearly
    /// coarsened back to `hX` over the following cells.
    RefinedSurface,
}

/// The non-uniform X grid: a monotonically increasing vertex vector.
#[derive(Debug, Clone)]
pub struct Grid {
    vertices: Vec<f64>,
}

const REFINED_CELLS: usize = 10;
const RAMP_CELLS: usize = 10;

impl Grid {
    /// Wrap an explicit vertex vector of length `nX + 2`.
    pub fn from_vertices(vertices: Vec<f64>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(Error::InvalidGridGeometry {
                index: 0,
                left: f64::NAN,
                right: f64::NAN,
            });
        }
        for (i, pair) in vertices.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(Error::InvalidGridGeometry {
                    index: i,
                    left: pair[0],
                    right: pair[1],
                });
            }
        }
        Ok(Self { vertices })
    }

    /// Generate the X grid for `nx` points with nominal step `hx`,
    /// refined around the initial surface index when asked to.
    pub fn generate(nx: usize, hx: f64, surface: usize, kind: GridKind) -> Result<Self> {
        if hx <= 0.0 {
            return Err(Error::InvalidGridGeometry {
                index: 0,
                left: 0.0,
                right: hx,
            });
        }
        let mut vertices = Vec::with_capacity(nx + 2);
        let mut x = 0.0;
        vertices.push(x);
        for cell in 0..nx + 1 {
            let step = match kind {
                GridKind::Uniform => hx,
                GridKind::RefinedSurface => {
                    // Fine cells just past the surface, then a linear ramp
                    // back to the nominal step.
                    if cell <= surface {
                        hx
                    } else {
                        let past = cell - surface - 1;
                        if past < REFINED_CELLS {
                            hx / 4.0
                        } else if past < REFINED_CELLS + RAMP_CELLS {
                            let t = (past - REFINED_CELLS + 1) as f64 / RAMP_CELLS as f64;
                            hx / 4.0 + t * (hx - hx / 4.0)
                        } else {
                            hx
                        }
                    }
                }
            };
            x += step;
            vertices.push(x);
        }
        Self::from_vertices(vertices)
    }

    /// Number of grid points (`nX`), vertices minus the two ghosts.
    pub fn n_points(&self) -> usize {
        self.vertices.len() - 2
    }

    pub fn vertices(&self) -> &[f64] {
        &self.vertices
    }

    /// Center of the cell holding point `xi`.
    pub fn cell_center(&self, xi: usize) -> f64 {
        (self.vertices[xi] + self.vertices[xi + 1]) / 2.0
    }

    /// Width of the cell holding point `xi`.
    pub fn cell_width(&self, xi: usize) -> f64 {
        self.vertices[xi + 1] - self.vertices[xi]
    }

    /// Left edge of the material at a given surface index.
    pub fn surface_edge(&self, surface: usize) -> f64 {
        self.vertices[surface + 1]
    }

    /// Depth of point `xi` below the surface.
    pub fn depth(&self, xi: usize, surface: usize) -> f64 {
        self.cell_center(xi) - self.surface_edge(surface)
    }

    /// Fractional position of point `xi` between the surface and the right
    /// boundary, as handed to temperature handlers. `xi` may be the left
    /// ghost (-1).
    pub fn depth_fraction(&self, xi: i64, surface: usize) -> f64 {
        let edge = self.surface_edge(surface);
        let span = self.vertices[self.vertices.len() - 1] - edge;
        let pos = if xi < 0 {
            self.vertices[0] - edge
        } else {
            self.cell_center(xi as usize) - edge
        };
        pos / span
    }

    /// Step sizes to the left and right of point `xi`, derived from the
    /// neighbor vertices. `xi` ranges over `[-1, nX]` to cover the ghost
    /// sweep.
    pub fn steps(&self, xi: i64) -> (f64, f64) {
        let g = &self.vertices;
        let nx = self.n_points() as i64;
        if xi - 1 >= 0 && xi < nx {
            let i = xi as usize;
            ((g[i + 1] - g[i - 1]) / 2.0, (g[i + 2] - g[i]) / 2.0)
        } else if xi == -1 {
            (0.0, (g[1] + g[0]) / 2.0)
        } else if xi - 1 < 0 {
            let i = xi as usize;
            ((g[i + 1] + g[i]) / 2.0, (g[i + 2] - g[i]) / 2.0)
        } else {
            let i = xi as usize;
            ((g[i + 1] - g[i - 1]) / 2.0, (g[i + 1] - g[i]) / 2.0)
        }
    }
}

/// Global extent of the structured grid: `nX` non-uniform points in X,
/// uniform Y and Z with constant steps. 1D runs use `ny = nz = 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainShape {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub hy: f64,
    pub hz: f64,
}

impl DomainShape {
    pub fn new(nx: usize, ny: usize, nz: usize, hy: f64, hz: f64) -> Self {
        Self { nx, ny, nz, hy, hz }
    }

    /// Spatial dimensionality implied by the transverse extents.
    pub fn dim(&self) -> usize {
        1 + usize::from(self.ny > 1) + usize::from(self.nz > 1)
    }
}

/// The contiguous box of grid points owned by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalBox {
    pub xs: usize,
    pub xm: usize,
    pub ys: usize,
    pub ym: usize,
    pub zs: usize,
    pub zm: usize,
}

impl LocalBox {
    /// A single-process box covering the whole grid.
    pub fn whole(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            xs: 0,
            xm: nx,
            ys: 0,
            ym: ny,
            zs: 0,
            zm: nz,
        }
    }

    pub fn owns(&self, xi: i64, yj: i64, zk: i64) -> bool {
        xi >= self.xs as i64
            && xi < (self.xs + self.xm) as i64
            && yj >= self.ys as i64
            && yj < (self.ys + self.ym) as i64
            && zk >= self.zs as i64
            && zk < (self.zs + self.zm) as i64
    }

    pub fn n_owned(&self) -> usize {
        self.xm * self.ym * self.zm
    }
}

/// Surface index per transverse column. For 1D this is a single entry,
/// for 2D an `nY` column of entries, for 3D the full `nY x nZ` matrix.
/// Cells to the left of the surface are vacuum and excluded from assembly.
#[derive(Debug, Clone)]
pub struct SurfacePosition {
    index: Vec<Vec<usize>>,
}

impl SurfacePosition {
    /// Flat surface at index `pos` everywhere.
    pub fn flat(ny: usize, nz: usize, pos: usize) -> Self {
        Self {
            index: vec![vec![pos; nz]; ny],
        }
    }

    pub fn from_matrix(index: Vec<Vec<usize>>) -> Self {
        Self { index }
    }

    pub fn get(&self, yj: usize, zk: usize) -> usize {
        self.index[yj][zk]
    }

    pub fn set(&mut self, yj: usize, zk: usize, pos: usize) {
        self.index[yj][zk] = pos;
    }

    pub fn matrix(&self) -> &Vec<Vec<usize>> {
        &self.index
    }

    pub fn ny(&self) -> usize {
        self.index.len()
    }

    pub fn nz(&self) -> usize {
        self.index[0].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_uniform_grid_steps() {
        let grid = Grid::generate(4, 1.0, 0, GridKind::Uniform).unwrap();
        assert_eq!(grid.n_points(), 4);
        assert_eq!(grid.vertices().len(), 6);
        // Interior point.
        let (l, r) = grid.steps(2);
        assert_ulps_eq!(l, 1.0);
        assert_ulps_eq!(r, 1.0);
        // Left ghost has no left step.
        let (l, r) = grid.steps(-1);
        assert_ulps_eq!(l, 0.0);
        assert_ulps_eq!(r, 0.5);
    }

    #[test]
    fn test_non_monotone_grid_is_rejected() {
        let err = Grid::from_vertices(vec![0.0, 1.0, 1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::InvalidGridGeometry { index: 1, .. }
        ));
    }

    #[test]
    fn test_refined_grid_is_finer_past_the_surface() {
        let grid = Grid::generate(30, 1.0, 0, GridKind::RefinedSurface).unwrap();
        let first = grid.cell_width(1);
        let last = grid.cell_width(29);
        assert!(first < last);
        assert_ulps_eq!(first, 0.25);
        assert_ulps_eq!(last, 1.0);
    }

    #[test]
    fn test_surface_position_shapes() {
        let mut surf = SurfacePosition::flat(3, 2, 1);
        assert_eq!(surf.get(2, 1), 1);
        surf.set(0, 0, 4);
        assert_eq!(surf.get(0, 0), 4);
        assert_eq!(surf.get(1, 0), 1);
    }

    proptest! {
        #[test]
        fn prop_generated_grids_are_monotone(
            nx in 2usize..64,
            hx in 1e-3f64..10.0,
            surface in 0usize..4,
            refined: bool,
        ) {
            let kind = if refined { GridKind::RefinedSurface } else { GridKind::Uniform };
            let grid = Grid::generate(nx, hx, surface, kind).unwrap();
            for pair in grid.vertices().windows(2) {
                prop_assert!(pair[1] > pair[0]);
            }
        }

        #[test]
        fn prop_steps_stay_positive_on_the_right(nx in 3usize..32, xi in 0i64..32) {
            prop_assume!(xi <= nx as i64);
            let grid = Grid::generate(nx, 0.5, 0, GridKind::Uniform).unwrap();
            let (l, r) = grid.steps(xi);
            prop_assert!(r > 0.0);
            prop_assert!(l >= 0.0);
        }
    }
}
