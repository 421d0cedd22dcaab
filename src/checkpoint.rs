//! Concentration checkpoints.
//!
//! The on-disk layout mirrors the solver's restart group: per grid point
//! a sparse list of `(cluster_id, value)` pairs followed by the
//! temperature value, then the surface-index array matching the
//! dimensionality. Everything is little-endian and values keep their
//! exact bit patterns, so a write/read round trip is bit-exact.

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::Result;

const MAGIC: i32 = 0x58_43_50;
const VERSION: i32 = 1;

/// A full, non-ghosted concentration field plus the surface indices.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointData {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Cluster degrees of freedom; the per-point stride is `dof + 1`
    /// with the temperature last.
    pub dof: usize,
    /// `(nx * ny * nz) * (dof + 1)` values, x fastest.
    pub concentrations: Vec<f64>,
    /// `ny x nz` surface indices.
    pub surface: Vec<Vec<usize>>,
}

impl CheckpointData {
    pub fn stride(&self) -> usize {
        self.dof + 1
    }

    pub fn point(&self, xi: usize, yj: usize, zk: usize) -> &[f64] {
        let at = ((zk * self.ny + yj) * self.nx + xi) * self.stride();
        &self.concentrations[at..at + self.stride()]
    }
}

pub fn write(path: &Path, data: &CheckpointData) -> Result<()> {
    let mut w = BufWriter::new(std::fs::File::create(path)?);
    w.write_all(&MAGIC.to_le_bytes())?;
    w.write_all(&VERSION.to_le_bytes())?;
    for dim in [data.nx, data.ny, data.nz, data.dof] {
        w.write_all(&(dim as i64).to_le_bytes())?;
    }

    let stride = data.stride();
    for zk in 0..data.nz {
        for yj in 0..data.ny {
            for xi in 0..data.nx {
                let row = data.point(xi, yj, zk);
                let pairs: Vec<(i64, f64)> = row[..data.dof]
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v != 0.0)
                    .map(|(c, &v)| (c as i64, v))
                    .collect();
                w.write_all(&(pairs.len() as i64).to_le_bytes())?;
                for (c, v) in pairs {
                    w.write_all(&c.to_le_bytes())?;
                    w.write_all(&v.to_le_bytes())?;
                }
                w.write_all(&row[stride - 1].to_le_bytes())?;
            }
        }
    }

    for yj in 0..data.ny {
        for zk in 0..data.nz {
            w.write_all(&(data.surface[yj][zk] as i64).to_le_bytes())?;
        }
    }
    w.flush()?;
    Ok(())
}

fn bad_data(message: &str) -> crate::error::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string()).into()
}

fn read_i32(r: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_i64(r: &mut impl Read) -> Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_f64(r: &mut impl Read) -> Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

pub fn read(path: &Path) -> Result<CheckpointData> {
    let mut r = BufReader::new(std::fs::File::open(path)?);
    if read_i32(&mut r)? != MAGIC {
        return Err(bad_data("not a concentration checkpoint"));
    }
    if read_i32(&mut r)? != VERSION {
        return Err(bad_data("unsupported checkpoint version"));
    }
    let nx = read_i64(&mut r)? as usize;
    let ny = read_i64(&mut r)? as usize;
    let nz = read_i64(&mut r)? as usize;
    let dof = read_i64(&mut r)? as usize;

    let stride = dof + 1;
    let mut concentrations = vec![0.0; nx * ny * nz * stride];
    for zk in 0..nz {
        for yj in 0..ny {
            for xi in 0..nx {
                let at = ((zk * ny + yj) * nx + xi) * stride;
                let n_pairs = read_i64(&mut r)? as usize;
                for _ in 0..n_pairs {
                    let c = read_i64(&mut r)? as usize;
                    if c >= dof {
                        return Err(bad_data("cluster id out of range"));
                    }
                    concentrations[at + c] = read_f64(&mut r)?;
                }
                concentrations[at + dof] = read_f64(&mut r)?;
            }
        }
    }

    let mut surface = vec![vec![0usize; nz]; ny];
    for row in surface.iter_mut() {
        for slot in row.iter_mut() {
            *slot = read_i64(&mut r)? as usize;
        }
    }

    Ok(CheckpointData {
        nx,
        ny,
        nz,
        dof,
        concentrations,
        surface,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(nx: usize, ny: usize, nz: usize, dof: usize) -> CheckpointData {
        let stride = dof + 1;
        let mut concentrations = vec![0.0; nx * ny * nz * stride];
        for (i, v) in concentrations.iter_mut().enumerate() {
            // Sparse field with awkward values.
            if i % 3 == 0 {
                *v = (i as f64).sqrt() * 1.0e-7 + f64::EPSILON;
            }
        }
        // Temperatures everywhere.
        for p in 0..nx * ny * nz {
            concentrations[p * stride + dof] = 933.0 + p as f64 * 0.1;
        }
        CheckpointData {
            nx,
            ny,
            nz,
            dof,
            concentrations,
            surface: vec![vec![1; nz]; ny],
        }
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let dir = std::env::temp_dir();
        let path = dir.join("xolotl_checkpoint_roundtrip.bin");
        let data = sample(4, 3, 2, 7);
        write(&path, &data).unwrap();
        let back = read(&path).unwrap();
        assert_eq!(back.nx, 4);
        assert_eq!(back.surface, data.surface);
        assert_eq!(back.concentrations.len(), data.concentrations.len());
        for (a, b) in data.concentrations.iter().zip(back.concentrations.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_rejects_foreign_files() {
        let dir = std::env::temp_dir();
        let path = dir.join("xolotl_checkpoint_bogus.bin");
        std::fs::write(&path, b"definitely not a checkpoint").unwrap();
        assert!(read(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
