//! Sparse point sources and their injection into grid fields.

use crate::error::*;
use crate::grid::Grid;
use crate::symbolic::{Access, Expr};
use crate::time_axis::TimeAxis;
use crate::util::*;

/// Ricker wavelet with peak frequency `f0` centred on `t0`, unit amplitude.
pub fn ricker_wavelet(f0: f64, t0: f64, time_values: &[f64]) -> Vec<f64> {
    time_values
        .iter()
        .map(|t| {
            let r = std::f64::consts::PI * f0 * (t - t0);
            (1.0 - 2.0 * r * r) * (-r * r).exp()
        })
        .collect()
}

/// Time series attached to points in physical coordinates.
/// Samples are stored `[time][point]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSource<const GRID_DIMENSION: usize> {
    name: String,
    coordinates: Vec<[f64; GRID_DIMENSION]>,
    num: usize,
    data: Vec<f64>,
}

impl<const GRID_DIMENSION: usize> PointSource<GRID_DIMENSION> {
    /// Source with all samples zero.
    pub fn new(
        name: &str,
        coordinates: Vec<[f64; GRID_DIMENSION]>,
        num: usize,
    ) -> Result<Self> {
        if coordinates.is_empty() {
            return Err(Error::InvalidSource(format!(
                "`{name}` has no points"
            )));
        }
        if coordinates.iter().flatten().any(|c| !c.is_finite()) {
            return Err(Error::InvalidSource(format!(
                "`{name}` has a coordinate that is not finite"
            )));
        }
        if num == 0 {
            return Err(Error::InvalidSource(format!(
                "`{name}` has no time samples"
            )));
        }
        let data = vec![0.0; num * coordinates.len()];
        Ok(PointSource {
            name: name.to_string(),
            coordinates,
            num,
            data,
        })
    }

    /// Ricker wavelet of peak frequency `f0` at every point,
    /// delayed by one period.
    pub fn ricker(
        name: &str,
        coordinates: Vec<[f64; GRID_DIMENSION]>,
        time_axis: &TimeAxis,
        f0: f64,
    ) -> Result<Self> {
        if !(f0 > 0.0) || !f0.is_finite() {
            return Err(Error::InvalidSource(format!(
                "peak frequency of `{name}` must be positive, got {f0}"
            )));
        }
        let mut source = Self::new(name, coordinates, time_axis.num())?;
        let wavelet = ricker_wavelet(f0, 1.0 / f0, &time_axis.time_values());
        for point in 0..source.npoint() {
            source.set_series(point, &wavelet)?;
        }
        Ok(source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coordinates(&self) -> &[[f64; GRID_DIMENSION]] {
        &self.coordinates
    }

    pub fn npoint(&self) -> usize {
        self.coordinates.len()
    }

    /// Number of time samples.
    pub fn num(&self) -> usize {
        self.num
    }

    pub fn sample(&self, time: usize, point: usize) -> f64 {
        self.data[time * self.npoint() + point]
    }

    /// Overwrite the time series of one point.
    pub fn set_series(&mut self, point: usize, series: &[f64]) -> Result<()> {
        if point >= self.npoint() || series.len() != self.num {
            return Err(Error::InvalidSource(format!(
                "`{}` expects {} samples for one of {} points",
                self.name,
                self.num,
                self.npoint()
            )));
        }
        let npoint = self.npoint();
        for (time, value) in series.iter().enumerate() {
            self.data[time * npoint + point] = *value;
        }
        Ok(())
    }

    /// Inject `expr` into `target` at every source point.
    ///
    /// `target` is a bare field access, usually the forward time level.
    /// `expr` may read `Expr::source()` and fields, it is evaluated at
    /// each of the `2^D` grid points around a source point and scaled by
    /// the multilinear interpolation weight of that point.
    pub fn inject(
        &self,
        grid: &Grid<GRID_DIMENSION>,
        target: Expr<GRID_DIMENSION>,
        expr: Expr<GRID_DIMENSION>,
    ) -> Result<Injection<GRID_DIMENSION>> {
        let target = match target {
            Expr::Access(a) if a.offset.iter().all(|o| *o == 0) => a,
            other => {
                return Err(Error::InvalidSource(format!(
                    "injection target `{other}` is not a bare field access"
                )))
            }
        };

        let domain = grid.domain();
        let mut corners = Vec::new();
        for (point, position) in self.coordinates.iter().enumerate() {
            let before = corners.len();
            let index = grid.index_position(position);
            let base: [f64; GRID_DIMENSION] =
                std::array::from_fn(|d| index[d].floor());
            let frac: [f64; GRID_DIMENSION] =
                std::array::from_fn(|d| index[d] - base[d]);
            for mask in 0..(1usize << GRID_DIMENSION) {
                let mut coord = Coord::zeros();
                let mut weight = 1.0;
                for d in 0..GRID_DIMENSION {
                    let upper = (mask >> d) & 1 == 1;
                    coord[d] = base[d] as i32 + upper as i32;
                    weight *= if upper { frac[d] } else { 1.0 - frac[d] };
                }
                if weight == 0.0 || !domain.contains(&coord) {
                    continue;
                }
                corners.push(InjectionCorner {
                    point,
                    coord,
                    weight,
                });
            }
            if corners.len() == before {
                log::warn!(
                    "point {} of `{}` at {:?} lies outside the grid",
                    point,
                    self.name,
                    position
                );
            }
        }

        Ok(Injection {
            source_name: self.name.clone(),
            target,
            expr,
            corners,
            npoint: self.npoint(),
            num: self.num,
            data: self.data.clone(),
        })
    }
}

/// Grid point touched by an injection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InjectionCorner<const GRID_DIMENSION: usize> {
    pub point: usize,
    pub coord: Coord<GRID_DIMENSION>,
    pub weight: f64,
}

/// Scatter of source samples into a field, consumed by the operator.
/// Samples are copied when the injection is built.
#[derive(Debug, Clone)]
pub struct Injection<const GRID_DIMENSION: usize> {
    source_name: String,
    target: Access<GRID_DIMENSION>,
    expr: Expr<GRID_DIMENSION>,
    corners: Vec<InjectionCorner<GRID_DIMENSION>>,
    npoint: usize,
    num: usize,
    data: Vec<f64>,
}

impl<const GRID_DIMENSION: usize> Injection<GRID_DIMENSION> {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn target(&self) -> &Access<GRID_DIMENSION> {
        &self.target
    }

    pub fn expr(&self) -> &Expr<GRID_DIMENSION> {
        &self.expr
    }

    pub fn corners(&self) -> &[InjectionCorner<GRID_DIMENSION>] {
        &self.corners
    }

    pub fn npoint(&self) -> usize {
        self.npoint
    }

    pub fn num(&self) -> usize {
        self.num
    }

    pub fn sample(&self, time: usize, point: usize) -> f64 {
        self.data[time * self.npoint + point]
    }
}
