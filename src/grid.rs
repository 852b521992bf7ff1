//! Regular cartesian grid.
//!
//! The grid only carries geometry: number of points per axis,
//! physical extent, origin and the element type of fields built on it.
//! Index space is `[0, shape - 1]` on every axis, see `Grid::domain`.

use crate::error::*;
use crate::real::DType;
use crate::symbolic::{SpacingMap, Symbol};
use crate::util::*;

/// Name of spatial axis `d`, `x`, `y`, `z` and then `d3`, `d4`, ...
pub fn dimension_name(d: usize) -> String {
    match d {
        0 => "x".to_string(),
        1 => "y".to_string(),
        2 => "z".to_string(),
        _ => format!("d{d}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid<const GRID_DIMENSION: usize> {
    shape: [usize; GRID_DIMENSION],
    extent: [f64; GRID_DIMENSION],
    origin: [f64; GRID_DIMENSION],
    dtype: DType,
}

impl<const GRID_DIMENSION: usize> Grid<GRID_DIMENSION> {
    pub fn new(
        shape: [usize; GRID_DIMENSION],
        extent: [f64; GRID_DIMENSION],
        origin: [f64; GRID_DIMENSION],
        dtype: DType,
    ) -> Result<Self> {
        if GRID_DIMENSION == 0 {
            return Err(Error::InvalidGrid(
                "grid needs at least one dimension".to_string(),
            ));
        }
        for d in 0..GRID_DIMENSION {
            if shape[d] < 2 {
                return Err(Error::InvalidGrid(format!(
                    "shape along `{}` must be at least 2, got {}",
                    dimension_name(d),
                    shape[d]
                )));
            }
            if !(extent[d] > 0.0) || !extent[d].is_finite() {
                return Err(Error::InvalidGrid(format!(
                    "extent along `{}` must be positive, got {}",
                    dimension_name(d),
                    extent[d]
                )));
            }
            if !origin[d].is_finite() {
                return Err(Error::InvalidGrid(format!(
                    "origin along `{}` must be finite, got {}",
                    dimension_name(d),
                    origin[d]
                )));
            }
        }
        Ok(Grid {
            shape,
            extent,
            origin,
            dtype,
        })
    }

    /// Build from spacing, `extent = spacing * (shape - 1)`.
    pub fn from_spacing(
        shape: [usize; GRID_DIMENSION],
        spacing: [f64; GRID_DIMENSION],
        origin: [f64; GRID_DIMENSION],
        dtype: DType,
    ) -> Result<Self> {
        let extent = std::array::from_fn(|d| {
            spacing[d] * (shape[d].saturating_sub(1)) as f64
        });
        Self::new(shape, extent, origin, dtype)
    }

    pub fn shape(&self) -> &[usize; GRID_DIMENSION] {
        &self.shape
    }

    pub fn extent(&self) -> &[f64; GRID_DIMENSION] {
        &self.extent
    }

    pub fn origin(&self) -> &[f64; GRID_DIMENSION] {
        &self.origin
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn spacing(&self) -> [f64; GRID_DIMENSION] {
        std::array::from_fn(|d| self.extent[d] / (self.shape[d] - 1) as f64)
    }

    pub fn dimension_names(&self) -> [String; GRID_DIMENSION] {
        std::array::from_fn(dimension_name)
    }

    /// Spacing symbols bound to their values, `h_x -> spacing[0]` etc.
    pub fn spacing_map(&self) -> SpacingMap {
        let mut map = SpacingMap::new();
        for (d, h) in self.spacing().into_iter().enumerate() {
            map.insert(Symbol::Spacing(d), h);
        }
        map
    }

    /// Index box of the domain region.
    pub fn domain(&self) -> AABB<GRID_DIMENSION> {
        AABB::from_shape(&self.shape)
    }

    pub fn num_points(&self) -> usize {
        self.shape.iter().product()
    }

    /// Fractional index position of a physical coordinate.
    pub fn index_position(
        &self,
        point: &[f64; GRID_DIMENSION],
    ) -> [f64; GRID_DIMENSION] {
        let spacing = self.spacing();
        std::array::from_fn(|d| (point[d] - self.origin[d]) / spacing[d])
    }

    /// Physical coordinate of a grid index.
    pub fn physical_position(
        &self,
        coord: &Coord<GRID_DIMENSION>,
    ) -> [f64; GRID_DIMENSION] {
        let spacing = self.spacing();
        std::array::from_fn(|d| self.origin[d] + coord[d] as f64 * spacing[d])
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn spacing_from_extent() {
        let grid = Grid::new(
            [1201, 1201, 601],
            [12000.0, 12000.0, 6000.0],
            [0.0; 3],
            DType::Float32,
        )
        .unwrap();
        for h in grid.spacing() {
            assert_approx_eq!(f64, h, 10.0);
        }
        assert_eq!(grid.domain(), AABB::new(matrix![0, 1200; 0, 1200; 0, 600]));
    }

    #[test]
    fn extent_from_spacing() {
        let grid = Grid::from_spacing(
            [11, 21],
            [10.0, 5.0],
            [1.0, -2.0],
            DType::Float64,
        )
        .unwrap();
        assert_eq!(grid.extent(), &[100.0, 100.0]);
        assert_eq!(grid.physical_position(&vector![10, 20]), [101.0, 98.0]);
        let p = grid.index_position(&[51.0, 0.5]);
        assert_approx_eq!(f64, p[0], 5.0);
        assert_approx_eq!(f64, p[1], 0.5);
    }

    #[test]
    fn spacing_map_names() {
        let grid =
            Grid::from_spacing([3, 3, 3], [1.0, 2.0, 3.0], [0.0; 3], DType::Float32)
                .unwrap();
        let map = grid.spacing_map();
        assert_eq!(map.get(&Symbol::Spacing(1)), Some(2.0));
        assert_eq!(map.get(&Symbol::Dt), None);
        assert_eq!(grid.dimension_names(), ["x", "y", "z"]);
        assert_eq!(dimension_name(4), "d4");
    }

    #[test]
    fn reject_degenerate() {
        assert!(Grid::new([1, 4], [1.0, 1.0], [0.0; 2], DType::Float32).is_err());
        assert!(Grid::new([4, 4], [1.0, 0.0], [0.0; 2], DType::Float32).is_err());
        assert!(
            Grid::new([4, 4], [1.0, f64::NAN], [0.0; 2], DType::Float32).is_err()
        );
    }
}
