use crate::util::indexing::*;
use crate::util::*;

/// Axis Aligned Bounding Box (AABB) for coordinate types.
/// Each instance is inclusive of both corners.
/// Maps between coordinates and a row-major linear buffer.
/// Coordinates may be negative, field storage uses that for halos.
#[derive(Hash, Debug, Copy, Clone, Eq, PartialEq)]
pub struct AABB<const DIMENSION: usize> {
    pub bounds: Bounds<DIMENSION>,
}

impl<const GRID_DIMENSION: usize> std::fmt::Display for AABB<GRID_DIMENSION> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> Result<(), std::fmt::Error> {
        write!(f, "[")?;
        for d in 0..GRID_DIMENSION {
            if d > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}..={}", self.bounds[(d, 0)], self.bounds[(d, 1)])?;
        }
        write!(f, "]")
    }
}

impl<const DIMENSION: usize> AABB<DIMENSION> {
    /// Create AABB from raw bounds.
    #[inline]
    pub fn new(bounds: Bounds<DIMENSION>) -> Self {
        AABB { bounds }
    }

    /// The box `[0, n - 1]` along each axis.
    pub fn from_shape(shape: &[usize; DIMENSION]) -> Self {
        let mut bounds = Bounds::zeros();
        for d in 0..DIMENSION {
            bounds[(d, 1)] = shape[d] as i32 - 1;
        }
        AABB { bounds }
    }

    /// Moving min to the origin, returns the exclusie size in each direction
    /// i.e. [0, 9]  would have exclusive size of 10.
    pub fn exclusive_bounds(&self) -> Coord<DIMENSION> {
        (self.bounds.column(1) - self.bounds.column(0)).add_scalar(1)
    }

    /// Return the number of coordinates contained in the instance.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        real_buffer_size(&self.exclusive_bounds())
    }

    /// Return the linear index for a coord in the instance
    pub fn coord_to_linear(&self, coord: &Coord<DIMENSION>) -> usize {
        coord_to_linear(&(coord - self.min()), &self.exclusive_bounds())
    }

    /// Return the coordinate in the instance for a given linear index.
    pub fn linear_to_coord(&self, index: usize) -> Coord<DIMENSION> {
        linear_to_coord(index, &self.exclusive_bounds()) + self.min()
    }

    /// Linear distance covered by a coordinate offset in this box.
    pub fn offset_to_linear(&self, offset: &Coord<DIMENSION>) -> isize {
        offset_to_linear(offset, &self.exclusive_bounds())
    }

    /// Check whether the instance contains a coordinate.
    pub fn contains(&self, coord: &Coord<DIMENSION>) -> bool {
        for d in 0..DIMENSION {
            if coord[d] < self.bounds[(d, 0)] || coord[d] > self.bounds[(d, 1)]
            {
                return false;
            }
        }
        true
    }

    /// Expand by `width` on every side of every axis.
    pub fn grow(&self, width: i32) -> Self {
        let mut result = *self;
        for d in 0..DIMENSION {
            result.bounds[(d, 0)] -= width;
            result.bounds[(d, 1)] += width;
        }
        result
    }

    /// Return min corner.
    pub fn min(&self) -> Coord<DIMENSION> {
        self.bounds.column(0).into()
    }

    /// Return iterator over contained coords
    /// in linear ordering.
    #[allow(clippy::needless_lifetimes)]
    pub fn coord_iter<'a>(
        &'a self,
    ) -> impl Iterator<Item = Coord<DIMENSION>> + use<'a, DIMENSION> {
        (0..self.buffer_size()).map(|i| self.linear_to_coord(i))
    }

    /// Cells between grid points, one fewer along every axis.
    pub fn cell_bounds(&self) -> Self {
        let mut cell_bounds = *self;
        cell_bounds
            .bounds
            .set_column(1, &cell_bounds.bounds.column(1).add_scalar(-1));
        cell_bounds
    }

    /// Split the leading `block_sizes.len()` axes into tiles
    /// of at most the given sizes, remaining axes stay whole.
    /// Tiles are returned in linear ordering and cover the instance exactly.
    pub fn tiles(&self, block_sizes: &[usize]) -> Vec<Self> {
        debug_assert!(block_sizes.len() <= DIMENSION);
        debug_assert!(block_sizes.iter().all(|b| *b > 0));
        let mut result = vec![*self];
        for (d, block_size) in block_sizes.iter().enumerate() {
            let block_size = *block_size as i32;
            let mut next = Vec::new();
            for tile in result {
                let mut start = tile.bounds[(d, 0)];
                while start <= tile.bounds[(d, 1)] {
                    let end = (start + block_size - 1).min(tile.bounds[(d, 1)]);
                    let mut sub = tile;
                    sub.bounds[(d, 0)] = start;
                    sub.bounds[(d, 1)] = end;
                    next.push(sub);
                    start = end + 1;
                }
            }
            result = next;
        }
        result
    }
}
