use crate::util::*;

pub fn real_buffer_size<const DIMENSION: usize>(
    exclusive_bound: &Coord<DIMENSION>,
) -> usize {
    let mut accumulator = 1;
    for d in exclusive_bound {
        accumulator *= *d as usize;
    }
    accumulator
}

/// Row-major strides, the last axis is contiguous.
pub fn linear_strides<const DIMENSION: usize>(
    exclusive_bounds: &Coord<DIMENSION>,
) -> [usize; DIMENSION] {
    let mut strides = [1; DIMENSION];
    for d in (0..DIMENSION.saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * exclusive_bounds[d + 1] as usize;
    }
    strides
}

pub fn coord_to_linear<const GRID_DIMENSION: usize>(
    coord: &Coord<GRID_DIMENSION>,
    exclusive_bounds: &Coord<GRID_DIMENSION>,
) -> usize {
    let strides = linear_strides(exclusive_bounds);
    let mut accumulator = 0;
    for d in 0..GRID_DIMENSION {
        debug_assert!(coord[d] >= 0);
        accumulator += coord[d] as usize * strides[d];
    }
    accumulator
}

/// Signed linear distance of a coordinate offset,
/// valid for any base coordinate in the same buffer.
pub fn offset_to_linear<const GRID_DIMENSION: usize>(
    offset: &Coord<GRID_DIMENSION>,
    exclusive_bounds: &Coord<GRID_DIMENSION>,
) -> isize {
    let strides = linear_strides(exclusive_bounds);
    let mut accumulator = 0;
    for d in 0..GRID_DIMENSION {
        accumulator += offset[d] as isize * strides[d] as isize;
    }
    accumulator
}

pub fn linear_to_coord<const GRID_DIMENSION: usize>(
    linear_index: usize,
    exclusive_bounds: &Coord<GRID_DIMENSION>,
) -> Coord<GRID_DIMENSION> {
    let mut result = Coord::zeros();
    let mut index_accumulator = linear_index;
    let strides = linear_strides(exclusive_bounds);
    for d in 0..GRID_DIMENSION {
        result[d] = (index_accumulator / strides[d]) as i32;
        index_accumulator %= strides[d];
    }
    result
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn buffer_size_test() {
        {
            let dimensions = vector![5];
            assert_eq!(real_buffer_size(&dimensions), 5);
        }

        {
            let dimensions = vector![5, 7, 9];
            assert_eq!(real_buffer_size(&dimensions), 5 * 7 * 9);
        }
    }

    #[test]
    fn strides_test() {
        assert_eq!(linear_strides(&vector![4, 5, 6]), [30, 6, 1]);
        assert_eq!(linear_strides(&vector![4]), [1]);
    }

    #[test]
    fn coord_to_linear_index_test() {
        {
            let index = vector![5, 7, 11];
            let bound = vector![20, 20, 20];
            assert_eq!(
                coord_to_linear(&index, &bound),
                5 * 20 * 20 + 7 * 20 + 11
            );
        }

        {
            let index = vector![5, 7];
            let bound = vector![20, 20];
            assert_eq!(coord_to_linear(&index, &bound), 5 * 20 + 7);
        }
    }

    #[test]
    fn offset_to_linear_test() {
        let bound = vector![10, 10, 10];
        assert_eq!(offset_to_linear(&vector![0, 0, -1], &bound), -1);
        assert_eq!(offset_to_linear(&vector![1, -1, 0], &bound), 90);
        let base = vector![4, 4, 4];
        let offset = vector![-3, 2, 1];
        assert_eq!(
            coord_to_linear(&(base + offset), &bound) as isize,
            coord_to_linear(&base, &bound) as isize
                + offset_to_linear(&offset, &bound)
        );
    }

    #[test]
    fn linear_to_coord_test() {
        {
            let bound = vector![10, 10];
            assert_eq!(linear_to_coord(67, &bound), vector![6, 7]);
        }

        {
            let bound = vector![100];
            assert_eq!(linear_to_coord(67, &bound), vector![67]);
        }

        {
            let bound = vector![10, 10, 8, 10];
            assert_eq!(linear_to_coord(0, &bound), vector![0, 0, 0, 0]);
        }
    }
}
