use crate::real::Real;
use crate::util::*;
use rayon::prelude::*;

/// Storage for one time level of a field.
/// The buffer is laid out over `aabb`, which is the domain
/// grown by the halo width, so world coordinates of halo
/// cells are negative or past the last domain index.
#[derive(Debug, Clone)]
pub struct FieldBuffer<T: Real, const GRID_DIMENSION: usize> {
    aabb: AABB<GRID_DIMENSION>,
    domain: AABB<GRID_DIMENSION>,
    buffer: Vec<T>,
}

impl<T: Real, const GRID_DIMENSION: usize> FieldBuffer<T, GRID_DIMENSION> {
    pub fn new(domain: AABB<GRID_DIMENSION>, halo: i32) -> Self {
        let aabb = domain.grow(halo);
        let buffer = vec![T::zero(); aabb.buffer_size()];
        FieldBuffer {
            aabb,
            domain,
            buffer,
        }
    }

    /// Allocated box, domain plus halo.
    pub fn aabb(&self) -> &AABB<GRID_DIMENSION> {
        &self.aabb
    }

    /// Domain region, the part written by operators.
    pub fn domain(&self) -> &AABB<GRID_DIMENSION> {
        &self.domain
    }

    pub fn buffer(&self) -> &[T] {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut [T] {
        &mut self.buffer
    }

    #[track_caller]
    pub fn view(&self, world_coord: &Coord<GRID_DIMENSION>) -> T {
        debug_assert!(
            self.aabb.contains(world_coord),
            "{:?} does not contain {:?}",
            self.aabb,
            world_coord
        );
        self.buffer[self.aabb.coord_to_linear(world_coord)]
    }

    #[track_caller]
    pub fn set_coord(&mut self, world_coord: &Coord<GRID_DIMENSION>, value: T) {
        debug_assert!(
            self.aabb.contains(world_coord),
            "{:?} does not contain {:?}",
            self.aabb,
            world_coord
        );
        let index = self.aabb.coord_to_linear(world_coord);
        self.buffer[index] = value;
    }

    pub fn par_modify_access(
        &mut self,
        chunk_size: usize,
    ) -> impl ParallelIterator<Item = BufferChunk<'_, T, GRID_DIMENSION>> {
        par_modify_access_impl(&mut self.buffer, &self.aabb, chunk_size)
    }

    /// Set every domain value from its world coordinate,
    /// halo cells are left untouched.
    pub fn par_set_values<
        F: Fn(Coord<GRID_DIMENSION>) -> T + Send + Sync,
    >(
        &mut self,
        f: F,
        chunk_size: usize,
    ) {
        let domain = self.domain;
        self.par_modify_access(chunk_size).for_each(
            |mut chunk: BufferChunk<'_, T, GRID_DIMENSION>| {
                chunk.coord_iter_mut().for_each(|(world_coord, value_mut)| {
                    if domain.contains(&world_coord) {
                        *value_mut = f(world_coord);
                    }
                })
            },
        );
    }

    /// Set every domain value to `value`.
    pub fn fill(&mut self, value: T, chunk_size: usize) {
        self.par_set_values(|_| value, chunk_size);
    }

    /// Copy of the domain region in linear ordering.
    pub fn domain_values(&self) -> Vec<T> {
        self.domain.coord_iter().map(|c| self.view(&c)).collect()
    }

    /// Largest absolute value in the domain region.
    pub fn max_abs(&self) -> T {
        self.domain
            .coord_iter()
            .map(|c| self.view(&c).abs())
            .fold(T::zero(), |a, b| a.max(b))
    }
}

/// Chunk of a field buffer handed to a rayon task.
pub struct BufferChunk<'a, T: Real, const GRID_DIMENSION: usize> {
    offset: usize,
    aabb: &'a AABB<GRID_DIMENSION>,
    buffer: &'a mut [T],
}

impl<'a, T: Real, const GRID_DIMENSION: usize>
    BufferChunk<'a, T, GRID_DIMENSION>
{
    pub fn coord_iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (Coord<GRID_DIMENSION>, &mut T)> {
        let offset = self.offset;
        let aabb = self.aabb;
        self.buffer.iter_mut().enumerate().map(move |(i, v)| {
            let coord = aabb.linear_to_coord(offset + i);
            (coord, v)
        })
    }
}

/// Rust compiler can't figure out how to borrow aabb and buffer
/// at the same time from one `&mut self`,
/// so the borrows are split before building the iterator.
fn par_modify_access_impl<'a, T: Real, const GRID_DIMENSION: usize>(
    buffer: &'a mut [T],
    aabb: &'a AABB<GRID_DIMENSION>,
    chunk_size: usize,
) -> impl ParallelIterator<Item = BufferChunk<'a, T, GRID_DIMENSION>> + 'a {
    let chunk_size = chunk_size.max(1);
    buffer
        .par_chunks_mut(chunk_size)
        .enumerate()
        .map(move |(i, buffer_chunk): (usize, &mut [T])| BufferChunk {
            offset: i * chunk_size,
            aabb,
            buffer: buffer_chunk,
        })
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn fill_leaves_halo_test() {
        let domain = AABB::new(matrix![0, 9; 0, 9]);
        let mut b = FieldBuffer::<f32, 2>::new(domain, 2);
        assert_eq!(b.buffer().len(), 14 * 14);
        b.fill(1.5, 7);
        for c in b.aabb().coord_iter() {
            if domain.contains(&c) {
                assert_approx_eq!(f32, b.view(&c), 1.5);
            } else {
                assert_approx_eq!(f32, b.view(&c), 0.0);
            }
        }
    }

    #[test]
    fn par_set_values_test() {
        let domain = AABB::new(matrix![0, 4; 0, 5; 0, 6]);
        let mut b = FieldBuffer::<f64, 3>::new(domain, 1);
        b.par_set_values(|c| (c[0] + 10 * c[1] + 100 * c[2]) as f64, 3);
        assert_approx_eq!(f64, b.view(&vector![4, 5, 6]), 654.0);
        assert_approx_eq!(f64, b.view(&vector![-1, 0, 0]), 0.0);
        let values = b.domain_values();
        assert_eq!(values.len(), domain.buffer_size());
        assert_approx_eq!(f64, values[1], 100.0);
    }

    #[test]
    fn max_abs_test() {
        let domain = AABB::new(matrix![0, 9]);
        let mut b = FieldBuffer::<f32, 1>::new(domain, 4);
        b.set_coord(&vector![3], -2.5);
        b.set_coord(&vector![7], 1.0);
        b.set_coord(&vector![-2], 100.0);
        assert_approx_eq!(f32, b.max_abs(), 2.5);
    }
}
