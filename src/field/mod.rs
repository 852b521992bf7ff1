//! Field storage.
//!
//! A `FieldStore` owns the data of every field built over one grid.
//! Fields are referred to by cheap `FieldHandle`s, which also build
//! the symbolic accesses used in equations.
//! Static fields (`Function`) own one buffer, time-stepped fields
//! (`TimeFunction`) own `time_order + 1` buffers that rotate with time.

mod buffer;

pub use buffer::*;

use crate::error::*;
use crate::grid::Grid;
use crate::real::Real;
use crate::symbolic::{Access, Expr};
use crate::util::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId {
    pub store: u64,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Function,
    TimeFunction { time_order: usize },
}

impl FieldKind {
    pub fn time_buffers(&self) -> usize {
        match self {
            FieldKind::Function => 1,
            FieldKind::TimeFunction { time_order } => time_order + 1,
        }
    }

    pub fn is_time_function(&self) -> bool {
        matches!(self, FieldKind::TimeFunction { .. })
    }
}

/// Buffer index holding time step `time + shift` of a field
/// with `buffers` rotating buffers.
pub fn time_buffer_index(time: usize, shift: i32, buffers: usize) -> usize {
    (time as i64 + shift as i64).rem_euclid(buffers as i64) as usize
}

/// Reference to a field of a `FieldStore`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldHandle<const GRID_DIMENSION: usize> {
    id: FieldId,
    name: Arc<str>,
    kind: FieldKind,
}

impl<const GRID_DIMENSION: usize> FieldHandle<GRID_DIMENSION> {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    fn access(&self, time: Option<i32>) -> Expr<GRID_DIMENSION> {
        Expr::Access(Access {
            field: self.id,
            name: self.name.clone(),
            time,
            offset: Coord::zeros(),
        })
    }

    /// Access at the current point, and the current time step
    /// for time functions.
    pub fn expr(&self) -> Expr<GRID_DIMENSION> {
        match self.kind {
            FieldKind::Function => self.access(None),
            FieldKind::TimeFunction { .. } => self.access(Some(0)),
        }
    }

    /// Access at time `time + 1`.
    pub fn forward(&self) -> Expr<GRID_DIMENSION> {
        self.access(Some(1))
    }

    /// Access at time `time - 1`.
    pub fn backward(&self) -> Expr<GRID_DIMENSION> {
        self.access(Some(-1))
    }
}

#[derive(Debug)]
pub struct FieldEntry<T: Real, const GRID_DIMENSION: usize> {
    pub name: String,
    pub kind: FieldKind,
    pub halo: i32,
    pub buffers: Vec<FieldBuffer<T, GRID_DIMENSION>>,
}

impl<T: Real, const GRID_DIMENSION: usize> FieldEntry<T, GRID_DIMENSION> {
    /// Allocated shape, leading time axis for time functions.
    pub fn allocated_shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(GRID_DIMENSION + 1);
        if self.kind.is_time_function() {
            shape.push(self.buffers.len());
        }
        let exclusive = self.buffers[0].aabb().exclusive_bounds();
        shape.extend(exclusive.iter().map(|e| *e as usize));
        shape
    }

    pub fn bytes(&self) -> usize {
        self.buffers.len()
            * self.buffers[0].buffer().len()
            * std::mem::size_of::<T>()
    }
}

pub struct FieldStore<T: Real, const GRID_DIMENSION: usize> {
    id: u64,
    grid: Grid<GRID_DIMENSION>,
    fields: Vec<FieldEntry<T, GRID_DIMENSION>>,
    chunk_size: usize,
}

impl<T: Real, const GRID_DIMENSION: usize> FieldStore<T, GRID_DIMENSION> {
    pub fn new(grid: Grid<GRID_DIMENSION>) -> Result<Self> {
        if grid.dtype() != T::DTYPE {
            return Err(Error::InvalidGrid(format!(
                "grid dtype is {} but fields are stored as {}",
                grid.dtype(),
                T::DTYPE
            )));
        }
        Ok(FieldStore {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            grid,
            fields: Vec::new(),
            chunk_size: 4096,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn grid(&self) -> &Grid<GRID_DIMENSION> {
        &self.grid
    }

    /// Static field. Halo width equals the space order so nested
    /// staggered derivatives stay inside the ghost region.
    pub fn function(
        &mut self,
        name: &str,
        space_order: usize,
    ) -> Result<FieldHandle<GRID_DIMENSION>> {
        self.add(name, FieldKind::Function, space_order)
    }

    /// Time-stepped field with `time_order + 1` rotating buffers.
    pub fn time_function(
        &mut self,
        name: &str,
        time_order: usize,
        space_order: usize,
    ) -> Result<FieldHandle<GRID_DIMENSION>> {
        if time_order == 0 {
            return Err(Error::InvalidField {
                name: name.to_string(),
                reason: "time order must be at least 1".to_string(),
            });
        }
        self.add(name, FieldKind::TimeFunction { time_order }, space_order)
    }

    fn add(
        &mut self,
        name: &str,
        kind: FieldKind,
        space_order: usize,
    ) -> Result<FieldHandle<GRID_DIMENSION>> {
        let invalid = |reason: &str| Error::InvalidField {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.is_empty()
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            || name.starts_with(|c: char| c.is_ascii_digit())
        {
            return Err(invalid("name must be a C identifier"));
        }
        if self.fields.iter().any(|f| f.name == name) {
            return Err(invalid("name is already used"));
        }
        if space_order < 2 || space_order % 2 != 0 {
            return Err(invalid("space order must be even and at least 2"));
        }

        let halo = space_order as i32;
        let domain = self.grid.domain();
        let buffers = (0..kind.time_buffers())
            .map(|_| FieldBuffer::new(domain, halo))
            .collect();
        let index = self.fields.len();
        self.fields.push(FieldEntry {
            name: name.to_string(),
            kind,
            halo,
            buffers,
        });
        log::debug!(
            "allocated field `{}` ({:?}), {} bytes",
            name,
            kind,
            self.fields[index].bytes()
        );

        Ok(FieldHandle {
            id: FieldId {
                store: self.id,
                index,
            },
            name: Arc::from(name),
            kind,
        })
    }

    pub fn entry(&self, id: FieldId) -> Result<&FieldEntry<T, GRID_DIMENSION>> {
        if id.store != self.id {
            return Err(Error::UnknownField(id.index));
        }
        self.fields.get(id.index).ok_or(Error::UnknownField(id.index))
    }

    fn entry_mut(
        &mut self,
        id: FieldId,
    ) -> Result<&mut FieldEntry<T, GRID_DIMENSION>> {
        if id.store != self.id {
            return Err(Error::UnknownField(id.index));
        }
        self.fields
            .get_mut(id.index)
            .ok_or(Error::UnknownField(id.index))
    }

    /// Data of a static field, or time buffer 0 of a time function.
    pub fn data(
        &self,
        field: &FieldHandle<GRID_DIMENSION>,
    ) -> Result<&FieldBuffer<T, GRID_DIMENSION>> {
        Ok(&self.entry(field.id)?.buffers[0])
    }

    pub fn data_mut(
        &mut self,
        field: &FieldHandle<GRID_DIMENSION>,
    ) -> Result<&mut FieldBuffer<T, GRID_DIMENSION>> {
        Ok(&mut self.entry_mut(field.id)?.buffers[0])
    }

    /// Buffer holding time step `time` of a field.
    pub fn time_data(
        &self,
        field: &FieldHandle<GRID_DIMENSION>,
        time: usize,
    ) -> Result<&FieldBuffer<T, GRID_DIMENSION>> {
        let entry = self.entry(field.id)?;
        let index = time_buffer_index(time, 0, entry.buffers.len());
        Ok(&entry.buffers[index])
    }

    pub fn time_data_mut(
        &mut self,
        field: &FieldHandle<GRID_DIMENSION>,
        time: usize,
    ) -> Result<&mut FieldBuffer<T, GRID_DIMENSION>> {
        let entry = self.entry_mut(field.id)?;
        let index = time_buffer_index(time, 0, entry.buffers.len());
        Ok(&mut entry.buffers[index])
    }

    /// Set the domain region of every buffer of a field to `value`.
    pub fn fill(
        &mut self,
        field: &FieldHandle<GRID_DIMENSION>,
        value: T,
    ) -> Result<()> {
        let chunk_size = self.chunk_size;
        for buffer in self.entry_mut(field.id)?.buffers.iter_mut() {
            buffer.fill(value, chunk_size);
        }
        Ok(())
    }

    /// Set the domain region of a static field from world coordinates.
    pub fn set_values<F: Fn(Coord<GRID_DIMENSION>) -> T + Send + Sync>(
        &mut self,
        field: &FieldHandle<GRID_DIMENSION>,
        f: F,
    ) -> Result<()> {
        let chunk_size = self.chunk_size;
        self.data_mut(field)?.par_set_values(f, chunk_size);
        Ok(())
    }

    /// Buffer `index` of a field checked at operator build time.
    pub(crate) fn buffer_at(
        &self,
        id: FieldId,
        index: usize,
    ) -> &FieldBuffer<T, GRID_DIMENSION> {
        &self.fields[id.index].buffers[index]
    }

    pub(crate) fn buffer_at_mut(
        &mut self,
        id: FieldId,
        index: usize,
    ) -> &mut FieldBuffer<T, GRID_DIMENSION> {
        &mut self.fields[id.index].buffers[index]
    }

    /// Move a buffer out so it can be written while the rest
    /// of the store is read. Must be paired with `restore_buffer`.
    pub(crate) fn take_buffer(
        &mut self,
        id: FieldId,
        index: usize,
    ) -> FieldBuffer<T, GRID_DIMENSION> {
        let domain = self.grid.domain();
        let placeholder = FieldBuffer::new(AABB::new(Bounds::zeros()), 0);
        let slot = &mut self.fields[id.index].buffers[index];
        debug_assert_eq!(slot.domain(), &domain);
        std::mem::replace(slot, placeholder)
    }

    pub(crate) fn restore_buffer(
        &mut self,
        id: FieldId,
        index: usize,
        buffer: FieldBuffer<T, GRID_DIMENSION>,
    ) {
        self.fields[id.index].buffers[index] = buffer;
    }

    pub fn total_bytes(&self) -> usize {
        self.fields.iter().map(|f| f.bytes()).sum()
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::real::DType;
    use float_cmp::assert_approx_eq;

    fn store() -> FieldStore<f32, 3> {
        let grid =
            Grid::from_spacing([5, 6, 7], [1.0; 3], [0.0; 3], DType::Float32)
                .unwrap();
        FieldStore::new(grid).unwrap()
    }

    #[test]
    fn allocation_test() {
        let mut s = store();
        let b = s.function("b", 4).unwrap();
        let p = s.time_function("p_0", 2, 8).unwrap();
        assert_eq!(s.entry(b.id()).unwrap().allocated_shape(), vec![13, 14, 15]);
        assert_eq!(
            s.entry(p.id()).unwrap().allocated_shape(),
            vec![3, 21, 22, 23]
        );
        assert_eq!(s.entry(p.id()).unwrap().halo, 8);
    }

    #[test]
    fn reject_bad_fields_test() {
        let mut s = store();
        assert!(s.function("b", 3).is_err());
        assert!(s.function("b", 0).is_err());
        assert!(s.function("1b", 2).is_err());
        assert!(s.function("a-b", 2).is_err());
        assert!(s.time_function("p", 0, 2).is_err());
        s.function("b", 2).unwrap();
        assert!(s.function("b", 2).is_err());
    }

    #[test]
    fn foreign_handle_test() {
        let mut a = store();
        let mut b = store();
        let _ = a.function("u", 2).unwrap();
        let v = b.function("v", 2).unwrap();
        assert!(matches!(a.data(&v), Err(Error::UnknownField(0))));
    }

    #[test]
    fn dtype_mismatch_test() {
        let grid = Grid::from_spacing([5, 5], [1.0; 2], [0.0; 2], DType::Float32)
            .unwrap();
        assert!(FieldStore::<f64, 2>::new(grid).is_err());
    }

    #[test]
    fn time_rotation_test() {
        assert_eq!(time_buffer_index(0, -1, 3), 2);
        assert_eq!(time_buffer_index(4, 1, 3), 2);
        assert_eq!(time_buffer_index(5, 0, 3), 2);

        let mut s = store();
        let p = s.time_function("p", 2, 2).unwrap();
        s.time_data_mut(&p, 7)
            .unwrap()
            .set_coord(&vector![1, 1, 1], 3.0);
        assert_approx_eq!(f32, s.time_data(&p, 1).unwrap().view(&vector![1, 1, 1]), 3.0);
        assert_approx_eq!(f32, s.time_data(&p, 2).unwrap().view(&vector![1, 1, 1]), 0.0);
    }

    #[test]
    fn handle_exprs_test() {
        let mut s = store();
        let b = s.function("b", 2).unwrap();
        let p = s.time_function("p", 2, 2).unwrap();
        match b.expr() {
            Expr::Access(a) => assert_eq!(a.time, None),
            e => panic!("unexpected {e:?}"),
        }
        match p.backward() {
            Expr::Access(a) => {
                assert_eq!(a.time, Some(-1));
                assert_eq!(&*a.name, "p");
            }
            e => panic!("unexpected {e:?}"),
        }
    }
}
