use crate::error::*;
use crate::field::*;
use crate::grid::dimension_name;
use crate::operator::*;
use crate::real::Real;
use crate::util::*;
use rayon::prelude::*;
use std::time::{Duration, Instant};
use sync_ptr::SyncMutPtr;

/// Runtime arguments of `Operator::apply`, by name.
/// Recognised names are `time_m`, `time_M` and the block sizes
/// from `Operator::block_dimensions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyArgs {
    values: Vec<(String, usize)>,
}

impl ApplyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: &str, value: usize) -> Self {
        self.values.retain(|(n, _)| n != name);
        self.values.push((name.to_string(), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// Performance summary of one `apply` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub elapsed: Duration,
    pub timesteps: usize,
    /// Grid points updated, domain size times time steps.
    pub points: usize,
    pub gpts: f64,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} time steps in {:.3} s, {:.3} GPts/s",
            self.timesteps,
            self.elapsed.as_secs_f64(),
            self.gpts
        )
    }
}

/// Resolved loop bounds of one `apply` call.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopBounds {
    pub time_m: usize,
    pub time_max: usize,
    pub block_sizes: Vec<usize>,
}

impl<T: Real, const GRID_DIMENSION: usize> Operator<T, GRID_DIMENSION> {
    /// Check `args` and fill in defaults.
    pub fn loop_bounds(&self, args: &ApplyArgs) -> Result<LoopBounds> {
        let blocks = self.block_dimensions();
        for (name, _) in &args.values {
            if name != "time_m" && name != "time_M" && !blocks.contains(name) {
                return Err(Error::InvalidArgument {
                    name: name.clone(),
                    reason: format!("`{}` has no such argument", self.name()),
                });
            }
        }

        let time_m = args.get("time_m").unwrap_or(0);
        let time_max = match args.get("time_M").or(self.default_time_max()) {
            Some(t) => t,
            None => {
                return Err(Error::InvalidArgument {
                    name: "time_M".to_string(),
                    reason: "no default without a source, pass it explicitly"
                        .to_string(),
                })
            }
        };
        if time_m > time_max {
            return Err(Error::InvalidArgument {
                name: "time_m".to_string(),
                reason: format!("{time_m} is past time_M = {time_max}"),
            });
        }
        for inj in &self.injections {
            if time_max >= inj.injection.num() {
                return Err(Error::InvalidArgument {
                    name: "time_M".to_string(),
                    reason: format!(
                        "`{}` has only {} samples",
                        inj.injection.source_name(),
                        inj.injection.num()
                    ),
                });
            }
        }

        let shape = self.grid().shape();
        let mut block_sizes = Vec::with_capacity(blocks.len());
        for (d, name) in blocks.iter().enumerate() {
            let size = args.get(name).unwrap_or(DEFAULT_BLOCK_SIZE);
            if size == 0 {
                return Err(Error::InvalidArgument {
                    name: name.clone(),
                    reason: "block size must be positive".to_string(),
                });
            }
            if size > shape[d] {
                log::debug!(
                    "{} = {} exceeds `{}` size {}, clamping",
                    name,
                    size,
                    dimension_name(d),
                    shape[d]
                );
            }
            block_sizes.push(size.min(shape[d]));
        }

        Ok(LoopBounds {
            time_m,
            time_max,
            block_sizes,
        })
    }

    /// Run the time loop `time_m..=time_M` on `store`.
    /// Every time step sweeps each equation over the whole domain in
    /// order, then adds every injection.
    pub fn apply(
        &self,
        store: &mut FieldStore<T, GRID_DIMENSION>,
        args: &ApplyArgs,
    ) -> Result<Summary> {
        if store.id() != self.store_id {
            return Err(Error::InvalidArgument {
                name: "store".to_string(),
                reason: format!("`{}` was built for another field store", self.name()),
            });
        }
        let bounds = self.loop_bounds(args)?;
        let tiles = self.grid().domain().tiles(&bounds.block_sizes);
        log::info!(
            "applying `{}`: time {}..={}, {} blocks of {:?}",
            self.name(),
            bounds.time_m,
            bounds.time_max,
            tiles.len(),
            bounds.block_sizes
        );

        let start = Instant::now();
        for time in bounds.time_m..=bounds.time_max {
            profiling::scope!("time step");
            for eq in &self.equations {
                sweep(eq, store, &tiles, time);
            }
            for inj in &self.injections {
                inject(inj, store, time);
            }
        }
        let elapsed = start.elapsed();

        let timesteps = bounds.time_max - bounds.time_m + 1;
        let points = self.grid().num_points() * timesteps;
        let gpts = points as f64 / elapsed.as_secs_f64().max(1e-9) / 1e9;
        let summary = Summary {
            elapsed,
            timesteps,
            points,
            gpts,
        };
        log::info!("`{}` done: {}", self.name(), summary);
        Ok(summary)
    }
}

/// Write one equation over the domain at time step `time`.
fn sweep<T: Real, const GRID_DIMENSION: usize>(
    eq: &LoweredEquation<T, GRID_DIMENSION>,
    store: &mut FieldStore<T, GRID_DIMENSION>,
    tiles: &[AABB<GRID_DIMENSION>],
    time: usize,
) {
    profiling::scope!("sweep");
    let target_index = eq.target.buffer_index(time);
    let mut target = store.take_buffer(eq.target.field, target_index);
    {
        let inputs: Vec<&FieldBuffer<T, GRID_DIMENSION>> = eq
            .slots
            .iter()
            .map(|s| store.buffer_at(s.field, s.buffer_index(time)))
            .collect();
        let slices: Vec<&[T]> = inputs.iter().map(|b| b.buffer()).collect();
        let aabbs: Vec<AABB<GRID_DIMENSION>> =
            inputs.iter().map(|b| *b.aabb()).collect();
        let target_aabb = *target.aabb();

        // Tiles are disjoint and the builder rejects reads of the
        // target buffer, so every element has exactly one writer.
        let target_ptr =
            unsafe { SyncMutPtr::new(target.buffer_mut().as_mut_ptr()) };
        tiles.par_iter().for_each(|tile| {
            let mut stack = Vec::with_capacity(eq.kernel.max_stack());
            let mut bases = vec![0; slices.len()];
            let (rows, len) = rows_of(tile);
            for row in rows.coord_iter() {
                for (base, aabb) in bases.iter_mut().zip(aabbs.iter()) {
                    *base = aabb.coord_to_linear(&row);
                }
                let target_base = target_aabb.coord_to_linear(&row);
                for i in 0..len {
                    let value =
                        eq.kernel.eval(&slices, &bases, i, T::zero(), &mut stack);
                    unsafe {
                        *target_ptr.inner().add(target_base + i) = value;
                    }
                }
            }
        });
    }
    store.restore_buffer(eq.target.field, target_index, target);
}

/// Row starts of a tile and the row length along the last axis.
fn rows_of<const GRID_DIMENSION: usize>(
    tile: &AABB<GRID_DIMENSION>,
) -> (AABB<GRID_DIMENSION>, usize) {
    let last = GRID_DIMENSION - 1;
    let mut rows = *tile;
    rows.bounds[(last, 1)] = rows.bounds[(last, 0)];
    let len = (tile.bounds[(last, 1)] - tile.bounds[(last, 0)] + 1) as usize;
    (rows, len)
}

/// Add the weighted injection expression at every corner.
/// Values are gathered before any write so the target may be read.
fn inject<T: Real, const GRID_DIMENSION: usize>(
    inj: &LoweredInjection<T, GRID_DIMENSION>,
    store: &mut FieldStore<T, GRID_DIMENSION>,
    time: usize,
) {
    profiling::scope!("inject");
    let target_index = inj.target.buffer_index(time);
    let updates: Vec<(usize, T)> = {
        let inputs: Vec<&FieldBuffer<T, GRID_DIMENSION>> = inj
            .slots
            .iter()
            .map(|s| store.buffer_at(s.field, s.buffer_index(time)))
            .collect();
        let slices: Vec<&[T]> = inputs.iter().map(|b| b.buffer()).collect();
        let target_aabb = *store.buffer_at(inj.target.field, target_index).aabb();
        let mut stack = Vec::with_capacity(inj.kernel.max_stack());
        let mut bases = vec![0; slices.len()];
        inj.injection
            .corners()
            .iter()
            .map(|corner| {
                for (base, input) in bases.iter_mut().zip(inputs.iter()) {
                    *base = input.aabb().coord_to_linear(&corner.coord);
                }
                let sample = T::of(inj.injection.sample(time, corner.point));
                let value = inj.kernel.eval(&slices, &bases, 0, sample, &mut stack);
                (
                    target_aabb.coord_to_linear(&corner.coord),
                    value * T::of(corner.weight),
                )
            })
            .collect()
    };
    let target = store.buffer_at_mut(inj.target.field, target_index);
    let buffer = target.buffer_mut();
    for (index, value) in updates {
        buffer[index] = buffer[index] + value;
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::grid::Grid;
    use crate::real::DType;
    use crate::source::PointSource;
    use crate::symbolic::*;
    use crate::time_axis::TimeAxis;
    use float_cmp::assert_approx_eq;

    #[test]
    fn rows_test() {
        let tile = AABB::new(matrix![0, 3; 4, 7; 2, 9]);
        let (rows, len) = rows_of(&tile);
        assert_eq!(rows, AABB::new(matrix![0, 3; 4, 7; 2, 2]));
        assert_eq!(len, 8);
        let (rows, len) = rows_of(&AABB::new(matrix![5, 9]));
        assert_eq!(rows.buffer_size(), 1);
        assert_eq!(len, 5);
    }

    #[test]
    fn args_test() {
        let grid = Grid::from_spacing([20, 6, 4], [1.0; 3], [0.0; 3], DType::Float64)
            .unwrap();
        let mut store = FieldStore::<f64, 3>::new(grid).unwrap();
        let u = store.time_function("u", 1, 2).unwrap();
        let eq = Equation::new(u.forward(), u.expr() * 0.5).unwrap();
        let subs = store.grid().spacing_map();
        let op = Operator::build("Op", &[eq], &[], &subs, &store).unwrap();

        assert!(op.loop_bounds(&ApplyArgs::new()).is_err());
        let b = op
            .loop_bounds(&ApplyArgs::new().set("time_M", 3).set("y0_blk0_size", 100))
            .unwrap();
        assert_eq!(b.block_sizes, vec![8, 6]);
        assert!(op
            .loop_bounds(&ApplyArgs::new().set("time_M", 3).set("x0_blk0_size", 0))
            .is_err());
        assert!(op
            .loop_bounds(&ApplyArgs::new().set("time_M", 3).set("z0_blk0_size", 2))
            .is_err());
        assert!(op
            .loop_bounds(&ApplyArgs::new().set("time_m", 4).set("time_M", 3))
            .is_err());
    }

    #[test]
    fn decay_test() {
        let grid = Grid::from_spacing([7, 5], [1.0; 2], [0.0; 2], DType::Float64)
            .unwrap();
        let mut store = FieldStore::<f64, 2>::new(grid).unwrap();
        let u = store.time_function("u", 1, 2).unwrap();
        store.fill(&u, 1.0).unwrap();
        let eq = Equation::new(u.forward(), u.expr() * 0.5).unwrap();
        let subs = store.grid().spacing_map();
        let op = Operator::build("Op", &[eq], &[], &subs, &store).unwrap();
        let summary = op
            .apply(&mut store, &ApplyArgs::new().set("time_M", 2).set("x0_blk0_size", 3))
            .unwrap();
        assert_eq!(summary.timesteps, 3);
        assert_eq!(summary.points, 105);
        let last = store.time_data(&u, 3).unwrap();
        for c in store.grid().domain().coord_iter() {
            assert_approx_eq!(f64, last.view(&c), 0.125);
        }
        assert_approx_eq!(f64, last.view(&vector![-1, 0]), 0.0);
    }

    #[test]
    fn injection_test() {
        let grid = Grid::from_spacing([5, 5], [1.0; 2], [0.0; 2], DType::Float32)
            .unwrap();
        let mut store = FieldStore::<f32, 2>::new(grid).unwrap();
        let p = store.time_function("p", 2, 2).unwrap();
        let b = store.function("b", 2).unwrap();
        store.fill(&b, 2.0).unwrap();
        let axis = TimeAxis::new(0.0, 3.0, 1.0).unwrap();
        let mut src = PointSource::new("src", vec![[1.5, 2.0]], axis.num()).unwrap();
        src.set_series(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let inj = src
            .inject(store.grid(), p.forward(), Expr::source() * b.expr())
            .unwrap();
        let subs = store.grid().spacing_map();
        let op = Operator::build("Op", &[], &[inj], &subs, &store).unwrap();
        op.apply(&mut store, &ApplyArgs::new().set("time_m", 1).set("time_M", 1))
            .unwrap();
        // time 1 writes buffer 2 with sample 2 * b = 4, split over two points
        let written = store.time_data(&p, 2).unwrap();
        assert_approx_eq!(f32, written.view(&vector![1, 2]), 2.0);
        assert_approx_eq!(f32, written.view(&vector![2, 2]), 2.0);
        assert_approx_eq!(f32, written.view(&vector![3, 2]), 0.0);
        assert!(op
            .apply(&mut store, &ApplyArgs::new().set("time_M", 4))
            .is_err());
    }

    #[test]
    fn default_time_range_test() {
        let grid = Grid::from_spacing([5, 5], [1.0; 2], [0.0; 2], DType::Float32)
            .unwrap();
        let mut store = FieldStore::<f32, 2>::new(grid).unwrap();
        let p = store.time_function("p", 2, 2).unwrap();
        let axis = TimeAxis::new(0.0, 3.0, 1.0).unwrap();
        let src = PointSource::ricker("src", vec![[2.0, 2.0]], &axis, 0.25).unwrap();
        let inj = src
            .inject(store.grid(), p.forward(), Expr::source())
            .unwrap();
        let subs = store.grid().spacing_map();
        let op = Operator::build("Op", &[], &[inj], &subs, &store).unwrap();

        // every source sample is injected by default
        let bounds = op.loop_bounds(&ApplyArgs::new()).unwrap();
        assert_eq!(bounds.time_m, 0);
        assert_eq!(bounds.time_max, axis.num() - 1);
        let last = ApplyArgs::new().set("time_M", axis.num() - 1);
        assert_eq!(op.loop_bounds(&last).unwrap().time_max, 3);
        op.apply(&mut store, &ApplyArgs::new()).unwrap();
        assert!(matches!(
            op.loop_bounds(&ApplyArgs::new().set("time_M", axis.num())),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
