//! Operators: validated, lowered equations plus source injections.
//!
//! `Operator::build` substitutes the bound symbols, checks every access
//! against the field store and lowers each right hand side into a
//! postfix `Kernel`. The result can be applied to the store with
//! `Operator::apply` or printed as C with `Operator::ccode`.

mod apply;
mod args;
mod codegen;
mod kernel;

pub use apply::*;
pub use args::*;
pub use kernel::*;

use crate::error::*;
use crate::field::*;
use crate::grid::{dimension_name, Grid};
use crate::real::Real;
use crate::source::Injection;
use crate::symbolic::{Access, Equation, Expr, SpacingMap};

/// Buffer a kernel reads or writes: a field at a time shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub field: FieldId,
    pub time: Option<i32>,
    pub buffers: usize,
}

impl Slot {
    /// Buffer holding this slot during time step `time`.
    pub fn buffer_index(&self, time: usize) -> usize {
        time_buffer_index(time, self.time.unwrap_or(0), self.buffers)
    }

    fn aliases(&self, other: &Slot) -> bool {
        self.field == other.field
            && (self.time.unwrap_or(0) - other.time.unwrap_or(0))
                .rem_euclid(self.buffers as i32)
                == 0
    }
}

/// Field layout recorded at build time, used for argument maps and C code.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub id: FieldId,
    pub name: String,
    pub kind: FieldKind,
    pub halo: i32,
    pub shape: Vec<usize>,
}

#[derive(Debug, Clone)]
pub(crate) struct LoweredEquation<T: Real, const GRID_DIMENSION: usize> {
    pub lhs: Access<GRID_DIMENSION>,
    pub target: Slot,
    pub rhs: Expr<GRID_DIMENSION>,
    pub slots: Vec<Slot>,
    pub kernel: Kernel<T>,
}

#[derive(Debug, Clone)]
pub(crate) struct LoweredInjection<T: Real, const GRID_DIMENSION: usize> {
    pub injection: Injection<GRID_DIMENSION>,
    pub target: Slot,
    pub expr: Expr<GRID_DIMENSION>,
    pub slots: Vec<Slot>,
    pub kernel: Kernel<T>,
}

pub struct Operator<T: Real, const GRID_DIMENSION: usize> {
    name: String,
    store_id: u64,
    grid: Grid<GRID_DIMENSION>,
    subs: SpacingMap,
    fields: Vec<FieldInfo>,
    equations: Vec<LoweredEquation<T, GRID_DIMENSION>>,
    injections: Vec<LoweredInjection<T, GRID_DIMENSION>>,
}

/// Check an access against the store and return its slot.
fn resolve_access<T: Real, const GRID_DIMENSION: usize>(
    store: &FieldStore<T, GRID_DIMENSION>,
    access: &Access<GRID_DIMENSION>,
) -> Result<Slot> {
    let entry = store.entry(access.field)?;
    match (entry.kind, access.time) {
        (FieldKind::Function, None) => {}
        (FieldKind::Function, Some(_)) => {
            return Err(Error::InvalidEquation(format!(
                "static field `{}` is accessed with a time index in `{}`",
                entry.name, access
            )))
        }
        (FieldKind::TimeFunction { time_order }, Some(t))
            if t <= 1 && t >= 1 - time_order as i32 => {}
        (FieldKind::TimeFunction { time_order }, _) => {
            return Err(Error::InvalidEquation(format!(
                "`{}` has time order {} and cannot be accessed as `{}`",
                entry.name, time_order, access
            )))
        }
    }
    for d in 0..GRID_DIMENSION {
        let needed = access.offset[d].abs();
        if needed > entry.halo {
            return Err(Error::InsufficientHalo {
                field: entry.name.clone(),
                dim: dimension_name(d),
                needed,
                available: entry.halo,
            });
        }
    }
    Ok(Slot {
        field: access.field,
        time: access.time,
        buffers: entry.buffers.len(),
    })
}

/// Substitute and check an expression, then lower it.
fn lower_expr<T: Real, const GRID_DIMENSION: usize>(
    store: &FieldStore<T, GRID_DIMENSION>,
    expr: &Expr<GRID_DIMENSION>,
    subs: &SpacingMap,
) -> Result<(Expr<GRID_DIMENSION>, Vec<Slot>, Kernel<T>)> {
    let expr = expr.subs(subs);
    if let Some(s) = expr.free_symbols().into_iter().next() {
        return Err(Error::UnboundSymbol(s.name()));
    }

    let mut slots: Vec<Slot> = Vec::new();
    for access in expr.accesses() {
        let slot = resolve_access(store, access)?;
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }

    let slot_of = |a: &Access<GRID_DIMENSION>| -> Result<(usize, isize)> {
        let slot = slots
            .iter()
            .position(|s| s.field == a.field && s.time == a.time)
            .ok_or(Error::UnknownField(a.field.index))?;
        let aabb = store.entry(a.field)?.buffers[0].aabb();
        Ok((slot, aabb.offset_to_linear(&a.offset)))
    };
    let kernel = Kernel::lower(&expr, &slot_of)?;
    Ok((expr, slots, kernel))
}

impl<T: Real, const GRID_DIMENSION: usize> Operator<T, GRID_DIMENSION> {
    /// Validate and lower `equations` and `injections`.
    ///
    /// Every symbol must be bound by `subs`, every field must belong to
    /// `store` and be read within its halo, and no equation may read the
    /// buffer it writes.
    pub fn build(
        name: &str,
        equations: &[Equation<GRID_DIMENSION>],
        injections: &[Injection<GRID_DIMENSION>],
        subs: &SpacingMap,
        store: &FieldStore<T, GRID_DIMENSION>,
    ) -> Result<Self> {
        profiling::scope!("operator build");
        if equations.is_empty() && injections.is_empty() {
            return Err(Error::InvalidEquation(
                "operator has nothing to compute".to_string(),
            ));
        }

        let mut lowered = Vec::with_capacity(equations.len());
        for eq in equations {
            let target = resolve_access(store, eq.lhs())?;
            let (rhs, slots, kernel) = lower_expr(store, eq.rhs(), subs)?;
            if slots.iter().any(|s| s.aliases(&target)) {
                return Err(Error::SelfDependency(eq.lhs().to_string()));
            }
            log::debug!(
                "{}: lowered `{}` to {} instructions over {} buffers",
                name,
                eq.lhs(),
                kernel.program().len(),
                slots.len()
            );
            lowered.push(LoweredEquation {
                lhs: eq.lhs().clone(),
                target,
                rhs,
                slots,
                kernel,
            });
        }

        let mut lowered_injections = Vec::with_capacity(injections.len());
        for injection in injections {
            let target = resolve_access(store, injection.target())?;
            let (expr, slots, kernel) =
                lower_expr(store, injection.expr(), subs)?;
            log::debug!(
                "{}: injection of `{}` into `{}` touches {} points",
                name,
                injection.source_name(),
                injection.target(),
                injection.corners().len()
            );
            lowered_injections.push(LoweredInjection {
                injection: injection.clone(),
                target,
                expr,
                slots,
                kernel,
            });
        }

        let mut ids: Vec<FieldId> = Vec::new();
        let mut note = |id: FieldId| {
            if !ids.contains(&id) {
                ids.push(id);
            }
        };
        for eq in &lowered {
            note(eq.target.field);
            eq.slots.iter().for_each(|s| note(s.field));
        }
        for inj in &lowered_injections {
            note(inj.target.field);
            inj.slots.iter().for_each(|s| note(s.field));
        }
        let mut fields = ids
            .into_iter()
            .map(|id| {
                let entry = store.entry(id)?;
                Ok(FieldInfo {
                    id,
                    name: entry.name.clone(),
                    kind: entry.kind,
                    halo: entry.halo,
                    shape: entry.allocated_shape(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        fields.sort_by(|a, b| a.name.cmp(&b.name));

        log::info!(
            "built operator `{}`: {} equations, {} injections, {} fields",
            name,
            lowered.len(),
            lowered_injections.len(),
            fields.len()
        );

        Ok(Operator {
            name: name.to_string(),
            store_id: store.id(),
            grid: store.grid().clone(),
            subs: subs.clone(),
            fields,
            equations: lowered,
            injections: lowered_injections,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &Grid<GRID_DIMENSION> {
        &self.grid
    }

    pub fn subs(&self) -> &SpacingMap {
        &self.subs
    }

    /// Fields touched by the operator, sorted by name.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn num_equations(&self) -> usize {
        self.equations.len()
    }

    pub fn num_injections(&self) -> usize {
        self.injections.len()
    }

    /// Substituted right hand sides, in execution order.
    pub fn rhs(&self) -> impl Iterator<Item = &Expr<GRID_DIMENSION>> + '_ {
        self.equations.iter().map(|eq| &eq.rhs)
    }

    /// Number of leading axes split into blocks, the innermost
    /// contiguous axis is never blocked.
    pub fn num_blocked(&self) -> usize {
        GRID_DIMENSION.saturating_sub(1).min(2)
    }

    /// Names of the block size arguments, `x0_blk0_size` and so on.
    pub fn block_dimensions(&self) -> Vec<String> {
        (0..self.num_blocked())
            .map(|d| format!("{}0_blk0_size", dimension_name(d)))
            .collect()
    }

    /// Default last time step, the last sample of the shortest source.
    pub fn default_time_max(&self) -> Option<usize> {
        self.injections
            .iter()
            .map(|inj| inj.injection.num())
            .min()
            .and_then(|n| n.checked_sub(1))
    }
}
