use crate::error::*;
use crate::real::Real;
use crate::symbolic::{Access, Expr};

/// One instruction of a postfix kernel program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr<T: Real> {
    Const(T),
    /// Push `buffers[slot][bases[slot] + step + offset]`.
    Load { slot: usize, offset: isize },
    /// Push the current source sample.
    Source,
    /// Replace the top `n` values by their sum.
    Add(usize),
    /// Replace the top `n` values by their product.
    Mul(usize),
    Pow(i32),
}

/// Pointwise evaluator of one lowered expression.
#[derive(Debug, Clone)]
pub struct Kernel<T: Real> {
    program: Vec<Instr<T>>,
    max_stack: usize,
}

impl<T: Real> Kernel<T> {
    /// Lower a symbol free expression.
    /// `slot_of` maps an access to its buffer slot and linear offset.
    pub fn lower<const GRID_DIMENSION: usize, F>(
        expr: &Expr<GRID_DIMENSION>,
        slot_of: &F,
    ) -> Result<Self>
    where
        F: Fn(&Access<GRID_DIMENSION>) -> Result<(usize, isize)>,
    {
        let mut program = Vec::new();
        lower_impl(expr, slot_of, &mut program)?;

        let mut depth: usize = 0;
        let mut max_stack = 0;
        for instr in &program {
            depth = match instr {
                Instr::Const(_) | Instr::Load { .. } | Instr::Source => depth + 1,
                Instr::Add(n) | Instr::Mul(n) => depth + 1 - n,
                Instr::Pow(_) => depth,
            };
            max_stack = max_stack.max(depth);
        }
        debug_assert_eq!(depth, 1);

        Ok(Kernel { program, max_stack })
    }

    pub fn program(&self) -> &[Instr<T>] {
        &self.program
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Evaluate at the point whose linear index in slot `s` is
    /// `bases[s] + step`.
    #[inline]
    pub fn eval(
        &self,
        buffers: &[&[T]],
        bases: &[usize],
        step: usize,
        source: T,
        stack: &mut Vec<T>,
    ) -> T {
        stack.clear();
        for instr in &self.program {
            match *instr {
                Instr::Const(v) => stack.push(v),
                Instr::Load { slot, offset } => {
                    let index = (bases[slot] + step) as isize + offset;
                    stack.push(buffers[slot][index as usize]);
                }
                Instr::Source => stack.push(source),
                Instr::Add(n) => {
                    let start = stack.len() - n;
                    let sum = stack[start + 1..]
                        .iter()
                        .fold(stack[start], |a, b| a + *b);
                    stack.truncate(start);
                    stack.push(sum);
                }
                Instr::Mul(n) => {
                    let start = stack.len() - n;
                    let product = stack[start + 1..]
                        .iter()
                        .fold(stack[start], |a, b| a * *b);
                    stack.truncate(start);
                    stack.push(product);
                }
                Instr::Pow(e) => {
                    if let Some(top) = stack.last_mut() {
                        *top = top.powi(e);
                    }
                }
            }
        }
        stack.pop().unwrap_or_else(T::zero)
    }
}

fn lower_impl<T: Real, const GRID_DIMENSION: usize, F>(
    expr: &Expr<GRID_DIMENSION>,
    slot_of: &F,
    program: &mut Vec<Instr<T>>,
) -> Result<()>
where
    F: Fn(&Access<GRID_DIMENSION>) -> Result<(usize, isize)>,
{
    match expr {
        Expr::Const(v) => program.push(Instr::Const(T::of(*v))),
        Expr::Symbol(s) => return Err(Error::UnboundSymbol(s.name())),
        Expr::Access(a) => {
            let (slot, offset) = slot_of(a)?;
            program.push(Instr::Load { slot, offset });
        }
        Expr::Source => program.push(Instr::Source),
        Expr::Add(terms) => {
            for t in terms {
                lower_impl(t, slot_of, program)?;
            }
            program.push(Instr::Add(terms.len()));
        }
        Expr::Mul(factors) => {
            for f in factors {
                lower_impl(f, slot_of, program)?;
            }
            program.push(Instr::Mul(factors.len()));
        }
        Expr::Pow(base, e) => {
            lower_impl(base, slot_of, program)?;
            program.push(Instr::Pow(*e));
        }
    }
    Ok(())
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::field::FieldId;
    use crate::symbolic::Symbol;
    use crate::util::*;
    use float_cmp::assert_approx_eq;
    use std::sync::Arc;

    fn access(index: usize) -> Expr<1> {
        Expr::Access(Access {
            field: FieldId { store: 0, index },
            name: Arc::from(if index == 0 { "u" } else { "v" }),
            time: None,
            offset: Coord::zeros(),
        })
    }

    fn slot_of(a: &Access<1>) -> Result<(usize, isize)> {
        Ok((a.field.index, a.offset[0] as isize))
    }

    #[test]
    fn eval_test() {
        // (u(x+1) - u(x-1)) * v / 2 + 1
        let e = (access(0).shift(0, 1) - access(0).shift(0, -1)) * access(1)
            / 2.0
            + 1.0;
        let k = Kernel::<f64>::lower(&e, &slot_of).unwrap();
        let u = [0.0, 1.0, 4.0, 9.0, 16.0];
        let v = [3.0; 5];
        let buffers: [&[f64]; 2] = [&u, &v];
        let mut stack = Vec::new();
        for step in 1..4 {
            let value = k.eval(&buffers, &[0, 0], step, 0.0, &mut stack);
            let expected =
                (u[step + 1] - u[step - 1]) * v[step] / 2.0 + 1.0;
            assert_approx_eq!(f64, value, expected);
        }
        assert!(k.max_stack() >= 3);
    }

    #[test]
    fn pow_and_source_test() {
        let e = Expr::source() * Expr::pow(access(1), -2);
        let k = Kernel::<f32>::lower(&e, &slot_of).unwrap();
        let v = [2.0f32];
        let buffers: [&[f32]; 2] = [&[], &v];
        let mut stack = Vec::new();
        let value = k.eval(&buffers, &[0, 0], 0, 8.0, &mut stack);
        assert_approx_eq!(f32, value, 2.0);
    }

    #[test]
    fn unbound_symbol_test() {
        let e = access(0) * Expr::symbol(Symbol::Dt);
        match Kernel::<f32>::lower(&e, &slot_of) {
            Err(Error::UnboundSymbol(name)) => assert_eq!(name, "dt"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
