use crate::error::*;
use crate::symbolic::{Access, Expr};

/// Update `lhs = rhs`, written for every point of the domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation<const GRID_DIMENSION: usize> {
    lhs: Access<GRID_DIMENSION>,
    rhs: Expr<GRID_DIMENSION>,
}

impl<const GRID_DIMENSION: usize> Equation<GRID_DIMENSION> {
    /// `lhs` must be a bare field access at the current point.
    pub fn new(
        lhs: Expr<GRID_DIMENSION>,
        rhs: Expr<GRID_DIMENSION>,
    ) -> Result<Self> {
        let lhs = match lhs {
            Expr::Access(a) => a,
            other => {
                return Err(Error::InvalidEquation(format!(
                    "left hand side `{other}` is not a field access"
                )))
            }
        };
        if lhs.offset.iter().any(|o| *o != 0) {
            return Err(Error::InvalidEquation(format!(
                "left hand side `{lhs}` is offset from the current point"
            )));
        }
        if rhs.contains_source() {
            return Err(Error::InvalidEquation(format!(
                "source samples may only appear in injections, found in `{rhs}`"
            )));
        }
        Ok(Equation { lhs, rhs })
    }

    pub fn lhs(&self) -> &Access<GRID_DIMENSION> {
        &self.lhs
    }

    pub fn rhs(&self) -> &Expr<GRID_DIMENSION> {
        &self.rhs
    }
}

impl<const GRID_DIMENSION: usize> std::fmt::Display for Equation<GRID_DIMENSION> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Eq({}, {})", self.lhs, self.rhs)
    }
}
