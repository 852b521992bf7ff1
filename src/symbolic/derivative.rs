//! Finite difference weights and staggered first derivatives.

use crate::error::*;
use crate::symbolic::Expr;

/// Which half point the derivative is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// `x + h/2`
    Forward,
    /// `x - h/2`
    Backward,
}

/// Fornberg's recursion for finite difference weights.
/// Returns `c` where `c[k][j]` is the weight of node `nodes[j]`
/// in the `k`-th derivative at `z`, for `k` up to `max_derivative`.
pub fn fornberg_weights(
    z: f64,
    nodes: &[f64],
    max_derivative: usize,
) -> Vec<Vec<f64>> {
    let n = nodes.len();
    let mut c = vec![vec![0.0; n]; max_derivative + 1];
    if n == 0 {
        return c;
    }
    let mut c1 = 1.0;
    let mut c4 = nodes[0] - z;
    c[0][0] = 1.0;
    for i in 1..n {
        let mn = i.min(max_derivative);
        let mut c2 = 1.0;
        let c5 = c4;
        c4 = nodes[i] - z;
        for j in 0..i {
            let c3 = nodes[i] - nodes[j];
            c2 *= c3;
            if j == i - 1 {
                for k in (1..=mn).rev() {
                    c[k][i] = c1 * (k as f64 * c[k - 1][i - 1] - c5 * c[k][i - 1])
                        / c2;
                }
                c[0][i] = -c1 * c5 * c[0][i - 1] / c2;
            }
            for k in (1..=mn).rev() {
                c[k][j] = (c4 * c[k][j] - k as f64 * c[k - 1][j]) / c3;
            }
            c[0][j] = c4 * c[0][j] / c3;
        }
        c1 = c2;
    }
    c
}

/// Node offsets and weights of a staggered first derivative with unit
/// spacing. `Forward` reads `-(r-1)..=r`, `Backward` reads `-r..=(r-1)`,
/// with `r = order / 2`.
pub fn staggered_weights(order: usize, side: Side) -> Result<Vec<(i32, f64)>> {
    if order < 2 || order % 2 != 0 {
        return Err(Error::InvalidEquation(format!(
            "staggered derivative order must be even and at least 2, got {order}"
        )));
    }
    let r = (order / 2) as i32;
    let (offsets, stagger): (Vec<i32>, f64) = match side {
        Side::Forward => ((-(r - 1)..=r).collect(), -0.5),
        Side::Backward => ((-r..r).collect(), 0.5),
    };
    let nodes: Vec<f64> = offsets.iter().map(|o| *o as f64 + stagger).collect();
    let c = fornberg_weights(0.0, &nodes, 1);
    Ok(offsets.into_iter().zip(c[1].iter().copied()).collect())
}

/// First derivative of `expr` along `axis` at the half point given by
/// `side`: `sum_j w_j expr(x + o_j) / h`.
/// Works on any expression, products are shifted as a whole.
pub fn staggered_first_derivative<const GRID_DIMENSION: usize>(
    expr: &Expr<GRID_DIMENSION>,
    axis: usize,
    side: Side,
    order: usize,
) -> Result<Expr<GRID_DIMENSION>> {
    if axis >= GRID_DIMENSION {
        return Err(Error::InvalidEquation(format!(
            "derivative along axis {axis} of a {GRID_DIMENSION}D grid"
        )));
    }
    let terms = staggered_weights(order, side)?
        .into_iter()
        .filter(|(_, w)| *w != 0.0)
        .map(|(o, w)| w * expr.shift(axis, o))
        .collect();
    Ok(Expr::mul(vec![
        Expr::pow(Expr::spacing(axis), -1),
        Expr::add(terms),
    ]))
}

/// Sum of absolute weights, the amplification bound of one derivative.
pub fn weight_norm(order: usize) -> Result<f64> {
    Ok(staggered_weights(order, Side::Forward)?
        .iter()
        .map(|(_, w)| w.abs())
        .sum())
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::field::FieldId;
    use crate::symbolic::{Access, SpacingMap, Symbol};
    use crate::util::*;
    use float_cmp::assert_approx_eq;
    use std::sync::Arc;

    #[test]
    fn centered_second_derivative_test() {
        let c = fornberg_weights(0.0, &[-1.0, 0.0, 1.0], 2);
        assert_approx_eq!(f64, c[2][0], 1.0);
        assert_approx_eq!(f64, c[2][1], -2.0);
        assert_approx_eq!(f64, c[2][2], 1.0);
        assert_approx_eq!(f64, c[1][0], -0.5);
        assert_approx_eq!(f64, c[1][2], 0.5);
        assert_approx_eq!(f64, c[0][1], 1.0);
    }

    #[test]
    fn order_two_test() {
        let w = staggered_weights(2, Side::Forward).unwrap();
        assert_eq!(w.len(), 2);
        assert_eq!((w[0].0, w[1].0), (0, 1));
        assert_approx_eq!(f64, w[0].1, -1.0);
        assert_approx_eq!(f64, w[1].1, 1.0);

        let w = staggered_weights(2, Side::Backward).unwrap();
        assert_eq!((w[0].0, w[1].0), (-1, 0));
        assert_approx_eq!(f64, w[0].1, -1.0);
        assert_approx_eq!(f64, w[1].1, 1.0);
    }

    #[test]
    fn order_eight_test() {
        let w = staggered_weights(8, Side::Forward).unwrap();
        let offsets: Vec<i32> = w.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![-3, -2, -1, 0, 1, 2, 3, 4]);
        let expected = [
            5.0 / 7168.0,
            -49.0 / 5120.0,
            245.0 / 3072.0,
            -1225.0 / 1024.0,
            1225.0 / 1024.0,
            -245.0 / 3072.0,
            49.0 / 5120.0,
            -5.0 / 7168.0,
        ];
        for ((_, w), e) in w.iter().zip(expected) {
            assert_approx_eq!(f64, *w, e, epsilon = 1e-12);
        }

        let b = staggered_weights(8, Side::Backward).unwrap();
        assert_eq!(b[0].0, -4);
        for ((_, wf), (_, wb)) in w.iter().zip(b.iter()) {
            assert_approx_eq!(f64, *wf, *wb, epsilon = 1e-12);
        }
        assert!(staggered_weights(3, Side::Forward).is_err());
    }

    #[test]
    fn derivative_of_linear_ramp_test() {
        // d/dx of x sampled with spacing 1 is exactly 1 for any order
        let w = staggered_weights(6, Side::Backward).unwrap();
        let slope: f64 = w.iter().map(|(o, w)| w * (*o as f64)).sum();
        assert_approx_eq!(f64, slope, 1.0, epsilon = 1e-12);
        let total: f64 = w.iter().map(|(_, w)| w).sum();
        assert_approx_eq!(f64, total, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn derivative_expr_test() {
        let u: Expr<2> = Expr::Access(Access {
            field: FieldId { store: 0, index: 0 },
            name: Arc::from("u"),
            time: None,
            offset: Coord::zeros(),
        });
        let d = staggered_first_derivative(&u, 1, Side::Forward, 4).unwrap();
        let offsets: Vec<i32> = d.accesses().iter().map(|a| a.offset[1]).collect();
        assert_eq!(offsets, vec![-1, 0, 1, 2]);
        assert!(d.free_symbols().contains(&Symbol::Spacing(1)));

        let dd = staggered_first_derivative(&d, 1, Side::Backward, 4).unwrap();
        let reach = dd.reach()[&FieldId { store: 0, index: 0 }];
        assert_eq!(reach, vector![0, 3]);

        let map = SpacingMap::new().with(Symbol::Spacing(1), 2.0);
        assert!(dd.subs(&map).free_symbols().is_empty());
        assert!(staggered_first_derivative(&u, 2, Side::Forward, 4).is_err());
    }

    #[test]
    fn weight_norm_test() {
        assert_approx_eq!(f64, weight_norm(2).unwrap(), 2.0);
        let n8 = weight_norm(8).unwrap();
        assert!(n8 > 2.5 && n8 < 2.6);
    }
}
