use crate::field::FieldId;
use crate::grid::dimension_name;
use crate::symbolic::{SpacingMap, Symbol};
use crate::util::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Read of a field at an integer offset from the current point.
#[derive(Debug, Clone, PartialEq)]
pub struct Access<const GRID_DIMENSION: usize> {
    pub field: FieldId,
    pub name: Arc<str>,
    /// Time shift for time functions, `None` for static fields.
    pub time: Option<i32>,
    pub offset: Coord<GRID_DIMENSION>,
}

/// Scalar expression over field accesses.
///
/// Sums and products are n-ary and built through `Expr::add` and
/// `Expr::mul`, which flatten nested nodes and fold constants.
/// `x - y` is stored as `x + (-1) y` and `x / y` as `x y^-1`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<const GRID_DIMENSION: usize> {
    Const(f64),
    Symbol(Symbol),
    Access(Access<GRID_DIMENSION>),
    /// Current sample of a point source, only valid in injections.
    Source,
    Add(Vec<Expr<GRID_DIMENSION>>),
    Mul(Vec<Expr<GRID_DIMENSION>>),
    Pow(Box<Expr<GRID_DIMENSION>>, i32),
}

impl<const GRID_DIMENSION: usize> Expr<GRID_DIMENSION> {
    pub fn symbol(symbol: Symbol) -> Self {
        Expr::Symbol(symbol)
    }

    pub fn dt() -> Self {
        Expr::Symbol(Symbol::Dt)
    }

    pub fn spacing(axis: usize) -> Self {
        Expr::Symbol(Symbol::Spacing(axis))
    }

    pub fn source() -> Self {
        Expr::Source
    }

    pub fn add(terms: Vec<Self>) -> Self {
        let mut constant = 0.0;
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                Expr::Const(v) => constant += v,
                Expr::Add(inner) => {
                    for t in inner {
                        match t {
                            Expr::Const(v) => constant += v,
                            t => flat.push(t),
                        }
                    }
                }
                t => flat.push(t),
            }
        }
        if constant != 0.0 {
            flat.push(Expr::Const(constant));
        }
        match flat.len() {
            0 => Expr::Const(0.0),
            1 => flat.pop().unwrap_or(Expr::Const(0.0)),
            _ => Expr::Add(flat),
        }
    }

    pub fn mul(factors: Vec<Self>) -> Self {
        let mut constant = 1.0;
        let mut flat = Vec::with_capacity(factors.len() + 1);
        for factor in factors {
            match factor {
                Expr::Const(v) => constant *= v,
                Expr::Mul(inner) => {
                    for f in inner {
                        match f {
                            Expr::Const(v) => constant *= v,
                            f => flat.push(f),
                        }
                    }
                }
                f => flat.push(f),
            }
        }
        if constant == 0.0 {
            return Expr::Const(0.0);
        }
        if constant != 1.0 || flat.is_empty() {
            flat.insert(0, Expr::Const(constant));
        }
        match flat.len() {
            1 => flat.pop().unwrap_or(Expr::Const(1.0)),
            _ => Expr::Mul(flat),
        }
    }

    pub fn pow(base: Self, exponent: i32) -> Self {
        match (base, exponent) {
            (_, 0) => Expr::Const(1.0),
            (base, 1) => base,
            (Expr::Const(v), e) => Expr::Const(v.powi(e)),
            (Expr::Pow(inner, e), exponent) => Expr::pow(*inner, e * exponent),
            (base, exponent) => Expr::Pow(Box::new(base), exponent),
        }
    }

    /// Rebuild the tree bottom up, `f` rewrites leaves.
    fn map_leaves<F: Fn(&Self) -> Option<Self> + Copy>(&self, f: F) -> Self {
        match self {
            Expr::Add(terms) => {
                Expr::add(terms.iter().map(|t| t.map_leaves(f)).collect())
            }
            Expr::Mul(factors) => {
                Expr::mul(factors.iter().map(|t| t.map_leaves(f)).collect())
            }
            Expr::Pow(base, e) => Expr::pow(base.map_leaves(f), *e),
            leaf => f(leaf).unwrap_or_else(|| leaf.clone()),
        }
    }

    /// Move every field access `k` points along `axis`.
    pub fn shift(&self, axis: usize, k: i32) -> Self {
        debug_assert!(axis < GRID_DIMENSION);
        self.map_leaves(|leaf| match leaf {
            Expr::Access(a) => {
                let mut a = a.clone();
                a.offset[axis] += k;
                Some(Expr::Access(a))
            }
            _ => None,
        })
    }

    /// Replace bound symbols by their values, folding constants.
    pub fn subs(&self, map: &SpacingMap) -> Self {
        self.map_leaves(|leaf| match leaf {
            Expr::Symbol(s) => map.get(s).map(Expr::Const),
            _ => None,
        })
    }

    fn visit<'a, F: FnMut(&'a Self)>(&'a self, f: &mut F) {
        f(self);
        match self {
            Expr::Add(children) | Expr::Mul(children) => {
                for c in children {
                    c.visit(f);
                }
            }
            Expr::Pow(base, _) => base.visit(f),
            _ => {}
        }
    }

    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut result = BTreeSet::new();
        self.visit(&mut |e| {
            if let Expr::Symbol(s) = e {
                result.insert(*s);
            }
        });
        result
    }

    /// Every field access, in traversal order, duplicates included.
    pub fn accesses(&self) -> Vec<&Access<GRID_DIMENSION>> {
        let mut result = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Access(a) = e {
                result.push(a);
            }
        });
        result
    }

    pub fn contains_source(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, Expr::Source));
        found
    }

    /// Largest absolute offset of any access per field and axis.
    pub fn reach(&self) -> BTreeMap<FieldId, Coord<GRID_DIMENSION>> {
        let mut result: BTreeMap<FieldId, Coord<GRID_DIMENSION>> =
            BTreeMap::new();
        for a in self.accesses() {
            let r = result.entry(a.field).or_insert_with(Coord::zeros);
            for d in 0..GRID_DIMENSION {
                r[d] = r[d].max(a.offset[d].abs());
            }
        }
        result
    }

}

impl<const GRID_DIMENSION: usize> std::fmt::Display for Access<GRID_DIMENSION> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.name)?;
        let mut first = true;
        if let Some(t) = self.time {
            write_index(f, "t", t)?;
            first = false;
        }
        for d in 0..GRID_DIMENSION {
            if !first {
                write!(f, ", ")?;
            }
            write_index(f, &dimension_name(d), self.offset[d])?;
            first = false;
        }
        write!(f, ")")
    }
}

fn write_index(
    f: &mut std::fmt::Formatter<'_>,
    name: &str,
    offset: i32,
) -> std::fmt::Result {
    match offset {
        0 => write!(f, "{name}"),
        o if o > 0 => write!(f, "{name} + {o}"),
        o => write!(f, "{name} - {}", -o),
    }
}

impl<const GRID_DIMENSION: usize> std::fmt::Display for Expr<GRID_DIMENSION> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v:?}"),
            Expr::Symbol(s) => write!(f, "{s}"),
            Expr::Access(a) => write!(f, "{a}"),
            Expr::Source => write!(f, "src"),
            Expr::Add(terms) => {
                write!(f, "(")?;
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            Expr::Mul(factors) => {
                for (i, t) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
            Expr::Pow(base, e) => match **base {
                Expr::Add(_) | Expr::Mul(_) => write!(f, "({base})**{e}"),
                _ => write!(f, "{base}**{e}"),
            },
        }
    }
}

impl<const GRID_DIMENSION: usize> From<f64> for Expr<GRID_DIMENSION> {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl<const GRID_DIMENSION: usize> std::ops::Neg for Expr<GRID_DIMENSION> {
    type Output = Self;

    fn neg(self) -> Self {
        Expr::mul(vec![Expr::Const(-1.0), self])
    }
}

impl<const GRID_DIMENSION: usize> std::ops::Add for Expr<GRID_DIMENSION> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Expr::add(vec![self, rhs])
    }
}

impl<const GRID_DIMENSION: usize> std::ops::Sub for Expr<GRID_DIMENSION> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Expr::add(vec![self, -rhs])
    }
}

impl<const GRID_DIMENSION: usize> std::ops::Mul for Expr<GRID_DIMENSION> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Expr::mul(vec![self, rhs])
    }
}

impl<const GRID_DIMENSION: usize> std::ops::Div for Expr<GRID_DIMENSION> {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        Expr::mul(vec![self, Expr::pow(rhs, -1)])
    }
}

macro_rules! scalar_ops {
    ($($trait:ident $method:ident),*) => {
        $(
            impl<const GRID_DIMENSION: usize> std::ops::$trait<f64>
                for Expr<GRID_DIMENSION>
            {
                type Output = Expr<GRID_DIMENSION>;

                fn $method(self, rhs: f64) -> Expr<GRID_DIMENSION> {
                    std::ops::$trait::$method(self, Expr::Const(rhs))
                }
            }

            impl<const GRID_DIMENSION: usize>
                std::ops::$trait<Expr<GRID_DIMENSION>> for f64
            {
                type Output = Expr<GRID_DIMENSION>;

                fn $method(
                    self,
                    rhs: Expr<GRID_DIMENSION>,
                ) -> Expr<GRID_DIMENSION> {
                    std::ops::$trait::$method(Expr::Const(self), rhs)
                }
            }
        )*
    };
}

scalar_ops!(Add add, Sub sub, Mul mul, Div div);

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn access(name: &str, index: usize, time: Option<i32>) -> Expr<2> {
        Expr::Access(Access {
            field: FieldId { store: 0, index },
            name: Arc::from(name),
            time,
            offset: Coord::zeros(),
        })
    }

    #[test]
    fn folding_test() {
        let u = access("u", 0, None);
        assert_eq!(Expr::<2>::add(vec![Expr::Const(1.0), Expr::Const(2.0)]), Expr::Const(3.0));
        assert_eq!(u.clone() * 1.0, u);
        assert_eq!(u.clone() * 0.0, Expr::Const(0.0));
        assert_eq!(Expr::<2>::pow(Expr::Const(2.0), -2), Expr::Const(0.25));
        assert_eq!(Expr::pow(Expr::pow(u.clone(), 2), -1), Expr::Pow(Box::new(u.clone()), -2));
        assert_eq!(u.clone() + 0.0, u);

        // nested sums flatten
        let v = access("v", 1, None);
        let e = (u.clone() + v.clone()) + (u.clone() + 2.0) + 3.0;
        match e {
            Expr::Add(terms) => {
                assert_eq!(terms.len(), 4);
                assert_eq!(terms[3], Expr::Const(5.0));
            }
            e => panic!("unexpected {e}"),
        }
    }

    #[test]
    fn shift_test() {
        let u = access("u", 0, None);
        let e = (u.clone() * u.shift(1, 2)).shift(0, -1);
        let offsets: Vec<Coord<2>> =
            e.accesses().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![vector![-1, 0], vector![-1, 2]]);
        assert_eq!(e.reach()[&FieldId { store: 0, index: 0 }], vector![1, 2]);
    }

    #[test]
    fn subs_test() {
        let u = access("u", 0, Some(0));
        let e = Expr::pow(Expr::dt(), 2) * u / Expr::spacing(0);
        assert_eq!(
            e.free_symbols().into_iter().collect::<Vec<_>>(),
            vec![Symbol::Dt, Symbol::Spacing(0)]
        );
        let map = SpacingMap::new().with(Symbol::Dt, 2.0);
        let e = e.subs(&map);
        assert_eq!(
            e.free_symbols().into_iter().collect::<Vec<_>>(),
            vec![Symbol::Spacing(0)]
        );
        match e {
            Expr::Mul(factors) => assert_eq!(factors[0], Expr::Const(4.0)),
            e => panic!("unexpected {e}"),
        }
    }

    #[test]
    fn display_test() {
        let u = access("p", 0, Some(1)).shift(1, -2);
        assert_eq!(u.to_string(), "p(t + 1, x, y - 2)");
        let e = 2.0 * Expr::source() - access("b", 1, None);
        assert_eq!(e.to_string(), "(2.0*src + -1.0*b(x, y))");
        assert!(e.contains_source());
    }
}
