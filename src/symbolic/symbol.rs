use crate::grid::dimension_name;
use std::collections::BTreeMap;

/// Free scalar of an expression, bound to a value at operator build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    /// Time step.
    Dt,
    /// Grid spacing along an axis.
    Spacing(usize),
}

impl Symbol {
    pub fn name(&self) -> String {
        match self {
            Symbol::Dt => "dt".to_string(),
            Symbol::Spacing(d) => format!("h_{}", dimension_name(*d)),
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Substitutions applied by the operator builder.
/// Ordered, so printed argument maps are stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpacingMap {
    values: BTreeMap<Symbol, f64>,
}

impl SpacingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `symbol`, replacing any previous value.
    pub fn insert(&mut self, symbol: Symbol, value: f64) -> Option<f64> {
        self.values.insert(symbol, value)
    }

    /// Builder form of `insert`.
    pub fn with(mut self, symbol: Symbol, value: f64) -> Self {
        self.insert(symbol, value);
        self
    }

    pub fn get(&self, symbol: &Symbol) -> Option<f64> {
        self.values.get(symbol).copied()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.values.contains_key(symbol)
    }

    /// Add every binding of `other`, `other` wins on conflicts.
    pub fn update(&mut self, other: &SpacingMap) {
        for (s, v) in other.iter() {
            self.values.insert(s, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, f64)> + '_ {
        self.values.iter().map(|(s, v)| (*s, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn names_test() {
        assert_eq!(Symbol::Dt.name(), "dt");
        assert_eq!(Symbol::Spacing(2).to_string(), "h_z");
    }

    #[test]
    fn update_test() {
        let mut a = SpacingMap::new()
            .with(Symbol::Spacing(0), 10.0)
            .with(Symbol::Dt, 0.5);
        let b = SpacingMap::new().with(Symbol::Dt, 1.0);
        a.update(&b);
        assert_eq!(a.get(&Symbol::Dt), Some(1.0));
        assert_eq!(a.len(), 2);
        let order: Vec<Symbol> = a.iter().map(|(s, _)| s).collect();
        assert_eq!(order, vec![Symbol::Dt, Symbol::Spacing(0)]);
    }
}
