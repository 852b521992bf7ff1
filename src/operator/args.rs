use crate::grid::dimension_name;
use crate::operator::Operator;
use crate::real::Real;

pub const DEFAULT_BLOCK_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Float(f64),
    Shape(Vec<usize>),
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "{v}"),
            ArgValue::Float(v) => write!(f, "{v:?}"),
            ArgValue::Shape(s) => {
                write!(f, "(")?;
                for (i, n) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{n}")?;
                }
                if s.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Named operator arguments in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgMap {
    entries: Vec<(String, ArgValue)>,
}

impl ArgMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `name`.
    pub fn insert(&mut self, name: &str, value: ArgValue) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Display for ArgMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{name}': {value}")?;
        }
        write!(f, "}}")
    }
}

impl<T: Real, const GRID_DIMENSION: usize> Operator<T, GRID_DIMENSION> {
    /// Default arguments of `apply`: time range, domain bounds,
    /// block sizes, bound symbols, origin, thread count and the
    /// allocated shape of every field and source.
    pub fn args(&self) -> ArgMap {
        let mut map = ArgMap::new();
        map.insert("time_m", ArgValue::Int(0));
        if let Some(time_max) = self.default_time_max() {
            map.insert("time_M", ArgValue::Int(time_max as i64));
        }
        for (d, n) in self.grid().shape().iter().enumerate() {
            let name = dimension_name(d);
            map.insert(&format!("{name}_m"), ArgValue::Int(0));
            map.insert(&format!("{name}_M"), ArgValue::Int(*n as i64 - 1));
        }
        for name in self.block_dimensions() {
            map.insert(&name, ArgValue::Int(DEFAULT_BLOCK_SIZE as i64));
        }
        for (symbol, value) in self.subs().iter() {
            map.insert(&symbol.name(), ArgValue::Float(value));
        }
        for (d, o) in self.grid().origin().iter().enumerate() {
            map.insert(&format!("o_{}", dimension_name(d)), ArgValue::Float(*o));
        }
        map.insert("nthreads", ArgValue::Int(rayon::current_num_threads() as i64));
        for field in self.fields() {
            map.insert(&field.name, ArgValue::Shape(field.shape.clone()));
        }
        for inj in &self.injections {
            let name = inj.injection.source_name();
            let npoint = inj.injection.npoint();
            map.insert(
                name,
                ArgValue::Shape(vec![inj.injection.num(), npoint]),
            );
            map.insert(
                &format!("{name}_coords"),
                ArgValue::Shape(vec![npoint, GRID_DIMENSION]),
            );
            map.insert(&format!("p_{name}_m"), ArgValue::Int(0));
            map.insert(&format!("p_{name}_M"), ArgValue::Int(npoint as i64 - 1));
        }
        map
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn display_test() {
        let mut map = ArgMap::new();
        map.insert("time_m", ArgValue::Int(0));
        map.insert("dt", ArgValue::Float(1.0));
        map.insert("b", ArgValue::Shape(vec![3, 4]));
        map.insert("src_coords", ArgValue::Shape(vec![1]));
        map.insert("time_m", ArgValue::Int(2));
        assert_eq!(map.len(), 4);
        assert_eq!(
            map.to_string(),
            "{'time_m': 2, 'dt': 1.0, 'b': (3, 4), 'src_coords': (1,)}"
        );
        assert_eq!(map.get("dt"), Some(&ArgValue::Float(1.0)));
        assert_eq!(map.get("x"), None);
    }
}
