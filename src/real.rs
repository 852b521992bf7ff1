use serde::{Deserialize, Serialize};

/// Floating point element type of field storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Float32,
    Float64,
}

impl DType {
    pub fn c_name(&self) -> &'static str {
        match self {
            DType::Float32 => "float",
            DType::Float64 => "double",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DType::Float32 => write!(f, "float32"),
            DType::Float64 => write!(f, "float64"),
        }
    }
}

/// Element type of field data and kernel arithmetic.
pub trait Real:
    num_traits::Float
    + std::fmt::Debug
    + std::fmt::Display
    + Default
    + Send
    + Sync
    + 'static
{
    const DTYPE: DType;

    fn of(value: f64) -> Self;

    fn into_f64(self) -> f64;
}

impl Real for f32 {
    const DTYPE: DType = DType::Float32;

    #[inline]
    fn of(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn into_f64(self) -> f64 {
        self as f64
    }
}

impl Real for f64 {
    const DTYPE: DType = DType::Float64;

    #[inline]
    fn of(value: f64) -> Self {
        value
    }

    #[inline]
    fn into_f64(self) -> f64 {
        self
    }
}
