pub mod attenuation;
pub mod build_info;
pub mod cli;
pub mod config;
pub mod error;
pub mod field;
pub mod grid;
pub mod iso_flatten;
pub mod operator;
pub mod output;
pub mod real;
pub mod source;
pub mod symbolic;
pub mod time_axis;
pub mod util;

pub use error::{Error, Result};
