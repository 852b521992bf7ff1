use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("invalid field `{name}`: {reason}")]
    InvalidField { name: String, reason: String },

    #[error("field id {0} does not belong to this field store")]
    UnknownField(usize),

    #[error("invalid equation: {0}")]
    InvalidEquation(String),

    #[error("equation for `{0}` reads its own target buffer")]
    SelfDependency(String),

    #[error("symbol `{0}` has no value, add it to the substitutions")]
    UnboundSymbol(String),

    #[error(
        "field `{field}` is read {needed} points away along `{dim}` \
         but its halo is only {available} wide"
    )]
    InsufficientHalo {
        field: String,
        dim: String,
        needed: i32,
        available: i32,
    },

    #[error("invalid time axis: {0}")]
    InvalidTimeAxis(String),

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to write output: {0}")]
    Output(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
