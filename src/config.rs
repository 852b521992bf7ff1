//! TOML configuration of the `iso_flatten` simulation.
//! Every section and key is optional, defaults reproduce the
//! reference setup on a 1201 x 1201 x 601 grid.

use crate::attenuation::AttenuationModel;
use crate::error::*;
use crate::real::DType;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Points per axis, the number of entries sets the dimension.
    pub shape: Vec<usize>,
    pub spacing: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Vec<f64>>,
    pub dtype: DType,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            shape: vec![1201, 1201, 601],
            spacing: vec![10.0, 10.0, 10.0],
            origin: None,
            dtype: DType::Float32,
        }
    }
}

impl GridConfig {
    fn validate(&self) -> Result<()> {
        if self.shape.is_empty() || self.shape.len() > 3 {
            return Err(Error::InvalidConfig(format!(
                "grid.shape must have 1 to 3 entries, got {}",
                self.shape.len()
            )));
        }
        if self.spacing.len() != self.shape.len() {
            return Err(Error::InvalidConfig(format!(
                "grid.spacing has {} entries but grid.shape has {}",
                self.spacing.len(),
                self.shape.len()
            )));
        }
        if let Some(origin) = &self.origin {
            if origin.len() != self.shape.len() {
                return Err(Error::InvalidConfig(format!(
                    "grid.origin has {} entries but grid.shape has {}",
                    origin.len(),
                    self.shape.len()
                )));
            }
        }
        if self.shape.iter().any(|n| *n < 2) {
            return Err(Error::InvalidConfig(format!(
                "every grid.shape entry must be at least 2, got {:?}",
                self.shape
            )));
        }
        if self.spacing.iter().any(|h| !(*h > 0.0) || !h.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "grid.spacing must be positive, got {:?}",
                self.spacing
            )));
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.shape.len()
    }

    /// `spacing * (shape - 1)` per axis.
    pub fn extent(&self) -> Vec<f64> {
        self.shape
            .iter()
            .zip(self.spacing.iter())
            .map(|(n, h)| h * n.saturating_sub(1) as f64)
            .collect()
    }

    pub fn origin(&self) -> Vec<f64> {
        self.origin
            .clone()
            .unwrap_or_else(|| vec![0.0; self.shape.len()])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub space_order: usize,
    /// Buoyancy.
    pub b: f64,
    /// Velocity.
    pub vel: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            space_order: 8,
            b: 1.0,
            vel: 1.5,
        }
    }
}

impl ModelConfig {
    fn validate(&self) -> Result<()> {
        if self.space_order < 2 || self.space_order % 2 != 0 {
            return Err(Error::InvalidConfig(format!(
                "model.space_order must be even and at least 2, got {}",
                self.space_order
            )));
        }
        if !(self.b > 0.0) || !(self.vel > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "model.b and model.vel must be positive, got {} and {}",
                self.b, self.vel
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeConfig {
    pub t0: f64,
    pub t1: f64,
    pub dt: f64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        TimeConfig {
            t0: 0.0,
            t1: 250.0,
            dt: 1.0,
        }
    }
}

impl TimeConfig {
    fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) || !(self.t1 > self.t0) {
            return Err(Error::InvalidConfig(format!(
                "time needs dt > 0 and t1 > t0, got t0 = {}, t1 = {}, dt = {}",
                self.t0, self.t1, self.dt
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Peak frequency of the Ricker wavelet.
    pub fpeak: f64,
    /// Physical position, grid centre when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Vec<f64>>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            fpeak: 0.010,
            coordinates: None,
        }
    }
}

impl SourceConfig {
    fn validate(&self, dimension: usize) -> Result<()> {
        if !(self.fpeak > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "source.fpeak must be positive, got {}",
                self.fpeak
            )));
        }
        if let Some(c) = &self.coordinates {
            if c.len() != dimension {
                return Err(Error::InvalidConfig(format!(
                    "source.coordinates has {} entries for a {}D grid",
                    c.len(),
                    dimension
                )));
            }
        }
        Ok(())
    }

    pub fn omega(&self) -> f64 {
        2.0 * std::f64::consts::PI * self.fpeak
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttenuationKind {
    Uniform,
    Sponge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttenuationConfig {
    pub model: AttenuationKind,
    /// Weight of the uniform model.
    pub value: f64,
    pub qmin: f64,
    pub qmax: f64,
    pub npad: usize,
}

impl Default for AttenuationConfig {
    fn default() -> Self {
        AttenuationConfig {
            model: AttenuationKind::Uniform,
            value: 1.0,
            qmin: 0.1,
            qmax: 1000.0,
            npad: 20,
        }
    }
}

impl AttenuationConfig {
    /// Model for a source of angular frequency `omega`.
    pub fn to_model(&self, omega: f64) -> AttenuationModel {
        match self.model {
            AttenuationKind::Uniform => AttenuationModel::Uniform(self.value),
            AttenuationKind::Sponge => AttenuationModel::Sponge {
                qmin: self.qmin,
                qmax: self.qmax,
                npad: self.npad,
                omega,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperatorConfig {
    pub name: String,
    pub block_x: usize,
    pub block_y: usize,
    pub code_file: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            name: "OpExampleIsoFlatten".to_string(),
            block_x: 8,
            block_y: 8,
            code_file: "operator.iso_flatten.c".to_string(),
        }
    }
}

impl OperatorConfig {
    fn validate(&self) -> Result<()> {
        let identifier = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !self.name.starts_with(|c: char| c.is_ascii_digit());
        if !identifier {
            return Err(Error::InvalidConfig(format!(
                "operator.name `{}` is not a C identifier",
                self.name
            )));
        }
        if self.block_x == 0 || self.block_y == 0 {
            return Err(Error::InvalidConfig(
                "operator block sizes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub model: ModelConfig,
    pub time: TimeConfig,
    pub source: SourceConfig,
    pub attenuation: AttenuationConfig,
    pub operator: OperatorConfig,
}

impl SimulationConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml(&content)?;
        log::info!("loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.model.validate()?;
        self.time.validate()?;
        self.source.validate(self.grid.dimension())?;
        self.attenuation.to_model(self.source.omega()).validate()?;
        self.operator.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn defaults_test() {
        let config = SimulationConfig::from_toml("").unwrap();
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.grid.extent(), vec![12000.0, 12000.0, 6000.0]);
        assert_eq!(config.model.space_order, 8);
        assert_eq!(config.operator.name, "OpExampleIsoFlatten");
        assert_eq!(config.attenuation.npad, 20);
    }

    #[test]
    fn partial_test() {
        let config = SimulationConfig::from_toml(
            r#"
            [grid]
            shape = [101, 81]
            spacing = [5.0, 5.0]
            dtype = "float64"

            [attenuation]
            model = "sponge"
            "#,
        )
        .unwrap();
        assert_eq!(config.grid.dimension(), 2);
        assert_eq!(config.grid.dtype, DType::Float64);
        assert_eq!(config.time.t1, 250.0);
        assert!(matches!(
            config.attenuation.to_model(1.0),
            AttenuationModel::Sponge { npad: 20, .. }
        ));
    }

    #[test]
    fn empty_axis_extent_test() {
        // extent is usable before validation
        let grid = GridConfig {
            shape: vec![0, 3],
            spacing: vec![1.0, 1.0],
            ..Default::default()
        };
        assert_eq!(grid.extent(), vec![0.0, 2.0]);
        assert!(SimulationConfig::from_toml("[grid]\nshape = [0, 3]\nspacing = [1.0, 1.0]\n").is_err());
    }

    #[test]
    fn reject_test() {
        assert!(SimulationConfig::from_toml("[grid]\nshape = [10, 10]\n").is_err());
        assert!(SimulationConfig::from_toml("[model]\nspace_order = 5\n").is_err());
        assert!(SimulationConfig::from_toml("[grid]\nfoo = 1\n").is_err());
        assert!(matches!(
            SimulationConfig::from_toml("[time]\ndt = \"x\"\n"),
            Err(Error::ConfigParse(_))
        ));
        assert!(SimulationConfig::from_toml("[operator]\nname = \"9op\"\n").is_err());
    }

    #[test]
    fn round_trip_test() {
        let mut config = SimulationConfig::default();
        config.source.coordinates = Some(vec![1.0, 2.0, 3.0]);
        config.attenuation.model = AttenuationKind::Sponge;
        let text = config.to_toml().unwrap();
        assert_eq!(SimulationConfig::from_toml(&text).unwrap(), config);
    }
}
