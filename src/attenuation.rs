//! Attenuation weight `wOverQ = omega / Q` of the SSA update.

use crate::error::*;
use crate::field::{FieldHandle, FieldStore};
use crate::real::Real;
use crate::util::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttenuationModel {
    /// Same weight everywhere.
    Uniform(f64),
    /// `Q = qmax` in the interior, decaying logarithmically to `qmin`
    /// over the `npad` points next to every boundary.
    Sponge {
        qmin: f64,
        qmax: f64,
        npad: usize,
        omega: f64,
    },
}

impl AttenuationModel {
    pub fn validate(&self) -> Result<()> {
        match *self {
            AttenuationModel::Uniform(v) if v.is_finite() => Ok(()),
            AttenuationModel::Uniform(v) => Err(Error::InvalidConfig(format!(
                "uniform attenuation weight must be finite, got {v}"
            ))),
            AttenuationModel::Sponge {
                qmin,
                qmax,
                npad,
                omega,
            } => {
                if !(qmin > 0.0) || !(qmax >= qmin) || !qmax.is_finite() {
                    return Err(Error::InvalidConfig(format!(
                        "need 0 < qmin <= qmax, got qmin = {qmin}, qmax = {qmax}"
                    )));
                }
                if npad == 0 {
                    return Err(Error::InvalidConfig(
                        "sponge needs npad > 0".to_string(),
                    ));
                }
                if !omega.is_finite() {
                    return Err(Error::InvalidConfig(format!(
                        "omega must be finite, got {omega}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Weight at grid index `coord` of a grid with `shape`.
    pub fn w_over_q<const GRID_DIMENSION: usize>(
        &self,
        coord: &Coord<GRID_DIMENSION>,
        shape: &[usize; GRID_DIMENSION],
    ) -> f64 {
        match *self {
            AttenuationModel::Uniform(v) => v,
            AttenuationModel::Sponge {
                qmin,
                qmax,
                npad,
                omega,
            } => {
                let (lqmin, lqmax) = (qmin.ln(), qmax.ln());
                let mut q = qmax;
                for d in 0..GRID_DIMENSION {
                    let left = coord[d] as f64;
                    let right = (shape[d] as i32 - 1 - coord[d]) as f64;
                    for dist in [left, right] {
                        if dist < npad as f64 {
                            let pos = dist / npad as f64;
                            q = q.min((lqmin + pos * (lqmax - lqmin)).exp());
                        }
                    }
                }
                omega / q
            }
        }
    }
}

/// Fill the domain of `field` from `model`.
pub fn setup_w_over_q<T: Real, const GRID_DIMENSION: usize>(
    store: &mut FieldStore<T, GRID_DIMENSION>,
    field: &FieldHandle<GRID_DIMENSION>,
    model: &AttenuationModel,
) -> Result<()> {
    model.validate()?;
    let shape = *store.grid().shape();
    store.set_values(field, |c| T::of(model.w_over_q(&c, &shape)))?;
    log::debug!("set `{}` from {:?}", field.name(), model);
    Ok(())
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::grid::Grid;
    use crate::real::DType;
    use float_cmp::assert_approx_eq;

    #[test]
    fn sponge_profile_test() {
        let omega = 2.0 * std::f64::consts::PI * 0.01;
        let model = AttenuationModel::Sponge {
            qmin: 0.1,
            qmax: 1000.0,
            npad: 20,
            omega,
        };
        let shape = [101, 101];
        assert_approx_eq!(f64, model.w_over_q(&vector![50, 50], &shape), omega / 1000.0);
        assert_approx_eq!(f64, model.w_over_q(&vector![0, 50], &shape), omega / 0.1, epsilon = 1e-9);
        assert_approx_eq!(f64, model.w_over_q(&vector![50, 100], &shape), omega / 0.1, epsilon = 1e-9);
        // halfway into the pad, geometric mean of qmin and qmax
        assert_approx_eq!(f64, model.w_over_q(&vector![10, 50], &shape), omega / 10.0, epsilon = 1e-9);
        // corners take the smaller Q
        assert!(
            model.w_over_q(&vector![5, 10], &shape) > model.w_over_q(&vector![10, 50], &shape)
        );
    }

    #[test]
    fn validate_test() {
        assert!(AttenuationModel::Uniform(1.0).validate().is_ok());
        assert!(AttenuationModel::Uniform(f64::NAN).validate().is_err());
        let bad = AttenuationModel::Sponge {
            qmin: 10.0,
            qmax: 1.0,
            npad: 3,
            omega: 1.0,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn setup_test() {
        let grid = Grid::from_spacing([6, 6], [1.0; 2], [0.0; 2], DType::Float32)
            .unwrap();
        let mut store = FieldStore::<f32, 2>::new(grid).unwrap();
        let w = store.function("wOverQ", 2).unwrap();
        setup_w_over_q(&mut store, &w, &AttenuationModel::Uniform(1.0)).unwrap();
        let data = store.data(&w).unwrap();
        assert_approx_eq!(f32, data.view(&vector![3, 3]), 1.0);
        assert_approx_eq!(f32, data.view(&vector![-1, 3]), 0.0);
    }
}
