//! Skew self adjoint isotropic acoustic propagation with attenuation.
//!
//! `IsoFlatten::setup` builds the whole simulation from a
//! `SimulationConfig`: the grid, the model fields, a Ricker source at
//! the grid centre, the staggered update equations and the operator.

use crate::attenuation::setup_w_over_q;
use crate::config::SimulationConfig;
use crate::error::*;
use crate::field::*;
use crate::grid::{dimension_name, Grid};
use crate::operator::*;
use crate::real::Real;
use crate::source::PointSource;
use crate::symbolic::*;
use crate::time_axis::TimeAxis;

/// `vmax dt sqrt(sum 1 / h^2)`.
pub fn courant_number(vmax: f64, dt: f64, spacing: &[f64]) -> f64 {
    vmax * dt * spacing.iter().map(|h| 1.0 / (h * h)).sum::<f64>().sqrt()
}

/// Largest stable Courant number of the two stage staggered Laplacian
/// with leapfrog stepping, `2 / sum |w|`.
pub fn courant_limit(space_order: usize) -> Result<f64> {
    Ok(2.0 / weight_norm(space_order)?)
}

/// Staggered derivative at `x + h/2` along `axis`.
pub fn g_forward<const GRID_DIMENSION: usize>(
    expr: &Expr<GRID_DIMENSION>,
    axis: usize,
    space_order: usize,
) -> Result<Expr<GRID_DIMENSION>> {
    staggered_first_derivative(expr, axis, Side::Forward, space_order)
}

/// Staggered derivative at `x - h/2` along `axis`.
pub fn g_backward<const GRID_DIMENSION: usize>(
    expr: &Expr<GRID_DIMENSION>,
    axis: usize,
    space_order: usize,
) -> Result<Expr<GRID_DIMENSION>> {
    staggered_first_derivative(expr, axis, Side::Backward, space_order)
}

/// Update equations of the SSA scheme, one auxiliary field per axis
/// followed by the pressure update.
///
/// `p_d = g_backward(b g_forward(p_0))`,
/// `p_0(t+1) = dt^2 vel^2 / b sum(p_d) + (2 - dt wOverQ) p_0
///            + (dt wOverQ - 1) p_0(t-1)`.
pub fn update_equations<const GRID_DIMENSION: usize>(
    b: &FieldHandle<GRID_DIMENSION>,
    vel: &FieldHandle<GRID_DIMENSION>,
    w_over_q: &FieldHandle<GRID_DIMENSION>,
    p_aux: &[FieldHandle<GRID_DIMENSION>; GRID_DIMENSION],
    p_0: &FieldHandle<GRID_DIMENSION>,
    space_order: usize,
) -> Result<Vec<Equation<GRID_DIMENSION>>> {
    let mut equations = Vec::with_capacity(GRID_DIMENSION + 1);
    for (d, p_d) in p_aux.iter().enumerate() {
        let inner = b.expr() * g_forward(&p_0.expr(), d, space_order)?;
        equations.push(Equation::new(p_d.expr(), g_backward(&inner, d, space_order)?)?);
    }

    let dt = Expr::dt();
    let laplacian = Expr::add(p_aux.iter().map(|p| p.expr()).collect());
    let rhs = Expr::pow(dt.clone(), 2) * Expr::pow(vel.expr(), 2) / b.expr() * laplacian
        + (2.0 - dt.clone() * w_over_q.expr()) * p_0.expr()
        + (dt * w_over_q.expr() - 1.0) * p_0.backward();
    equations.push(Equation::new(p_0.forward(), rhs)?);
    Ok(equations)
}

pub struct IsoFlatten<T: Real, const GRID_DIMENSION: usize> {
    pub store: FieldStore<T, GRID_DIMENSION>,
    pub b: FieldHandle<GRID_DIMENSION>,
    pub vel: FieldHandle<GRID_DIMENSION>,
    pub w_over_q: FieldHandle<GRID_DIMENSION>,
    pub p_aux: [FieldHandle<GRID_DIMENSION>; GRID_DIMENSION],
    pub p_0: FieldHandle<GRID_DIMENSION>,
    pub time_axis: TimeAxis,
    pub source: PointSource<GRID_DIMENSION>,
    pub operator: Operator<T, GRID_DIMENSION>,
    config: SimulationConfig,
}

fn to_array<const GRID_DIMENSION: usize>(
    name: &str,
    values: &[f64],
) -> Result<[f64; GRID_DIMENSION]> {
    values.try_into().map_err(|_| {
        Error::InvalidConfig(format!(
            "{name} has {} entries, expected {GRID_DIMENSION}",
            values.len()
        ))
    })
}

impl<T: Real, const GRID_DIMENSION: usize> IsoFlatten<T, GRID_DIMENSION> {
    pub fn setup(config: &SimulationConfig) -> Result<Self> {
        profiling::scope!("iso_flatten setup");
        config.validate()?;
        if config.grid.dimension() != GRID_DIMENSION {
            return Err(Error::InvalidConfig(format!(
                "configured for {}D, set up as {}D",
                config.grid.dimension(),
                GRID_DIMENSION
            )));
        }

        // grid and fields
        let shape: [usize; GRID_DIMENSION] = config
            .grid
            .shape
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidConfig("grid.shape".to_string()))?;
        let spacing = to_array::<GRID_DIMENSION>("grid.spacing", &config.grid.spacing)?;
        let origin = to_array::<GRID_DIMENSION>("grid.origin", &config.grid.origin())?;
        let grid = Grid::from_spacing(shape, spacing, origin, config.grid.dtype)?;
        log::info!(
            "grid {:?}, extent {:?}, {}",
            grid.shape(),
            grid.extent(),
            grid.dtype()
        );

        let so = config.model.space_order;
        let mut store = FieldStore::<T, GRID_DIMENSION>::new(grid)?;
        let b = store.function("b", so)?;
        let vel = store.function("vel", so)?;
        let w_over_q = store.function("wOverQ", so)?;
        let mut p_aux = Vec::with_capacity(GRID_DIMENSION);
        for d in 0..GRID_DIMENSION {
            p_aux.push(store.function(&format!("p_{}", dimension_name(d)), so)?);
        }
        let p_aux: [FieldHandle<GRID_DIMENSION>; GRID_DIMENSION] = p_aux
            .try_into()
            .map_err(|_| Error::InvalidConfig("auxiliary fields".to_string()))?;
        let p_0 = store.time_function("p_0", 2, so)?;
        log::info!("allocated {} MB of field data", store.total_bytes() >> 20);

        store.fill(&b, T::of(config.model.b))?;
        store.fill(&vel, T::of(config.model.vel))?;
        let omega = config.source.omega();
        setup_w_over_q(&mut store, &w_over_q, &config.attenuation.to_model(omega))?;

        // time axis and source
        let time_axis =
            TimeAxis::new(config.time.t0, config.time.t1, config.time.dt)?;
        log::info!("{}", time_axis);

        let position: [f64; GRID_DIMENSION] = match &config.source.coordinates {
            Some(c) => to_array("source.coordinates", c)?,
            None => std::array::from_fn(|d| {
                origin[d] + (spacing[d] * (shape[d] - 1) as f64 / 2.0).floor()
            }),
        };
        let source = PointSource::ricker(
            "src",
            vec![position],
            &time_axis,
            config.source.fpeak,
        )?;
        let injection_expr = Expr::source()
            * Expr::pow(Expr::dt(), 2)
            * Expr::pow(vel.expr(), 2)
            / b.expr();
        let injection =
            source.inject(store.grid(), p_0.forward(), injection_expr)?;

        // equations and operator
        let equations = update_equations(&b, &vel, &w_over_q, &p_aux, &p_0, so)?;
        let mut subs = store.grid().spacing_map();
        subs.insert(Symbol::Dt, time_axis.step());

        let courant = courant_number(config.model.vel, time_axis.step(), &spacing);
        let limit = courant_limit(so)?;
        if courant > limit {
            log::warn!(
                "Courant number {:.4} exceeds the stability limit {:.4}, \
                 the simulation will blow up",
                courant,
                limit
            );
        } else {
            log::info!("Courant number {:.4} (limit {:.4})", courant, limit);
        }

        let operator = Operator::build(
            &config.operator.name,
            &equations,
            &[injection],
            &subs,
            &store,
        )?;

        Ok(IsoFlatten {
            store,
            b,
            vel,
            w_over_q,
            p_aux,
            p_0,
            time_axis,
            source,
            operator,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Block sizes from the configuration, one per blocked axis.
    pub fn apply_args(&self) -> ApplyArgs {
        let sizes = [self.config.operator.block_x, self.config.operator.block_y];
        self.operator
            .block_dimensions()
            .iter()
            .zip(sizes)
            .fold(ApplyArgs::new(), |args, (name, size)| args.set(name, size))
    }

    pub fn run(&mut self, args: &ApplyArgs) -> Result<Summary> {
        self.operator.apply(&mut self.store, args)
    }

    /// Time step holding the newest pressure after running with `args`.
    pub fn final_time(&self, args: &ApplyArgs) -> Result<usize> {
        Ok(self.operator.loop_bounds(args)?.time_max + 1)
    }

    pub fn pressure(&self, time: usize) -> Result<&FieldBuffer<T, GRID_DIMENSION>> {
        self.store.time_data(&self.p_0, time)
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::config::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn courant_test() {
        let c = courant_number(1.5, 1.0, &[10.0, 10.0, 10.0]);
        assert_approx_eq!(f64, c, 1.5 * (0.03f64).sqrt());
        let limit = courant_limit(8).unwrap();
        assert!(limit > 0.77 && limit < 0.78);
        assert_approx_eq!(f64, courant_limit(2).unwrap(), 1.0);
    }

    #[test]
    fn equations_reach_test() {
        let config = SimulationConfig {
            grid: GridConfig {
                shape: vec![21, 21],
                spacing: vec![10.0, 10.0],
                ..Default::default()
            },
            time: TimeConfig {
                t1: 20.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let sim = IsoFlatten::<f32, 2>::setup(&config).unwrap();
        assert_eq!(sim.operator.num_equations(), 3);
        assert_eq!(sim.operator.name(), "OpExampleIsoFlatten");
        let reach: Vec<i32> = sim
            .operator
            .rhs()
            .take(2)
            .map(|e| e.reach().values().map(|r| r.max()).max().unwrap_or(0))
            .collect();
        assert_eq!(reach, vec![7, 7]);
        assert_eq!(sim.source.coordinates()[0], [100.0, 100.0]);
        let args = sim.apply_args();
        assert_eq!(args.get("x0_blk0_size"), Some(8));
        assert_eq!(args.get("y0_blk0_size"), None);
        assert_eq!(sim.operator.default_time_max(), Some(20));
        assert_eq!(sim.final_time(&args).unwrap(), 21);
    }

    #[test]
    fn setup_mismatch_test() {
        // 3D configuration
        let config = SimulationConfig::default();
        assert!(IsoFlatten::<f32, 2>::setup(&config).is_err());
        let config = SimulationConfig {
            grid: GridConfig {
                shape: vec![11],
                spacing: vec![1.0],
                ..Default::default()
            },
            ..Default::default()
        };
        // float32 configuration
        assert!(IsoFlatten::<f64, 1>::setup(&config).is_err());
    }
}
