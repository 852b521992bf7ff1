use ssawave::cli::Args;
use ssawave::config::SimulationConfig;
use ssawave::iso_flatten::IsoFlatten;
use ssawave::output;
use ssawave::real::{DType, Real};
use ssawave::Result;

fn run<T: Real, const GRID_DIMENSION: usize>(
    args: &Args,
    config: &SimulationConfig,
) -> Result<()> {
    let mut sim = IsoFlatten::<T, GRID_DIMENSION>::setup(config)?;
    println!("{}", sim.operator.args());

    sim.operator.write_ccode(&config.operator.code_file)?;

    let apply_args = sim.apply_args();
    let summary = sim.run(&apply_args)?;
    log::info!("{}", summary);

    let final_time = sim.final_time(&apply_args)?;
    let pressure = sim.pressure(final_time)?;
    log::info!(
        "max |p_0| at time step {}: {:e}",
        final_time,
        pressure.max_abs().into_f64()
    );

    if args.write_images {
        let position = sim.store.grid().index_position(&sim.source.coordinates()[0]);
        let slice = position.get(2).map(|z| z.round() as i32).unwrap_or(0);
        if let Some(path) = args.output_path("p_0.png") {
            output::write_png(pressure, slice, path)?;
        }
    }
    if args.write_vtk {
        if let Some(path) = args.output_path("p_0.vtu") {
            output::write_vtk3d(sim.store.grid(), pressure, "p_0", path)?;
        }
    }
    Ok(())
}

fn dispatch(args: &Args) -> Result<()> {
    let config = args.to_config()?;
    match (config.grid.dtype, config.grid.dimension()) {
        (DType::Float32, 1) => run::<f32, 1>(args, &config),
        (DType::Float32, 2) => run::<f32, 2>(args, &config),
        (DType::Float32, _) => run::<f32, 3>(args, &config),
        (DType::Float64, 1) => run::<f64, 1>(args, &config),
        (DType::Float64, 2) => run::<f64, 2>(args, &config),
        (DType::Float64, _) => run::<f64, 3>(args, &config),
    }
}

fn main() {
    let name = "iso_flatten";
    let args = match Args::cli_setup(name) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{name}: {e}");
            std::process::exit(1);
        }
    };
    let result = dispatch(&args);
    args.finish();
    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
