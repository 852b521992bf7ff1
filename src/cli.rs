//! Command line front end shared by the demo executables.

use crate::build_info;
use crate::config::SimulationConfig;
use crate::error::*;
use clap::Parser;
use std::path::{Path, PathBuf};

#[cfg(feature = "profile-with-puffin")]
use std::sync::Mutex;

#[cfg(feature = "profile-with-puffin")]
static PUFFIN_SERVER: Mutex<Option<puffin_http::Server>> = Mutex::new(None);

/// Staggered SSA acoustic propagation with attenuation
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// TOML configuration, missing keys take their defaults.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Grid shape, overrides the configuration, e.g. `--shape 201,201`.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub shape: Option<Vec<usize>>,

    /// Simulation end time.
    #[arg(long)]
    pub t1: Option<f64>,

    /// Block size along x.
    #[arg(long)]
    pub block_x: Option<usize>,

    /// Block size along y.
    #[arg(long)]
    pub block_y: Option<usize>,

    /// The number of threads to use, all cores when absent.
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Where to write the generated C operator.
    #[arg(long)]
    pub code_file: Option<PathBuf>,

    /// Directory for output files, will be created.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Write a PNG slice of the final pressure.
    #[arg(short, long, requires("output_dir"))]
    pub write_images: bool,

    /// Write a VTK snapshot of the final pressure, 3D only.
    #[arg(long, requires("output_dir"))]
    pub write_vtk: bool,

    /// Print build information and quit
    #[arg(long)]
    pub build_info: bool,

    /// More logging, repeat for trace output.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn cli_setup(name: &str) -> Result<Self> {
        let args = Args::parse();
        args.setup(name)?;
        Ok(args)
    }

    /// Logging, thread pool and output directory for parsed `args`.
    pub fn setup(&self, name: &str) -> Result<()> {
        if self.build_info {
            build_info::print_report(name);
            std::process::exit(0);
        }

        let level = match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        let _ = env_logger::builder()
            .filter_level(level)
            .parse_default_env()
            .try_init();
        log::info!("{} {}", name, build_info::GIT_DESCRIBE);

        if let Some(output_dir) = &self.output_dir {
            ensure_dir_exists(output_dir)?;
        }

        #[cfg(feature = "profile-with-puffin")]
        {
            let server_addr = format!("127.0.0.1:{}", puffin_http::DEFAULT_PORT);
            let server = puffin_http::Server::new(&server_addr)
                .map_err(|e| Error::Output(format!("profiling server: {e}")))?;
            log::info!("run this to view profiling data: puffin_viewer {server_addr}");
            profiling::puffin::set_scopes_on(true);
            if let Ok(mut lock) = PUFFIN_SERVER.lock() {
                *lock = Some(server);
            }
        }

        let mut pool = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("rayon_thread_{}", i));
        if let Some(threads) = self.threads {
            if threads == 0 {
                return Err(Error::InvalidArgument {
                    name: "threads".to_string(),
                    reason: "must be positive".to_string(),
                });
            }
            pool = pool.num_threads(threads);
        }
        if let Err(e) = pool.build_global() {
            log::warn!("global thread pool already configured: {e}");
        }
        log::info!("using {} threads", rayon::current_num_threads());
        Ok(())
    }

    /// Configuration file, if any, with command line overrides applied.
    pub fn to_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_file(path)?,
            None => SimulationConfig::default(),
        };

        if let Some(shape) = &self.shape {
            let grid = &mut config.grid;
            if shape.len() != grid.shape.len() {
                let h = grid.spacing.first().copied().unwrap_or(1.0);
                grid.spacing = vec![h; shape.len()];
                grid.origin = None;
                config.source.coordinates = None;
            }
            grid.shape = shape.clone();
        }
        if let Some(t1) = self.t1 {
            config.time.t1 = t1;
        }
        if let Some(block_x) = self.block_x {
            config.operator.block_x = block_x;
        }
        if let Some(block_y) = self.block_y {
            config.operator.block_y = block_y;
        }
        if let Some(code_file) = &self.code_file {
            config.operator.code_file = code_file.to_string_lossy().into_owned();
        }
        config.validate()?;
        Ok(config)
    }

    /// `name` inside the output directory.
    pub fn output_path(&self, name: &str) -> Option<PathBuf> {
        self.output_dir.as_ref().map(|dir| dir.join(name))
    }

    pub fn finish(&self) {
        #[cfg(feature = "profile-with-puffin")]
        {
            profiling::finish_frame!();
            log::info!("flushing profiler");
            if let Ok(mut lock) = PUFFIN_SERVER.lock() {
                lock.take();
            }
        }
    }
}

/// Create `dir` and its parents if missing.
pub fn ensure_dir_exists<P: AsRef<Path>>(dir: P) -> Result<()> {
    let dir = dir.as_ref();
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        log::debug!("created {}", dir.display());
    } else if !dir.is_dir() {
        return Err(Error::Output(format!(
            "{} exists and is not a directory",
            dir.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn overrides_test() {
        let args = Args::parse_from([
            "iso_flatten",
            "--shape",
            "51,41",
            "--t1",
            "30",
            "--block-x",
            "16",
        ]);
        let config = args.to_config().unwrap();
        assert_eq!(config.grid.shape, vec![51, 41]);
        assert_eq!(config.grid.spacing, vec![10.0, 10.0]);
        assert_eq!(config.time.t1, 30.0);
        assert_eq!(config.operator.block_x, 16);
        assert_eq!(config.operator.block_y, 8);
    }

    #[test]
    fn requires_output_dir_test() {
        assert!(Args::try_parse_from(["iso_flatten", "--write-images"]).is_err());
        let args =
            Args::try_parse_from(["iso_flatten", "-w", "-o", "out"]).unwrap();
        assert_eq!(args.output_path("p.png"), Some(PathBuf::from("out/p.png")));
    }

    #[test]
    fn bad_override_test() {
        let args = Args::parse_from(["iso_flatten", "--shape", "1,5"]);
        assert!(args.to_config().is_err());
    }

    #[test]
    fn ensure_dir_exists_test() {
        let dir = std::env::temp_dir()
            .join(format!("ssawave_cli_test_{}", std::process::id()))
            .join("nested");
        ensure_dir_exists(&dir).unwrap();
        ensure_dir_exists(&dir).unwrap();
        assert!(dir.is_dir());
        std::fs::remove_dir_all(dir.parent().unwrap()).unwrap();
    }
}
