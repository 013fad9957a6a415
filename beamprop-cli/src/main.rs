use beamprop_core::diagnostics::format_parse_error;
use beamprop_core::gun::{Distribution, GunParameter};
use beamprop_core::io::{self, Direction, Format, ParseError, ParserOptions};
use beamprop_core::parameters::Parameters;
use beamprop_core::runtime::{run_simulation, SimulationConfig, SimulationResult};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "beamprop")]
#[command(about = "Beamprop - Linear optics particle transport along beamlines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header and element listing of an optics file
    Info {
        #[command(flatten)]
        optics: OpticsArgs,
        /// Also list drifts
        #[arg(long)]
        drifts: bool,
    },
    /// Propagate a particle ensemble and report where particles are stopped
    Run {
        #[command(flatten)]
        optics: OpticsArgs,
        #[command(flatten)]
        beam: BeamArgs,
        /// Position up to which particles are propagated (m)
        #[arg(long, default_value_t = 250.0)]
        s_max: f64,
        #[arg(long, default_value_t = 1000)]
        particles: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Regular expression selecting detector elements
        #[arg(long)]
        detectors: Option<String>,
        /// Propagate particles on all cores
        #[arg(long)]
        parallel: bool,
    },
}

#[derive(Args)]
struct OpticsArgs {
    /// Path to the optics table
    file: PathBuf,
    #[arg(long, value_enum, default_value_t = FormatArg::Twiss)]
    format: FormatArg,
    /// Element used as the origin of the beamline
    #[arg(long, default_value = "IP5")]
    ip: String,
    /// Read the optics towards decreasing s
    #[arg(long)]
    backward: bool,
    /// Last element entrance kept (m)
    #[arg(long)]
    max_s: Option<f64>,
    /// Skip malformed rows instead of failing
    #[arg(long)]
    lenient: bool,
    #[arg(long, default_value_t = 6500.0)]
    energy: f64,
    /// Apply horizontal and vertical kickers
    #[arg(long)]
    kickers: bool,
}

#[derive(Args)]
struct BeamArgs {
    /// Momentum loss of the particles
    #[arg(long, default_value_t = 0.0)]
    xi: f64,
    #[arg(long, default_value_t = 0.0)]
    sigma_xi: f64,
    #[arg(long, default_value_t = 0.0)]
    sigma_x: f64,
    #[arg(long, default_value_t = 0.0)]
    sigma_y: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    tx: f64,
    #[arg(long, default_value_t = 0.0)]
    sigma_tx: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    ty: f64,
    #[arg(long, default_value_t = 0.0)]
    sigma_ty: f64,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Twiss,
    Madx,
}

impl From<FormatArg> for Format {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Twiss => Format::Twiss,
            FormatArg::Madx => Format::Madx,
        }
    }
}

impl OpticsArgs {
    fn parser_options(&self) -> ParserOptions {
        let direction = if self.backward {
            Direction::Backward
        } else {
            Direction::Forward
        };
        let mut options = ParserOptions::new(self.ip.clone())
            .with_direction(direction)
            .lenient(self.lenient);
        if let Some(max_s) = self.max_s {
            options = options.with_max_s(max_s);
        }
        options
    }

    fn parameters(&self) -> Parameters {
        Parameters::default()
            .with_beam_energy(self.energy)
            .with_kickers(self.kickers)
    }
}

impl BeamArgs {
    fn distributions(&self, params: &Parameters) -> Vec<(GunParameter, Distribution)> {
        let energy = params.xi_to_e(self.xi);
        vec![
            (GunParameter::X, distribution(0.0, self.sigma_x)),
            (GunParameter::Y, distribution(0.0, self.sigma_y)),
            (GunParameter::Tx, distribution(self.tx, self.sigma_tx)),
            (GunParameter::Ty, distribution(self.ty, self.sigma_ty)),
            (
                GunParameter::Energy,
                distribution(energy, self.sigma_xi * params.beam_energy),
            ),
        ]
    }
}

fn distribution(mean: f64, sigma: f64) -> Distribution {
    if sigma > 0.0 {
        Distribution::Gaussian { mean, sigma }
    } else {
        Distribution::Fixed(mean)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let file = match &cli.command {
        Commands::Info { optics, .. } | Commands::Run { optics, .. } => optics.file.clone(),
    };

    let result = match cli.command {
        Commands::Info { optics, drifts } => info(&optics, drifts),
        Commands::Run {
            optics,
            beam,
            s_max,
            particles,
            seed,
            detectors,
            parallel,
        } => {
            let parameters = optics.parameters();
            let mut config = SimulationConfig::new(optics.file.clone(), optics.parser_options());
            config.format = optics.format.into();
            config.gun = beam.distributions(&parameters);
            config.parameters = parameters;
            config.s_max = s_max;
            config.particles = particles;
            config.seed = seed;
            config.detectors = detectors;
            config.parallel = parallel;
            run(&config)
        }
    };

    if let Err(e) = result {
        eprintln!("{}", error_report(e.as_ref(), &file));
        std::process::exit(1);
    }
}

/// Error message for the user; parse errors quote the offending line
fn error_report(error: &(dyn Error + 'static), file: &Path) -> String {
    match error.downcast_ref::<ParseError>() {
        Some(parse_error) => {
            let source = fs::read_to_string(file).unwrap_or_default();
            format_parse_error(parse_error, &source)
        }
        None => format!("Error: {}", error),
    }
}

fn info(args: &OpticsArgs, drifts: bool) -> Result<(), Box<dyn Error>> {
    let optics = io::parse_optics(
        &args.file,
        args.format.into(),
        args.parser_options(),
        &args.parameters(),
    )?;

    for key in optics.header.keys() {
        if let Some(value) = optics.header.get(key) {
            println!("{:<16} {}", key, value);
        }
    }
    if let Some(date) = optics.header.production_date() {
        println!("{:<16} {}", "production_date", date);
    }
    for diagnostic in optics.diagnostics.iter() {
        println!("{}", diagnostic);
    }
    println!();
    print!("{}", optics.beamline.dump(drifts));

    Ok(())
}

fn run(config: &SimulationConfig) -> Result<(), Box<dyn Error>> {
    log::info!(
        "propagating {} particles up to s = {} m",
        config.particles,
        config.s_max
    );
    let result = run_simulation(config, None)?;
    print_summary(&result);
    Ok(())
}

fn print_summary(result: &SimulationResult) {
    let total = result.tally.total();
    let percent = |count: usize| {
        if total > 0 {
            100.0 * count as f64 / total as f64
        } else {
            0.0
        }
    };

    println!(
        "{} particles, {} transmitted ({:.2}%)",
        total,
        result.tally.transmitted(),
        percent(result.tally.transmitted())
    );
    for stop in result.tally.counts() {
        println!(
            "  {:<24} {:<24} {:>8} ({:.2}%)",
            stop.name,
            stop.element_type,
            stop.count,
            percent(stop.count)
        );
    }

    for detector in &result.detectors {
        println!(
            "{} @ s = {:.3} m: {} hits, <x> = {:.4e} m, <y> = {:.4e} m",
            detector.name,
            detector.s,
            detector.hits,
            detector.mean_position.x,
            detector.mean_position.y
        );
    }

    if result.interrupted {
        println!("(interrupted)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../beamprop-core/tests/data")
            .join(name)
    }

    #[test]
    fn test_parse_error_report_quotes_line() {
        let file = fixture("malformed_ir5b1.tfs");
        let error: Box<dyn Error> =
            Box::new(ParseError::malformed(17, "expected 19 fields, found 18"));
        let report = error_report(error.as_ref(), &file);
        assert!(report.starts_with("Parse error: line 17"));
        assert!(report.contains("at line 17: \"MQXB.A2R5\""));
    }

    #[test]
    fn test_other_errors_reported_plainly() {
        let error: Box<dyn Error> = "no particles".into();
        let report = error_report(error.as_ref(), Path::new("missing.tfs"));
        assert_eq!(report, "Error: no particles");
    }
}
