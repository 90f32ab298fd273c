use clap::{Parser, Subcommand, ValueEnum};
use fdm_components::{
    ComponentError, Harness, PiController, ThrottleActuator, ThrottleServo,
};
use fdm_sim::{
    Algorithm, ConsoleFrontend, Input, IoError, JsonlOutput, Output, RunSummary, ScriptedInput,
    SimError, SimOptions, Simulation,
};
use fdm_system::{System, SystemError, SystemResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error(transparent)]
    Device(#[from] IoError),
    #[error(transparent)]
    System(#[from] SystemError),
    #[error(transparent)]
    Component(#[from] ComponentError),
    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "fdm-cli")]
#[command(about = "fdm CLI - run component-tree simulations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demo model
    Run(RunArgs),
    /// Print the default simulation options as YAML
    Config,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Model to simulate
    #[arg(long, value_enum, default_value_t = Model::Harness)]
    model: Model,
    /// Simulation options YAML file; flags override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Time step in seconds
    #[arg(long)]
    dt: Option<f64>,
    /// Discrete update period in seconds
    #[arg(long)]
    disc_dt: Option<f64>,
    /// End time in seconds
    #[arg(long)]
    t_end: Option<f64>,
    /// Integration method
    #[arg(long, value_enum)]
    algorithm: Option<AlgorithmArg>,
    /// Error-controlled step size (bogacki-shampine only)
    #[arg(long)]
    adaptive: bool,
    /// Stream outputs to a JSON-lines file
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Run paced against the wall clock with inputs and a status frontend
    #[arg(long)]
    interactive: bool,
    /// Real-time factor for interactive runs
    #[arg(long, default_value_t = 1.0)]
    pace: f64,
    /// Throttle commands for the servo model, replayed one per second
    #[arg(long = "setpoint", value_delimiter = ',')]
    setpoints: Vec<f64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Model {
    /// Oscillator plus discrete counter
    Harness,
    /// PI throttle servo positioning the throttle lever
    Servo,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlgorithmArg {
    Rk4,
    Heun,
    ForwardEuler,
    BogackiShampine,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Rk4 => Algorithm::Rk4,
            AlgorithmArg::Heun => Algorithm::Heun,
            AlgorithmArg::ForwardEuler => Algorithm::ForwardEuler,
            AlgorithmArg::BogackiShampine => Algorithm::BogackiShampine,
        }
    }
}

fn main() -> CliResult<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(&args),
        Commands::Config => cmd_config(),
    }
}

fn cmd_config() -> CliResult<()> {
    print!("{}", serde_yaml::to_string(&SimOptions::default())?);
    Ok(())
}

fn load_options(args: &RunArgs) -> CliResult<SimOptions> {
    let mut opts = match &args.config {
        Some(path) => read_options(path)?,
        None => SimOptions::default(),
    };
    if let Some(dt) = args.dt {
        opts.dt = dt;
    }
    if let Some(disc_dt) = args.disc_dt {
        opts.disc_dt = disc_dt;
    }
    if let Some(t_end) = args.t_end {
        opts.t_end = t_end;
    }
    if let Some(algorithm) = args.algorithm {
        opts.algorithm = algorithm.into();
    }
    if args.adaptive {
        opts.adaptive = true;
    }
    opts.dt_min = opts.dt_min.min(opts.dt);
    Ok(opts)
}

fn read_options(path: &Path) -> CliResult<SimOptions> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

fn build_system(model: Model) -> CliResult<System> {
    let sys = match model {
        Model::Harness => System::new(Harness::default())?,
        Model::Servo => System::new(ThrottleServo::new(
            ThrottleActuator::new(0.2, 2.0)?,
            PiController::new(1.5, 3.75, 0.0, 1.0)?.with_reference(0.5),
        ))?,
    };
    Ok(sys)
}

fn set_servo_setpoint(sys: &mut System, throttle: &f64) -> SystemResult<()> {
    sys.node_mut("controller")?
        .u_mut()?
        .set_path_f64("reference", *throttle)
}

fn cmd_run(args: &RunArgs) -> CliResult<()> {
    let opts = load_options(args)?;
    let sys = build_system(args.model)?;
    info!(model = ?args.model, nodes = sys.node_count(), states = sys.x().len(), "system built");

    let mut sim = Simulation::new(sys, opts)?;
    if let Some(path) = &args.output {
        sim.attach(Output::new(JsonlOutput::create(path)?));
        println!("Writing outputs to {}", path.display());
    }

    let summary = if args.interactive {
        if matches!(args.model, Model::Servo) && !args.setpoints.is_empty() {
            sim.attach(Input::new(
                ScriptedInput::new(args.setpoints.clone(), Duration::from_secs(1)),
                set_servo_setpoint,
            ));
        }
        sim.set_frontend(ConsoleFrontend::new(Duration::from_secs(1)));
        sim.run_interactive(args.pace)?
    } else {
        sim.run()?
    };

    print_summary(&summary);
    let final_y = sim.with_system(|sys| sys.snapshot_y())?;
    if let Some(y) = final_y {
        println!("\nFinal outputs:");
        print!("{}", serde_yaml::to_string(&y)?);
    }
    println!("Logged samples: {}", sim.log_len()?);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== Run Summary ===");
    println!("  Final time:       {:.6} s", summary.t);
    println!("  Steps:            {}", summary.steps);
    println!("  Discrete updates: {}", summary.discrete_updates);
    println!("  Wall time:        {:.3} s", summary.wall_time);
    println!(
        "  Step time:        {:.1} us mean, {:.1} us max",
        summary.mean_step_time * 1e6,
        summary.max_step_time * 1e6
    );
    if summary.overruns > 0 {
        println!("  Pacing overruns:  {}", summary.overruns);
    }
    if summary.dropped_outputs > 0 {
        println!("  Dropped outputs:  {}", summary.dropped_outputs);
    }
    if summary.aborted {
        println!("  (aborted before t_end)");
    }
}
