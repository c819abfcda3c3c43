use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Row, Table, presets::UTF8_FULL};
use commloss::{LossModel, ModelParams, QuantitySet, SolverConfig};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "commloss")]
#[command(
    about = "Information carried by correlated Gaussian populations and what an independence-assuming decoder loses",
    long_about = None
)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate every quantity at one parameter setting.
    Eval(EvalArgs),
    /// Evaluate every quantity along a grid of correlations.
    Sweep(SweepArgs),
}

#[derive(Args, Debug)]
struct SolverArgs {
    /// JSON file with solver settings; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EvalArgs {
    /// Probability of the first stimulus, in (0, 1).
    #[arg(long = "p", allow_hyphen_values = true)]
    p: f64,
    /// Noise correlation under the first stimulus, in (-1, 1).
    #[arg(long = "rho", allow_hyphen_values = true)]
    rho: f64,
    /// Noise correlation under the second stimulus; defaults to `--rho`.
    #[arg(long = "rho2", allow_hyphen_values = true)]
    rho2: Option<f64>,
    #[command(flatten)]
    solver: SolverArgs,
    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SweepArgs {
    #[arg(long = "p", allow_hyphen_values = true)]
    p: f64,
    #[arg(long = "rho-min", allow_hyphen_values = true, default_value_t = -0.9)]
    rho_min: f64,
    #[arg(long = "rho-max", allow_hyphen_values = true, default_value_t = 0.9)]
    rho_max: f64,
    #[arg(long, default_value_t = 19)]
    steps: usize,
    #[command(flatten)]
    solver: SolverArgs,
    /// Write the sweep as JSON to this file instead of printing a table.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Serialize)]
struct SweepOutput<'a> {
    config: &'a SolverConfig,
    points: Vec<QuantitySet>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Eval(args) => run_eval(args),
        Command::Sweep(args) => run_sweep(args),
    }
}

fn load_config(args: &SolverArgs) -> Result<SolverConfig, String> {
    let config = match &args.config {
        Some(path) => read_config(path)?,
        None => SolverConfig::default(),
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<SolverConfig, String> {
    let payload = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config '{}': {e}", path.display()))?;
    serde_json::from_str(&payload)
        .map_err(|e| format!("failed to parse config '{}': {e}", path.display()))
}

fn run_eval(args: EvalArgs) -> Result<(), String> {
    let config = load_config(&args.solver)?;
    let set = match args.rho2 {
        Some(rho2) if rho2 != args.rho => {
            let params = ModelParams::new(args.p, args.rho, rho2).map_err(|e| e.to_string())?;
            QuantitySet::evaluate(&params, &config).map_err(|e| e.to_string())?
        }
        _ => {
            let mut model = LossModel::with_config(config).map_err(|e| e.to_string())?;
            model.set_probability(args.p).map_err(|e| e.to_string())?;
            model.set_correlation(args.rho).map_err(|e| e.to_string())?;
            model.evaluate_all().map_err(|e| e.to_string())?
        }
    };

    if args.json {
        let payload = serde_json::to_string_pretty(&set)
            .map_err(|e| format!("failed to serialize quantities: {e}"))?;
        println!("{payload}");
        return Ok(());
    }
    print_quantities(&set);
    Ok(())
}

fn run_sweep(args: SweepArgs) -> Result<(), String> {
    if args.steps < 2 {
        return Err(format!("--steps must be at least 2, got {}", args.steps));
    }
    if !(args.rho_min < args.rho_max) {
        return Err(format!(
            "--rho-min ({}) must be below --rho-max ({})",
            args.rho_min, args.rho_max
        ));
    }
    let config = load_config(&args.solver)?;
    let mut model = LossModel::with_config(config.clone()).map_err(|e| e.to_string())?;
    model.set_probability(args.p).map_err(|e| e.to_string())?;

    let step = (args.rho_max - args.rho_min) / (args.steps - 1) as f64;
    let mut points = Vec::with_capacity(args.steps);
    for i in 0..args.steps {
        let rho = args.rho_min + step * i as f64;
        model.set_correlation(rho).map_err(|e| e.to_string())?;
        let set = model
            .evaluate_all()
            .map_err(|e| format!("rho={rho}: {e}"))?;
        if !set.converged {
            eprintln!("warning: minimizer did not converge at rho={rho:.4}");
        }
        points.push(set);
    }

    match args.out {
        Some(path) => {
            let payload = serde_json::to_string_pretty(&SweepOutput {
                config: &config,
                points,
            })
            .map_err(|e| format!("failed to serialize sweep: {e}"))?;
            fs::write(&path, payload)
                .map_err(|e| format!("failed to write '{}': {e}", path.display()))?;
            println!("wrote {} sweep points to {}", args.steps, path.display());
        }
        None => print_sweep(&points),
    }
    Ok(())
}

fn print_quantities(set: &QuantitySet) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Quantity", "Value (nats)"]);
    let rows = [
        ("info_total", set.info_total),
        ("descriptive_loss", set.descriptive_loss),
        ("joint_loss", set.joint_loss),
        ("single_frame_loss", set.single_frame_loss),
        ("single_letter_loss", set.single_letter_loss),
        ("parallel_loss", set.parallel_loss),
        ("destructive_interference", set.destructive_interference),
    ];
    for (name, value) in rows {
        table.add_row(Row::from(vec![
            Cell::new(name),
            Cell::new(format!("{value:.6e}")),
        ]));
    }
    println!(
        "p = {}, rho1 = {}, rho2 = {}, theta* = {:.6}{}",
        set.p,
        set.rho1,
        set.rho2,
        set.theta,
        if set.converged { "" } else { " (not converged)" }
    );
    println!("{table}");
}

fn print_sweep(points: &[QuantitySet]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["rho", "info_total", "descriptive", "joint", "theta*"]);
    for set in points {
        table.add_row(Row::from(vec![
            Cell::new(format!("{:.4}", set.rho1)),
            Cell::new(format!("{:.6}", set.info_total)),
            Cell::new(format!("{:.6e}", set.descriptive_loss)),
            Cell::new(format!("{:.6e}", set.joint_loss)),
            Cell::new(format!("{:.4}", set.theta)),
        ]));
    }
    println!("{table}");
}
