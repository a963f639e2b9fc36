mod config;
mod render;

use std::collections::BTreeMap;
use std::process::ExitCode;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use converge_core::RunSettings;
use converge_graph::{load, overlay_variables, read_plan};
use fs_err as fs;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Exit code for a plan rejected before any apply (cycle, duplicate
/// identity, dangling reference). Apply-time failures exit with the 1-based
/// plan position of the first failed resource, saturated to 255.
const PLAN_REJECTED: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "converge",
    version,
    about = "Declarative desired-state convergence for files, templates, and services."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Converge the system toward a plan.
    Apply(ApplyArgs),
    /// Load and validate a plan, printing the resolved apply order.
    Validate(ValidateArgs),
}

#[derive(Debug, Parser)]
struct ApplyArgs {
    /// Plan file (YAML or JSON).
    #[arg(long)]
    plan: Utf8PathBuf,

    /// Compute and report diffs without applying or notifying.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Externally resolved template variables (YAML mapping), overlaid onto
    /// every template declaration. External values win.
    #[arg(long)]
    vars: Option<Utf8PathBuf>,

    /// Root the declared paths are interpreted beneath (default: `/`).
    #[arg(long, default_value = "/")]
    root: Utf8PathBuf,

    /// Config file (default: ./converge.toml if present).
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Write the run report as JSON.
    #[arg(long)]
    report: Option<Utf8PathBuf>,
}

#[derive(Debug, Parser)]
struct ValidateArgs {
    /// Plan file (YAML or JSON).
    #[arg(long)]
    plan: Utf8PathBuf,
}

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => code,
        Err(e) => {
            error!("{:?}", e);
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn real_main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Apply(args) => cmd_apply(args),
        Command::Validate(args) => cmd_validate(args),
    }
}

fn cmd_apply(args: ApplyArgs) -> anyhow::Result<ExitCode> {
    let mut doc = read_plan(&args.plan)?;
    if let Some(vars_path) = &args.vars {
        let vars = read_vars(vars_path)?;
        overlay_variables(&mut doc, &vars);
    }

    let plan = match load(doc) {
        Ok(plan) => plan,
        Err(err) => {
            error!("plan rejected: {err}");
            eprintln!("plan rejected: {err}");
            return Ok(ExitCode::from(PLAN_REJECTED));
        }
    };

    let file_config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => config::load_or_default(Utf8Path::new("."))?,
    };
    debug!(
        "config: backups.keep={}, service.manager={}",
        file_config.backups.keep, file_config.service.manager
    );

    let settings = RunSettings {
        root: args.root,
        dry_run: args.dry_run,
        backups: file_config.backup_policy(),
        service_manager: file_config.service.manager.clone(),
    };
    let backends = settings.live_backends();

    let outcome = converge_core::run(&plan, &backends, &settings);

    print!("{}", render::render_report_md(&outcome.report));
    if args.dry_run && !outcome.patch.is_empty() {
        print!("{}", outcome.patch);
    }
    if let Some(report_path) = &args.report {
        write_json(report_path, &outcome.report)?;
        info!("wrote run report to {}", report_path);
    }

    Ok(match outcome.failed {
        None => ExitCode::SUCCESS,
        Some(pos) => {
            let identity = plan
                .resources
                .get(pos)
                .map(|r| r.identity().to_string())
                .unwrap_or_else(|| "?".to_string());
            error!("run stopped at resource {} ({identity})", pos + 1);
            eprintln!("run stopped at resource {} ({identity})", pos + 1);
            ExitCode::from(u8::try_from(pos + 1).unwrap_or(u8::MAX))
        }
    })
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<ExitCode> {
    let doc = read_plan(&args.plan)?;
    match load(doc) {
        Ok(plan) => {
            print!("{}", render::render_order(&plan));
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!("plan rejected: {err}");
            eprintln!("plan rejected: {err}");
            Ok(ExitCode::from(PLAN_REJECTED))
        }
    }
}

/// Read a flat `name: value` YAML mapping of template variables.
fn read_vars(path: &Utf8Path) -> anyhow::Result<BTreeMap<String, String>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read vars {}", path))?;
    let vars: BTreeMap<String, String> =
        serde_yaml::from_str(&contents).with_context(|| format!("parse vars {}", path))?;
    Ok(vars)
}

fn write_json<T: serde::Serialize>(path: &Utf8Path, v: &T) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(v).context("serialize json")?;
    fs::write(path, s).with_context(|| format!("write {}", path))?;
    Ok(())
}
