mod catalog;
mod config;
mod environment;
mod report;
mod runner;

use catalog::FlashAttnCatalog;
use clap::Parser;
use config::Config;
use eyre::{Result, WrapErr};
use flashplan::{plan_build, CompilationPlan};
use runner::TimeoutRunner;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing::{info, warn};

/// Resolves the compilation plan for the tree at `--project-root` and prints
/// it as JSON for the build driver.
///
/// The framework is asked about its build through `--python` unless
/// `--skip-framework-query` is set; a failed query only loses the facts it
/// would have supplied; explicit flags still apply.
fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();
    let cfg = Config::parse();

    let project_root = cfg
        .project_root
        .canonicalize()
        .wrap_err_with(|| format!("project root {:?} is not accessible", cfg.project_root))?;
    info!("Planning build for {:?}", project_root);

    let runner = TimeoutRunner::new(cfg.probe_timeout());

    let framework = if cfg.skip_framework_query {
        None
    } else {
        match environment::query_framework(&runner, &cfg.python) {
            Ok(info) => {
                info!(
                    "Framework {} (cuda={:?}, hip={:?})",
                    info.version.as_deref().unwrap_or("unknown"),
                    info.cuda,
                    info.hip
                );
                Some(info)
            }
            Err(err) => {
                warn!("Could not query the framework via {:?}: {err:#}", cfg.python);
                None
            }
        }
    };

    let env = environment::build_environment(&cfg, framework.as_ref()).map_err(report::diagnose)?;
    let catalog = FlashAttnCatalog::discover(&project_root)?;
    let plan = plan_build(&env, &runner, &catalog).map_err(report::diagnose)?;
    info!(
        "Resolved {} plan: {} sources, {} targets",
        plan.backend(),
        plan.sources().len(),
        plan.architectures().targets().len()
    );

    match &cfg.output {
        Some(path) => {
            let file =
                File::create(path).wrap_err_with(|| format!("creating {}", path.display()))?;
            write_plan(BufWriter::new(file), &plan)?;
            info!("Wrote plan to {:?}", path);
        }
        None => write_plan(io::stdout().lock(), &plan)?,
    }
    Ok(())
}

fn write_plan<W: Write>(mut out: W, plan: &CompilationPlan) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, plan)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
