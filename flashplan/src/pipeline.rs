//! End-to-end plan resolution for one build invocation.

use crate::arch::{self, ConversionMode};
use crate::backend::{select_backend, BackendKind, BackendSignals};
use crate::compat;
use crate::error::PlanError;
use crate::flags::{cross_compile_arch_list, FRAMEWORK_ARCH_LIST_VAR};
use crate::plan::{AssemblyOptions, CompilationPlan, PlanAssembler, SourceInventory};
use crate::probe::{CommandRunner, VersionProbe};
use crate::version::ToolchainVersion;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Supplies the per-backend source list and include roots.
pub trait SourceCatalog {
    fn inventory(&self, backend: BackendKind) -> SourceInventory;
    fn include_roots(&self, backend: BackendKind) -> Vec<PathBuf>;
}

/// Everything the boundary learned about the machine, as plain values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildEnvironment {
    pub signals: BackendSignals,
    /// CUDA release the framework binaries were built with.
    pub framework_cuda_version: Option<ToolchainVersion>,
    pub arch_override: Option<String>,
    pub allow_version_mismatch: bool,
    pub conversion: ConversionMode,
    pub old_generator_path: bool,
    /// Target list already exported for the framework's own extension builder.
    pub framework_arch_list: Option<String>,
    pub extension_name: String,
}

/// Runs every stage in order and returns the finished plan.
///
/// Stages: backend selection, toolchain probe, framework match (CUDA only),
/// target resolution, assembly. The first failing stage ends the run.
pub fn plan_build<R: CommandRunner, C: SourceCatalog>(
    env: &BuildEnvironment,
    runner: &R,
    catalog: &C,
) -> Result<CompilationPlan, PlanError> {
    let backend = select_backend(&env.signals);
    info!("Building for {backend}");

    let root = env
        .signals
        .toolchain_root(backend)
        .ok_or(PlanError::ToolchainNotFound {
            backend,
            path: None,
        })?;
    let report = VersionProbe::new(backend, runner).probe_report(root)?;
    info!(
        "Compiling {} extensions with {} from {}",
        backend,
        report.version,
        report.program.display()
    );
    let version = report.version;

    if backend == BackendKind::Cuda {
        check_framework_match(env, &version)?;
    }

    let flags = arch::resolve(
        backend,
        &version,
        env.arch_override.as_deref(),
        env.conversion,
    )?;

    let mut env_exports = BTreeMap::new();
    if backend == BackendKind::Cuda
        && !env.signals.gpu_visible
        && !has_explicit_targets(env)
        && env.framework_arch_list.is_none()
    {
        let list = cross_compile_arch_list(&version);
        warn!(
            "No visible GPU; cross-compiling. Exporting {FRAMEWORK_ARCH_LIST_VAR}={list}. \
             Set an explicit architecture list to build for a single target."
        );
        env_exports.insert(FRAMEWORK_ARCH_LIST_VAR.to_string(), list);
    }

    let assembler = PlanAssembler::new(AssemblyOptions {
        extension_name: env.extension_name.clone(),
        old_generator_path: env.old_generator_path,
        env_exports,
    });
    assembler.assemble(
        backend,
        version,
        flags,
        catalog.inventory(backend),
        catalog.include_roots(backend),
    )
}

fn has_explicit_targets(env: &BuildEnvironment) -> bool {
    env.arch_override
        .as_deref()
        .is_some_and(|list| arch::override_tokens(list).next().is_some())
}

fn check_framework_match(env: &BuildEnvironment, toolkit: &ToolchainVersion) -> Result<(), PlanError> {
    let outcome = match &env.framework_cuda_version {
        Some(framework) => compat::validate(toolkit, framework),
        None => Err(PlanError::FrameworkVersionUnknown),
    };

    match outcome {
        Err(err) if env.allow_version_mismatch => {
            warn!("{err}; continuing because the version check is bypassed");
            Ok(())
        }
        other => other,
    }
}
