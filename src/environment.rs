//! Everything that touches the process environment or the filesystem
//! before planning starts. The planner itself only sees the values
//! collected here.

use crate::config::Config;
use eyre::{ensure, eyre, Result};
use flashplan::{BackendSignals, BuildEnvironment, CommandRunner, PlanError, ToolchainVersion};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Printed as a single JSON line by the framework's interpreter.
const FRAMEWORK_QUERY: &str = "import json, os, torch; print(json.dumps({\
    'version': torch.__version__, \
    'cuda': torch.version.cuda, \
    'hip': getattr(torch.version, 'hip', None), \
    'include_dir': os.path.join(torch.__path__[0], 'include'), \
    'gpu_visible': torch.cuda.is_available()}))";

/// Build facts reported by the installed framework.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct FrameworkInfo {
    pub version: Option<String>,
    pub cuda: Option<String>,
    pub hip: Option<String>,
    pub include_dir: Option<PathBuf>,
    pub gpu_visible: Option<bool>,
}

pub fn query_framework<R: CommandRunner>(runner: &R, python: &Path) -> Result<FrameworkInfo> {
    let output = runner.run(python, &["-c", FRAMEWORK_QUERY])?;
    ensure!(
        output.success,
        "{} failed to import the framework",
        python.display()
    );
    parse_framework_info(&output.stdout)
}

/// Takes the last JSON object line; import-time warnings may precede it.
pub fn parse_framework_info(stdout: &str) -> Result<FrameworkInfo> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .ok_or_else(|| eyre!("framework query printed no JSON"))?;
    Ok(serde_json::from_str(line)?)
}

/// Combines command-line/env configuration with the framework's answers.
/// Explicit configuration wins over anything queried.
pub fn build_environment(
    cfg: &Config,
    framework: Option<&FrameworkInfo>,
) -> Result<BuildEnvironment, PlanError> {
    let queried = framework.cloned().unwrap_or_default();

    let framework_version = cfg
        .framework_version
        .as_deref()
        .or(queried.version.as_deref())
        .map(parse_release)
        .transpose()?;
    let framework_cuda_version = cfg
        .framework_cuda_version
        .as_deref()
        .or(queried.cuda.as_deref())
        .map(parse_release)
        .transpose()?;
    let framework_hip = cfg
        .framework_hip
        .or_else(|| framework.map(|info| info.hip.is_some()));
    let include_dir = cfg.framework_include_dir.clone().or(queried.include_dir);

    Ok(BuildEnvironment {
        signals: BackendSignals {
            requested: cfg.requested_backend()?,
            cuda_root: cuda_home(cfg),
            rocm_root: rocm_home(cfg),
            framework_hip,
            framework_version,
            gpu_visible: cfg.gpu_visible.or(queried.gpu_visible).unwrap_or(false),
        },
        framework_cuda_version,
        arch_override: cfg.arch_list.clone(),
        allow_version_mismatch: cfg.allow_version_mismatch,
        conversion: cfg.conversion_mode(),
        old_generator_path: include_dir.as_deref().is_some_and(has_legacy_generator_header),
        framework_arch_list: cfg.torch_arch_list.clone(),
        extension_name: cfg.extension_name.clone(),
    })
}

/// Framework releases carry local tags (`2.1.0+cu118`); only the number matters.
fn parse_release(raw: &str) -> Result<ToolchainVersion, PlanError> {
    ToolchainVersion::parse_leading(raw.trim()).ok_or_else(|| PlanError::InvalidVersion {
        input: raw.to_string(),
    })
}

/// Older framework releases keep the generator header at the top of `ATen/`.
pub fn has_legacy_generator_header(include_dir: &Path) -> bool {
    include_dir.join("ATen").join("CUDAGeneratorImpl.h").is_file()
}

fn cuda_home(cfg: &Config) -> Option<PathBuf> {
    cfg.cuda_home
        .clone()
        .or_else(|| env::var_os("CUDA_PATH").map(PathBuf::from))
        .or_else(|| toolchain_root_on_path("nvcc"))
        .or_else(|| existing_dir("/usr/local/cuda"))
}

fn rocm_home(cfg: &Config) -> Option<PathBuf> {
    cfg.rocm_home
        .clone()
        .or_else(|| env::var_os("ROCM_PATH").map(PathBuf::from))
        .or_else(|| toolchain_root_on_path("hipcc"))
        .or_else(|| existing_dir("/opt/rocm"))
}

/// `<root>/bin/<program>` found on `PATH` gives `<root>`.
fn toolchain_root_on_path(program: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    let exe = env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())?;
    let exe = exe.canonicalize().ok()?;
    exe.parent()?.parent().map(Path::to_path_buf)
}

fn existing_dir(path: &str) -> Option<PathBuf> {
    let path = PathBuf::from(path);
    path.is_dir().then_some(path)
}
