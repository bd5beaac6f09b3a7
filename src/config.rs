use clap::builder::{BoolishValueParser, FalseyValueParser};
use clap::Parser;
use flashplan::{requested_backend, BackendKind, ConversionMode, PlanError};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Resolve the FlashAttention-2 compilation plan for this machine",
    long_about = None
)]
pub struct Config {
    /// Root of the extension source tree
    #[arg(long, env = "FLASHPLAN_PROJECT_ROOT", default_value = ".")]
    pub project_root: PathBuf,

    /// CUDA toolkit root (falls back to CUDA_PATH, nvcc on PATH, /usr/local/cuda)
    #[arg(long, env = "CUDA_HOME")]
    pub cuda_home: Option<PathBuf>,

    /// ROCm root (falls back to ROCM_PATH, hipcc on PATH, /opt/rocm)
    #[arg(long, env = "ROCM_HOME")]
    pub rocm_home: Option<PathBuf>,

    /// Build for CUDA regardless of what is detected
    #[arg(long, env = "FLASHPLAN_FORCE_CUDA", value_parser = FalseyValueParser::new())]
    pub force_cuda: bool,

    /// Build for ROCm regardless of what is detected
    #[arg(long, env = "FLASHPLAN_FORCE_ROCM", value_parser = FalseyValueParser::new())]
    pub force_rocm: bool,

    /// Explicit target list, e.g. "8.0;9.0" for CUDA or "gfx90a" for ROCm
    #[arg(long, env = "FLASHPLAN_ARCH_LIST")]
    pub arch_list: Option<String>,

    /// Accept a toolkit whose release differs from the framework's build (at your own risk)
    #[arg(long, env = "FLASHPLAN_ALLOW_VERSION_MISMATCH", value_parser = FalseyValueParser::new())]
    pub allow_version_mismatch: bool,

    /// Round-to-nearest bf16 conversion for ROCm kernels
    #[arg(long, env = "FLASH_ATTENTION_INTERNAL_USE_RTN", value_parser = FalseyValueParser::new())]
    pub use_rtn: bool,

    /// Python interpreter used to ask the framework about its build
    #[arg(long, env = "FLASHPLAN_PYTHON", default_value = "python3")]
    pub python: PathBuf,

    /// Do not run the interpreter; rely on the framework flags below
    #[arg(long, env = "FLASHPLAN_SKIP_FRAMEWORK_QUERY", value_parser = FalseyValueParser::new())]
    pub skip_framework_query: bool,

    /// Framework release, e.g. "2.1.0"
    #[arg(long, env = "FLASHPLAN_TORCH_VERSION")]
    pub framework_version: Option<String>,

    /// CUDA release the framework was built with, e.g. "11.8"
    #[arg(long, env = "FLASHPLAN_TORCH_CUDA_VERSION")]
    pub framework_cuda_version: Option<String>,

    /// Whether the framework is a HIP build
    #[arg(long, env = "FLASHPLAN_TORCH_HIP", value_parser = BoolishValueParser::new())]
    pub framework_hip: Option<bool>,

    /// The framework's C++ include directory
    #[arg(long, env = "FLASHPLAN_TORCH_INCLUDE_DIR")]
    pub framework_include_dir: Option<PathBuf>,

    /// Whether a GPU is visible to the framework
    #[arg(long, env = "FLASHPLAN_GPU_VISIBLE", value_parser = BoolishValueParser::new())]
    pub gpu_visible: Option<bool>,

    /// Target list already exported for the framework's extension builder
    #[arg(long, env = "TORCH_CUDA_ARCH_LIST", hide = true)]
    pub torch_arch_list: Option<String>,

    /// Name of the extension module
    #[arg(long, env = "FLASHPLAN_EXTENSION_NAME", default_value = "flash_attn_2_cuda")]
    pub extension_name: String,

    /// Seconds to wait for each external program
    #[arg(long, env = "FLASHPLAN_PROBE_TIMEOUT_SECS", default_value = "30")]
    pub probe_timeout_secs: u64,

    /// Write the plan here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl Config {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn requested_backend(&self) -> Result<Option<BackendKind>, PlanError> {
        requested_backend(self.force_cuda, self.force_rocm)
    }

    pub fn conversion_mode(&self) -> ConversionMode {
        if self.use_rtn {
            ConversionMode::RoundToNearest
        } else {
            ConversionMode::RoundTowardZero
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("flashplan").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn forcing_both_backends_is_rejected() {
        let cfg = parse(&["--force-cuda", "--force-rocm"]);
        assert_eq!(
            cfg.requested_backend(),
            Err(PlanError::AmbiguousBackendSelection)
        );
    }

    #[test]
    fn rtn_flag_selects_round_to_nearest() {
        assert_eq!(parse(&["--use-rtn"]).conversion_mode(), ConversionMode::RoundToNearest);
    }

    #[test]
    fn timeout_is_in_seconds() {
        let cfg = parse(&["--probe-timeout-secs", "5"]);
        assert_eq!(cfg.probe_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn framework_facts_parse_from_flags() {
        let cfg = parse(&[
            "--framework-cuda-version",
            "11.8",
            "--framework-hip",
            "false",
            "--gpu-visible",
            "true",
        ]);
        assert_eq!(cfg.framework_cuda_version.as_deref(), Some("11.8"));
        assert_eq!(cfg.framework_hip, Some(false));
        assert_eq!(cfg.gpu_visible, Some(true));
    }

    #[test]
    fn framework_facts_accept_numeric_booleans() {
        let cfg = parse(&["--framework-hip", "1", "--gpu-visible", "0"]);
        assert_eq!(cfg.framework_hip, Some(true));
        assert_eq!(cfg.gpu_visible, Some(false));

        let cfg = parse(&["--framework-hip", "no", "--gpu-visible", "yes"]);
        assert_eq!(cfg.framework_hip, Some(false));
        assert_eq!(cfg.gpu_visible, Some(true));
    }
}
