//! Choosing between the CUDA and ROCm build paths.

use crate::error::PlanError;
use crate::version::ToolchainVersion;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Oldest framework release that can build ROCm extensions.
pub const MIN_ROCM_FRAMEWORK: ToolchainVersion = ToolchainVersion::new(1, 5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cuda,
    Rocm,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cuda => write!(f, "CUDA"),
            Self::Rocm => write!(f, "ROCm"),
        }
    }
}

/// Plain values the boundary gathered from the process environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendSignals {
    /// Explicit backend override.
    pub requested: Option<BackendKind>,
    pub cuda_root: Option<PathBuf>,
    pub rocm_root: Option<PathBuf>,
    /// Whether the framework reports a HIP build; `None` when it could not be asked.
    pub framework_hip: Option<bool>,
    pub framework_version: Option<ToolchainVersion>,
    pub gpu_visible: bool,
}

impl BackendSignals {
    pub fn toolchain_root(&self, backend: BackendKind) -> Option<&Path> {
        match backend {
            BackendKind::Cuda => self.cuda_root.as_deref(),
            BackendKind::Rocm => self.rocm_root.as_deref(),
        }
    }
}

/// Turns the two force flags into a single override.
pub fn requested_backend(
    force_cuda: bool,
    force_rocm: bool,
) -> Result<Option<BackendKind>, PlanError> {
    match (force_cuda, force_rocm) {
        (true, true) => Err(PlanError::AmbiguousBackendSelection),
        (true, false) => Ok(Some(BackendKind::Cuda)),
        (false, true) => Ok(Some(BackendKind::Rocm)),
        (false, false) => Ok(None),
    }
}

/// Picks the backend for this build.
///
/// An explicit request always wins. ROCm is chosen when its root is known,
/// the framework does not report a non-HIP build, and the framework (when
/// its release is known) is new enough to build ROCm extensions.
/// Everything else falls through to CUDA; whether CUDA is actually
/// installed is the probe's problem, not this function's.
pub fn select_backend(signals: &BackendSignals) -> BackendKind {
    if let Some(requested) = signals.requested {
        return requested;
    }

    let framework_supports_rocm = signals
        .framework_version
        .map_or(true, |v| v >= MIN_ROCM_FRAMEWORK);

    if signals.rocm_root.is_some()
        && signals.framework_hip != Some(false)
        && framework_supports_rocm
    {
        BackendKind::Rocm
    } else {
        BackendKind::Cuda
    }
}
