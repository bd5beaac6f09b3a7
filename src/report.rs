//! Turns planning failures into messages a user can act on.

use eyre::eyre;
use flashplan::{BackendKind, PlanError};

pub fn diagnose(err: PlanError) -> eyre::Report {
    match suggestion(&err) {
        Some(hint) => eyre!("{err}\n\n{hint}"),
        None => eyre!(err),
    }
}

fn suggestion(err: &PlanError) -> Option<String> {
    let hint = match err {
        PlanError::ToolchainNotFound {
            backend: BackendKind::Cuda,
            path: None,
        } => "nvcc was not found. Are you sure your environment has nvcc available? \
              Set CUDA_HOME to the toolkit root. If you're installing within a container \
              from https://hub.docker.com/r/pytorch/pytorch, only images whose names \
              contain 'devel' will provide nvcc."
            .to_string(),
        PlanError::ToolchainNotFound {
            backend: BackendKind::Cuda,
            path: Some(_),
        } => "CUDA_HOME must point at a toolkit that contains bin/nvcc.".to_string(),
        PlanError::ToolchainNotFound {
            backend: BackendKind::Rocm,
            ..
        } => "Set ROCM_HOME to the ROCm installation root, or pass --force-cuda.".to_string(),
        PlanError::UnparsableVersionOutput { output, .. } => format!(
            "A wrapper script may be intercepting the compiler. It printed:\n{}",
            output.trim_end()
        ),
        PlanError::VersionMismatch { framework, .. } => format!(
            "The framework binaries were built with CUDA {framework}. Install that toolkit \
             release, or pass --allow-version-mismatch to proceed at your own risk."
        ),
        PlanError::UnsupportedToolchainVersion { minimum, .. } => {
            format!("FlashAttention needs CUDA {minimum} or newer.")
        }
        PlanError::AmbiguousBackendSelection => {
            "Pass at most one of --force-cuda and --force-rocm.".to_string()
        }
        PlanError::FrameworkVersionUnknown => {
            "Check that --python can import the framework, pass --framework-cuda-version, \
             or pass --allow-version-mismatch."
                .to_string()
        }
        PlanError::InvalidArchitectureOverride { .. } => {
            "Targets look like \"8.0;9.0\" for CUDA or \"gfx90a\" for ROCm.".to_string()
        }
        PlanError::InvalidVersion { .. } => {
            "Versions look like \"11.8\" or \"11.8.0\".".to_string()
        }
        PlanError::ProbeTimedOut { .. } => {
            "Raise --probe-timeout-secs if the toolchain lives on slow storage.".to_string()
        }
        PlanError::ProbeFailed { .. } => {
            "The compiler started but its output could not be read; rerun, and check \
             for wrapper scripts around the compiler."
                .to_string()
        }
        PlanError::IncompletePlan { .. } => return None,
    };
    Some(hint)
}
