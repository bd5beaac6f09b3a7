use crate::backend::BackendKind;
use crate::version::ToolchainVersion;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Every way plan resolution can fail.
///
/// Variants carry the values that were compared or tried so the caller can
/// render its own diagnostic. None of them are retryable: they describe the
/// machine the build runs on, which does not change during one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The toolchain root is unknown, or its compiler could not be executed.
    ToolchainNotFound {
        backend: BackendKind,
        path: Option<PathBuf>,
    },
    /// The compiler ran but its output carried no version after the marker.
    UnparsableVersionOutput {
        program: PathBuf,
        expected_marker: &'static str,
        output: String,
    },
    VersionMismatch {
        toolchain: ToolchainVersion,
        framework: ToolchainVersion,
    },
    UnsupportedToolchainVersion {
        found: ToolchainVersion,
        minimum: ToolchainVersion,
    },
    /// Both backends were forced at once.
    AmbiguousBackendSelection,
    /// CUDA build, strict check requested, but the framework's CUDA release is unknown.
    FrameworkVersionUnknown,
    InvalidArchitectureOverride {
        token: String,
    },
    InvalidVersion {
        input: String,
    },
    ProbeTimedOut {
        program: PathBuf,
    },
    /// The compiler started but its output could not be collected.
    ProbeFailed {
        program: PathBuf,
        reason: String,
    },
    IncompletePlan {
        reason: &'static str,
    },
}

impl Display for PlanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToolchainNotFound {
                backend,
                path: Some(path),
            } => write!(f, "{backend} toolchain not found at {}", path.display()),
            Self::ToolchainNotFound {
                backend,
                path: None,
            } => write!(f, "{backend} toolchain root is not set"),
            Self::UnparsableVersionOutput {
                program,
                expected_marker,
                ..
            } => write!(
                f,
                "could not find a version after `{expected_marker}` in the output of {}",
                program.display()
            ),
            Self::VersionMismatch {
                toolchain,
                framework,
            } => write!(
                f,
                "toolchain release {toolchain} does not match the framework build release {framework}"
            ),
            Self::UnsupportedToolchainVersion { found, minimum } => {
                write!(f, "toolchain release {found} is older than the minimum {minimum}")
            }
            Self::AmbiguousBackendSelection => {
                write!(f, "both CUDA and ROCm were requested explicitly")
            }
            Self::FrameworkVersionUnknown => {
                write!(f, "the framework's CUDA build release is unknown")
            }
            Self::InvalidArchitectureOverride { token } => {
                write!(f, "invalid architecture token `{token}`")
            }
            Self::InvalidVersion { input } => write!(f, "invalid version `{input}`"),
            Self::ProbeTimedOut { program } => {
                write!(f, "{} did not report its version in time", program.display())
            }
            Self::ProbeFailed { program, reason } => {
                write!(f, "could not read the output of {}: {reason}", program.display())
            }
            Self::IncompletePlan { reason } => write!(f, "incomplete compilation plan: {reason}"),
        }
    }
}

impl Error for PlanError {}
