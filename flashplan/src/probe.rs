//! Asking an installed compiler for its release.
//!
//! The compiler is located relative to the toolchain root and run once. Its
//! banner is searched for a marker word and the version is read from the
//! word that follows, so reordered or extra banner lines do not matter.

use crate::backend::BackendKind;
use crate::error::PlanError;
use crate::version::ToolchainVersion;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Captured result of running a program to completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
}

/// Runs external programs. The seam lets callers add a timeout and lets
/// tests script compiler output.
pub trait CommandRunner {
    fn run(&self, program: &Path, args: &[&str]) -> io::Result<CommandOutput>;
}

/// Runs programs with `std::process::Command` and no timeout.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[&str]) -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// How to get a version out of one backend's compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeSpec {
    pub backend: BackendKind,
    /// Path of the compiler relative to the toolchain root.
    pub executable: &'static str,
    pub args: &'static [&'static str],
    /// Word that immediately precedes the version token.
    pub marker: &'static str,
}

/// `Cuda compilation tools, release 11.8, V11.8.89`
pub const NVCC: ProbeSpec = ProbeSpec {
    backend: BackendKind::Cuda,
    executable: "bin/nvcc",
    args: &["-V"],
    marker: "release",
};

/// `HIP version: 5.7.31921-d1770ee1b`
pub const HIPCC: ProbeSpec = ProbeSpec {
    backend: BackendKind::Rocm,
    executable: "bin/hipcc",
    args: &["--version"],
    marker: "version:",
};

impl ProbeSpec {
    pub fn for_backend(backend: BackendKind) -> &'static ProbeSpec {
        match backend {
            BackendKind::Cuda => &NVCC,
            BackendKind::Rocm => &HIPCC,
        }
    }
}

/// A successful probe: which program answered and what it printed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeReport {
    pub program: PathBuf,
    pub version: ToolchainVersion,
    pub raw_output: String,
}

pub struct VersionProbe<'r, R: CommandRunner> {
    spec: &'static ProbeSpec,
    runner: &'r R,
}

impl<'r, R: CommandRunner> VersionProbe<'r, R> {
    pub fn new(backend: BackendKind, runner: &'r R) -> Self {
        Self {
            spec: ProbeSpec::for_backend(backend),
            runner,
        }
    }

    pub fn probe(&self, toolchain_root: &Path) -> Result<ToolchainVersion, PlanError> {
        self.probe_report(toolchain_root).map(|report| report.version)
    }

    /// Runs the compiler under `toolchain_root` once and parses its banner.
    ///
    /// A program that is missing or not executable is reported as
    /// `ToolchainNotFound`; other I/O failures are `ProbeFailed`;
    /// a program that runs but fails, or prints no version after the marker,
    /// is `UnparsableVersionOutput`.
    pub fn probe_report(&self, toolchain_root: &Path) -> Result<ProbeReport, PlanError> {
        let program = toolchain_root.join(self.spec.executable);
        let output = self
            .runner
            .run(&program, self.spec.args)
            .map_err(|err| match err.kind() {
                io::ErrorKind::TimedOut => PlanError::ProbeTimedOut {
                    program: program.clone(),
                },
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    PlanError::ToolchainNotFound {
                        backend: self.spec.backend,
                        path: Some(program.clone()),
                    }
                }
                _ => PlanError::ProbeFailed {
                    program: program.clone(),
                    reason: err.to_string(),
                },
            })?;
        debug!(program = %program.display(), output = %output.stdout.trim(), "probe output");

        let unparsable = || PlanError::UnparsableVersionOutput {
            program: program.clone(),
            expected_marker: self.spec.marker,
            output: output.stdout.clone(),
        };
        if !output.success {
            return Err(unparsable());
        }
        let version = version_after_marker(&output.stdout, self.spec.marker).ok_or_else(unparsable)?;

        Ok(ProbeReport {
            program: program.clone(),
            version,
            raw_output: output.stdout.clone(),
        })
    }
}

/// Finds the first `marker` word in `output` and parses the word after it.
pub fn version_after_marker(output: &str, marker: &str) -> Option<ToolchainVersion> {
    let mut words = output.split_whitespace();
    words.find(|word| *word == marker)?;
    ToolchainVersion::parse_leading(words.next()?)
}
