//! Toolchain against framework build release.
//!
//! Extensions compiled with a different CUDA release than the framework
//! binaries may miscompile or crash at load time. Only exact equality is
//! accepted here; any leniency is the caller's explicit choice.

use crate::error::PlanError;
use crate::version::ToolchainVersion;

pub fn validate(
    toolchain: &ToolchainVersion,
    framework: &ToolchainVersion,
) -> Result<(), PlanError> {
    if toolchain == framework {
        Ok(())
    } else {
        Err(PlanError::VersionMismatch {
            toolchain: *toolchain,
            framework: *framework,
        })
    }
}
