//! The compilation plan handed to the build driver.

use crate::arch::ArchitectureFlagSet;
use crate::backend::BackendKind;
use crate::error::PlanError;
use crate::flags::{self, OLD_GENERATOR_DEFINE};
use crate::version::ToolchainVersion;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CompilerRole {
    /// C++ compiler for host translation units (`cxx`).
    #[serde(rename = "host-compiler")]
    Host,
    /// nvcc or hipcc.
    #[serde(rename = "device-compiler")]
    Device,
}

/// A file the driver must copy before compiling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StagedCopy {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// What the external source inventory supplies for one backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceInventory {
    pub sources: Vec<PathBuf>,
    pub staged_copies: Vec<StagedCopy>,
}

/// Per-build settings that are not derived from the toolchain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssemblyOptions {
    pub extension_name: String,
    pub old_generator_path: bool,
    pub env_exports: BTreeMap<String, String>,
}

/// Resolved description of one extension build. Only [`PlanAssembler`]
/// creates these, and nothing mutates them afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompilationPlan {
    extension_name: String,
    backend: BackendKind,
    toolchain_version: ToolchainVersion,
    architectures: ArchitectureFlagSet,
    compiler_args: BTreeMap<CompilerRole, Vec<String>>,
    include_dirs: Vec<PathBuf>,
    sources: Vec<PathBuf>,
    staged_copies: Vec<StagedCopy>,
    env_exports: BTreeMap<String, String>,
}

impl CompilationPlan {
    pub fn extension_name(&self) -> &str {
        &self.extension_name
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn toolchain_version(&self) -> &ToolchainVersion {
        &self.toolchain_version
    }

    pub fn architectures(&self) -> &ArchitectureFlagSet {
        &self.architectures
    }

    pub fn compiler_args(&self, role: CompilerRole) -> &[String] {
        self.compiler_args
            .get(&role)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn staged_copies(&self) -> &[StagedCopy] {
        &self.staged_copies
    }

    pub fn env_exports(&self) -> &BTreeMap<String, String> {
        &self.env_exports
    }
}

pub struct PlanAssembler {
    options: AssemblyOptions,
}

impl PlanAssembler {
    pub fn new(options: AssemblyOptions) -> Self {
        Self { options }
    }

    /// Composes the backend's flag profile, the resolved targets and the
    /// inventory into a plan.
    ///
    /// Device arguments are ordered as: profile, generator define, target
    /// arguments, version-gated options. Fails with `IncompletePlan` if a
    /// flag list, the source list or the target set would be empty, or an
    /// include root is blank; nothing is returned in that case.
    pub fn assemble(
        &self,
        backend: BackendKind,
        version: ToolchainVersion,
        flags: ArchitectureFlagSet,
        inventory: SourceInventory,
        include_roots: Vec<PathBuf>,
    ) -> Result<CompilationPlan, PlanError> {
        if self.options.extension_name.is_empty() {
            return Err(PlanError::IncompletePlan {
                reason: "extension name is empty",
            });
        }
        if flags.is_empty() {
            return Err(PlanError::IncompletePlan {
                reason: "no target architectures",
            });
        }
        if inventory.sources.is_empty() {
            return Err(PlanError::IncompletePlan {
                reason: "source inventory is empty",
            });
        }
        if include_roots.iter().any(|root| is_blank(root)) {
            return Err(PlanError::IncompletePlan {
                reason: "blank include root",
            });
        }

        let profile = flags::profile(backend);
        let generator = self
            .options
            .old_generator_path
            .then(|| OLD_GENERATOR_DEFINE.to_string());

        let host: Vec<String> = profile
            .host
            .iter()
            .map(|flag| flag.to_string())
            .chain(generator.clone())
            .collect();
        let device: Vec<String> = profile
            .device
            .iter()
            .map(|flag| flag.to_string())
            .chain(generator)
            .chain(flags.device_args())
            .chain(flags::version_gated_device_flags(backend, &version))
            .collect();

        if host.is_empty() || device.is_empty() {
            return Err(PlanError::IncompletePlan {
                reason: "empty compiler flag list",
            });
        }

        let compiler_args = BTreeMap::from([(CompilerRole::Host, host), (CompilerRole::Device, device)]);

        Ok(CompilationPlan {
            extension_name: self.options.extension_name.clone(),
            backend,
            toolchain_version: version,
            architectures: flags,
            compiler_args,
            include_dirs: include_roots,
            sources: inventory.sources,
            staged_copies: inventory.staged_copies,
            env_exports: self.options.env_exports.clone(),
        })
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().is_empty()
}
