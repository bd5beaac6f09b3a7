//! FlashAttention-2 build planning
//!
//! Resolves how the native GPU extension should be compiled on this machine:
//! - `backend`: CUDA or ROCm, from plain environment signals
//! - `probe`: the toolchain's release, read from its compiler banner
//! - `compat`: strict toolchain vs. framework build release check
//! - `arch`: device targets from a version-gated table or a user override
//! - `plan`: the immutable compilation plan consumed by the build driver
//!
//! Nothing here reads the process environment or invokes the compiler
//! except the single version probe, which goes through [`CommandRunner`].

pub mod arch;
pub mod backend;
pub mod compat;
pub mod error;
pub mod flags;
pub mod pipeline;
pub mod plan;
pub mod probe;
pub mod version;

pub use arch::{ArchTarget, ArchitectureFlagSet, ComputeCapability, ConversionMode};
pub use backend::{requested_backend, select_backend, BackendKind, BackendSignals};
pub use error::PlanError;
pub use pipeline::{plan_build, BuildEnvironment, SourceCatalog};
pub use plan::{CompilationPlan, CompilerRole, PlanAssembler, SourceInventory, StagedCopy};
pub use probe::{CommandOutput, CommandRunner, SystemRunner, VersionProbe};
pub use version::ToolchainVersion;
