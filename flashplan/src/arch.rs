//! Target GPU architectures for device code.
//!
//! CUDA targets come from a version-gated table: each toolkit release adds
//! the architectures it can compile for and none are ever dropped, so a
//! single build carries device code for every generation the toolkit
//! supports. An explicit list from the user replaces the table entirely.
//!
//! ROCm compiles for the GPU of the build machine unless told otherwise.

use crate::backend::BackendKind;
use crate::error::PlanError;
use crate::version::{unlocked, ToolchainVersion, VersionGate};
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use tracing::{info, warn};

/// Oldest CUDA toolkit the kernels compile with.
pub const MIN_CUDA_TOOLKIT: ToolchainVersion = ToolchainVersion::new(11, 0);

const AMPERE: &[ComputeCapability] = &[ComputeCapability::new(8, 0)];
const HOPPER: &[ComputeCapability] = &[ComputeCapability::new(9, 0)];

/// Architectures unlocked by each CUDA release, ascending.
pub const CUDA_ARCH_POLICY: &[VersionGate<ComputeCapability>] = &[
    VersionGate::new(MIN_CUDA_TOOLKIT, AMPERE),
    VersionGate::new(ToolchainVersion::new(11, 8), HOPPER),
];

/// ROCm offload target used when none is requested.
pub const ROCM_NATIVE_TARGET: &str = "native";

/// `major.minor` hardware generation of an NVIDIA GPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputeCapability {
    major: u32,
    minor: u32,
}

impl ComputeCapability {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Virtual architecture, e.g. `compute_80`.
    pub fn compute_token(&self) -> String {
        format!("compute_{}{}", self.major, self.minor)
    }

    /// Real architecture, e.g. `sm_80`.
    pub fn code_token(&self) -> String {
        format!("sm_{}{}", self.major, self.minor)
    }
}

impl Display for ComputeCapability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Serialize for ComputeCapability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepts `8.0` and the compact `80` form; the last digit of the compact
/// form is the minor revision.
impl FromStr for ComputeCapability {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PlanError::InvalidArchitectureOverride {
            token: s.to_string(),
        };
        let digits = |part: &str| -> Result<u32, PlanError> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        match s.split_once('.') {
            Some((major, minor)) => Ok(Self::new(digits(major)?, digits(minor)?)),
            None if s.len() >= 2 => {
                let (major, minor) = s.split_at(s.len() - 1);
                Ok(Self::new(digits(major)?, digits(minor)?))
            }
            None => Err(invalid()),
        }
    }
}

/// One device-code target.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchTarget {
    /// CUDA `(compute_XY, sm_XY)` pair.
    Gencode(ComputeCapability),
    /// ROCm offload target such as `native` or `gfx90a`.
    Offload(String),
}

impl ArchTarget {
    /// The `(compute-capability, code-generation)` token pair.
    pub fn tokens(&self) -> (String, String) {
        match self {
            Self::Gencode(cap) => (cap.compute_token(), cap.code_token()),
            Self::Offload(target) => (target.clone(), target.clone()),
        }
    }

    /// Compiler arguments selecting this target.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Gencode(cap) => vec![
                "-gencode".to_string(),
                format!("arch={},code={}", cap.compute_token(), cap.code_token()),
            ],
            Self::Offload(target) => vec![format!("--offload-arch={target}")],
        }
    }
}

/// How ROCm kernels convert to bf16.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConversionMode {
    #[default]
    RoundTowardZero,
    RoundToNearest,
}

impl ConversionMode {
    /// Extra define selecting the conversion code path, if it is not the default.
    pub fn define(self) -> Option<&'static str> {
        match self {
            Self::RoundTowardZero => None,
            Self::RoundToNearest => Some("-DUSE_RTN_BF16_CONVERT"),
        }
    }
}

/// Ordered device targets, unique by target, plus extra defines.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ArchitectureFlagSet {
    targets: Vec<ArchTarget>,
    defines: Vec<String>,
}

impl ArchitectureFlagSet {
    /// Appends `target` unless it is already present. Returns whether it was added.
    pub fn push_unique(&mut self, target: ArchTarget) -> bool {
        if self.targets.contains(&target) {
            return false;
        }
        self.targets.push(target);
        true
    }

    pub fn push_define(&mut self, define: impl Into<String>) {
        self.defines.push(define.into());
    }

    pub fn targets(&self) -> &[ArchTarget] {
        &self.targets
    }

    pub fn defines(&self) -> &[String] {
        &self.defines
    }

    pub fn contains(&self, target: &ArchTarget) -> bool {
        self.targets.contains(target)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn is_superset_of(&self, other: &Self) -> bool {
        other.targets.iter().all(|t| self.contains(t))
    }

    /// Arguments for the device compiler: targets in order, then defines.
    pub fn device_args(&self) -> Vec<String> {
        self.targets
            .iter()
            .flat_map(ArchTarget::args)
            .chain(self.defines.iter().cloned())
            .collect()
    }
}

/// Splits an override list on `;`, `,` or whitespace.
pub(crate) fn override_tokens(list: &str) -> impl Iterator<Item = &str> {
    list.split(|c: char| c == ';' || c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
}

fn parse_override(backend: BackendKind, list: &str) -> Result<Vec<ArchTarget>, PlanError> {
    override_tokens(list)
        .map(|token| match backend {
            BackendKind::Cuda => token.parse().map(ArchTarget::Gencode),
            BackendKind::Rocm if is_offload_target(token) => {
                Ok(ArchTarget::Offload(token.to_string()))
            }
            BackendKind::Rocm => Err(PlanError::InvalidArchitectureOverride {
                token: token.to_string(),
            }),
        })
        .collect()
}

/// `native` or `gfx<hex>`, optionally with `:feature+` / `:feature-` suffixes
/// such as `gfx90a:xnack+`.
fn is_offload_target(token: &str) -> bool {
    let mut parts = token.split(':');
    let processor = parts.next().unwrap_or_default();
    let processor_ok = processor == ROCM_NATIVE_TARGET
        || processor
            .strip_prefix("gfx")
            .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_hexdigit()));

    processor_ok
        && parts.all(|feature| {
            feature
                .strip_suffix(|c: char| c == '+' || c == '-')
                .is_some_and(|name| {
                    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric())
                })
        })
}

/// Resolves the device targets for one build.
///
/// An override that names at least one target is used as given and the
/// toolchain version is ignored. Without one, CUDA folds
/// [`CUDA_ARCH_POLICY`] up to `version` and rejects toolkits older than
/// [`MIN_CUDA_TOOLKIT`]; ROCm uses the native target. `conversion` only
/// affects ROCm.
pub fn resolve(
    backend: BackendKind,
    version: &ToolchainVersion,
    explicit_override: Option<&str>,
    conversion: ConversionMode,
) -> Result<ArchitectureFlagSet, PlanError> {
    let mut set = ArchitectureFlagSet::default();

    let requested = match explicit_override {
        Some(list) => parse_override(backend, list)?,
        None => Vec::new(),
    };

    if !requested.is_empty() {
        for target in requested {
            let (compute, _) = target.tokens();
            if !set.push_unique(target) {
                warn!("Ignoring duplicate architecture {compute} in override");
            }
        }
    } else {
        match backend {
            BackendKind::Cuda => {
                if *version < MIN_CUDA_TOOLKIT {
                    return Err(PlanError::UnsupportedToolchainVersion {
                        found: *version,
                        minimum: MIN_CUDA_TOOLKIT,
                    });
                }
                for cap in unlocked(CUDA_ARCH_POLICY, version) {
                    set.push_unique(ArchTarget::Gencode(*cap));
                }
            }
            BackendKind::Rocm => {
                set.push_unique(ArchTarget::Offload(ROCM_NATIVE_TARGET.to_string()));
            }
        }
    }

    if backend == BackendKind::Rocm {
        match conversion.define() {
            Some(define) => {
                info!("Using round-to-nearest bf16 conversion");
                set.push_define(define);
            }
            None => info!("Using round-toward-zero bf16 conversion"),
        }
    }

    Ok(set)
}
