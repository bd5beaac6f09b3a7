//! Per-backend compiler flag profiles.

use crate::arch::ComputeCapability;
use crate::backend::BackendKind;
use crate::version::{unlocked, ToolchainVersion, VersionGate};

/// Set when the framework still ships `ATen/CUDAGeneratorImpl.h` at the top level.
pub const OLD_GENERATOR_DEFINE: &str = "-DOLD_GENERATOR_PATH";

/// Environment variable the framework's extension builder reads its targets from.
pub const FRAMEWORK_ARCH_LIST_VAR: &str = "TORCH_CUDA_ARCH_LIST";

pub struct FlagProfile {
    pub host: &'static [&'static str],
    pub device: &'static [&'static str],
}

pub const CUDA_PROFILE: FlagProfile = FlagProfile {
    host: &["-O3", "-std=c++17"],
    device: &[
        "-O3",
        "-std=c++17",
        "-U__CUDA_NO_HALF_OPERATORS__",
        "-U__CUDA_NO_HALF_CONVERSIONS__",
        "-U__CUDA_NO_HALF2_OPERATORS__",
        "-U__CUDA_NO_BFLOAT16_CONVERSIONS__",
        "--expt-relaxed-constexpr",
        "--expt-extended-lambda",
        "--use_fast_math",
        "--ptxas-options=-v",
        "-lineinfo",
    ],
};

pub const ROCM_PROFILE: FlagProfile = FlagProfile {
    host: &["-O3", "-std=c++20", "-DNDEBUG"],
    device: &[
        "-O3",
        "-std=c++20",
        "-DNDEBUG",
        "-U__CUDA_NO_HALF_OPERATORS__",
        "-U__CUDA_NO_HALF_CONVERSIONS__",
    ],
};

pub fn profile(backend: BackendKind) -> &'static FlagProfile {
    match backend {
        BackendKind::Cuda => &CUDA_PROFILE,
        BackendKind::Rocm => &ROCM_PROFILE,
    }
}

/// nvcc options that only exist from a given release on.
pub const NVCC_VERSION_FLAGS: &[VersionGate<&str>] =
    &[VersionGate::new(ToolchainVersion::new(11, 2), &["--threads", "4"])];

/// Device compiler flags unlocked by `version`. Appended after everything else.
pub fn version_gated_device_flags(backend: BackendKind, version: &ToolchainVersion) -> Vec<String> {
    match backend {
        BackendKind::Cuda => unlocked(NVCC_VERSION_FLAGS, version)
            .map(|flag| flag.to_string())
            .collect(),
        BackendKind::Rocm => Vec::new(),
    }
}

const PRE_AMPERE: &[ComputeCapability] = &[
    ComputeCapability::new(6, 0),
    ComputeCapability::new(6, 1),
    ComputeCapability::new(6, 2),
    ComputeCapability::new(7, 0),
    ComputeCapability::new(7, 5),
];
const SM80: &[ComputeCapability] = &[ComputeCapability::new(8, 0)];
const SM86: &[ComputeCapability] = &[ComputeCapability::new(8, 6)];
const SM90: &[ComputeCapability] = &[ComputeCapability::new(9, 0)];

/// Framework-wide targets exported when no GPU is visible, so its own
/// extension builder cross-compiles instead of querying a device.
pub const CROSS_COMPILE_ARCHS: &[VersionGate<ComputeCapability>] = &[
    VersionGate::new(ToolchainVersion::new(0, 0), PRE_AMPERE),
    VersionGate::new(ToolchainVersion::new(11, 0), SM80),
    VersionGate::new(ToolchainVersion::new(11, 1), SM86),
    VersionGate::new(ToolchainVersion::new(11, 8), SM90),
];

/// `6.0;6.1;...` list for [`FRAMEWORK_ARCH_LIST_VAR`].
pub fn cross_compile_arch_list(version: &ToolchainVersion) -> String {
    unlocked(CROSS_COMPILE_ARCHS, version)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";")
}
