//! Source layout of the FlashAttention-2 tree.

use eyre::{Result, WrapErr};
use flashplan::{BackendKind, SourceCatalog, SourceInventory, StagedCopy};
use std::fs;
use std::path::{Path, PathBuf};

const CUDA_API_SOURCE: &str = "csrc/flash_attn/flash_api.cpp";
const CUDA_KERNEL_DIR: &str = "csrc/flash_attn/src";
const KERNEL_PASSES: [&str; 2] = ["fwd", "bwd"];
const HEAD_DIMS: [u32; 8] = [32, 64, 96, 128, 160, 192, 224, 256];
const DTYPES: [&str; 2] = ["fp16", "bf16"];

const CUDA_INCLUDE_DIRS: &[&str] = &[
    "csrc/flash_attn",
    "csrc/flash_attn/src",
    "csrc/cutlass/include",
];

const ROCM_API_SOURCE: &str = "csrc/flash_attn_rocm/flash_api.cpp";
const ROCM_KERNEL_DIR: &str = "csrc/flash_attn_rocm/src";
const CK_UTILITY_SOURCES: [&str; 3] = [
    "csrc/flash_attn_rocm/composable_kernel/library/src/utility/convolution_parameter.cpp",
    "csrc/flash_attn_rocm/composable_kernel/library/src/utility/device_memory.cpp",
    "csrc/flash_attn_rocm/composable_kernel/library/src/utility/host_tensor.cpp",
];

const ROCM_INCLUDE_DIRS: &[&str] = &[
    "csrc/flash_attn_rocm",
    "csrc/flash_attn_rocm/src",
    "csrc/flash_attn_rocm/composable_kernel/include",
    "csrc/flash_attn_rocm/composable_kernel/include/ck",
    "csrc/flash_attn_rocm/composable_kernel/include/ck/tensor_operation/gpu/device",
    "csrc/flash_attn_rocm/composable_kernel/include/ck/tensor_operation/gpu/device/impl",
    "csrc/flash_attn_rocm/composable_kernel/include/ck/tensor_operation/gpu/element",
    "csrc/flash_attn_rocm/composable_kernel/include/ck/library/utility",
    "csrc/flash_attn_rocm/composable_kernel/library/include/ck/library/utility",
    "csrc/flash_attn_rocm/composable_kernel/library/include",
    "csrc/flash_attn_rocm/composable_kernel/include/ck/utility/library",
    "csrc/flash_attn_rocm/composable_kernel/include/ck/library/reference_tensor_operation",
    "csrc/flash_attn_rocm/composable_kernel/include/ck/tensor_operation/reference_tensor_operation",
];

/// The fixed CUDA kernel list plus whatever ROCm kernels the tree ships.
#[derive(Clone, Debug)]
pub struct FlashAttnCatalog {
    root: PathBuf,
    rocm_kernels: Vec<PathBuf>,
}

impl FlashAttnCatalog {
    /// Scans the ROCm kernel directory once. A tree without it is fine:
    /// the ROCm inventory then only has the API and utility sources.
    pub fn discover(root: &Path) -> Result<Self> {
        let dir = root.join(ROCM_KERNEL_DIR);
        let mut rocm_kernels = Vec::new();
        if dir.is_dir() {
            let entries =
                fs::read_dir(&dir).wrap_err_with(|| format!("reading {}", dir.display()))?;
            for entry in entries {
                let path = entry?.path();
                if matches!(extension(&path), Some("cpp" | "cu")) {
                    rocm_kernels.push(path);
                }
            }
            rocm_kernels.sort();
        }
        Ok(Self {
            root: root.to_path_buf(),
            rocm_kernels,
        })
    }

    fn cuda_inventory(&self) -> SourceInventory {
        let kernels = KERNEL_PASSES.iter().flat_map(|pass| {
            HEAD_DIMS.iter().flat_map(move |hdim| {
                DTYPES
                    .iter()
                    .map(move |dtype| format!("flash_{pass}_hdim{hdim}_{dtype}_sm80.cu"))
            })
        });

        let mut sources = vec![self.root.join(CUDA_API_SOURCE)];
        sources.extend(kernels.map(|name| self.root.join(CUDA_KERNEL_DIR).join(name)));
        SourceInventory {
            sources,
            staged_copies: Vec::new(),
        }
    }

    /// hipcc only compiles `.cu`, so every `.cpp` is staged next to itself.
    fn rocm_inventory(&self) -> SourceInventory {
        let candidates = std::iter::once(self.root.join(ROCM_API_SOURCE))
            .chain(self.rocm_kernels.iter().cloned())
            .chain(CK_UTILITY_SOURCES.iter().map(|rel| self.root.join(rel)));

        let mut inventory = SourceInventory::default();
        for path in candidates {
            let target = path.with_extension("cu");
            if extension(&path) == Some("cpp") {
                inventory.staged_copies.push(StagedCopy {
                    from: path,
                    to: target.clone(),
                });
            }
            if !inventory.sources.contains(&target) {
                inventory.sources.push(target);
            }
        }
        inventory
    }
}

impl SourceCatalog for FlashAttnCatalog {
    fn inventory(&self, backend: BackendKind) -> SourceInventory {
        match backend {
            BackendKind::Cuda => self.cuda_inventory(),
            BackendKind::Rocm => self.rocm_inventory(),
        }
    }

    fn include_roots(&self, backend: BackendKind) -> Vec<PathBuf> {
        let dirs = match backend {
            BackendKind::Cuda => CUDA_INCLUDE_DIRS,
            BackendKind::Rocm => ROCM_INCLUDE_DIRS,
        };
        dirs.iter().map(|rel| self.root.join(rel)).collect()
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}
