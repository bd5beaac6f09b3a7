use flashplan::{
    plan_build, ArchTarget, BackendKind, BackendSignals, BuildEnvironment, CommandOutput,
    CommandRunner, CompilerRole, ComputeCapability, ConversionMode, PlanError, SourceCatalog,
    SourceInventory, StagedCopy, ToolchainVersion,
};
use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};

/// Answers every program with a fixed banner and records what was run.
struct FakeToolchain {
    banner: Option<&'static str>,
    runs: RefCell<Vec<PathBuf>>,
}

impl FakeToolchain {
    fn reporting(banner: &'static str) -> Self {
        Self {
            banner: Some(banner),
            runs: RefCell::new(Vec::new()),
        }
    }

    fn missing() -> Self {
        Self {
            banner: None,
            runs: RefCell::new(Vec::new()),
        }
    }
}

impl CommandRunner for FakeToolchain {
    fn run(&self, program: &Path, _args: &[&str]) -> io::Result<CommandOutput> {
        self.runs.borrow_mut().push(program.to_path_buf());
        match self.banner {
            Some(banner) => Ok(CommandOutput {
                success: true,
                stdout: banner.to_string(),
            }),
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }
}

struct FixedCatalog;

impl SourceCatalog for FixedCatalog {
    fn inventory(&self, backend: BackendKind) -> SourceInventory {
        match backend {
            BackendKind::Cuda => SourceInventory {
                sources: vec![
                    PathBuf::from("/src/csrc/flash_attn/flash_api.cpp"),
                    PathBuf::from("/src/csrc/flash_attn/src/flash_fwd_hdim128_fp16_sm80.cu"),
                ],
                staged_copies: Vec::new(),
            },
            BackendKind::Rocm => SourceInventory {
                sources: vec![PathBuf::from("/src/csrc/flash_attn_rocm/flash_api.cu")],
                staged_copies: vec![StagedCopy {
                    from: PathBuf::from("/src/csrc/flash_attn_rocm/flash_api.cpp"),
                    to: PathBuf::from("/src/csrc/flash_attn_rocm/flash_api.cu"),
                }],
            },
        }
    }

    fn include_roots(&self, backend: BackendKind) -> Vec<PathBuf> {
        match backend {
            BackendKind::Cuda => vec![PathBuf::from("/src/csrc/flash_attn")],
            BackendKind::Rocm => vec![PathBuf::from("/src/csrc/flash_attn_rocm")],
        }
    }
}

fn nvcc(release: &str) -> &'static str {
    match release {
        "10.2" => "Cuda compilation tools, release 10.2, V10.2.89\n",
        "11.0" => "Cuda compilation tools, release 11.0, V11.0.221\n",
        "11.8" => "Cuda compilation tools, release 11.8, V11.8.89\n",
        other => panic!("no banner for {other}"),
    }
}

fn cuda_env(framework: &str) -> BuildEnvironment {
    BuildEnvironment {
        signals: BackendSignals {
            cuda_root: Some(PathBuf::from("/usr/local/cuda")),
            gpu_visible: true,
            ..BackendSignals::default()
        },
        framework_cuda_version: Some(framework.parse().unwrap()),
        extension_name: "flash_attn_2_cuda".to_string(),
        ..BuildEnvironment::default()
    }
}

fn sm(major: u32, minor: u32) -> ArchTarget {
    ArchTarget::Gencode(ComputeCapability::new(major, minor))
}

#[test]
fn cuda_11_0_targets_ampere_only() {
    let runner = FakeToolchain::reporting(nvcc("11.0"));
    let plan = plan_build(&cuda_env("11.0"), &runner, &FixedCatalog).expect("plan");

    assert_eq!(plan.backend(), BackendKind::Cuda);
    assert!(plan.architectures().contains(&sm(8, 0)));
    assert!(!plan.architectures().contains(&sm(9, 0)));
    assert!(!plan
        .compiler_args(CompilerRole::Device)
        .contains(&"--threads".to_string()));
    assert_eq!(*runner.runs.borrow(), vec![PathBuf::from("/usr/local/cuda/bin/nvcc")]);
}

#[test]
fn cuda_11_8_targets_ampere_and_hopper() {
    let runner = FakeToolchain::reporting(nvcc("11.8"));
    let plan = plan_build(&cuda_env("11.8"), &runner, &FixedCatalog).expect("plan");

    assert_eq!(plan.architectures().targets(), &[sm(8, 0), sm(9, 0)]);
    assert_eq!(plan.toolchain_version().to_string(), "11.8");
    let device = plan.compiler_args(CompilerRole::Device);
    assert_eq!(&device[device.len() - 2..], &["--threads", "4"]);
    assert!(plan.env_exports().is_empty());
    assert_eq!(plan.extension_name(), "flash_attn_2_cuda");
    assert_eq!(plan.include_dirs(), &[PathBuf::from("/src/csrc/flash_attn")]);
}

#[test]
fn mismatched_framework_release_is_fatal() {
    let runner = FakeToolchain::reporting(nvcc("10.2"));
    let err = plan_build(&cuda_env("11.0"), &runner, &FixedCatalog).unwrap_err();
    assert_eq!(
        err,
        PlanError::VersionMismatch {
            toolchain: "10.2".parse().unwrap(),
            framework: "11.0".parse().unwrap(),
        }
    );
    assert_eq!(err.to_string().matches("10.2").count(), 1);
}

#[test]
fn bypassed_mismatch_still_enforces_minimum() {
    let runner = FakeToolchain::reporting(nvcc("10.2"));
    let env = BuildEnvironment {
        allow_version_mismatch: true,
        ..cuda_env("11.0")
    };
    assert_eq!(
        plan_build(&env, &runner, &FixedCatalog).unwrap_err(),
        PlanError::UnsupportedToolchainVersion {
            found: ToolchainVersion::new(10, 2),
            minimum: ToolchainVersion::new(11, 0),
        }
    );
}

#[test]
fn bypassed_mismatch_produces_plan() {
    let runner = FakeToolchain::reporting(nvcc("11.8"));
    let env = BuildEnvironment {
        allow_version_mismatch: true,
        ..cuda_env("11.7")
    };
    let plan = plan_build(&env, &runner, &FixedCatalog).expect("plan");
    assert_eq!(plan.toolchain_version(), &ToolchainVersion::new(11, 8));
}

#[test]
fn unknown_framework_release_needs_bypass() {
    let runner = FakeToolchain::reporting(nvcc("11.8"));
    let mut env = cuda_env("11.8");
    env.framework_cuda_version = None;
    assert_eq!(
        plan_build(&env, &runner, &FixedCatalog).unwrap_err(),
        PlanError::FrameworkVersionUnknown
    );

    env.allow_version_mismatch = true;
    assert!(plan_build(&env, &runner, &FixedCatalog).is_ok());
}

#[test]
fn missing_cuda_root_fails_before_probing() {
    let runner = FakeToolchain::reporting(nvcc("11.8"));
    let mut env = cuda_env("11.8");
    env.signals.cuda_root = None;
    assert_eq!(
        plan_build(&env, &runner, &FixedCatalog).unwrap_err(),
        PlanError::ToolchainNotFound {
            backend: BackendKind::Cuda,
            path: None,
        }
    );
    assert!(runner.runs.borrow().is_empty());
}

#[test]
fn missing_nvcc_is_not_found() {
    let runner = FakeToolchain::missing();
    assert!(matches!(
        plan_build(&cuda_env("11.8"), &runner, &FixedCatalog),
        Err(PlanError::ToolchainNotFound { path: Some(_), .. })
    ));
}

#[test]
fn explicit_override_wins() {
    let runner = FakeToolchain::reporting(nvcc("11.8"));
    let env = BuildEnvironment {
        arch_override: Some("8.6".to_string()),
        ..cuda_env("11.8")
    };
    let plan = plan_build(&env, &runner, &FixedCatalog).expect("plan");
    assert_eq!(plan.architectures().targets(), &[sm(8, 6)]);
}

#[test]
fn no_visible_gpu_exports_cross_compile_list() {
    let runner = FakeToolchain::reporting(nvcc("11.8"));
    let mut env = cuda_env("11.8");
    env.signals.gpu_visible = false;

    let plan = plan_build(&env, &runner, &FixedCatalog).expect("plan");
    assert_eq!(
        plan.env_exports().get("TORCH_CUDA_ARCH_LIST").map(String::as_str),
        Some("6.0;6.1;6.2;7.0;7.5;8.0;8.6;9.0")
    );

    env.arch_override = Some(" ".to_string());
    let plan = plan_build(&env, &runner, &FixedCatalog).expect("plan");
    assert!(plan.env_exports().contains_key("TORCH_CUDA_ARCH_LIST"));

    env.arch_override = Some("8.0".to_string());
    let plan = plan_build(&env, &runner, &FixedCatalog).expect("plan");
    assert!(plan.env_exports().is_empty());

    env.arch_override = None;
    env.framework_arch_list = Some("8.0".to_string());
    let plan = plan_build(&env, &runner, &FixedCatalog).expect("plan");
    assert!(plan.env_exports().is_empty());
}

#[test]
fn rocm_root_selects_rocm_plan() {
    let runner = FakeToolchain::reporting("HIP version: 5.7.31921-d1770ee1b\n");
    let env = BuildEnvironment {
        signals: BackendSignals {
            rocm_root: Some(PathBuf::from("/opt/rocm")),
            ..BackendSignals::default()
        },
        conversion: ConversionMode::RoundToNearest,
        extension_name: "flash_attn_2_cuda".to_string(),
        ..BuildEnvironment::default()
    };

    let plan = plan_build(&env, &runner, &FixedCatalog).expect("plan");
    assert_eq!(plan.backend(), BackendKind::Rocm);
    assert_eq!(
        plan.architectures().targets(),
        &[ArchTarget::Offload("native".to_string())]
    );
    assert!(plan
        .compiler_args(CompilerRole::Device)
        .contains(&"-DUSE_RTN_BF16_CONVERT".to_string()));
    assert_eq!(plan.staged_copies().len(), 1);
    assert!(plan.env_exports().is_empty(), "no cross-compile export for ROCm");
    assert_eq!(*runner.runs.borrow(), vec![PathBuf::from("/opt/rocm/bin/hipcc")]);
}

#[test]
fn plan_serializes_for_the_driver() {
    let runner = FakeToolchain::reporting(nvcc("11.8"));
    let plan = plan_build(&cuda_env("11.8"), &runner, &FixedCatalog).expect("plan");
    let json = serde_json::to_value(&plan).expect("json");
    assert_eq!(json["backend"], "cuda");
    assert_eq!(json["sources"].as_array().map(Vec::len), Some(2));
    assert_eq!(
        json["compiler_args"]["host-compiler"],
        serde_json::json!(["-O3", "-std=c++17"])
    );
}
