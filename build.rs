//! Build script: embeds the git hash and pre-flight checks GPU features.
//!
//! The GPU checks run before whisper-rs-sys compiles, so a missing toolkit
//! fails with an actionable message instead of a wall of cmake errors.

use std::process::Command;

fn main() {
    // Embed git short hash for version string
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if cfg!(feature = "cuda") && Command::new("nvcc").arg("--version").output().is_err() {
        panic!(
            "\n`nvcc` not found: the CUDA toolkit is not installed.\n\
             Install it from https://developer.nvidia.com/cuda-downloads\n\
             or build without CUDA: cargo build --release\n"
        );
    }

    if cfg!(feature = "vulkan")
        && Command::new("vulkaninfo")
            .arg("--summary")
            .output()
            .is_err()
    {
        panic!(
            "\n`vulkaninfo` not found: the Vulkan SDK is not installed.\n\
             Install it from https://vulkan.lunarg.com/\n\
             or build without Vulkan: cargo build --release\n"
        );
    }
}
