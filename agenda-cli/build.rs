//! Stamps the binary with the commit it was built from.
//!
//! `AGENDA_BUILD_SHA` from the environment wins (release builds from a
//! tarball); otherwise git is asked, and "unknown" is the last resort.

use std::path::Path;
use std::process::Command;

fn git_short_sha(repo: &Path) -> Option<String> {
    let out = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let sha = String::from_utf8(out.stdout).ok()?.trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

fn main() {
    println!("cargo:rerun-if-env-changed=AGENDA_BUILD_SHA");

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let workspace = Path::new(&manifest_dir).join("..");
    let head = workspace.join(".git").join("HEAD");
    if head.exists() {
        println!("cargo:rerun-if-changed={}", head.display());
    }

    let sha = std::env::var("AGENDA_BUILD_SHA")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| git_short_sha(&workspace))
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=AGENDA_BUILD_SHA={sha}");
}
