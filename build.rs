use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let version = rustc_version(&rustc).unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=EMBED_RELAY_RUSTC_VERSION={version}");
    println!("cargo:rerun-if-env-changed=RUSTC");

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let lockfile = find_lockfile(Path::new(&manifest_dir));
    let reqwest = lockfile
        .as_deref()
        .and_then(|path| locked_version(path, "reqwest"))
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=EMBED_RELAY_REQWEST_VERSION={reqwest}");
    if let Some(path) = lockfile {
        println!("cargo:rerun-if-changed={}", path.display());
    }
    println!("cargo:rerun-if-changed=build.rs");
}

fn rustc_version(rustc: &str) -> Option<String> {
    let output = Command::new(rustc).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }

    // "rustc 1.85.0 (4d91de4e4 2025-02-17)" -> "1.85.0"
    let stdout = String::from_utf8(output.stdout).ok()?;
    stdout.split_whitespace().nth(1).map(str::to_string)
}

fn find_lockfile(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join("Cargo.lock"))
        .find(|candidate| candidate.is_file())
}

/// Version of `package` as resolved in the lockfile.
fn locked_version(lockfile: &Path, package: &str) -> Option<String> {
    let contents = fs::read_to_string(lockfile).ok()?;
    let wanted = format!("name = \"{package}\"");

    let mut lines = contents.lines().map(str::trim);
    while let Some(line) = lines.next() {
        if line != wanted {
            continue;
        }
        for field in lines.by_ref() {
            if field.is_empty() || field == "[[package]]" {
                break;
            }
            if let Some(version) = field.strip_prefix("version = ") {
                return Some(version.trim_matches('"').to_string());
            }
        }
    }
    None
}
