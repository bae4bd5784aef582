// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=CAMERA_SESSION_VERSION");

    // Packagers can pin the version without a git checkout
    let version = match std::env::var("CAMERA_SESSION_VERSION") {
        Ok(v) if !v.is_empty() => v,
        _ => describe_version(),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Build a version string from `git describe`
///
/// - exact tag `v0.2.0` becomes `0.2.0-<hash>`
/// - `v0.2.0-3-gabc1234` (commits after a tag) becomes `0.2.0-dirty-abc1234`
/// - no tags at all falls back to the crate version plus hash
fn describe_version() -> String {
    let hash = git(&["rev-parse", "--short", "HEAD"]);

    let Some(described) = git(&["describe", "--tags", "--match", "v*"]) else {
        let pkg = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
        return match hash {
            Some(hash) => format!("{}-{}", pkg, hash),
            None => pkg,
        };
    };

    let described = described.strip_prefix('v').unwrap_or(&described).to_string();

    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    if parts.len() == 3 {
        let short = parts[0].strip_prefix('g').unwrap_or(parts[0]);
        return format!("{}-dirty-{}", parts[2], short);
    }

    match hash {
        Some(hash) => format!("{}-{}", described, hash),
        None => described,
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}
