//! Build script for prguard: embeds a human-readable version string
//! (`BUILD_INFO_HUMAN`) used by `prguard --version`.
//!
//! The string is `<crate version> (<git version>) <rustc version>`, where
//! the git version is `git describe --tags --always --dirty` when a tag is
//! reachable and `v<crate version>-<commit date>-<short sha>[+dirty]`
//! otherwise. Outside a git checkout the git part is left out.

use std::{env, process::Command};

use chrono::{DateTime, Utc};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn main() {
    for path in ["src", "build.rs", "Cargo.toml", "Cargo.lock"] {
        println!("cargo:rerun-if-changed={path}");
    }

    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let build_info = [
        Some(version.clone()),
        git_version(&version).map(|v| format!("({v})")),
        rustc_version(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={build_info}");
}

fn run(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn rustc_version() -> Option<String> {
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    run(&rustc, &["--version"])
}

/// `None` outside a git checkout. `.cargo-ok`, written by
/// `cargo install --git`, does not count as a change.
fn is_dirty() -> Option<bool> {
    run("git", &["status", "--porcelain"]).map_or_else(
        || run("git", &["rev-parse", "--git-dir"]).map(|_| false),
        |status| {
            Some(
                status
                    .lines()
                    .any(|line| line.get(3..).is_some_and(|path| path != ".cargo-ok")),
            )
        },
    )
}

fn git_version(version: &str) -> Option<String> {
    let describe = run("git", &["describe", "--tags", "--always", "--dirty"])?;
    if describe.starts_with('v') || describe.contains("-g") {
        return Some(describe);
    }

    let commit = run("git", &["rev-parse", "--short=12", "HEAD"])?;
    let dirty = is_dirty().unwrap_or(false);

    // Clean builds use the commit time so the same commit always yields
    // the same version.
    let timestamp = if dirty {
        Utc::now()
    } else {
        run("git", &["log", "-1", "--format=%ct"])
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now)
    };

    let suffix = if dirty { "+dirty" } else { "" };
    Some(format!(
        "v{version}-{}-{commit}{suffix}",
        timestamp.format(TIMESTAMP_FORMAT)
    ))
}
