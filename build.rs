//! Build script for pull-request-fixer - embeds version information.
//!
//! `BUILD_INFO_HUMAN` is `{CARGO_PKG_VERSION} ({git version}) {rustc
//! version}`. The git version is `git describe --tags --always --dirty`
//! when a tag is reachable, otherwise a pseudo-version
//! `v{CARGO_PKG_VERSION}-{timestamp}-{commit}[+dirty]`.

use std::process::Command;

use chrono::Utc;

fn main() {
    ["src", "build.rs", "Cargo.toml", "Cargo.lock"]
        .iter()
        .for_each(|path| println!("cargo:rerun-if-changed={path}"));

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={}", build_info());
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

fn git_version() -> String {
    match run("git", &["describe", "--tags", "--always", "--dirty"]) {
        Some(desc) if desc.contains('v') || desc.contains("-g") => desc,
        _ => pseudo_version(),
    }
}

fn pseudo_version() -> String {
    let commit = run("git", &["rev-parse", "--short=12", "HEAD"])
        .unwrap_or_else(|| "unknown".to_string());
    // .cargo-ok is written by `cargo install --git` and is not a real change.
    let dirty = run("git", &["status", "--porcelain"])
        .map(|out| out.lines().any(|line| line.get(3..) != Some(".cargo-ok")))
        .unwrap_or(false);

    let timestamp = if dirty {
        None
    } else {
        run("git", &["log", "-1", "--format=%ct"])
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
    }
    .unwrap_or_else(Utc::now)
    .format("%Y%m%d%H%M%S");

    let suffix = if dirty { "+dirty" } else { "" };
    format!(
        "v{}-{timestamp}-{commit}{suffix}",
        env!("CARGO_PKG_VERSION")
    )
}

fn build_info() -> String {
    [
        Some(env!("CARGO_PKG_VERSION").to_string()),
        Some(format!("({})", git_version())),
        run("rustc", &["--version"]),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
}
