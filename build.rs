// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=SERVICE_BAY_VERSION");

    // Packaged builds pin the version explicitly
    let version = std::env::var("SERVICE_BAY_VERSION").unwrap_or_else(|_| {
        match git_short_hash() {
            Some(hash) => format!("{}-{}", env!("CARGO_PKG_VERSION"), hash),
            None => env!("CARGO_PKG_VERSION").to_string(),
        }
    });

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|hash| !hash.is_empty())
}
