//! Build script: embeds the release or git-described version.

use std::process::Command;

fn main() {
    // Release builds pin the version through REALITYMARBLE_VERSION; local
    // builds describe the checkout instead.
    if let Ok(version) = std::env::var("REALITYMARBLE_VERSION") {
        println!("cargo:rustc-env=REALITYMARBLE_VERSION={version}");
    } else if let Ok(output) = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        && output.status.success()
    {
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=REALITYMARBLE_VERSION={version}");
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
    println!("cargo:rerun-if-env-changed=REALITYMARBLE_VERSION");
}
