//! Build script to embed the git revision in the startup log

use std::process::Command;

fn main() {
    // Short hash, suffixed with -dirty when the worktree has local changes
    let output = Command::new("git").args(["describe", "--always", "--dirty"]).output();

    let git_hash = match output {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => String::from("unknown"),
    };

    println!("cargo:rustc-env=GIT_HASH={git_hash}");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
