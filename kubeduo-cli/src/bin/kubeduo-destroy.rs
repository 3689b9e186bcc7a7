//! Thin wrapper binary that delegates to `kubeduo destroy`
//!
//! Lets `kubeduo-destroy` be used as a standalone teardown entry point.

use std::env;
use std::process::{Command, exit};

fn main() {
    let current_exe = env::current_exe().unwrap_or_else(|e| {
        eprintln!("Failed to determine current executable path: {e}");
        exit(1);
    });
    let kubeduo = current_exe.with_file_name(format!("kubeduo{}", env::consts::EXE_SUFFIX));

    let status = Command::new(&kubeduo)
        .arg("destroy")
        .args(env::args().skip(1))
        .status()
        .unwrap_or_else(|e| {
            eprintln!("Failed to execute kubeduo: {e}");
            eprintln!("Expected at: {}", kubeduo.display());
            exit(1);
        });

    exit(status.code().unwrap_or(1));
}
