//! CLI smoke tests. Every path here exits before the server starts, so no
//! ports or database files are touched.

mod common;

use common::crmd_bin;

#[test]
fn version_flag_prints_the_package_version() {
    let output = crmd_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("crmd {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn short_version_flag_matches_the_long_one() {
    let long = crmd_bin().arg("--version").output().unwrap();
    let short = crmd_bin().arg("-V").output().unwrap();
    assert_eq!(long.stdout, short.stdout);
}

#[test]
fn help_flag_lists_the_options() {
    let output = crmd_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage: crmd"));
    assert!(stdout.contains("--config"));
    assert!(stdout.contains("--version"));
}

#[test]
fn unknown_argument_fails_with_a_hint() {
    let output = crmd_bin().arg("--frobnicate").output().unwrap();
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown argument"));
    assert!(stderr.contains("--help"));
}

#[test]
fn config_flag_without_a_path_fails() {
    let output = crmd_bin().arg("--config").output().unwrap();
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("requires a path"));
}
