//! Binary-level integration tests.
//!
//! Everything that mutates firewall state requires root and is marked with
//! #[ignore]; run those with: `sudo cargo test -- --ignored`

use std::path::PathBuf;
use std::process::{Command, Output};

fn binary_path() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // test binary name
    path.pop(); // deps directory
    path.push("transtunnel");
    path
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn run_transtunnel(args: &[&str]) -> Output {
    Command::new(binary_path())
        .args(args)
        .output()
        .expect("Failed to execute transtunnel")
}

#[test]
fn test_help_lists_the_configuration_surface() {
    let output = run_transtunnel(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--tun-iface",
        "--src-default",
        "--dst-default",
        "--self-proxy",
        "--server",
        "--mark",
        "--flush",
    ] {
        assert!(stdout.contains(flag), "help is missing {flag}");
    }
}

#[test]
fn test_version_flag() {
    let output = run_transtunnel(&["--version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("transtunnel"));
}

#[test]
fn test_unknown_option_uses_clap_status() {
    let output = run_transtunnel(&["--definitely-not-a-flag"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unrecognized_default_token_is_a_validation_error() {
    let output = run_transtunnel(&[
        "-i",
        "tun0",
        "-s",
        "203.0.113.5",
        "--src-default",
        "sideways",
    ]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("src-default"));
}

#[test]
fn test_missing_tun_iface_is_a_validation_error() {
    let output = run_transtunnel(&["-s", "203.0.113.5"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_missing_server_and_mark_is_a_validation_error() {
    let output = run_transtunnel(&["-i", "tun0"]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--server") || stderr.contains("--mark"));
}

#[test]
fn test_install_without_root_fails_the_environment_check() {
    if is_root() {
        eprintln!("Skipping: running as root");
        return;
    }
    let output = run_transtunnel(&["-i", "tun0", "-s", "203.0.113.5"]);
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_flush_without_root_fails_the_environment_check() {
    if is_root() {
        eprintln!("Skipping: running as root");
        return;
    }
    let output = run_transtunnel(&["--flush"]);
    assert_eq!(output.status.code(), Some(4));
}

#[test]
#[ignore] // Requires root and the firewall toolchain
fn test_flush_succeeds_on_a_clean_host() {
    if !is_root() {
        eprintln!("Skipping test_flush_succeeds_on_a_clean_host: requires root");
        return;
    }
    let output = run_transtunnel(&["--flush"]);
    assert!(
        output.status.success(),
        "flush failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // Idempotence: a second flush changes nothing and still succeeds
    let output = run_transtunnel(&["--flush"]);
    assert!(output.status.success());
}

#[test]
#[ignore] // Requires root, the firewall toolchain and a tun0 interface
fn test_install_then_flush_round_trip() {
    if !is_root() {
        eprintln!("Skipping test_install_then_flush_round_trip: requires root");
        return;
    }
    let output = run_transtunnel(&["-i", "tun0", "-s", "203.0.113.5", "-v"]);
    if !output.status.success() {
        // No tun0 on this host; nothing to assert beyond a clean error class
        assert_eq!(output.status.code(), Some(5));
        return;
    }

    let output = run_transtunnel(&["--flush"]);
    assert!(output.status.success());
}
