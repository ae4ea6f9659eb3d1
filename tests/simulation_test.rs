use std::process::{Command, Output};

fn run_headless(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_brt_sim"))
        .args(args)
        .env("RUST_LOG", "warn,brt_sim=info")
        .output()
        .expect("Failed to execute simulation")
}

/// Parse the number following `label` in the final log block
fn logged_count(stderr: &str, label: &str) -> u64 {
    let line = stderr
        .lines()
        .find(|line| line.contains(label))
        .unwrap_or_else(|| panic!("Could not find '{}' line", label));

    // Format: "[2026-10-16T17:10:52Z INFO  brt_sim] Total cars spawned: 12"
    let parts: Vec<&str> = line.split(label).collect();
    parts
        .get(1)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_else(|| panic!("Could not parse count from line: {}", line))
}

/// Test that the simulation runs in headless mode without crashing
#[test]
fn test_headless_simulation_runs() {
    let output = run_headless(&["--seconds", "5", "--seed", "1"]);

    assert!(
        output.status.success(),
        "Simulation failed to run in headless mode. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("SIMULATION COMPLETE"),
        "Simulation did not complete properly. stderr: {}",
        stderr
    );
}

/// Test that simulation statistics are logged
#[test]
fn test_simulation_statistics_logged() {
    let output = run_headless(&["--seconds", "5", "--seed", "2"]);
    assert!(output.status.success(), "Simulation failed to run");

    let stderr = String::from_utf8_lossy(&output.stderr);
    for label in [
        "Total cars spawned:",
        "Total cars completed:",
        "Active cars:",
        "Bus laps completed:",
        "Total passengers:",
    ] {
        assert!(stderr.contains(label), "Missing '{}' statistic", label);
    }
}

/// Test that cars are spawned and accounted for
#[test]
fn test_cars_spawn_during_simulation() {
    let output = run_headless(&["--seconds", "20", "--seed", "3", "--density", "high"]);
    assert!(output.status.success(), "Simulation failed to run");

    let stderr = String::from_utf8_lossy(&output.stderr);
    let spawned = logged_count(&stderr, "Total cars spawned:");
    let completed = logged_count(&stderr, "Total cars completed:");
    let active = logged_count(&stderr, "Active cars:");

    assert!(spawned > 0, "No cars were spawned during simulation");
    assert_eq!(spawned, completed + active);
}

/// Test the mixed-traffic layout with the map enabled
#[test]
fn test_mixed_traffic_run_with_map() {
    let output = run_headless(&[
        "--scenario",
        "without-bus-lane",
        "--schedule",
        "10mins",
        "--seconds",
        "10",
        "--seed",
        "4",
        "--map",
    ]);
    assert!(
        output.status.success(),
        "Mixed run failed. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Corridor Map"));
    assert!(stdout.contains("lane 2 |"));
}

/// Test that bad arguments are rejected before anything runs
#[test]
fn test_invalid_arguments_fail() {
    let output = run_headless(&["--scenario", "monorail"]);
    assert!(!output.status.success());

    let output = run_headless(&["--seconds", "1", "--delta", "0"]);
    assert!(!output.status.success());
}
