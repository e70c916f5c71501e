#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::*;

#[test]
fn quick_work_returns_its_result() {
    assert!(bounded(|| true, Duration::from_secs(1)));
    assert!(!bounded(|| false, Duration::from_secs(1)));
}

#[test]
fn slow_work_times_out() {
    let started = std::time::Instant::now();
    let ok = bounded(
        || {
            std::thread::sleep(Duration::from_secs(2));
            true
        },
        Duration::from_millis(100),
    );
    assert!(!ok);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn feasible_pattern_probes_true() {
    assert!(approximation_feasible(
        "^Great offer",
        0,
        ScanMode::Block,
        Duration::from_secs(1),
    ));
}

#[test]
fn infeasible_pattern_probes_false() {
    assert!(!approximation_feasible(
        ".*",
        0,
        ScanMode::Block,
        Duration::from_secs(1),
    ));
}
