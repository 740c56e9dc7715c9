//! Integration tests for the per-node lifecycle coordinator.
//!
//! All of these run against the mock hypervisor and mock probe
//! transport under a paused tokio clock, so the 30s settle delay, 10s
//! retry period and 120s deadline elapse in virtual time.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use vnode::probe::{MockTransport, ProbeTransport};
use vnode::request::Outcome;
use vnode::{Coordinator, MockHypervisor, Request, Settings};

const FEDORA_OS_RELEASE: &str = "NAME=\"Fedora Linux\"\nVERSION=\"34 (Cloud Edition)\"\nID=fedora\nPRETTY_NAME=\"Fedora Linux 34 (Cloud Edition)\"\n";

const NODE5_ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 122, 105);

fn settings(dir: &tempfile::TempDir) -> Settings {
    Settings {
        work_dir: dir.path().to_path_buf(),
        boot_dir: dir.path().to_path_buf(),
        ..Settings::default()
    }
}

fn coordinator(
    hypervisor: &Arc<MockHypervisor>,
    transport: &Arc<MockTransport>,
    dir: &tempfile::TempDir,
) -> Coordinator {
    Coordinator::new(
        Arc::clone(hypervisor) as Arc<dyn vnode::Hypervisor>,
        Arc::clone(transport) as Arc<dyn ProbeTransport>,
        settings(dir),
    )
}

fn request(token: &str) -> Request {
    Request::parse(token, "f34", false).unwrap()
}

#[tokio::test(start_paused = true)]
async fn probe_success_before_deadline_is_ready() {
    let dir = tempfile::tempdir().unwrap();
    let hv = Arc::new(MockHypervisor::new());
    let transport = Arc::new(MockTransport::new().with_ready_after(NODE5_ADDR, 2, FEDORA_OS_RELEASE));
    let coordinator = coordinator(&hv, &transport, &dir);

    let started = tokio::time::Instant::now();
    let outcome = coordinator.provision(&request("5")).await;

    assert_eq!(
        outcome,
        Outcome::Ready("Fedora Linux 34 (Cloud Edition)".to_string())
    );
    // Settle delay (30s) plus one failed attempt and retry (10s).
    assert_eq!(started.elapsed(), Duration::from_secs(40));
    // The install's job was done the moment the probe answered.
    assert_eq!(hv.termination_count("vnode05").await, 1);
}

#[tokio::test(start_paused = true)]
async fn probe_success_at_the_deadline_still_wins() {
    let dir = tempfile::tempdir().unwrap();
    let hv = Arc::new(MockHypervisor::new());
    // Attempt 10 lands at 30s settle + 9 retries of 10s: exactly the
    // 120s deadline. Readiness takes the tie over the timeout.
    let transport =
        Arc::new(MockTransport::new().with_ready_after(NODE5_ADDR, 10, FEDORA_OS_RELEASE));
    let coordinator = coordinator(&hv, &transport, &dir);

    let started = tokio::time::Instant::now();
    let outcome = coordinator.provision(&request("5")).await;

    assert_eq!(
        outcome,
        Outcome::Ready("Fedora Linux 34 (Cloud Edition)".to_string())
    );
    assert_eq!(started.elapsed(), Duration::from_secs(120));
    assert_eq!(hv.termination_count("vnode05").await, 1);
}

#[tokio::test(start_paused = true)]
async fn unreachable_node_times_out_and_install_is_killed() {
    let dir = tempfile::tempdir().unwrap();
    let hv = Arc::new(MockHypervisor::new());
    let transport = Arc::new(MockTransport::new());
    let coordinator = coordinator(&hv, &transport, &dir);

    let started = tokio::time::Instant::now();
    let outcome = coordinator.provision(&request("7")).await;

    assert_eq!(outcome, Outcome::TimedOut);
    assert!(started.elapsed() >= Duration::from_secs(120));
    // Killed exactly once, never left running past the deadline.
    assert_eq!(hv.termination_count("vnode07").await, 1);
}

#[tokio::test(start_paused = true)]
async fn existing_domain_without_force_is_already_running() {
    let dir = tempfile::tempdir().unwrap();
    let hv = Arc::new(MockHypervisor::new().with_existing("vnode05"));
    let transport = Arc::new(MockTransport::new());
    let coordinator = coordinator(&hv, &transport, &dir);

    let outcome = coordinator.provision(&request("5")).await;

    assert_eq!(outcome, Outcome::AlreadyRunning);
    assert_eq!(hv.destroy_count("vnode05").await, 0);
    assert_eq!(hv.undefine_count("vnode05").await, 0);
    // Nothing was cloned or launched.
    assert_eq!(hv.clone_count().await, 0);
    assert_eq!(hv.termination_count("vnode05").await, 0);
}

#[tokio::test(start_paused = true)]
async fn force_clears_existing_domain_then_provisions() {
    let dir = tempfile::tempdir().unwrap();
    let hv = Arc::new(MockHypervisor::new().with_existing("vnode05"));
    let transport = Arc::new(MockTransport::new().with_ready_after(NODE5_ADDR, 1, FEDORA_OS_RELEASE));
    let coordinator = coordinator(&hv, &transport, &dir);

    let outcome = coordinator
        .provision(&Request::parse("5", "f34", true).unwrap())
        .await;

    assert!(outcome.is_ready());
    assert_eq!(hv.destroy_count("vnode05").await, 1);
    assert_eq!(hv.undefine_count("vnode05").await, 1);
}

#[tokio::test(start_paused = true)]
async fn clone_failure_is_install_failed() {
    let dir = tempfile::tempdir().unwrap();
    let hv = Arc::new(MockHypervisor::new().with_failing_clone("vnode05"));
    let transport = Arc::new(MockTransport::new());
    let coordinator = coordinator(&hv, &transport, &dir);

    let outcome = coordinator.provision(&request("5")).await;

    match outcome {
        Outcome::InstallFailed(reason) => assert!(reason.contains("qemu-img")),
        other => panic!("expected install failure, got {other:?}"),
    }
    assert_eq!(hv.termination_count("vnode05").await, 0);
}

#[tokio::test(start_paused = true)]
async fn spawn_failure_short_circuits_the_race() {
    let dir = tempfile::tempdir().unwrap();
    let hv = Arc::new(MockHypervisor::new().with_failing_spawn("vnode05"));
    let transport = Arc::new(MockTransport::new());
    let coordinator = coordinator(&hv, &transport, &dir);

    let started = tokio::time::Instant::now();
    let outcome = coordinator.provision(&request("5")).await;

    match outcome {
        Outcome::InstallFailed(reason) => assert!(reason.contains("spawn")),
        other => panic!("expected install failure, got {other:?}"),
    }
    // No race ever started, so no settle delay was waited out.
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn install_crash_loses_the_race_before_the_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let hv = Arc::new(
        MockHypervisor::new().with_crash_after("vnode05", Duration::from_secs(10)),
    );
    let transport = Arc::new(MockTransport::new());
    let coordinator = coordinator(&hv, &transport, &dir);

    let started = tokio::time::Instant::now();
    let outcome = coordinator.provision(&request("5")).await;

    match outcome {
        Outcome::InstallFailed(reason) => assert!(reason.contains("exited early")),
        other => panic!("expected install failure, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn artifacts_land_under_the_work_dir() {
    let dir = tempfile::tempdir().unwrap();
    let hv = Arc::new(MockHypervisor::new());
    let transport = Arc::new(MockTransport::new().with_ready_after(NODE5_ADDR, 1, FEDORA_OS_RELEASE));
    let coordinator = coordinator(&hv, &transport, &dir);

    coordinator.provision(&request("5")).await;

    let network = dir.path().join("configs").join("vnode05-network.yaml");
    let content = tokio::fs::read_to_string(&network).await.unwrap();
    assert!(content.contains("192.168.122.105/24"));
    assert!(content.contains("52:54:00:00:00:05"));
}
