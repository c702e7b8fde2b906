//! No process outlives its run, whichever way the run ends

#![cfg(unix)]

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use runwarden_process::{ProcessConfig, ProcessManager, RunBudget};
use tokio_util::sync::CancellationToken;

/// Dead, or a zombie left for init to reap
fn is_gone(pid: u32) -> bool {
    if matches!(kill(Pid::from_raw(pid as i32), None), Err(Errno::ESRCH)) {
        return true;
    }
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            let fields = stat.rsplit_once(')')?.1;
            fields.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}

async fn wait_gone(pids: &[u32]) -> bool {
    for _ in 0..60 {
        if pids.iter().all(|pid| is_gone(*pid)) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Starts a shell with two background sleepers; reports their pids first
fn family() -> ProcessConfig {
    ProcessConfig::new("sh")
        .args(["-c", "sleep 30 & echo $!; sleep 30 & echo $!; echo ready; wait"])
        .read_timeout(Duration::from_secs(5))
        .grace_period(Duration::from_millis(500))
}

async fn start_family(
    manager: &ProcessManager,
    cancel: CancellationToken,
) -> (runwarden_process::LineStream, Vec<u32>) {
    let mut lines = manager.run(family(), cancel).await.unwrap();
    let mut pids = vec![lines.pid()];
    for _ in 0..2 {
        let pid = lines.next_line().await.unwrap().unwrap();
        pids.push(pid.parse().unwrap());
    }
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ready"));
    (lines, pids)
}

#[tokio::test]
async fn test_cancel_leaves_no_descendants() {
    let manager = ProcessManager::new();
    let cancel = CancellationToken::new();
    let (mut lines, pids) = start_family(&manager, cancel.clone()).await;

    cancel.cancel();
    assert!(lines.next_line().await.unwrap_err().is_cancelled());
    assert!(wait_gone(&pids).await);
}

#[tokio::test]
async fn test_read_timeout_leaves_no_descendants() {
    let manager = ProcessManager::new();
    let mut lines = manager
        .run(
            family().read_timeout(Duration::from_millis(300)),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let mut pids = vec![lines.pid()];
    for _ in 0..2 {
        pids.push(lines.next_line().await.unwrap().unwrap().parse().unwrap());
    }
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ready"));

    assert!(lines.next_line().await.is_err());
    assert!(wait_gone(&pids).await);
}

#[tokio::test]
async fn test_close_leaves_no_descendants() {
    let manager = ProcessManager::new();
    let (lines, pids) = start_family(&manager, CancellationToken::new()).await;

    lines.close().await;
    assert!(wait_gone(&pids).await);
    assert!(!manager.is_active());
}

#[tokio::test]
async fn test_drop_leaves_no_descendants() {
    let manager = ProcessManager::new();
    let (lines, pids) = start_family(&manager, CancellationToken::new()).await;

    drop(lines);
    assert!(wait_gone(&pids).await);
}

#[tokio::test]
async fn test_budget_leaves_no_descendants() {
    let manager = ProcessManager::new();
    let mut lines = RunBudget::from_millis(500)
        .run(&manager, family(), CancellationToken::new())
        .await
        .unwrap();
    let mut pids = vec![lines.pid()];
    for _ in 0..2 {
        pids.push(lines.next_line().await.unwrap().unwrap().parse().unwrap());
    }

    loop {
        match lines.next_line().await {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("family should not finish on its own"),
            Err(err) => {
                assert!(err.is_exceeded());
                break;
            }
        }
    }
    assert!(wait_gone(&pids).await);
}

#[tokio::test]
async fn test_leader_exit_sweeps_background_children() {
    // The leader exits at once; its background child keeps the pipe open
    // until the group sweep after the read deadline.
    let manager = ProcessManager::new();
    let config = ProcessConfig::new("sh")
        .args(["-c", "sleep 30 & echo $!"])
        .read_timeout(Duration::from_millis(300))
        .grace_period(Duration::from_millis(300));

    let mut lines = manager.run(config, CancellationToken::new()).await.unwrap();
    let orphan: u32 = lines.next_line().await.unwrap().unwrap().parse().unwrap();

    assert!(lines.next_line().await.is_err());
    assert!(wait_gone(&[orphan]).await);
}

#[tokio::test]
async fn test_clean_exit_sweeps_detached_children() {
    // The background child drops the pipe, so output ends with the leader.
    let manager = ProcessManager::new();
    let config = ProcessConfig::new("sh").args(["-c", "sleep 30 >/dev/null 2>&1 & echo $!"]);

    let lines = manager
        .run(config, CancellationToken::new())
        .await
        .unwrap()
        .collect_lines()
        .await
        .unwrap();
    assert_eq!(lines.len(), 1);

    let orphan: u32 = lines[0].parse().unwrap();
    assert!(wait_gone(&[orphan]).await);
    assert!(!manager.is_active());
}

#[tokio::test]
async fn test_failed_exit_sweeps_detached_children() {
    let manager = ProcessManager::new();
    let config =
        ProcessConfig::new("sh").args(["-c", "sleep 30 >/dev/null 2>&1 & echo $!; exit 3"]);

    let mut lines = manager.run(config, CancellationToken::new()).await.unwrap();
    let orphan: u32 = lines.next_line().await.unwrap().unwrap().parse().unwrap();

    let err = lines.next_line().await.unwrap_err();
    assert_eq!(err.return_code(), Some(3));
    assert!(wait_gone(&[orphan]).await);
}
