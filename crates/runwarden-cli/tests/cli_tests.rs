//! `runwarden run` behaviour through the library entry points

#![cfg(unix)]

use clap::Parser;
use runwarden_cli::{error::EXIT_TIMEOUT, runner::run_program, Cli, Commands};
use runwarden_config::RunnerConfig;
use tokio_util::sync::CancellationToken;

fn argv(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn parse_run(args: &[&str]) -> (RunnerConfig, Vec<String>) {
    let cli = Cli::try_parse_from(args).unwrap();
    let Commands::Run(run) = cli.command else {
        panic!("expected run");
    };
    let mut config = RunnerConfig::default();
    run.apply(&mut config);
    (config, run.argv)
}

#[tokio::test]
async fn test_lines_are_written_in_order() {
    let (config, program) = parse_run(&["runwarden", "run", "--", "printf", "a\\nb\\nc\\n"]);
    let mut out = Vec::new();

    let count = run_program(&config, program, CancellationToken::new(), &mut out)
        .await
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(String::from_utf8(out).unwrap(), "a\nb\nc\n");
}

#[tokio::test]
async fn test_child_exit_code_is_passed_through() {
    let (config, program) = parse_run(&["runwarden", "run", "--", "sh", "-c", "exit 7"]);
    let mut out = Vec::new();

    let err = run_program(&config, program, CancellationToken::new(), &mut out)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 7);
}

#[tokio::test]
async fn test_read_timeout_exit_code() {
    let (config, program) = parse_run(&[
        "runwarden",
        "run",
        "--read-timeout-ms",
        "100",
        "--",
        "sleep",
        "5",
    ]);
    let mut out = Vec::new();

    let err = run_program(&config, program, CancellationToken::new(), &mut out)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), EXIT_TIMEOUT);
}

#[tokio::test]
async fn test_overall_budget_exit_code() {
    let (config, program) = parse_run(&[
        "runwarden",
        "run",
        "--overall-timeout-ms",
        "300",
        "--",
        "sh",
        "-c",
        "while true; do echo tick; sleep 0.05; done",
    ]);
    let mut out = Vec::new();

    let err = run_program(&config, program, CancellationToken::new(), &mut out)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), EXIT_TIMEOUT);
    assert!(String::from_utf8(out).unwrap().starts_with("tick\n"));
}

#[tokio::test]
async fn test_missing_program_exit_code() {
    let config = RunnerConfig::default();
    let mut out = Vec::new();

    let err = run_program(
        &config,
        argv(&["/nonexistent/runwarden-cli-missing"]),
        CancellationToken::new(),
        &mut out,
    )
    .await
    .unwrap_err();
    assert_eq!(err.exit_code(), 127);
    assert!(err.user_message().contains("Check the program name"));
}

#[tokio::test]
async fn test_signal_exit_code() {
    let config = RunnerConfig::default();
    let mut out = Vec::new();

    let err = run_program(
        &config,
        argv(&["sh", "-c", "kill -KILL $$"]),
        CancellationToken::new(),
        &mut out,
    )
    .await
    .unwrap_err();
    assert_eq!(err.exit_code(), 128 + 9);
}

#[tokio::test]
async fn test_cancelled_exit_code() {
    let config = RunnerConfig::default();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let mut out = Vec::new();
    let err = run_program(&config, argv(&["sleep", "30"]), cancel, &mut out)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 130);
}

#[tokio::test]
async fn test_separate_stderr_reaches_error_message() {
    let (config, program) = parse_run(&[
        "runwarden",
        "run",
        "--separate-stderr",
        "--",
        "sh",
        "-c",
        "echo out; echo 'no such report' >&2; exit 1",
    ]);
    let mut out = Vec::new();

    let err = run_program(&config, program, CancellationToken::new(), &mut out)
        .await
        .unwrap_err();
    assert_eq!(String::from_utf8(out).unwrap(), "out\n");
    assert!(err.user_message().contains("Error output: no such report"));
}

#[tokio::test]
async fn test_working_directory_flag() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "present\n").unwrap();
    let cwd = dir.path().to_string_lossy().to_string();

    let (config, program) = parse_run(&["runwarden", "run", "--cwd", &cwd, "--", "cat", "marker.txt"]);
    let mut out = Vec::new();

    run_program(&config, program, CancellationToken::new(), &mut out)
        .await
        .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "present\n");
}
