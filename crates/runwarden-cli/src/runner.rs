// `runwarden run`: stream a program's output to a writer

use std::io::Write;

use runwarden_config::RunnerConfig;
use runwarden_process::ProcessManager;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CliResult;

/// Run `argv` under `config`, writing each line to `out` as it arrives
pub async fn run_program<W: Write>(
    config: &RunnerConfig,
    argv: Vec<String>,
    cancel: CancellationToken,
    out: &mut W,
) -> CliResult<usize> {
    let process_config = config.process_config(argv)?;
    let manager = ProcessManager::new();
    let mut count = 0;

    match config.budget() {
        Some(budget) => {
            debug!(budget_ms = %budget.limit().as_millis(), "Running with overall budget");
            let mut lines = budget.run(&manager, process_config, cancel).await?;
            while let Some(line) = lines.next_line().await? {
                if let Err(e) = emit(out, &line) {
                    lines.close().await;
                    return Err(e.into());
                }
                count += 1;
            }
        }
        None => {
            let mut lines = manager.run(process_config, cancel).await?;
            while let Some(line) = lines.next_line().await? {
                if let Err(e) = emit(out, &line) {
                    lines.close().await;
                    return Err(e.into());
                }
                count += 1;
            }
        }
    }

    info!(lines = count, "Program finished");
    Ok(count)
}

fn emit<W: Write>(out: &mut W, line: &str) -> std::io::Result<()> {
    writeln!(out, "{}", line)?;
    out.flush()
}
