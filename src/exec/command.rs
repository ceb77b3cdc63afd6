// src/exec/command.rs

//! Command executor: one shell process per unit.
//!
//! The unit is written as JSON to the child's stdin and described again in
//! its environment. On exit 0 the last non-empty stdout line is the unit's
//! result: a JSON object in the ledger's record format, where `issue` may be
//! omitted and is filled in from the unit.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::{BatchError, Result};
use crate::exec::backend::{ExecContext, ExecFuture, UnitExecutor};
use crate::exec::process::{isolate_process_group, terminate_child, ProcessGroupGuard};
use crate::unit::{UnitId, UnitResult, WorkUnit};

/// How long a child gets between SIGTERM and SIGKILL.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Production [`UnitExecutor`] running `ExecParams::cmd` through the shell.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    terminate_grace: Duration,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self {
            terminate_grace: DEFAULT_TERMINATE_GRACE,
        }
    }

    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }
}

impl UnitExecutor for CommandExecutor {
    fn execute(&self, unit: WorkUnit, ctx: ExecContext) -> ExecFuture {
        Box::pin(run_unit_command(unit, ctx, self.terminate_grace))
    }
}

fn execution_error(unit: UnitId, message: impl Into<String>) -> BatchError {
    BatchError::ExecutionError {
        unit,
        message: message.into(),
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(script: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    }
}

fn apply_environment(cmd: &mut Command, unit: &WorkUnit, ctx: &ExecContext) -> Result<()> {
    let params = &ctx.params;

    cmd.env("ISSUE_NUMBER", unit.number.to_string())
        .env("ISSUE_TYPE", params.issue_type.as_str())
        .env("MAX_ITERATIONS", params.max_iterations.to_string())
        .env("OUTPUT_DIR", &params.output_dir)
        .env("LOG_DIR", &params.log_dir);

    if let Some(branch) = &unit.head_branch {
        cmd.env("HEAD_BRANCH", branch);
    }
    if let Some(commit) = &ctx.base_commit {
        cmd.env("BASE_COMMIT", commit);
    }
    if let Some(image) = &params.container_image {
        cmd.env("CONTAINER_IMAGE", image);
    }
    if let Some(model) = &params.llm_model {
        cmd.env("LLM_MODEL", model);
    }
    if let Some(instruction) = &params.repo_instruction {
        cmd.env("REPO_INSTRUCTION", instruction);
    }
    if !params.extra.is_empty() {
        cmd.env("RUN_PARAMS", serde_json::to_string(&params.extra)?);
    }
    Ok(())
}

async fn run_unit_command(
    unit: WorkUnit,
    ctx: ExecContext,
    terminate_grace: Duration,
) -> Result<UnitResult> {
    let id = unit.number;
    info!(unit = id, cmd = %ctx.params.cmd, "starting executor process");

    let mut cmd = shell_command(&ctx.params.cmd);
    apply_environment(&mut cmd, &unit, &ctx)?;
    isolate_process_group(&mut cmd);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| execution_error(id, format!("spawning executor process: {e}")))?;

    let pid = child.id();
    let group = ProcessGroupGuard::new(pid);
    let (_registration, mut terminate_rx) = ctx.processes.register(id, pid);

    if let Some(mut stdin) = child.stdin.take() {
        let payload = serde_json::to_vec(&unit)?;
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(unit = id, error = %e, "executor did not read its stdin");
            }
            let _ = stdin.shutdown().await;
        });
    }

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            for_each_line(stderr, |line| debug!(unit = id, "stderr: {}", line)).await;
        });
    }

    let stdout_task = child.stdout.take().map(|stdout| {
        tokio::spawn(async move {
            let mut last = None;
            for_each_line(stdout, |line| {
                if !line.trim().is_empty() {
                    debug!(unit = id, "stdout: {}", line);
                    last = Some(line);
                }
            })
            .await;
            last
        })
    });

    tokio::select! {
        status_res = child.wait() => {
            let status = status_res
                .map_err(|e| execution_error(id, format!("waiting for executor process: {e}")))?;
            // Leftovers in the group would keep stdout open.
            drop(group);

            let code = status.code().unwrap_or(-1);
            info!(unit = id, exit_code = code, success = status.success(), "executor process exited");

            if !status.success() {
                return Err(execution_error(id, format!("executor exited with code {code}")));
            }

            let last_line = match stdout_task {
                Some(task) => task.await.unwrap_or_else(|e| {
                    warn!(unit = id, error = %e, "stdout reader failed");
                    None
                }),
                None => None,
            };
            let line = last_line
                .ok_or_else(|| execution_error(id, "executor printed no result line"))?;

            parse_result_line(&unit, &line, ctx.base_commit)
        }

        _ = &mut terminate_rx => {
            info!(unit = id, ?pid, "terminate requested; stopping executor process");
            if let Err(e) = terminate_child(&mut child, terminate_grace).await {
                warn!(unit = id, error = %e, "failed to stop executor process");
            }
            drop(group);
            Err(BatchError::Terminated { unit: id })
        }
    }
}

/// Read `reader` to EOF, handing each line to `f` without its line ending.
/// Bytes that are not valid UTF-8 are replaced rather than ending the read.
async fn for_each_line<R>(reader: R, mut f: impl FnMut(String))
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                f(line.trim_end_matches(['\n', '\r']).to_string());
            }
            Err(e) => {
                debug!(error = %e, "pipe read failed");
                break;
            }
        }
    }
}

/// Turn the executor's result line into a [`UnitResult`] for `unit`.
pub fn parse_result_line(
    unit: &WorkUnit,
    line: &str,
    base_commit: Option<String>,
) -> Result<UnitResult> {
    let id = unit.number;

    let mut value: Value = serde_json::from_str(line)
        .map_err(|e| execution_error(id, format!("unparseable result line: {e}")))?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| execution_error(id, "result line is not a JSON object"))?;
    if !obj.contains_key("issue") {
        obj.insert("issue".to_string(), serde_json::to_value(unit)?);
    }

    let mut result: UnitResult = serde_json::from_value(value)
        .map_err(|e| execution_error(id, format!("invalid result record: {e}")))?;

    if result.id() != id {
        return Err(execution_error(
            id,
            format!("executor reported a result for issue {}", result.id()),
        ));
    }
    if result.base_commit.is_none() {
        result.base_commit = base_commit;
    }
    Ok(result)
}
