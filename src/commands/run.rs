use anyhow::Context;
use measure::clienv::EnvVar;
use measure::hooks::StepMetrics;
use measure::metrics::{self, TimeDistribution};
use measure::{MeasureConfig, SessionSettings};
use tokio::process::Command;

use crate::args::StepArgs;

/// Wrap a task command in the step lifecycle and return its exit code.
pub(crate) async fn cmd_run(
    config: MeasureConfig,
    step: StepArgs,
    command: Vec<String>,
) -> anyhow::Result<i32> {
    let (program, args) = command.split_first().context("No command given")?;
    let registry = metrics::global();
    let ctx = step.context();

    let mut hooks = StepMetrics::new(config, SessionSettings::from_env());
    let session = hooks.task_pre_step(&ctx, registry).await;

    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(socket) = session.socket_path() {
        cmd.env(EnvVar::MeasureStatsdSocket.as_str(), socket);
    }

    let status = {
        let _timer = TimeDistribution::new("measure.task.duration", &[], "ms");
        cmd.status().await
    };

    let is_task_ok = matches!(&status, Ok(s) if s.success());
    let outcome = if is_task_ok {
        "measure.task.succeeded"
    } else {
        "measure.task.failed"
    };
    metrics::increment(outcome, 1, &[]);

    hooks
        .task_finished(is_task_ok, step.retry_count, registry)
        .await;

    let status = status.with_context(|| format!("Failed to run {program}"))?;
    Ok(status.code().unwrap_or(1))
}
