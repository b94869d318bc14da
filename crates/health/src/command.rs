//! 外部命令执行辅助
//!
//! Host tools (`ip`, `ping`, `arping`, `docker`) are driven through
//! `tokio::process` so the runtime threads never block on them.

use crate::error::{HealthError, Result};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

fn render(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// 执行命令并返回原始输出（不检查退出码）
pub(crate) async fn output(program: &str, args: &[&str]) -> Result<Output> {
    debug!("Executing {}", render(program, args));
    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| HealthError::Command {
            command: render(program, args),
            message: e.to_string(),
        })
}

/// 执行命令并检查是否成功，返回 stdout
pub(crate) async fn run(program: &str, args: &[&str]) -> Result<String> {
    let output = output(program, args).await?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => format!("exited with {}", output.status),
            trimmed => trimmed.to_string(),
        };
        Err(HealthError::Command {
            command: render(program, args),
            message,
        })
    }
}
