//! 命令执行器
//!
//! 所有外部命令都以 argv 形式启动（不经过 shell），并受超时约束：
//! 超时后子进程随 future 一起被丢弃并被杀掉（`kill_on_drop`）。

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// 命令执行器
pub struct CommandRunner;

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 命令超时
    Timeout(Duration),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::Timeout(t) => write!(f, "Command timed out after {}s", t.as_secs()),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e) => Some(e),
            CommandError::Timeout(_) => None,
        }
    }
}

/// 命令执行结果
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout + stderr（保留原始诊断信息）
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (true, true) => String::new(),
        }
    }
}

impl CommandRunner {
    /// 执行命令并收集输出
    ///
    /// # Arguments
    /// * `program` - 要执行的程序
    /// * `args` - 命令行参数（逐个传递，不做 shell 解释）
    /// * `work_dir` - 工作目录，`None` 表示继承当前目录
    /// * `timeout` - 超时时间
    pub async fn run(
        program: &str,
        args: &[&str],
        work_dir: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = work_dir {
            command.current_dir(dir);
        }

        debug!(program = program, args = ?args, "Running command");

        let child = command.output();

        let output = tokio::select! {
            result = child => result.map_err(CommandError::SpawnFailed)?,
            _ = tokio::time::sleep(timeout) => {
                warn!(program = program, args = ?args, "Command timed out after {:?}", timeout);
                return Err(CommandError::Timeout(timeout));
            }
        };

        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(program = program, code = ?result.code, "Command finished");
        Ok(result)
    }

    /// 检查程序是否在 PATH 中
    pub async fn is_available(program: &str) -> bool {
        matches!(
            Self::run("which", &[program], None, Duration::from_secs(5)).await,
            Ok(output) if output.success
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_run_success() {
        let result = CommandRunner::run(
            "echo",
            &["hello"],
            Some(&PathBuf::from("/tmp")),
            Duration::from_secs(5),
        )
        .await;

        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.success);
        assert_eq!(output.combined(), "hello");
    }

    #[tokio::test]
    async fn test_run_not_found() {
        let result =
            CommandRunner::run("nonexistent_command_12345", &[], None, Duration::from_secs(5))
                .await;

        assert!(matches!(result, Err(CommandError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_run_non_zero_exit() {
        let output = CommandRunner::run("sh", &["-c", "echo oops >&2; exit 3"], None, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.combined(), "oops");
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let result =
            CommandRunner::run("sleep", &["5"], None, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(CommandError::Timeout(_))));
    }

    #[test]
    fn test_args_are_not_shell_interpreted() {
        let output = tokio::runtime::Runtime::new().unwrap().block_on(CommandRunner::run(
            "echo",
            &["a; echo injected"],
            None,
            Duration::from_secs(5),
        ));
        assert_eq!(output.unwrap().combined(), "a; echo injected");
    }
}
