use crate::error::{MarketError, Result};
use tracing::debug;

/// Output from a command execution
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Execute a command and fail on non-zero exit code
pub async fn exec(program: &str, args: &[String]) -> Result<CommandOutput> {
    let command_line = format!("{} {}", program, args.join(" "));
    debug!("Executing: {}", command_line);

    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| MarketError::command_failed(&command_line, -1, e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    debug!("Command exited with code {}: {}", exit_code, command_line);

    if exit_code != 0 {
        return Err(MarketError::command_failed(command_line, exit_code, stderr));
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_fails() {
        let result = exec("spotsched-definitely-not-installed", &[]).await;
        assert!(matches!(
            result,
            Err(MarketError::CommandFailed { exit_code: -1, .. })
        ));
    }
}
