use std::path::{Path, PathBuf};
use std::process::Command;

use crate::OrchestratorError;

/// Resolve `tool`, preferring the path in the `override_env` environment variable when set.
pub fn require_tool(tool: &str, override_env: &str) -> Result<PathBuf, OrchestratorError> {
    let missing = || OrchestratorError::MissingTool {
        tool: tool.to_string(),
        env: override_env.to_string(),
    };

    match std::env::var(override_env) {
        Ok(path) if !path.trim().is_empty() => {
            let path = PathBuf::from(path.trim());
            if path.exists() {
                Ok(path)
            } else {
                which::which(&path).map_err(|_| missing())
            }
        }
        _ => which::which(tool).map_err(|_| missing()),
    }
}

/// Run `program` with `args` to completion and return its standard output.
pub(crate) fn output(program: &Path, args: &[&str]) -> Result<String, OrchestratorError> {
    let command = describe(program, args);
    log::trace!("[placement] Running `{command}`");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| OrchestratorError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(OrchestratorError::Failed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub(crate) fn describe(program: &Path, args: &[&str]) -> String {
    let mut command = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}
