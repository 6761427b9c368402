//! External tool invocation.
//!
//! The sort and extraction stages delegate to system tools (`sort`, `zstd`,
//! `gzip`, `awk`) through `bash -c` pipelines. A nonzero exit is always fatal
//! to the calling stage; combined stdout/stderr is captured for diagnostics.

use std::path::Path;
use std::process::Command;

/// Error from a failed external tool or shell pipeline.
#[derive(Debug)]
pub struct ToolError {
    /// The pipeline or command that was attempted
    pub pipeline: String,
    /// Process exit code, if the process ran at all
    pub status: Option<i32>,
    /// Combined stdout/stderr, or the spawn error message
    pub output: String,
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(
                f,
                "command exited with status {code}: {}\noutput: {}",
                self.pipeline, self.output
            ),
            None => write!(f, "command failed to run: {}: {}", self.pipeline, self.output),
        }
    }
}

impl std::error::Error for ToolError {}

/// Run a shell pipeline via `bash -c` with pipefail, capturing all output.
pub fn run_shell(pipeline: &str) -> Result<(), ToolError> {
    let script = format!("set -o pipefail; {pipeline}");
    let output = Command::new("bash")
        .arg("-c")
        .arg(&script)
        .output()
        .map_err(|e| ToolError {
            pipeline: pipeline.to_string(),
            status: None,
            output: e.to_string(),
        })?;
    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(ToolError {
            pipeline: pipeline.to_string(),
            status: output.status.code(),
            output: combined,
        });
    }
    Ok(())
}

/// Run a single command (no shell), capturing combined output on failure.
pub fn run_command(cmd: &mut Command) -> Result<(), ToolError> {
    let describe = format!("{cmd:?}");
    let output = cmd.output().map_err(|e| ToolError {
        pipeline: describe.clone(),
        status: None,
        output: e.to_string(),
    })?;
    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(ToolError {
            pipeline: describe,
            status: output.status.code(),
            output: combined,
        });
    }
    Ok(())
}

/// Check whether an executable is reachable through `PATH`.
pub fn has_command(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(name)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Quote a string for safe interpolation into a `bash -c` pipeline.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'/' | b'.' | b'-' | b'_' | b'%' | b'+' | b':' | b'=' | b',')) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_passthrough_for_safe_chars() {
        assert_eq!(shell_quote("/data/dump-2024.json.zst"), "/data/dump-2024.json.zst");
        assert_eq!(shell_quote("25%"), "25%");
    }

    #[test]
    fn shell_quote_wraps_spaces() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn shell_quote_escapes_single_quote() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn run_shell_success() {
        assert!(run_shell("true").is_ok());
    }

    #[test]
    fn run_shell_nonzero_captures_output() {
        let err = run_shell("echo boom; false").unwrap_err();
        assert_eq!(err.status, Some(1));
        assert!(err.output.contains("boom"));
    }

    #[test]
    fn run_shell_pipefail_propagates() {
        // Without pipefail the trailing `cat` would mask the failure.
        let err = run_shell("false | cat").unwrap_err();
        assert_eq!(err.status, Some(1));
    }

    #[test]
    fn run_command_failure() {
        let err = run_command(Command::new("bash").args(["-c", "exit 3"])).unwrap_err();
        assert_eq!(err.status, Some(3));
    }

    #[test]
    fn has_command_finds_sh() {
        assert!(has_command("sh"));
        assert!(!has_command("definitely-not-a-real-tool-9f2a"));
    }
}
