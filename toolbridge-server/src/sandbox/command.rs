// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Subprocess runner with a command denylist and working-directory guard.

use super::filesystem::{absolute, normalize};
use super::SandboxError;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

/// Substrings that refuse a command outright (case-insensitive).
pub const DENIED_COMMANDS: &[&str] = &[
    "rm", "del", "format", "fdisk", "mkfs", "dd", "sudo", "su", "chmod", "chown", "passwd",
    "useradd", "userdel", "shutdown", "reboot", "halt", "poweroff", "kill", "killall",
];

/// Directories a command may not run in, including their descendants.
pub const DENIED_DIRECTORIES: &[&str] =
    &["/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/root"];

const MAX_OUTPUT_CHARS: usize = 30_000;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    pub env: HashMap<String, String>,
    pub capture_output: bool,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            timeout: Duration::from_secs(10),
            env: HashMap::new(),
            capture_output: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub command: String,
    pub args: Vec<String>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub truncated: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct CommandSandbox {
    max_timeout: Duration,
}

impl CommandSandbox {
    pub fn new(max_timeout: Duration) -> Self {
        Self { max_timeout }
    }

    pub fn max_timeout(&self) -> Duration {
        self.max_timeout
    }

    /// Reject the command if it matches the denylist.
    pub fn check_command(&self, command: &str) -> Result<(), SandboxError> {
        let lowered = command.to_lowercase();
        match DENIED_COMMANDS.iter().find(|d| lowered.contains(*d)) {
            Some(pattern) => Err(SandboxError::CommandDenied {
                command: command.to_string(),
                pattern: pattern.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Resolve `cwd` and reject it if it lies under a denied directory.
    pub fn check_working_directory(&self, cwd: &Path) -> Result<PathBuf, SandboxError> {
        let requested = cwd.to_string_lossy();
        let lexical =
            normalize(&absolute(cwd).map_err(|e| SandboxError::io(&requested, cwd, e))?);
        let resolved = std::fs::canonicalize(&lexical).unwrap_or_else(|_| lexical.clone());

        let denied = [&lexical, &resolved].iter().any(|candidate| {
            DENIED_DIRECTORIES
                .iter()
                .any(|dir| candidate.starts_with(dir))
        });
        if denied {
            tracing::warn!("Denied working directory {:?}", resolved);
            return Err(SandboxError::WorkingDirectoryDenied {
                path: requested.into_owned(),
            });
        }
        Ok(resolved)
    }

    pub async fn run(&self, request: CommandRequest) -> Result<CommandOutput, SandboxError> {
        if request.command.trim().is_empty() {
            return Err(SandboxError::InvalidInput("command must not be empty".into()));
        }
        self.check_command(&request.command)?;
        let cwd = match &request.cwd {
            Some(dir) => Some(self.check_working_directory(dir)?),
            None => None,
        };
        let timeout = request.timeout.min(self.max_timeout);

        let mut cmd = tokio::process::Command::new(&request.command);
        cmd.args(&request.args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &cwd {
            cmd.current_dir(dir);
        }
        if request.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        tracing::debug!(
            "Running command '{}' with {} arg(s), timeout {}ms",
            request.command,
            request.args.len(),
            timeout.as_millis()
        );

        let start = Instant::now();
        let child = cmd.spawn().map_err(SandboxError::Spawn)?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| SandboxError::TimedOut {
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(SandboxError::Spawn)?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (stdout, out_truncated) =
            truncate_output(&String::from_utf8_lossy(&output.stdout), MAX_OUTPUT_CHARS);
        let (stderr, err_truncated) =
            truncate_output(&String::from_utf8_lossy(&output.stderr), MAX_OUTPUT_CHARS);

        Ok(CommandOutput {
            command: request.command,
            args: request.args,
            exit_code: output.status.code(),
            stdout,
            stderr,
            duration_ms,
            truncated: out_truncated || err_truncated,
        })
    }
}

fn truncate_output(s: &str, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => (s[..cut].to_string(), true),
        None => (s.to_string(), false),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sandbox() -> CommandSandbox {
        CommandSandbox::new(Duration::from_secs(30))
    }

    #[test]
    fn test_denylist_is_case_insensitive_substring() {
        let sb = sandbox();
        assert!(sb.check_command("rm").is_err());
        assert!(sb.check_command("SUDO").is_err());
        assert!(sb.check_command("/usr/bin/killall").is_err());
        assert!(sb.check_command("echo").is_ok());
        assert!(sb.check_command("ls").is_ok());
    }

    #[test]
    fn test_denied_working_directories() {
        let sb = sandbox();
        assert!(sb.check_working_directory(Path::new("/etc")).is_err());
        assert!(sb.check_working_directory(Path::new("/etc/ssl")).is_err());
        assert!(sb
            .check_working_directory(Path::new("/tmp/../usr/sbin"))
            .is_err());
        assert!(sb.check_working_directory(Path::new("/etcetera")).is_ok());
    }

    #[tokio::test]
    async fn test_runs_and_captures_output() {
        let mut req = CommandRequest::new("echo");
        req.args = vec!["hello".into()];
        let out = sandbox().run(req).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello\n");
        assert!(!out.truncated);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_data() {
        let out = sandbox().run(CommandRequest::new("false")).await.unwrap();
        assert_eq!(out.exit_code, Some(1));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = CommandRequest::new("pwd");
        req.cwd = Some(dir.path().to_path_buf());
        let out = sandbox().run(req).await.unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(out.stdout.trim(), expected.to_string_lossy());
    }

    #[tokio::test]
    async fn test_env_is_passed_through() {
        let mut req = CommandRequest::new("printenv");
        req.args = vec!["TOOLBRIDGE_TEST_VALUE".into()];
        req.env.insert("TOOLBRIDGE_TEST_VALUE".into(), "42".into());
        let out = sandbox().run(req).await.unwrap();
        assert_eq!(out.stdout.trim(), "42");
    }

    #[tokio::test]
    async fn test_capture_disabled_discards_output() {
        let mut req = CommandRequest::new("echo");
        req.args = vec!["hidden".into()];
        req.capture_output = false;
        let out = sandbox().run(req).await.unwrap();
        assert!(out.stdout.is_empty());
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_timeout_is_enforced_and_clamped() {
        let sb = CommandSandbox::new(Duration::from_millis(200));
        let mut req = CommandRequest::new("sleep");
        req.args = vec!["5".into()];
        req.timeout = Duration::from_secs(10);
        let start = Instant::now();
        let err = sb.run(req).await.unwrap_err();
        assert!(matches!(err, SandboxError::TimedOut { timeout_ms: 200 }));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let err = sandbox()
            .run(CommandRequest::new("definitely-not-a-real-binary-xyz"))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn(_)));
    }

    #[test]
    fn test_truncate_output_respects_chars() {
        let (s, truncated) = truncate_output("héllo", 2);
        assert_eq!(s, "hé");
        assert!(truncated);
        let (s, truncated) = truncate_output("hi", 2);
        assert_eq!(s, "hi");
        assert!(!truncated);
    }
}
