//! Shell execution with a hard timeout and bounded output.
//!
//! Used by the `shell` skill. Commands run through `sh -c` in the workspace
//! root; output is clipped to a fixed cap so runaway commands cannot flood
//! the transcript.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

const MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct ExecRequest {
    pub command: String,
    /// Hard timeout in seconds.
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
}

fn default_timeout_sec() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecResponse {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

fn clip(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_OUTPUT_BYTES {
        text.into_owned()
    } else {
        let mut end = MAX_OUTPUT_BYTES;
        while !text.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}\n[output clipped]", &text[..end])
    }
}

/// Run a command to completion or until the timeout fires.
pub async fn exec(workdir: &Path, req: ExecRequest) -> ExecResponse {
    let timeout = std::time::Duration::from_secs(req.timeout_sec.max(1));

    let child = Command::new("sh")
        .arg("-c")
        .arg(&req.command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(c) => c,
        Err(e) => {
            return ExecResponse {
                exit_code: None,
                stdout: String::new(),
                stderr: format!("spawn failed: {e}"),
                timed_out: false,
            }
        }
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => ExecResponse {
            exit_code: output.status.code(),
            stdout: clip(&output.stdout),
            stderr: clip(&output.stderr),
            timed_out: false,
        },
        Ok(Err(e)) => ExecResponse {
            exit_code: None,
            stdout: String::new(),
            stderr: format!("wait failed: {e}"),
            timed_out: false,
        },
        Err(_) => ExecResponse {
            exit_code: None,
            stdout: String::new(),
            stderr: format!("command timed out after {}s", req.timeout_sec),
            timed_out: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let resp = exec(
            dir.path(),
            ExecRequest {
                command: "echo hello".into(),
                timeout_sec: 10,
            },
        )
        .await;
        assert_eq!(resp.exit_code, Some(0));
        assert!(resp.stdout.contains("hello"));
        assert!(!resp.timed_out);
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let resp = exec(
            dir.path(),
            ExecRequest {
                command: "exit 3".into(),
                timeout_sec: 10,
            },
        )
        .await;
        assert_eq!(resp.exit_code, Some(3));
    }

    #[tokio::test]
    async fn timeout_kills_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let resp = exec(
            dir.path(),
            ExecRequest {
                command: "sleep 30".into(),
                timeout_sec: 1,
            },
        )
        .await;
        assert!(resp.timed_out);
        assert!(resp.stderr.contains("timed out"));
    }
}
