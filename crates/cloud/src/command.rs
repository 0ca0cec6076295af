//! Helpers for running external CLIs.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::CloudError;

/// Flags whose `KEY=VALUE` argument carries a value that must not be shown.
const REDACTED_FLAGS: &[&str] = &["--environment"];

/// Render a command line for logs and error messages.
///
/// Values passed through [`REDACTED_FLAGS`] keep their key and lose the value.
#[must_use]
pub fn describe(cmd: &Command) -> String {
    let std_cmd = cmd.as_std();
    let mut parts = vec![std_cmd.get_program().to_string_lossy().into_owned()];
    let mut redact_next = false;
    for arg in std_cmd.get_args() {
        let arg = arg.to_string_lossy();
        if redact_next {
            parts.push(redact(&arg));
        } else {
            parts.push(arg.to_string());
        }
        redact_next = REDACTED_FLAGS.contains(&&*arg);
    }
    parts.join(" ")
}

fn redact(arg: &str) -> String {
    match arg.split_once('=') {
        Some((key, _)) => format!("{key}=***"),
        None => "***".to_string(),
    }
}

/// Run a command to completion and return its stdout.
///
/// # Errors
///
/// Returns [`CloudError::Spawn`] when the binary cannot be started and
/// [`CloudError::Command`] when it exits unsuccessfully.
pub async fn run(mut cmd: Command) -> Result<Vec<u8>, CloudError> {
    let line = describe(&cmd);
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    debug!(command = %line, "Running command");

    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| CloudError::Spawn { program, source })?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(CloudError::Command {
            command: line,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
