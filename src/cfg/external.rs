// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Invocation of the two external binaries the service shells out to:
//! `netsh.exe` (WINS configuration, DHCP enable) and `ipconfig.exe`
//! (resolver flush/register). Both are resolved from the system directory
//! at call time rather than trusting `PATH`.

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::errors::{Result, ServiceError};

/// Runs `name` with `args`, polling for completion until `timeout` elapses.
/// If the timeout is exceeded the child is killed and an error is
/// returned; a non-zero exit status is also treated as a failure.
pub fn run_external(name: &str, args: &[&str], timeout: Duration) -> Result<()> {
    let path = resolve_system_binary(name);
    let mut child = Command::new(path)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ServiceError::Io)?;

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(ServiceError::Io)? {
            return if status.success() {
                Ok(())
            } else {
                Err(ServiceError::Other(format!(
                    "{name} exited with status {status}"
                )))
            };
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            return Err(ServiceError::Other(format!("{name} timed out after {timeout:?}")));
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Resolves `name` (without extension) to its path under
/// `%SystemRoot%\System32`, falling back to the bare name if the
/// environment variable is unset (as in non-Windows test builds).
fn resolve_system_binary(name: &str) -> String {
    match std::env::var("SystemRoot") {
        Ok(root) => format!("{root}\\System32\\{name}.exe"),
        Err(_) => format!("{name}.exe"),
    }
}
