// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Process-wide settings loaded once at service startup. Distinct from the
/// VPN engine's own option set, which is opaque to the service and carried
/// verbatim in the startup blob (see [`crate::session::startup`]).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServiceSettings {
    /// Path to the engine executable the service launches per session.
    #[serde(rename = "EngineExecutablePath")]
    pub engine_executable_path: String,

    /// Local group whose members may request operations that would
    /// otherwise be rejected as invalid (e.g. a startup option the service
    /// does not recognize).
    #[serde(rename = "AdminGroupName", default = "default_admin_group")]
    pub admin_group_name: String,

    /// Account the service itself runs as; used when building the DACL for
    /// the launched engine process.
    #[serde(rename = "ServiceUserName", default = "default_service_user")]
    pub service_user_name: String,

    /// Suffix appended to the well-known pipe names, allowing side-by-side
    /// installs to avoid colliding on the same pipe namespace.
    #[serde(rename = "PipeInstanceSuffix", default)]
    pub pipe_instance_suffix: String,

    /// Per-request read/write timeout on the session pipes.
    #[serde(rename = "IoTimeoutSeconds", with = "serde_secs", default = "default_io_timeout")]
    pub io_timeout: Duration,

    /// Upper bound on how long a worker waits to acquire the register-DNS
    /// semaphore before giving up.
    #[serde(
        rename = "RegisterDnsTimeoutSeconds",
        with = "serde_secs",
        default = "default_register_dns_timeout"
    )]
    pub register_dns_timeout: Duration,

    /// Priority class the engine child process is created with.
    #[serde(rename = "ChildProcessPriority", default)]
    pub child_process_priority: ChildProcessPriority,

    #[serde(rename = "Logger")]
    pub logger: LoggerSettings,
}

/// Priority class passed to `CreateProcessAsUserW` when launching the
/// engine (§4.H step 3).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChildProcessPriority {
    Idle,
    BelowNormal,
    #[default]
    Normal,
    AboveNormal,
    High,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoggerSettings {
    #[serde(rename = "Level", default = "default_log_level")]
    pub level: String,
    #[serde(rename = "Output", default)]
    pub output: LogOutput,
    #[serde(rename = "FilePath", default)]
    pub file_path: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

fn default_admin_group() -> String {
    "Administrators".to_string()
}
fn default_service_user() -> String {
    "NT AUTHORITY\\NetworkService".to_string()
}
fn default_io_timeout() -> Duration {
    Duration::from_secs(2)
}
fn default_register_dns_timeout() -> Duration {
    Duration::from_secs(600)
}
fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceSettings {
    /// Loads settings from YAML, validates them, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: ServiceSettings =
            serde_yaml::from_str(&s).context("failed to parse service settings YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            !self.engine_executable_path.is_empty(),
            "EngineExecutablePath must not be empty"
        );
        ensure!(
            !self.admin_group_name.is_empty(),
            "AdminGroupName must not be empty"
        );
        ensure!(
            self.register_dns_timeout > Duration::ZERO,
            "RegisterDnsTimeoutSeconds must be > 0"
        );
        ensure!(self.io_timeout > Duration::ZERO, "IoTimeoutSeconds must be > 0");

        if self.output_requires_file() && self.logger.file_path.is_none() {
            ensure!(false, "Logger.FilePath is required when Logger.Output = file");
        }

        Ok(())
    }

    fn output_requires_file(&self) -> bool {
        self.logger.output == LogOutput::File
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ServiceSettings {
        ServiceSettings {
            engine_executable_path: "C:\\Program Files\\Engine\\engine.exe".into(),
            admin_group_name: "Administrators".into(),
            service_user_name: "NT AUTHORITY\\NetworkService".into(),
            pipe_instance_suffix: String::new(),
            io_timeout: Duration::from_secs(2),
            register_dns_timeout: Duration::from_secs(600),
            child_process_priority: ChildProcessPriority::Normal,
            logger: LoggerSettings {
                level: "info".into(),
                output: LogOutput::Stdout,
                file_path: None,
            },
        }
    }

    #[test]
    fn rejects_empty_engine_path() {
        let mut cfg = base();
        cfg.engine_executable_path.clear();
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn rejects_zero_register_dns_timeout() {
        let mut cfg = base();
        cfg.register_dns_timeout = Duration::ZERO;
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn rejects_file_output_without_path() {
        let mut cfg = base();
        cfg.logger.output = LogOutput::File;
        cfg.logger.file_path = None;
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn accepts_well_formed_settings() {
        let mut cfg = base();
        assert!(cfg.validate_and_normalize().is_ok());
    }
}
