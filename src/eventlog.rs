// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Reportable-error bridge. The production NT event-log provider is an
//! external collaborator out of scope for this crate; [`TracingEventLog`]
//! satisfies [`EventLog`] by formatting the same `0x%08x / function /
//! message` shape used on the wire (§6 of the startup-failure path) into a
//! single structured `tracing` event, so the same call sites work whether
//! or not a real event-log sink is wired in.

/// Severity passed to [`EventLog::report`]; loosely mirrors the Windows
/// event log's `EVENTLOG_*_TYPE` values without requiring callers to depend
/// on `windows` for something this small.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Informational,
}

/// Destination for reportable errors: protocol violations, OS mutation
/// failures, child misbehaviour, and wait-loop failures.
pub trait EventLog: Send + Sync {
    fn report(&self, severity: Severity, code: u32, function: &str, message: &str);
}

/// Default [`EventLog`] implementation: formats every report as a single
/// structured `tracing` event rather than writing to the real Windows
/// event log.
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn report(&self, severity: Severity, code: u32, function: &str, message: &str) {
        match severity {
            Severity::Error => tracing::error!(code = format!("0x{code:08x}"), function, message),
            Severity::Warning => tracing::warn!(code = format!("0x{code:08x}"), function, message),
            Severity::Informational => {
                tracing::info!(code = format!("0x{code:08x}"), function, message)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_never_panics_on_non_utf8_friendly_input() {
        // Constructing a String already guarantees valid UTF-8; this test
        // exercises the lossy boundary documented on TracingEventLog by
        // feeding it a message built from a lossily-converted byte slice,
        // matching how a caller would sanitize raw OS/system-message text.
        let lossy = String::from_utf8_lossy(&[0xff, 0xfe, b'x']).into_owned();
        TracingEventLog.report(Severity::Error, 5, "ApplyDnsConfig", &lossy);
    }
}
