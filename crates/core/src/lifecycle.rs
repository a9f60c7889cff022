//! Process teardown.
//!
//! A stuck action that cannot be stopped, a watchdog that cannot stop its
//! target, a lost world connection, and `!restart` all end the process. They
//! go through [`Terminator`] so the escalation is observable in tests.

/// Ends the agent process.
pub trait Terminator: Send + Sync {
    fn terminate(&self, reason: &str);
}

/// Logs the reason and exits with status 1 so a supervisor can restart us.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, reason: &str) {
        tracing::error!(reason, "Terminating agent process");
        std::process::exit(1);
    }
}
