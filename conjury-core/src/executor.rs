//! The action-executor seam.
//!
//! The engine never spawns processes itself; it hands shell strings and argv
//! vectors to an `Executor`. Zero means success, anything else is a fatal
//! action failure.

use std::io;
use std::process::Command;

/// Runs shell and argv actions on behalf of the engine.
pub trait Executor {
    /// Run `command` through the platform shell and return its result code.
    fn spawn_shell(&mut self, command: &str) -> io::Result<i32>;

    /// Spawn `argv[0]` with the remaining arguments and return its result
    /// code.
    fn spawn_argv(&mut self, argv: &[String]) -> io::Result<i32>;
}

/// The real thing: `std::process::Command`.
#[derive(Debug, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        SystemExecutor
    }

    fn code_of(status: std::process::ExitStatus) -> i32 {
        // A signal-terminated child has no code; report it as failure.
        status.code().unwrap_or(-1)
    }
}

impl Executor for SystemExecutor {
    fn spawn_shell(&mut self, command: &str) -> io::Result<i32> {
        let status = if cfg!(windows) {
            Command::new("cmd").args(["/C", command]).status()?
        } else {
            Command::new("sh").args(["-c", command]).status()?
        };
        Ok(Self::code_of(status))
    }

    fn spawn_argv(&mut self, argv: &[String]) -> io::Result<i32> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty argv action")
        })?;
        let status = Command::new(program).args(args).status()?;
        Ok(Self::code_of(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn shell_reports_exit_codes() {
        let mut exec = SystemExecutor::new();
        assert_eq!(exec.spawn_shell("exit 0").unwrap(), 0);
        assert_eq!(exec.spawn_shell("exit 3").unwrap(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn argv_spawns_directly() {
        let mut exec = SystemExecutor::new();
        let code = exec
            .spawn_argv(&["true".to_string()])
            .unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn empty_argv_is_an_error() {
        let mut exec = SystemExecutor::new();
        assert!(exec.spawn_argv(&[]).is_err());
    }
}
