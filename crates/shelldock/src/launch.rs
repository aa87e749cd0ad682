//! Launching resolved commands

use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{Result, ShellDockError};
use crate::resolve::Resolved;

/// Runs resolved command text through `<shell> -c`
#[derive(Debug, Clone)]
pub struct Launcher {
    shell: String,
    cancel: CancelToken,
}

impl Launcher {
    pub fn new(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Spawn the shell and wait for it, with stdio inherited.
    ///
    /// Cancellation is only honoured before the process is spawned.
    pub fn launch(&self, resolved: &Resolved) -> Result<ExitStatus> {
        if self.cancel.is_cancelled() {
            info!(id = %resolved.id, "launch cancelled");
            return Err(ShellDockError::Cancelled);
        }

        debug!(id = %resolved.id, shell = %self.shell, command = %resolved.command, "launching");
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(&resolved.command)
            .status()
            .map_err(|e| ShellDockError::io(&PathBuf::from(&self.shell), e))?;

        debug!(id = %resolved.id, code = ?status.code(), "command finished");
        Ok(status)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::resolve::{resolve, Bindings};

    fn resolved(command: &str) -> Resolved {
        Resolved {
            id: "test".to_string(),
            platform: None,
            command: command.to_string(),
        }
    }

    #[test]
    fn test_launch_reports_exit_status() -> Result<()> {
        let launcher = Launcher::new("sh");
        assert!(launcher.launch(&resolved("true"))?.success());
        assert_eq!(launcher.launch(&resolved("exit 3"))?.code(), Some(3));
        Ok(())
    }

    #[test]
    fn test_cancelled_before_spawn() {
        let tmp = tempfile::TempDir::new().unwrap();
        let marker = tmp.path().join("ran");
        let launcher = Launcher::new("sh");
        launcher.cancel_token().cancel();

        let command = format!("touch {}", shell_words::quote(&marker.to_string_lossy()));
        let err = launcher.launch(&resolved(&command)).unwrap_err();
        assert!(matches!(err, ShellDockError::Cancelled));
        assert!(!marker.exists());
    }

    #[test]
    fn test_quoted_values_never_run_as_commands() -> Result<()> {
        let tmp = tempfile::TempDir::new().unwrap();
        let marker = tmp.path().join("pwned");
        let marker = marker.to_string_lossy();
        let launcher = Launcher::new("sh");

        for (template, value) in [
            ("echo {{name}} >/dev/null", format!("x; touch {}", marker)),
            ("echo \"hello {{name}}\" >/dev/null", format!("x\"; touch {}; echo \"", marker)),
            ("echo 'hello {{name}}' >/dev/null", format!("';touch {};'", marker)),
            ("echo \"$(echo {{name}})\" >/dev/null", format!("$(touch {})", marker)),
        ] {
            let mut args = Bindings::new();
            args.set("name", &value);
            let resolved = resolve(&Entry::new("greet", template), "ubuntu", &args)?;
            assert!(launcher.launch(&resolved)?.success(), "{}", resolved.command);
            assert!(!tmp.path().join("pwned").exists(), "{}", resolved.command);
        }
        Ok(())
    }

    #[test]
    fn test_missing_shell_is_io_error() {
        let launcher = Launcher::new("/nonexistent/shell");
        assert!(matches!(
            launcher.launch(&resolved("true")),
            Err(ShellDockError::Io { .. })
        ));
    }
}
