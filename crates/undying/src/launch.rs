use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// Starts a command in the background and hands back its pid.
pub trait Launcher {
	fn launch(&self, command: &str) -> Result<u32>;
}

/// Runs commands through `sh -c` in their own session, detached from the
/// caller's terminal and stdio. The child is never waited on.
#[derive(Debug, Clone)]
pub struct ShellLauncher {
	shell: String,
}

impl Default for ShellLauncher {
	fn default() -> Self {
		Self { shell: "sh".into() }
	}
}

impl ShellLauncher {
	pub fn with_shell(shell: impl Into<String>) -> Self {
		Self { shell: shell.into() }
	}
}

impl Launcher for ShellLauncher {
	fn launch(&self, command: &str) -> Result<u32> {
		let mut cmd = Command::new(&self.shell);
		cmd.args(["-c", command])
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null());

		// SAFETY: setsid is async-signal-safe and touches no parent state.
		unsafe {
			cmd.pre_exec(|| {
				nix::unistd::setsid().map_err(io::Error::from)?;
				Ok(())
			});
		}

		let child = cmd.spawn().map_err(|source| Error::Spawn {
			command: command.to_string(),
			source,
		})?;
		Ok(child.id())
	}
}
