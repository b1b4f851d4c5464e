use std::io;
use std::path::PathBuf;

/// Errors from the supervisor engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Filesystem error on the durable store.
	#[error("io error on {}: {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	/// The registry file exists but could not be parsed or serialized.
	#[error("registry {} is unreadable: {source}", .path.display())]
	Registry {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
	/// Could not take the exclusive registry lock.
	#[error("failed to lock {}: {source}", .path.display())]
	Lock {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	/// Could not append to a failure journal.
	#[error("failed to write journal {}: {source}", .path.display())]
	Journal {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	/// The process facility refused to start the command.
	#[error("failed to spawn `{command}`: {source}")]
	Spawn {
		command: String,
		#[source]
		source: io::Error,
	},
}

impl Error {
	pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		Error::Io { path: path.into(), source }
	}
}

pub type Result<T> = std::result::Result<T, Error>;
