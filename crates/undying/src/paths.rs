use std::path::{Path, PathBuf};

use crate::identity::Identifier;

pub const APP_NAME: &str = "undying";

/// Layout of the durable state under one base directory.
#[derive(Debug, Clone)]
pub struct StorePaths {
	base_dir: PathBuf,
}

impl StorePaths {
	pub fn new(base_dir: impl Into<PathBuf>) -> Self {
		Self {
			base_dir: base_dir.into(),
		}
	}

	/// `$XDG_STATE_HOME/undying`, falling back to `~/.local/state/undying`.
	pub fn default_location() -> Self {
		Self::new(state_dir())
	}

	pub fn base_dir(&self) -> &Path {
		&self.base_dir
	}

	pub fn registry_path(&self) -> PathBuf {
		self.base_dir.join("registry.json")
	}

	pub fn lock_path(&self) -> PathBuf {
		self.base_dir.join("registry.lock")
	}

	pub fn journal_dir(&self) -> PathBuf {
		self.base_dir.join("failures")
	}

	pub fn journal_path(&self, id: &Identifier) -> PathBuf {
		self.journal_dir().join(id.as_str())
	}
}

pub fn state_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
		PathBuf::from(dir).join(APP_NAME)
	} else if let Some(home) = home_dir() {
		home.join(".local").join("state").join(APP_NAME)
	} else {
		PathBuf::from("/tmp").join(APP_NAME)
	}
}

pub fn config_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(dir).join(APP_NAME)
	} else if let Some(home) = home_dir() {
		home.join(".config").join(APP_NAME)
	} else {
		PathBuf::from("/tmp").join(APP_NAME).join("config")
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::identity::identify;

	#[test]
	fn layout_is_rooted_at_base_dir() {
		let paths = StorePaths::new("/srv/undying");
		assert_eq!(paths.registry_path(), Path::new("/srv/undying/registry.json"));
		assert_eq!(paths.lock_path(), Path::new("/srv/undying/registry.lock"));

		let id = identify("sleep 100");
		let journal = paths.journal_path(&id);
		assert!(journal.starts_with("/srv/undying/failures"));
		assert_eq!(journal.file_name().unwrap().to_str().unwrap(), id.as_str());
	}
}
