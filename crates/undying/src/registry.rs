use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::{identify, Identifier};
use crate::paths::StorePaths;

/// One supervised command line and the process last started for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredCommand {
	identifier: Identifier,
	command: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pid: Option<u32>,
	/// OS start time (unix seconds) of `pid`, used to spot a recycled pid.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub started_at: Option<u64>,
}

impl MonitoredCommand {
	pub fn new(command: impl Into<String>) -> Self {
		let command = command.into();
		Self {
			identifier: identify(&command),
			command,
			pid: None,
			started_at: None,
		}
	}

	pub fn identifier(&self) -> &Identifier {
		&self.identifier
	}

	pub fn command(&self) -> &str {
		&self.command
	}

	pub fn clear_pid(&mut self) {
		self.pid = None;
		self.started_at = None;
	}
}

/// Identifier → command mapping, iterated in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
	#[serde(default)]
	commands: Vec<MonitoredCommand>,
}

impl Registry {
	pub fn get(&self, id: &Identifier) -> Option<&MonitoredCommand> {
		self.commands.iter().find(|c| &c.identifier == id)
	}

	pub fn get_mut(&mut self, id: &Identifier) -> Option<&mut MonitoredCommand> {
		self.commands.iter_mut().find(|c| &c.identifier == id)
	}

	pub fn get_or_create(&mut self, id: &Identifier, command: &str) -> &mut MonitoredCommand {
		let pos = match self.commands.iter().position(|c| &c.identifier == id) {
			Some(pos) => pos,
			None => {
				self.commands.push(MonitoredCommand {
					identifier: id.clone(),
					command: command.to_string(),
					pid: None,
					started_at: None,
				});
				self.commands.len() - 1
			}
		};
		&mut self.commands[pos]
	}

	pub fn delete(&mut self, id: &Identifier) -> Option<MonitoredCommand> {
		let pos = self.commands.iter().position(|c| &c.identifier == id)?;
		Some(self.commands.remove(pos))
	}

	pub fn iter(&self) -> impl Iterator<Item = &MonitoredCommand> {
		self.commands.iter()
	}

	pub fn len(&self) -> usize {
		self.commands.len()
	}

	pub fn is_empty(&self) -> bool {
		self.commands.is_empty()
	}

	/// Derives every identifier from its command text again, so a hand-edited
	/// file cannot hold entries that lookups by command would never reach.
	/// Entries that collapse onto an earlier one are dropped.
	fn rekey(&mut self) {
		let mut seen: Vec<Identifier> = Vec::with_capacity(self.commands.len());
		self.commands.retain_mut(|entry| {
			let id = identify(&entry.command);
			if entry.identifier != id {
				tracing::warn!(
					"identifier of `{}` did not match its command, using {}",
					entry.command,
					id
				);
				entry.identifier = id.clone();
			}
			if seen.contains(&id) {
				tracing::warn!("dropping duplicate entry for `{}`", entry.command);
				return false;
			}
			seen.push(id);
			true
		});
	}
}

/// Exclusive handle on the durable registry.
///
/// Opening takes an advisory lock on `registry.lock` and loads the registry;
/// the lock is held until the store is dropped, so a whole load→mutate→save
/// cycle runs without another invocation interleaving.
pub struct Store {
	paths: StorePaths,
	registry: Registry,
	lock: File,
}

impl Store {
	/// Blocks until the lock is free.
	pub fn open(paths: StorePaths) -> Result<Self> {
		let lock = open_lock_file(&paths)?;
		tracing::debug!("waiting for {}", paths.lock_path().display());
		lock.lock_exclusive().map_err(|source| Error::Lock {
			path: paths.lock_path(),
			source,
		})?;
		Self::load_locked(paths, lock)
	}

	/// Fails with [`Error::Lock`] instead of waiting when another invocation holds the lock.
	pub fn try_open(paths: StorePaths) -> Result<Self> {
		let lock = open_lock_file(&paths)?;
		lock.try_lock_exclusive().map_err(|source| Error::Lock {
			path: paths.lock_path(),
			source,
		})?;
		Self::load_locked(paths, lock)
	}

	fn load_locked(paths: StorePaths, lock: File) -> Result<Self> {
		let registry = load(&paths.registry_path())?;
		tracing::debug!(
			"loaded {} command(s) from {}",
			registry.len(),
			paths.registry_path().display()
		);
		Ok(Self { paths, registry, lock })
	}

	pub fn paths(&self) -> &StorePaths {
		&self.paths
	}

	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	pub fn registry_mut(&mut self) -> &mut Registry {
		&mut self.registry
	}

	/// Rewrites the whole registry file atomically.
	pub fn save(&self) -> Result<()> {
		save(&self.paths, &self.registry)?;
		tracing::debug!(
			"saved {} command(s) to {}",
			self.registry.len(),
			self.paths.registry_path().display()
		);
		Ok(())
	}
}

impl Drop for Store {
	fn drop(&mut self) {
		let _ = self.lock.unlock();
	}
}

fn open_lock_file(paths: &StorePaths) -> Result<File> {
	let base = paths.base_dir();
	fs::create_dir_all(base).map_err(|e| Error::io(base, e))?;

	let lock_path = paths.lock_path();
	OpenOptions::new()
		.create(true)
		.truncate(false)
		.write(true)
		.open(&lock_path)
		.map_err(|source| Error::Lock { path: lock_path, source })
}

/// Reads the registry, creating an empty one on first use.
pub fn load(path: &Path) -> Result<Registry> {
	let content = match fs::read_to_string(path) {
		Ok(c) => c,
		Err(e) if e.kind() == io::ErrorKind::NotFound => {
			let registry = Registry::default();
			if let Some(dir) = path.parent() {
				fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
				write_atomic(dir, path, &registry)?;
			}
			return Ok(registry);
		}
		Err(e) => return Err(Error::io(path, e)),
	};

	if content.trim().is_empty() {
		return Ok(Registry::default());
	}

	let mut registry: Registry =
		serde_json::from_str(&content).map_err(|source| Error::Registry {
			path: path.to_path_buf(),
			source,
		})?;
	registry.rekey();
	Ok(registry)
}

pub fn save(paths: &StorePaths, registry: &Registry) -> Result<()> {
	let base = paths.base_dir();
	fs::create_dir_all(base).map_err(|e| Error::io(base, e))?;
	write_atomic(base, &paths.registry_path(), registry)
}

fn write_atomic(dir: &Path, path: &Path, registry: &Registry) -> Result<()> {
	let mut data = serde_json::to_vec_pretty(registry).map_err(|source| Error::Registry {
		path: path.to_path_buf(),
		source,
	})?;
	data.push(b'\n');

	let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
	tmp.write_all(&data).map_err(|e| Error::io(tmp.path(), e))?;
	tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
	tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
	Ok(())
}
