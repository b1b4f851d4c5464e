use chrono::Local;
use serde::Serialize;

use crate::error::Result;
use crate::identity::{identify, Identifier};
use crate::journal::{self, FailureJournal, Timestamp};
use crate::launch::{Launcher, ShellLauncher};
use crate::probe::{is_running, ProcessTable, SystemProcessTable};
use crate::registry::{MonitoredCommand, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StartOutcome {
	AlreadyRunning { pid: u32 },
	Started { pid: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SweepStatus {
	Healthy { pid: u32 },
	Revived {
		old_pid: Option<u32>,
		new_pid: u32,
		flapping: bool,
	},
	ReviveFailed { error: String, flapping: bool },
}

impl SweepStatus {
	pub fn is_flapping(&self) -> bool {
		match self {
			SweepStatus::Healthy { .. } => false,
			SweepStatus::Revived { flapping, .. } | SweepStatus::ReviveFailed { flapping, .. } => {
				*flapping
			}
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepEntry {
	pub identifier: Identifier,
	pub command: String,
	pub status: SweepStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
	pub entries: Vec<SweepEntry>,
}

impl SweepReport {
	pub fn revived(&self) -> usize {
		self.entries
			.iter()
			.filter(|e| matches!(e.status, SweepStatus::Revived { .. }))
			.count()
	}

	pub fn failed(&self) -> usize {
		self.entries
			.iter()
			.filter(|e| matches!(e.status, SweepStatus::ReviveFailed { .. }))
			.count()
	}
}

/// Read-only view of one registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct CommandStatus {
	pub identifier: Identifier,
	pub command: String,
	pub pid: Option<u32>,
	pub alive: bool,
	pub failures: usize,
	pub last_failure: Option<String>,
	pub flapping: bool,
}

/// Drives register / remove / sweep over a locked [`Store`].
pub struct Supervisor<'s, T = SystemProcessTable, L = ShellLauncher> {
	store: &'s mut Store,
	journal: FailureJournal,
	table: T,
	launcher: L,
}

impl<'s> Supervisor<'s> {
	pub fn new(store: &'s mut Store) -> Self {
		Self::with_parts(store, SystemProcessTable, ShellLauncher::default())
	}
}

impl<'s, T: ProcessTable, L: Launcher> Supervisor<'s, T, L> {
	pub fn with_parts(store: &'s mut Store, table: T, launcher: L) -> Self {
		let journal = FailureJournal::new(store.paths().clone());
		Self {
			store,
			journal,
			table,
			launcher,
		}
	}

	pub fn journal(&self) -> &FailureJournal {
		&self.journal
	}

	/// Registers `command` if new and starts it unless it is already alive.
	pub fn register_and_start(&mut self, command: &str) -> Result<StartOutcome> {
		let id = identify(command);
		let entry = self.store.registry_mut().get_or_create(&id, command);

		if is_running(&self.table, entry) {
			if let Some(pid) = entry.pid {
				tracing::debug!("`{}` already running (pid {})", command, pid);
				return Ok(StartOutcome::AlreadyRunning { pid });
			}
		}

		let pid = start(&self.table, &self.launcher, entry)?;
		Ok(StartOutcome::Started { pid })
	}

	/// Stops supervising `command`. A running process is left alone.
	pub fn remove(&mut self, command: &str) -> Option<MonitoredCommand> {
		let id = identify(command);
		let removed = self.store.registry_mut().delete(&id);
		match &removed {
			Some(entry) => tracing::info!("removed `{}` ({})", command, entry.identifier()),
			None => tracing::debug!("`{}` was not registered", command),
		}
		removed
	}

	pub fn sweep_all(&mut self) -> SweepReport {
		self.sweep_all_at(Local::now())
	}

	/// Checks every registered command and revives the dead ones.
	///
	/// A command that cannot be restarted is reported and skipped; the rest of
	/// the sweep still runs.
	pub fn sweep_all_at(&mut self, now: Timestamp) -> SweepReport {
		let ids: Vec<Identifier> = self
			.store
			.registry()
			.iter()
			.map(|c| c.identifier().clone())
			.collect();

		let mut report = SweepReport::default();
		for id in ids {
			let Some(entry) = self.store.registry_mut().get_mut(&id) else {
				continue;
			};

			let status = if is_running(&self.table, entry) {
				let pid = entry.pid.unwrap_or_default();
				tracing::debug!("`{}` is running (pid {})", entry.command(), pid);
				SweepStatus::Healthy { pid }
			} else {
				revive(&self.journal, &self.table, &self.launcher, entry, now)
			};

			report.entries.push(SweepEntry {
				identifier: id,
				command: entry.command().to_string(),
				status,
			});
		}
		report
	}

	pub fn inspect(&self) -> Vec<CommandStatus> {
		let now = Local::now();
		self.store
			.registry()
			.iter()
			.map(|entry| {
				let failures = self
					.journal
					.recent_failures(entry.identifier())
					.unwrap_or_else(|e| {
						tracing::warn!("{}", e);
						Vec::new()
					});
				CommandStatus {
					identifier: entry.identifier().clone(),
					command: entry.command().to_string(),
					pid: entry.pid,
					alive: is_running(&self.table, entry),
					failures: failures.len(),
					last_failure: failures.last().map(|ts| journal::format_timestamp(*ts)),
					flapping: journal::is_flapping(&failures, now),
				}
			})
			.collect()
	}
}

fn start(
	table: &impl ProcessTable,
	launcher: &impl Launcher,
	entry: &mut MonitoredCommand,
) -> Result<u32> {
	entry.clear_pid();
	let launched_at = u64::try_from(Local::now().timestamp()).ok();
	let pid = launcher.launch(entry.command())?;
	entry.pid = Some(pid);
	// a child that already exited has no start time left to read
	entry.started_at = table.start_time(pid).or(launched_at);
	tracing::info!("started `{}` (pid {})", entry.command(), pid);
	Ok(pid)
}

fn revive(
	journal: &FailureJournal,
	table: &impl ProcessTable,
	launcher: &impl Launcher,
	entry: &mut MonitoredCommand,
	now: Timestamp,
) -> SweepStatus {
	let old_pid = entry.pid;
	tracing::warn!("`{}` has died (last pid {:?}), reviving", entry.command(), old_pid);

	if let Err(e) = journal.record_failure(entry.identifier(), now) {
		tracing::error!("{}", e);
	}

	let started = start(table, launcher, entry);

	let flapping = journal
		.is_flapping(entry.identifier(), now)
		.unwrap_or_else(|e| {
			tracing::warn!("{}", e);
			false
		});
	if flapping {
		tracing::warn!(
			"frequent failures on {} (`{}`)",
			entry.identifier(),
			entry.command()
		);
	}

	match started {
		Ok(new_pid) => SweepStatus::Revived {
			old_pid,
			new_pid,
			flapping,
		},
		Err(e) => {
			tracing::error!("{}", e);
			SweepStatus::ReviveFailed {
				error: e.to_string(),
				flapping,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::Error;
	use crate::paths::StorePaths;
	use chrono::TimeDelta;
	use std::cell::{Cell, RefCell};
	use std::collections::HashMap;
	use std::rc::Rc;

	/// Process table where launched commands stay alive until `kill` is called.
	#[derive(Clone, Default)]
	struct World {
		live: Rc<RefCell<HashMap<u32, u64>>>,
		next_pid: Rc<Cell<u32>>,
		spawns: Rc<RefCell<Vec<String>>>,
		broken: Rc<RefCell<Vec<String>>>,
	}

	impl World {
		fn kill(&self, pid: u32) {
			self.live.borrow_mut().remove(&pid);
		}

		fn spawn_count(&self) -> usize {
			self.spawns.borrow().len()
		}
	}

	impl ProcessTable for World {
		fn start_time(&self, pid: u32) -> Option<u64> {
			self.live.borrow().get(&pid).copied()
		}
	}

	impl Launcher for World {
		fn launch(&self, command: &str) -> Result<u32> {
			if self.broken.borrow().iter().any(|c| c == command) {
				return Err(Error::Spawn {
					command: command.to_string(),
					source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
				});
			}
			let pid = self.next_pid.get() + 100;
			self.next_pid.set(pid);
			self.live.borrow_mut().insert(pid, 1_000 + pid as u64);
			self.spawns.borrow_mut().push(command.to_string());
			Ok(pid)
		}
	}

	/// Launches through the world, but the child exits before it can be inspected.
	struct Vanishing(World);

	impl Launcher for Vanishing {
		fn launch(&self, command: &str) -> Result<u32> {
			let pid = self.0.launch(command)?;
			self.0.kill(pid);
			Ok(pid)
		}
	}

	fn open_store(dir: &tempfile::TempDir) -> Store {
		Store::open(StorePaths::new(dir.path())).unwrap()
	}

	#[test]
	fn register_twice_spawns_once() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = open_store(&dir);
		let world = World::default();
		let mut sup = Supervisor::with_parts(&mut store, world.clone(), world.clone());

		let pid = match sup.register_and_start("sleep 100").unwrap() {
			StartOutcome::Started { pid } => pid,
			other => panic!("expected start, got {:?}", other),
		};
		assert_eq!(
			sup.register_and_start("sleep 100").unwrap(),
			StartOutcome::AlreadyRunning { pid }
		);
		assert_eq!(world.spawn_count(), 1);
	}

	#[test]
	fn register_restarts_dead_entry_without_counting_failure() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = open_store(&dir);
		let world = World::default();
		let mut sup = Supervisor::with_parts(&mut store, world.clone(), world.clone());

		let StartOutcome::Started { pid } = sup.register_and_start("a").unwrap() else {
			panic!("expected start");
		};
		world.kill(pid);

		let again = sup.register_and_start("a").unwrap();
		assert!(matches!(again, StartOutcome::Started { pid: p } if p != pid));
		assert!(sup.journal().recent_failures(&identify("a")).unwrap().is_empty());
	}

	#[test]
	fn pid_reused_after_instant_exit_is_not_running() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = open_store(&dir);
		let world = World::default();
		let mut sup = Supervisor::with_parts(&mut store, world.clone(), Vanishing(world.clone()));

		let StartOutcome::Started { pid } = sup.register_and_start("flash").unwrap() else {
			panic!("expected start");
		};
		// an unrelated process picks up the freed pid
		world.live.borrow_mut().insert(pid, 5);

		let report = sup.sweep_all();
		match &report.entries[0].status {
			SweepStatus::Revived { old_pid, .. } => assert_eq!(*old_pid, Some(pid)),
			other => panic!("expected revive, got {:?}", other),
		}
	}

	#[test]
	fn remove_unknown_is_noop() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = open_store(&dir);
		let world = World::default();
		let mut sup = Supervisor::with_parts(&mut store, world.clone(), world);

		assert!(sup.remove("never registered").is_none());
		assert!(sup.inspect().is_empty());
	}

	#[test]
	fn remove_leaves_process_running() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = open_store(&dir);
		let world = World::default();
		let mut sup = Supervisor::with_parts(&mut store, world.clone(), world.clone());

		let StartOutcome::Started { pid } = sup.register_and_start("a").unwrap() else {
			panic!("expected start");
		};
		assert!(sup.remove("a").is_some());
		assert!(sup.inspect().iter().all(|s| s.identifier != identify("a")));
		assert!(world.is_alive(pid));
	}

	#[test]
	fn sweep_reports_healthy_and_revives_dead() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = open_store(&dir);
		let world = World::default();
		let mut sup = Supervisor::with_parts(&mut store, world.clone(), world.clone());

		sup.register_and_start("alive").unwrap();
		let StartOutcome::Started { pid: dead } = sup.register_and_start("dead").unwrap() else {
			panic!("expected start");
		};
		world.kill(dead);

		let report = sup.sweep_all();
		assert_eq!(report.entries.len(), 2);
		assert!(matches!(report.entries[0].status, SweepStatus::Healthy { .. }));
		match &report.entries[1].status {
			SweepStatus::Revived { old_pid, new_pid, flapping } => {
				assert_eq!(*old_pid, Some(dead));
				assert_ne!(*new_pid, dead);
				assert!(!flapping);
			}
			other => panic!("expected revive, got {:?}", other),
		}
		assert_eq!(report.revived(), 1);
		assert_eq!(sup.journal().recent_failures(&identify("dead")).unwrap().len(), 1);
	}

	#[test]
	fn never_started_entry_is_revived_by_sweep() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = open_store(&dir);
		store.registry_mut().get_or_create(&identify("x"), "x");
		let world = World::default();
		let mut sup = Supervisor::with_parts(&mut store, world.clone(), world.clone());

		let report = sup.sweep_all();
		assert!(matches!(
			report.entries[0].status,
			SweepStatus::Revived { old_pid: None, .. }
		));
	}

	#[test]
	fn fifth_death_within_an_hour_is_flagged() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = open_store(&dir);
		let world = World::default();
		let mut sup = Supervisor::with_parts(&mut store, world.clone(), world.clone());
		sup.register_and_start("crashy").unwrap();

		let start = Local::now();
		for round in 0..5 {
			let pids: Vec<u32> = world.live.borrow().keys().copied().collect();
			for pid in pids {
				world.kill(pid);
			}
			let report = sup.sweep_all_at(start + TimeDelta::minutes(round * 10));
			assert_eq!(report.entries[0].status.is_flapping(), round == 4, "round {}", round);
		}
	}

	#[test]
	fn spawn_failure_does_not_abort_sweep() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = open_store(&dir);
		for cmd in ["first", "broken", "last"] {
			store.registry_mut().get_or_create(&identify(cmd), cmd);
		}
		let world = World::default();
		world.broken.borrow_mut().push("broken".into());
		let mut sup = Supervisor::with_parts(&mut store, world.clone(), world.clone());

		let report = sup.sweep_all();
		assert_eq!(report.revived(), 2);
		assert_eq!(report.failed(), 1);
		assert!(matches!(report.entries[1].status, SweepStatus::ReviveFailed { .. }));
		assert_eq!(*world.spawns.borrow(), vec!["first".to_string(), "last".to_string()]);
		assert_eq!(sup.journal().recent_failures(&identify("broken")).unwrap().len(), 1);
	}

	#[test]
	fn inspect_reports_failures_and_liveness() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = open_store(&dir);
		let world = World::default();
		let mut sup = Supervisor::with_parts(&mut store, world.clone(), world.clone());

		let StartOutcome::Started { pid } = sup.register_and_start("a").unwrap() else {
			panic!("expected start");
		};
		world.kill(pid);
		sup.sweep_all();

		let status = sup.inspect();
		assert_eq!(status.len(), 1);
		assert!(status[0].alive);
		assert_eq!(status[0].failures, 1);
		assert!(status[0].last_failure.is_some());
		assert!(!status[0].flapping);
	}
}
