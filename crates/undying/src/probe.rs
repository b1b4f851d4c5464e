use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

use crate::registry::MonitoredCommand;

/// Start times read at different moments can disagree by a rounding second.
const START_TIME_SLACK_SECS: u64 = 1;

/// Read access to the OS process table.
pub trait ProcessTable {
	/// Start time (unix seconds) of the live process whose id is exactly `pid`.
	fn start_time(&self, pid: u32) -> Option<u64>;

	fn is_alive(&self, pid: u32) -> bool {
		self.start_time(pid).is_some()
	}
}

/// Queries the real process table through `sysinfo`, one pid at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
	fn start_time(&self, pid: u32) -> Option<u64> {
		if pid == 0 {
			return None;
		}
		let target = Pid::from_u32(pid);
		let mut system = System::new();
		system.refresh_processes_specifics(
			ProcessesToUpdate::Some(&[target]),
			true,
			ProcessRefreshKind::new(),
		);

		let process = system.process(target)?;
		if process.pid() != target {
			return None;
		}
		match process.status() {
			// exited but not yet reaped
			ProcessStatus::Zombie | ProcessStatus::Dead => None,
			_ => Some(process.start_time()),
		}
	}
}

/// Whether the process recorded on `entry` is still the one we started.
///
/// A pid alone can be recycled by the OS; when the start time was captured
/// at spawn it has to match too.
pub fn is_running(table: &impl ProcessTable, entry: &MonitoredCommand) -> bool {
	let Some(pid) = entry.pid else {
		return false;
	};
	match (table.start_time(pid), entry.started_at) {
		(None, _) => false,
		(Some(_), None) => true,
		(Some(actual), Some(expected)) => actual.abs_diff(expected) <= START_TIME_SLACK_SECS,
	}
}
