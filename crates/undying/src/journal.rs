use std::fs::{self, OpenOptions};
use std::io::{self, Write};

use chrono::{DateTime, Local, SecondsFormat, TimeDelta};

use crate::error::{Error, Result};
use crate::identity::Identifier;
use crate::paths::StorePaths;

pub type Timestamp = DateTime<Local>;

/// Failures needed inside the flap window before a command counts as flapping.
pub const FLAP_THRESHOLD: usize = 5;
pub const FLAP_WINDOW_SECS: i64 = 60 * 60;

/// Append-only, one-file-per-identifier record of when commands were found dead.
#[derive(Debug, Clone)]
pub struct FailureJournal {
	paths: StorePaths,
}

impl FailureJournal {
	pub fn new(paths: StorePaths) -> Self {
		Self { paths }
	}

	pub fn record_failure(&self, id: &Identifier, at: Timestamp) -> Result<()> {
		let dir = self.paths.journal_dir();
		fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

		let path = self.paths.journal_path(id);
		let journal_err = |source| Error::Journal { path: path.clone(), source };
		let mut file = OpenOptions::new()
			.create(true)
			.append(true)
			.open(&path)
			.map_err(journal_err)?;
		writeln!(file, "{}", format_timestamp(at)).map_err(journal_err)?;
		Ok(())
	}

	/// Every recorded failure, oldest first. Missing journal means no failures.
	pub fn recent_failures(&self, id: &Identifier) -> Result<Vec<Timestamp>> {
		let path = self.paths.journal_path(id);
		let content = match fs::read_to_string(&path) {
			Ok(c) => c,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(Error::io(&path, e)),
		};

		let mut failures = Vec::new();
		for (n, line) in content.lines().enumerate() {
			let line = line.trim();
			if line.is_empty() {
				continue;
			}
			match parse_timestamp(line) {
				Some(ts) => failures.push(ts),
				None => tracing::warn!(
					"skipping unreadable timestamp on line {} of {}: {:?}",
					n + 1,
					path.display(),
					line
				),
			}
		}
		Ok(failures)
	}

	pub fn is_flapping(&self, id: &Identifier, now: Timestamp) -> Result<bool> {
		let failures = self.recent_failures(id)?;
		Ok(is_flapping(&failures, now))
	}
}

/// True when the [`FLAP_THRESHOLD`]th most recent failure lies strictly inside
/// the trailing hour.
pub fn is_flapping(failures: &[Timestamp], now: Timestamp) -> bool {
	if failures.len() < FLAP_THRESHOLD {
		return false;
	}
	failures[failures.len() - FLAP_THRESHOLD] > now - TimeDelta::seconds(FLAP_WINDOW_SECS)
}

pub fn format_timestamp(ts: Timestamp) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

pub fn parse_timestamp(s: &str) -> Option<Timestamp> {
	DateTime::parse_from_rfc3339(s)
		.ok()
		.map(|ts| ts.with_timezone(&Local))
}
