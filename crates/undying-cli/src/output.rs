use std::io::IsTerminal;

use owo_colors::{OwoColorize, Style};
use undying::{CommandStatus, StartOutcome, SweepEntry, SweepReport, SweepStatus};

/// Colors only when stdout is a terminal, so cron mail stays plain.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
	enabled: bool,
}

impl Painter {
	pub fn detect() -> Self {
		Self {
			enabled: std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
		}
	}

	#[cfg(test)]
	pub fn plain() -> Self {
		Self { enabled: false }
	}

	fn paint(&self, text: &str, style: Style) -> String {
		if self.enabled {
			text.style(style).to_string()
		} else {
			text.to_string()
		}
	}

	fn green(&self, text: &str) -> String {
		self.paint(text, Style::new().green())
	}

	fn yellow(&self, text: &str) -> String {
		self.paint(text, Style::new().yellow())
	}

	fn red(&self, text: &str) -> String {
		self.paint(text, Style::new().red().bold())
	}

	fn dimmed(&self, text: &str) -> String {
		self.paint(text, Style::new().dimmed())
	}
}

pub fn start_lines(p: Painter, command: &str, outcome: &StartOutcome) -> Vec<String> {
	match outcome {
		StartOutcome::AlreadyRunning { pid } => vec![format!(
			"{} `{}` already running (pid {})",
			p.green("●"),
			command,
			pid
		)],
		StartOutcome::Started { pid } => vec![
			format!("{} starting `{}`...", p.yellow("●"), command),
			format!("  pid {}", pid),
		],
	}
}

pub fn sweep_lines(p: Painter, report: &SweepReport) -> Vec<String> {
	let mut lines = Vec::new();
	for entry in &report.entries {
		lines.push(sweep_line(p, entry));
		if entry.status.is_flapping() {
			lines.push(p.red(&format!(
				"! FREQUENT FAILURE ON {} (`{}`)",
				entry.identifier, entry.command
			)));
		}
	}
	lines
}

fn sweep_line(p: Painter, entry: &SweepEntry) -> String {
	match &entry.status {
		SweepStatus::Healthy { pid } => {
			format!("{} `{}` is running fine (pid {})", p.green("●"), entry.command, pid)
		}
		SweepStatus::Revived { new_pid, .. } => format!(
			"{} `{}` HAS DIED! revived as pid {}",
			p.yellow("●"),
			entry.command,
			new_pid
		),
		SweepStatus::ReviveFailed { error, .. } => format!(
			"{} `{}` HAS DIED! could not revive: {}",
			p.red("●"),
			entry.command,
			error
		),
	}
}

pub fn inspect_lines(p: Painter, statuses: &[CommandStatus]) -> Vec<String> {
	if statuses.is_empty() {
		return vec![p.dimmed("no commands registered")];
	}

	let mut lines = Vec::new();
	for s in statuses {
		let (circle, label) = if s.alive {
			(p.green("●"), p.green("alive"))
		} else {
			(p.red("●"), p.red("dead"))
		};
		let pid = s.pid.map(|pid| pid.to_string()).unwrap_or_else(|| "-".into());
		let flap = if s.flapping {
			format!(" {}", p.red("flapping"))
		} else {
			String::new()
		};
		let id = s.identifier.as_str();
		let short_id = id.get(..12).unwrap_or(id);
		lines.push(format!("{} {} {}", circle, s.command, p.dimmed(&format!("[{}]", short_id))));
		lines.push(format!(
			"    {:<6} pid {:<8} failures {}{}{}",
			label,
			pid,
			s.failures,
			s.last_failure
				.as_deref()
				.map(|t| format!(" (last {})", t))
				.unwrap_or_default(),
			flap
		));
	}
	lines
}

pub fn print_lines(lines: &[String]) {
	for line in lines {
		println!("{}", line);
	}
}
