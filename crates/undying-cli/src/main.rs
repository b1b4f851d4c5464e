mod config;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;
use undying::{
	Launcher, ProcessTable, ShellLauncher, Store, StorePaths, Supervisor, SystemProcessTable,
};

use config::GlobalConfig;
use output::Painter;

const EXIT_OK: u8 = 0;
/// Lock, persistence, corrupt registry or a failed `run`.
const EXIT_FATAL: u8 = 1;
/// The sweep finished but at least one command could not be revived.
const EXIT_PARTIAL: u8 = 3;

#[derive(Debug, Parser)]
#[command(
	name = "undying",
	version,
	about = "Keep shell commands alive; run bare from cron to revive the dead"
)]
struct Cli {
	/// Directory holding the registry and failure journals
	#[arg(long, global = true, value_name = "DIR")]
	base_dir: Option<PathBuf>,

	/// Log debug output to stderr
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Register a command and start it unless it is already running
	Run {
		/// Shell command line, quoted as one argument
		#[arg(allow_hyphen_values = true)]
		command: String,
	},
	/// Stop supervising a command (a running process is left alone)
	Remove {
		/// The exact command line given to `run`
		#[arg(allow_hyphen_values = true)]
		command: String,
	},
	/// Show every registered command
	Inspect {
		/// Dump as JSON
		#[arg(long)]
		json: bool,
	},
	/// Check every registered command and revive the dead (the default)
	Sweep,
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	let global_config = config::load_global_config();
	init_logging(&global_config, cli.verbose);

	match run(cli, &global_config) {
		Ok(code) => ExitCode::from(code),
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			ExitCode::from(EXIT_FATAL)
		}
	}
}

fn init_logging(config: &GlobalConfig, verbose: bool) {
	let filter = if verbose {
		EnvFilter::new("debug")
	} else {
		EnvFilter::try_from_default_env()
			.or_else(|_| EnvFilter::try_new(&config.log.level))
			.unwrap_or_else(|_| EnvFilter::new("warn"))
	};
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();
}

/// Every mode loads and saves the registry, including read-only ones and
/// modes that failed halfway.
fn run(cli: Cli, global_config: &GlobalConfig) -> undying::Result<u8> {
	let paths = config::resolve_store_paths(cli.base_dir.as_deref(), global_config);
	tracing::debug!("using {}", paths.base_dir().display());

	execute(
		paths,
		cli.command.unwrap_or(Command::Sweep),
		SystemProcessTable,
		ShellLauncher::default(),
	)
}

fn execute<T: ProcessTable, L: Launcher>(
	paths: StorePaths,
	command: Command,
	table: T,
	launcher: L,
) -> undying::Result<u8> {
	let mut store = Store::open(paths)?;
	let outcome = dispatch(Supervisor::with_parts(&mut store, table, launcher), command);
	store.save()?;
	outcome
}

fn dispatch<T: ProcessTable, L: Launcher>(
	mut sup: Supervisor<'_, T, L>,
	command: Command,
) -> undying::Result<u8> {
	let painter = Painter::detect();

	match command {
		Command::Run { command } => {
			let outcome = sup.register_and_start(&command)?;
			output::print_lines(&output::start_lines(painter, &command, &outcome));
			Ok(EXIT_OK)
		}
		Command::Remove { command } => {
			sup.remove(&command);
			Ok(EXIT_OK)
		}
		Command::Inspect { json } => {
			let statuses = sup.inspect();
			if json {
				match serde_json::to_string_pretty(&statuses) {
					Ok(text) => println!("{}", text),
					Err(e) => {
						eprintln!("{} {}", "error:".red().bold(), e);
						return Ok(EXIT_FATAL);
					}
				}
			} else {
				output::print_lines(&output::inspect_lines(painter, &statuses));
			}
			Ok(EXIT_OK)
		}
		Command::Sweep => {
			let report = sup.sweep_all();
			output::print_lines(&output::sweep_lines(painter, &report));
			if report.failed() > 0 {
				Ok(EXIT_PARTIAL)
			} else {
				Ok(EXIT_OK)
			}
		}
	}
}
