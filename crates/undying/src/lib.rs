//! # undying
//!
//! Keeps shell commands alive from a periodic trigger such as cron.
//!
//! Each invocation locks and loads a small registry of commands, checks the
//! recorded pid of each against the process table, restarts the dead ones,
//! appends the death to a per-command failure journal and flags commands that
//! died five times within an hour.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use undying::{Store, StorePaths, Supervisor};
//!
//! let mut store = Store::open(StorePaths::new("/tmp/undying")).unwrap();
//! let mut sup = Supervisor::new(&mut store);
//! sup.register_and_start("sleep 100").unwrap();
//! let report = sup.sweep_all();
//! println!("{} revived", report.revived());
//! store.save().unwrap();
//! ```

pub mod error;
pub mod identity;
pub mod journal;
pub mod launch;
pub mod paths;
pub mod probe;
pub mod registry;
pub mod supervisor;

pub use error::{Error, Result};
pub use identity::{identify, Identifier};
pub use journal::FailureJournal;
pub use launch::{Launcher, ShellLauncher};
pub use paths::StorePaths;
pub use probe::{ProcessTable, SystemProcessTable};
pub use registry::{MonitoredCommand, Registry, Store};
pub use supervisor::{CommandStatus, StartOutcome, Supervisor, SweepEntry, SweepReport, SweepStatus};
