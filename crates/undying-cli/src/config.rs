use serde::Deserialize;
use std::path::{Path, PathBuf};
use undying::paths::{self, StorePaths};

pub const HOME_ENV: &str = "UNDYING_HOME";

// ── Global config (~/.config/undying/config.toml) ───────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
	#[serde(default)]
	pub storage: StorageConfig,
	#[serde(default)]
	pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
	/// Directory holding the registry and failure journals.
	pub base_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
	#[serde(default = "default_level")]
	pub level: String,
}

impl Default for LogConfig {
	fn default() -> Self {
		Self { level: default_level() }
	}
}

fn default_level() -> String { "warn".into() }

pub fn config_path() -> PathBuf {
	paths::config_dir().join("config.toml")
}

pub fn load_global_config() -> GlobalConfig {
	let path = config_path();
	if path.exists() {
		match std::fs::read_to_string(&path) {
			Ok(content) => match parse_config(&content) {
				Ok(config) => return config,
				Err(e) => eprintln!("warning: failed to parse {}: {}", path.display(), e),
			},
			Err(e) => eprintln!("warning: failed to read {}: {}", path.display(), e),
		}
	}
	GlobalConfig::default()
}

pub fn parse_config(content: &str) -> Result<GlobalConfig, toml::de::Error> {
	toml::from_str(content)
}

// ── Storage location ─────────────────────────────────────────────────────────

/// `--base-dir`, then `$UNDYING_HOME`, then `[storage] base_dir`, then the XDG state dir.
pub fn resolve_store_paths(flag: Option<&Path>, config: &GlobalConfig) -> StorePaths {
	let env = std::env::var(HOME_ENV).ok().filter(|v| !v.is_empty());
	match resolve_base_dir(flag, env.as_deref(), config) {
		Some(dir) => StorePaths::new(dir),
		None => StorePaths::default_location(),
	}
}

fn resolve_base_dir(
	flag: Option<&Path>,
	env: Option<&str>,
	config: &GlobalConfig,
) -> Option<PathBuf> {
	if let Some(dir) = flag {
		return Some(dir.to_path_buf());
	}
	if let Some(dir) = env {
		return Some(expand_tilde(dir));
	}
	config.storage.base_dir.as_deref().map(expand_tilde)
}

fn expand_tilde(path: &str) -> PathBuf {
	if let Some(rest) = path.strip_prefix("~/") {
		if let Ok(home) = std::env::var("HOME") {
			return PathBuf::from(home).join(rest);
		}
	}
	PathBuf::from(path)
}
