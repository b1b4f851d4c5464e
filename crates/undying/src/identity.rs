use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content hash of a command line, used as the registry and journal key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Identifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// SHA-256 over the exact bytes of `command`, whitespace included.
pub fn identify(command: &str) -> Identifier {
	let digest = Sha256::digest(command.as_bytes());
	Identifier(hex::encode(digest))
}
