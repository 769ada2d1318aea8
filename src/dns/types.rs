//! Canonical zone types shared by the normalizer, the reconciler and the zone API clients.

use serde::{Deserialize, Serialize};

/// A resource record in canonical form. `name` is absolute with a trailing dot and lowercase,
/// `record_type` is uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
	/// Position of the record in the zone file; the handle used for removal.
	pub line: u64,
	pub name: String,
	pub record_type: String,
	pub data: Vec<String>,
}

impl ZoneRecord {
	/// Record payload with multi-string TXT chunks joined.
	pub fn joined_data(&self) -> String {
		self.data.concat()
	}
}

/// SOA serial guarding every write to the zone.
pub type ZoneVersion = u64;

/// Zone contents plus the version they were read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedZone {
	pub records: Vec<ZoneRecord>,
	pub version: ZoneVersion,
}

/// One operation of an atomic edit batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
	Remove {
		line: u64,
	},
	Add {
		name: String,
		record_type: String,
		payload: String,
		class: String,
		ttl: u32,
	},
}

/// Error types for zone access
#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
	/// The listing cannot be interpreted. Not retryable.
	#[error("Malformed zone: {0}")]
	Malformed(String),

	/// The submitted serial no longer matches the zone.
	#[error("Zone modified concurrently: {0}")]
	ConcurrentModification(String),

	#[error("Zone API error: {0}")]
	Api(String),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	Json(#[from] serde_json::Error),
}
