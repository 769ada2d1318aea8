//! Payment alias reconciliation for a single user.
//!
//! A user's alias is two records on `<name>.<zone>.`: an OpenAlias TXT record carrying the
//! payment address and an A record pointing at the service. Each cycle reads the zone, stages all
//! existing TXT and A records on that name for removal, adds the two desired records and submits
//! everything as one batch tagged with the serial just read. A serial conflict restarts the whole
//! cycle, bounded by `max_attempts`.

use super::types::{EditOp, NormalizedZone, ZoneError, ZoneRecord};
use super::zone::{canonical_name, normalize};
use super::ZoneApi;

use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts per reconcile call when the zone keeps changing underneath us.
pub const MAX_RECONCILE_ATTEMPTS: usize = 3;

const ALIAS_RECORD_TYPES: &[&str] = &["TXT", "A"];

/// Where and how alias records are written.
#[derive(Debug, Clone)]
pub struct AliasSettings {
	/// Zone the aliases live in, e.g. `example.com`.
	pub zone: String,
	/// Address the per-user A record points to.
	pub target_ip: Ipv4Addr,
	pub ttl: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
	#[error("Display name {0:?} is not a valid DNS label")]
	InvalidName(String),

	#[error(transparent)]
	Zone(#[from] ZoneError),

	#[error("Zone kept changing, gave up after {attempts} attempts: {last}")]
	RetriesExhausted { attempts: usize, last: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
	/// A batch was accepted at `version`.
	Applied {
		version: u64,
		removed: usize,
		added: usize,
	},
	/// The zone already holds exactly the desired records.
	Unchanged,
}

pub struct DnsReconciler {
	api: Arc<dyn ZoneApi>,
	settings: AliasSettings,
	max_attempts: usize,
}

impl DnsReconciler {
	pub fn new(api: Arc<dyn ZoneApi>, settings: AliasSettings) -> Self {
		Self {
			api,
			settings,
			max_attempts: MAX_RECONCILE_ATTEMPTS,
		}
	}

	/// Bring the alias records of one user in line with `address`.
	pub async fn reconcile(
		&self,
		user_id: &str,
		display_name: &str,
		address: &str,
	) -> Result<ReconcileOutcome, ReconcileError> {
		let label = alias_label(display_name)?;
		let mut last_conflict = String::new();

		for attempt in 1..=self.max_attempts {
			let raw = self.api.read_zone(&self.settings.zone).await?;
			let zone = normalize(&raw, &self.settings.zone)?;

			let Some(ops) = plan(&zone, &self.settings, &label, address) else {
				debug!("Alias for user {} already up to date", user_id);
				return Ok(ReconcileOutcome::Unchanged);
			};

			match self
				.api
				.submit_edit(&self.settings.zone, zone.version, &ops)
				.await
			{
				Ok(()) => {
					let removed = ops
						.iter()
						.filter(|op| matches!(op, EditOp::Remove { .. }))
						.count();
					info!(
						"Reconciled alias {} for user {} at serial {}",
						label, user_id, zone.version
					);
					return Ok(ReconcileOutcome::Applied {
						version: zone.version,
						removed,
						added: ops.len() - removed,
					});
				}
				Err(ZoneError::ConcurrentModification(detail)) => {
					warn!(
						"Zone changed during reconcile of user {} (attempt {}/{}): {}",
						user_id, attempt, self.max_attempts, detail
					);
					last_conflict = detail;
				}
				Err(e) => return Err(e.into()),
			}
		}

		Err(ReconcileError::RetriesExhausted {
			attempts: self.max_attempts,
			last: last_conflict,
		})
	}
}

/// Lowercased display name, validated as a single DNS label.
pub fn alias_label(display_name: &str) -> Result<String, ReconcileError> {
	let label = display_name.trim().to_ascii_lowercase();
	let valid = (1..=63).contains(&label.len())
		&& label
			.bytes()
			.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
		&& !label.starts_with('-')
		&& !label.ends_with('-');

	if valid {
		Ok(label)
	} else {
		Err(ReconcileError::InvalidName(display_name.to_string()))
	}
}

/// OpenAlias TXT payload for `address`.
pub fn alias_payload(address: &str, display_name: &str) -> String {
	format!(
		"oa1:xmr recipient_address={}; recipient_name={};",
		address, display_name
	)
}

/// Edit batch that moves `zone` to the desired alias records, or `None` if it already matches.
fn plan(
	zone: &NormalizedZone,
	settings: &AliasSettings,
	label: &str,
	address: &str,
) -> Option<Vec<EditOp>> {
	let name = canonical_name(label, &settings.zone);
	let payload = alias_payload(address, label);
	let target_ip = settings.target_ip.to_string();

	let stale: Vec<&ZoneRecord> = zone
		.records
		.iter()
		.filter(|record| {
			record.name == name && ALIAS_RECORD_TYPES.contains(&record.record_type.as_str())
		})
		.collect();

	let up_to_date = stale.len() == 2
		&& stale
			.iter()
			.any(|r| r.record_type == "TXT" && r.joined_data() == payload)
		&& stale
			.iter()
			.any(|r| r.record_type == "A" && r.joined_data() == target_ip);
	if up_to_date {
		return None;
	}

	let mut ops: Vec<EditOp> = stale
		.iter()
		.map(|record| EditOp::Remove { line: record.line })
		.collect();
	ops.push(EditOp::Add {
		name: name.clone(),
		record_type: "TXT".to_string(),
		payload,
		class: "IN".to_string(),
		ttl: settings.ttl,
	});
	ops.push(EditOp::Add {
		name,
		record_type: "A".to_string(),
		payload: target_ip,
		class: "IN".to_string(),
		ttl: settings.ttl,
	});
	Some(ops)
}
