//! DNS payment alias management.
//!
//! The zone is owned by an external hosting panel. Writes are coordinated through the SOA serial
//! (optimistic versioning): every batch carries the serial it was computed against and the panel
//! rejects it if the zone moved on in the meantime.

/// Sweep over all provisioned users
mod batch;
/// HTTP client for the panel's zone API
mod client;
/// Per-user alias reconciliation
mod reconciler;
/// Canonical zone types
mod types;
/// Normalization of raw zone listings
pub mod zone;

pub use batch::{BatchSyncDriver, SyncAllReport};
pub use client::{CpanelCredentials, CpanelZoneClient, ZONE_TIMEOUT};
pub use reconciler::{
	AliasSettings, DnsReconciler, MAX_RECONCILE_ATTEMPTS, ReconcileError, ReconcileOutcome,
	alias_label, alias_payload,
};
pub use types::*;

/// Access to the externally owned zone.
#[async_trait::async_trait]
pub trait ZoneApi: Send + Sync {
	/// Raw zone listing, in whatever shape the upstream returns.
	async fn read_zone(&self, zone: &str) -> Result<serde_json::Value, ZoneError>;

	/// Apply `ops` atomically if the zone is still at `version`.
	async fn submit_edit(
		&self,
		zone: &str,
		version: ZoneVersion,
		ops: &[EditOp],
	) -> Result<(), ZoneError>;
}
