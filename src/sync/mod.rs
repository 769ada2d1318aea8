//! Wallet synchronization loop.
//!
//! The `SyncLoop` keeps the process-wide [`SyncState`] current by periodically driving the wallet
//! engine's sync. Ticks are single-flight: a tick that finds a sync already running returns
//! immediately instead of queueing. The `is_syncing` flag is cleared by a drop guard, so it is
//! reset on every exit path including cancellation of the tick future.
//!
//! No other component writes `SyncState`; readers get a [`SyncStatusSnapshot`].

use crate::utils::{XMR_DECIMALS, format_token_amount};
use crate::wallet::{WalletHandle, WalletSnapshot};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Lifecycle status of the sync loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
	/// Created at startup, no tick has finished yet.
	Initializing,
	/// No wallet configured. Terminal.
	Disabled,
	/// Last tick succeeded.
	Synced,
	/// Last tick failed with the given detail; retried next tick.
	Error(String),
}

impl fmt::Display for SyncStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncStatus::Initializing => write!(f, "Initializing"),
			SyncStatus::Disabled => write!(f, "Disabled"),
			SyncStatus::Synced => write!(f, "Synced"),
			SyncStatus::Error(detail) => write!(f, "Error: {}", detail),
		}
	}
}

/// Process-wide sync state, owned by [`SyncLoop`].
#[derive(Debug, Clone)]
pub struct SyncState {
	pub last_height: u64,
	pub last_balance_atomic_units: u64,
	pub status: SyncStatus,
	pub last_synced_at: Option<DateTime<Utc>>,
}

/// Read-only view of the sync state for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusSnapshot {
	pub last_height: u64,
	pub last_balance_atomic_units: u64,
	pub balance_xmr: String,
	pub is_syncing: bool,
	pub status_message: String,
	pub last_synced_at: Option<DateTime<Utc>>,
}

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
	Synced(WalletSnapshot),
	Failed(String),
	/// Another sync was in flight.
	Skipped,
	Disabled,
}

pub struct SyncLoop {
	wallet: Option<WalletHandle>,
	is_syncing: AtomicBool,
	state: RwLock<SyncState>,
}

/// Clears the in-flight flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

impl SyncLoop {
	pub fn new(wallet: WalletHandle) -> Self {
		Self::with_status(Some(wallet), SyncStatus::Initializing)
	}

	/// A loop that never ticks, for deployments without wallet credentials.
	pub fn disabled(reason: &str) -> Self {
		warn!("Wallet sync disabled: {}", reason);
		Self::with_status(None, SyncStatus::Disabled)
	}

	fn with_status(wallet: Option<WalletHandle>, status: SyncStatus) -> Self {
		Self {
			wallet,
			is_syncing: AtomicBool::new(false),
			state: RwLock::new(SyncState {
				last_height: 0,
				last_balance_atomic_units: 0,
				status,
				last_synced_at: None,
			}),
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.wallet.is_some()
	}

	/// Run one sync cycle unless one is already running.
	pub async fn tick(&self) -> TickOutcome {
		let Some(wallet) = &self.wallet else {
			return TickOutcome::Disabled;
		};

		if self
			.is_syncing
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			debug!("Sync already in progress, skipping tick");
			return TickOutcome::Skipped;
		}
		let _in_flight = InFlight(&self.is_syncing);

		debug!("Starting wallet sync");
		match wallet.sync_and_save().await {
			Ok(snapshot) => {
				let mut state = self.state.write().await;
				state.last_height = snapshot.height;
				state.last_balance_atomic_units = snapshot.balance_atomic_units;
				state.status = SyncStatus::Synced;
				state.last_synced_at = Some(Utc::now());

				info!(
					"Wallet synced to height {} (balance {} XMR)",
					snapshot.height,
					format_token_amount(snapshot.balance_atomic_units, XMR_DECIMALS)
				);
				TickOutcome::Synced(snapshot)
			}
			Err(e) => {
				error!("Wallet sync failed: {}", e);
				let detail = e.to_string();
				self.state.write().await.status = SyncStatus::Error(detail.clone());
				TickOutcome::Failed(detail)
			}
		}
	}

	pub async fn snapshot(&self) -> SyncStatusSnapshot {
		let state = self.state.read().await;
		SyncStatusSnapshot {
			last_height: state.last_height,
			last_balance_atomic_units: state.last_balance_atomic_units,
			balance_xmr: format_token_amount(state.last_balance_atomic_units, XMR_DECIMALS),
			is_syncing: self.is_syncing.load(Ordering::Acquire),
			status_message: state.status.to_string(),
			last_synced_at: state.last_synced_at,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::MockWallet;
	use crate::wallet::WalletTimeouts;
	use std::sync::Arc;
	use std::time::Duration;

	fn sync_loop(wallet: Arc<MockWallet>) -> SyncLoop {
		SyncLoop::new(WalletHandle::new(wallet, WalletTimeouts::default()))
	}

	#[tokio::test]
	async fn test_tick_refreshes_state() {
		let wallet = Arc::new(MockWallet::new());
		wallet.set_chain(1_234, 2_000_000_000_000);
		let sync_loop = sync_loop(wallet.clone());

		assert_eq!(sync_loop.snapshot().await.status_message, "Initializing");

		let outcome = sync_loop.tick().await;

		assert!(matches!(outcome, TickOutcome::Synced(_)));
		let status = sync_loop.snapshot().await;
		assert_eq!(status.last_height, 1_234);
		assert_eq!(status.last_balance_atomic_units, 2_000_000_000_000);
		assert_eq!(status.balance_xmr, "2.000000000000");
		assert_eq!(status.status_message, "Synced");
		assert!(!status.is_syncing);
		assert_eq!(wallet.save_count(), 1);
	}

	#[tokio::test]
	async fn test_failed_sync_reports_error_and_clears_flag() {
		let wallet = Arc::new(MockWallet::new());
		wallet.fail_sync("daemon unreachable");
		let sync_loop = sync_loop(wallet.clone());

		let outcome = sync_loop.tick().await;

		assert!(matches!(outcome, TickOutcome::Failed(_)));
		let status = sync_loop.snapshot().await;
		assert!(status.status_message.starts_with("Error: "));
		assert!(status.status_message.contains("daemon unreachable"));
		assert!(!status.is_syncing);

		// Recovers on the next tick.
		wallet.clear_sync_failure();
		assert!(matches!(sync_loop.tick().await, TickOutcome::Synced(_)));
		assert_eq!(sync_loop.snapshot().await.status_message, "Synced");
	}

	#[tokio::test]
	async fn test_overlapping_tick_is_skipped() {
		let wallet = Arc::new(MockWallet::new().with_call_delay(Duration::from_millis(50)));
		let sync_loop = Arc::new(sync_loop(wallet.clone()));

		let running = {
			let sync_loop = sync_loop.clone();
			tokio::spawn(async move { sync_loop.tick().await })
		};
		tokio::time::sleep(Duration::from_millis(10)).await;

		assert!(sync_loop.snapshot().await.is_syncing);
		assert_eq!(sync_loop.tick().await, TickOutcome::Skipped);
		assert!(matches!(running.await.unwrap(), TickOutcome::Synced(_)));
		assert_eq!(wallet.sync_count(), 1);
	}

	#[tokio::test]
	async fn test_cancelled_tick_clears_flag() {
		let wallet = Arc::new(MockWallet::new().with_call_delay(Duration::from_millis(100)));
		let sync_loop = sync_loop(wallet);

		let cancelled = tokio::time::timeout(Duration::from_millis(10), sync_loop.tick()).await;

		assert!(cancelled.is_err());
		assert!(!sync_loop.snapshot().await.is_syncing);
	}

	#[tokio::test]
	async fn test_disabled_loop_never_syncs() {
		let sync_loop = SyncLoop::disabled("WALLET_RPC_URL not set");

		assert_eq!(sync_loop.tick().await, TickOutcome::Disabled);
		assert_eq!(sync_loop.snapshot().await.status_message, "Disabled");
		assert!(!sync_loop.is_enabled());
	}
}
