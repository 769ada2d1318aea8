//! Payment detection and account activation.
//!
//! Each tick walks the users that hold a channel but are not yet premium, asks the wallet engine
//! for incoming transfers on their subaddress and activates the user on the first confirmed one.
//! Activated users drop out of the candidate set, so nobody is evaluated twice. A failure for one
//! user is logged and counted and the remaining users are still processed.

use crate::store::{StoreError, UserChannel, UserStore};
use crate::wallet::{CHANNEL_ACCOUNT, Transfer, WalletError, WalletHandle};

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Confirmations required before a transfer activates its user.
///
/// A single confirmation is not reorg-safe; a transfer that is later orphaned still leaves the
/// user activated.
pub const MIN_CONFIRMATIONS: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	#[error("Wallet error: {0}")]
	Wallet(#[from] WalletError),
}

/// Counters for one watcher tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchReport {
	pub checked: usize,
	pub activated: usize,
	pub failed: usize,
}

pub struct PaymentWatcher {
	store: Arc<dyn UserStore>,
	wallet: WalletHandle,
}

impl PaymentWatcher {
	pub fn new(store: Arc<dyn UserStore>, wallet: WalletHandle) -> Self {
		Self { store, wallet }
	}

	/// Check every pending user once.
	///
	/// Only listing the candidates can fail the tick as a whole.
	pub async fn tick(&self) -> Result<WatchReport, WatchError> {
		let pending = self.store.pending_activations().await?;
		let mut report = WatchReport::default();

		for user in &pending {
			report.checked += 1;
			match self.check_user(user).await {
				Ok(true) => report.activated += 1,
				Ok(false) => {}
				Err(e) => {
					report.failed += 1;
					error!(
						"Payment check for user {} (channel {}) failed: {}",
						user.user_id, user.channel_index, e
					);
				}
			}
		}

		if report.checked > 0 {
			info!(
				"Payment check: {} pending, {} activated, {} failed",
				report.checked, report.activated, report.failed
			);
		}
		Ok(report)
	}

	async fn check_user(&self, user: &UserChannel) -> Result<bool, WatchError> {
		let transfers = self
			.wallet
			.incoming_transfers(CHANNEL_ACCOUNT, user.channel_index)
			.await?;

		let Some(confirmed) = first_confirmed(&transfers) else {
			debug!(
				"No confirmed payment for user {} across {} transfers",
				user.user_id,
				transfers.len()
			);
			return Ok(false);
		};

		let written = self.store.activate(&user.user_id, Utc::now()).await?;
		if written {
			info!(
				"Activated user {} after payment {} ({} confirmations)",
				user.user_id, confirmed.txid, confirmed.confirmations
			);
		} else {
			warn!("User {} was already active", user.user_id);
		}
		Ok(written)
	}
}

fn first_confirmed(transfers: &[Transfer]) -> Option<&Transfer> {
	transfers
		.iter()
		.find(|transfer| transfer.confirmations >= MIN_CONFIRMATIONS)
}
