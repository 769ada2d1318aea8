//! Payment channel allocation.
//!
//! Every user gets one subaddress index under [`CHANNEL_ACCOUNT`]. Indices come from a global
//! counter (`max + 1`), so reading the maximum and inserting the new row happen under one
//! process-wide lock; two first-time requests can otherwise observe the same maximum and collide.

use crate::store::{ChannelLedger, StoreError};
use crate::wallet::{CHANNEL_ACCOUNT, WalletError, WalletHandle};
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Upper bound on the time spent retrying address derivation.
const DERIVE_RETRY_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum AllocateError {
	#[error("Unknown user: {0}")]
	UnknownUser(String),

	#[error("Ledger error: {0}")]
	Store(StoreError),

	#[error("Address derivation failed: {0}")]
	Wallet(#[from] WalletError),
}

impl From<StoreError> for AllocateError {
	fn from(e: StoreError) -> Self {
		match e {
			StoreError::UnknownUser(user_id) => AllocateError::UnknownUser(user_id),
			other => AllocateError::Store(other),
		}
	}
}

/// Hands out payment channels and their receiving addresses.
pub struct Allocator {
	ledger: Arc<dyn ChannelLedger>,
	wallet: WalletHandle,
	allocation_lock: Mutex<()>,
}

impl Allocator {
	pub fn new(ledger: Arc<dyn ChannelLedger>, wallet: WalletHandle) -> Self {
		Self {
			ledger,
			wallet,
			allocation_lock: Mutex::new(()),
		}
	}

	/// Return the receiving address for `user_id`, assigning a channel on first use.
	pub async fn allocate(&self, user_id: &str) -> Result<String, AllocateError> {
		let index = match self.ledger.channel_index(user_id).await? {
			Some(index) => index,
			None => self.assign(user_id).await?,
		};

		self.derive(index).await
	}

	async fn assign(&self, user_id: &str) -> Result<u32, AllocateError> {
		let _guard = self.allocation_lock.lock().await;

		// Another request may have assigned while we waited for the lock.
		if let Some(index) = self.ledger.channel_index(user_id).await? {
			debug!("Channel {} for {} assigned concurrently", index, user_id);
			return Ok(index);
		}

		let next = self.ledger.max_channel_index().await?.map_or(1, |max| max + 1);
		self.ledger.insert_channel(user_id, next).await?;

		info!("Assigned channel {} to user {}", next, user_id);
		Ok(next)
	}

	async fn derive(&self, index: u32) -> Result<String, AllocateError> {
		let policy = ExponentialBackoff {
			initial_interval: Duration::from_millis(200),
			max_elapsed_time: Some(DERIVE_RETRY_WINDOW),
			..Default::default()
		};

		let address = backoff::future::retry(policy, || async {
			self.wallet
				.subaddress(CHANNEL_ACCOUNT, index)
				.await
				.map_err(|e| {
					warn!("Deriving address for channel {} failed: {}", index, e);
					backoff::Error::transient(e)
				})
		})
		.await?;

		Ok(address)
	}
}
