//! Wallet engine integration.
//!
//! The wallet engine is an external black box that scans the chain for the master wallet and
//! answers queries about subaddresses and their transfers. [`WalletEngine`] is the seam the rest
//! of the pipeline depends on; [`WalletRpcClient`] is the production implementation.
//!
//! The engine handle is a single shared mutable resource. [`WalletHandle`] owns it behind one
//! async mutex so the sync loop, the payment watcher and the allocator never call into the
//! engine at the same time, and bounds every call with a timeout.

/// JSON-RPC client for monero-wallet-rpc
mod rpc;
/// Type definitions for wallet data and errors
mod types;

pub use rpc::WalletRpcClient;
pub use types::*;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Account whose subaddresses are handed out as payment channels.
pub const CHANNEL_ACCOUNT: u32 = 0;

/// Operations the pipeline needs from the wallet engine.
#[async_trait::async_trait]
pub trait WalletEngine: Send + Sync {
	/// Scan the chain up to the current tip.
	async fn sync(&self) -> Result<(), WalletError>;

	/// Persist the engine's wallet state.
	async fn save(&self) -> Result<(), WalletError>;

	/// Total balance of the channel account in atomic units.
	async fn balance(&self) -> Result<u64, WalletError>;

	/// Height the engine has scanned to.
	async fn height(&self) -> Result<u64, WalletError>;

	/// Derive the receiving address for `(account, index)`. Pure: no state changes.
	async fn subaddress(&self, account: u32, index: u32) -> Result<String, WalletError>;

	/// Transfers addressed to `(account, index)`.
	async fn transfers(
		&self,
		account: u32,
		index: u32,
		incoming_only: bool,
	) -> Result<Vec<Transfer>, WalletError>;
}

/// Timeouts applied to wallet engine calls.
#[derive(Debug, Clone, Copy)]
pub struct WalletTimeouts {
	/// Bound for a full sync + save cycle.
	pub sync: Duration,
	/// Bound for queries and address derivation.
	pub call: Duration,
}

impl Default for WalletTimeouts {
	fn default() -> Self {
		Self {
			sync: Duration::from_secs(600),
			call: Duration::from_secs(30),
		}
	}
}

/// Serialized, time-bounded access to the shared wallet engine.
#[derive(Clone)]
pub struct WalletHandle {
	engine: Arc<dyn WalletEngine>,
	gate: Arc<Mutex<()>>,
	timeouts: WalletTimeouts,
}

impl WalletHandle {
	pub fn new(engine: Arc<dyn WalletEngine>, timeouts: WalletTimeouts) -> Self {
		Self {
			engine,
			gate: Arc::new(Mutex::new(())),
			timeouts,
		}
	}

	/// Run sync, save, balance and height as one exclusive unit.
	pub async fn sync_and_save(&self) -> Result<WalletSnapshot, WalletError> {
		let engine = &self.engine;

		self.exclusive("sync", self.timeouts.sync, async {
			engine.sync().await?;
			engine.save().await?;
			let balance_atomic_units = engine.balance().await?;
			let height = engine.height().await?;
			Ok::<_, WalletError>(WalletSnapshot {
				height,
				balance_atomic_units,
			})
		})
		.await
	}

	/// Derive the channel address for `(account, index)`.
	pub async fn subaddress(&self, account: u32, index: u32) -> Result<String, WalletError> {
		debug!("Deriving subaddress ({}, {})", account, index);
		self.exclusive(
			"subaddress",
			self.timeouts.call,
			self.engine.subaddress(account, index),
		)
		.await
	}

	/// Incoming transfers for `(account, index)`. Queues behind a running sync, up to the call
	/// timeout.
	pub async fn incoming_transfers(
		&self,
		account: u32,
		index: u32,
	) -> Result<Vec<Transfer>, WalletError> {
		self.exclusive(
			"transfers",
			self.timeouts.call,
			self.engine.transfers(account, index, true),
		)
		.await
	}

	/// Run `call` while holding the gate. `limit` covers the wait for the gate as well as the call.
	async fn exclusive<T>(
		&self,
		what: &'static str,
		limit: Duration,
		call: impl Future<Output = Result<T, WalletError>>,
	) -> Result<T, WalletError> {
		tokio::time::timeout(limit, async {
			let _guard = self.gate.lock().await;
			call.await
		})
		.await
		.map_err(|_| WalletError::Timeout(what, limit.as_secs()))?
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::MockWallet;

	#[tokio::test]
	async fn test_handle_serializes_engine_access() {
		let wallet = Arc::new(MockWallet::new().with_call_delay(Duration::from_millis(20)));
		wallet.set_transfers(1, vec![]);
		let handle = WalletHandle::new(wallet.clone(), WalletTimeouts::default());

		let tasks: Vec<_> = (0..4)
			.map(|_| {
				let handle = handle.clone();
				tokio::spawn(async move { handle.incoming_transfers(0, 1).await })
			})
			.collect();
		let sync = handle.sync_and_save();

		let (sync_result, results) = tokio::join!(sync, futures::future::join_all(tasks));
		sync_result.unwrap();
		for result in results {
			result.unwrap().unwrap();
		}

		assert_eq!(wallet.max_concurrent_calls(), 1);
	}

	#[tokio::test]
	async fn test_query_queued_behind_sync_times_out_on_call_limit() {
		let wallet = Arc::new(MockWallet::new().with_call_delay(Duration::from_millis(200)));
		let handle = WalletHandle::new(
			wallet,
			WalletTimeouts {
				sync: Duration::from_secs(5),
				call: Duration::from_millis(300),
			},
		);

		let sync = {
			let handle = handle.clone();
			tokio::spawn(async move { handle.sync_and_save().await })
		};
		tokio::time::sleep(Duration::from_millis(20)).await;

		let started = std::time::Instant::now();
		let err = handle.subaddress(0, 1).await.unwrap_err();

		assert!(matches!(err, WalletError::Timeout("subaddress", _)));
		assert!(started.elapsed() < Duration::from_millis(700));
		sync.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_stuck_engine_times_out() {
		let wallet = Arc::new(MockWallet::new().with_call_delay(Duration::from_millis(200)));
		let handle = WalletHandle::new(
			wallet,
			WalletTimeouts {
				sync: Duration::from_millis(50),
				call: Duration::from_millis(50),
			},
		);

		let err = handle.subaddress(0, 1).await.unwrap_err();
		assert!(matches!(err, WalletError::Timeout("subaddress", _)));
	}
}
