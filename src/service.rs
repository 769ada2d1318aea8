//! Pipeline wiring and lifecycle.
//!
//! [`Pipeline`] owns one instance of every component and exposes the operations external callers
//! use. [`Pipeline::start`] spawns the periodic wallet sync and payment check tasks; the returned
//! [`PipelineTasks`] stops them. Shutdown is only observed between ticks, so a tick that already
//! started (and any store or zone write it issued) runs to completion.

use crate::allocator::{AllocateError, Allocator};
use crate::config::Schedule;
use crate::dns::{BatchSyncDriver, DnsReconciler, ReconcileError, SyncAllReport, alias_label};
use crate::payments::PaymentWatcher;
use crate::store::{ChannelLedger, StoreError, UserStore};
use crate::sync::{SyncLoop, SyncStatusSnapshot, TickOutcome};
use crate::wallet::WalletHandle;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
	#[error("Wallet is not configured")]
	WalletDisabled,

	#[error("DNS alias management is not configured")]
	DnsDisabled,

	#[error(transparent)]
	Allocate(#[from] AllocateError),

	#[error(transparent)]
	Reconcile(#[from] ReconcileError),

	#[error("Store error: {0}")]
	Store(#[from] StoreError),
}

pub struct Pipeline {
	store: Arc<dyn UserStore>,
	allocator: Option<Allocator>,
	sync_loop: Arc<SyncLoop>,
	watcher: Option<Arc<PaymentWatcher>>,
	reconciler: Option<Arc<DnsReconciler>>,
	batch: Option<BatchSyncDriver>,
	schedule: Schedule,
}

/// Handles of the running periodic tasks.
pub struct PipelineTasks {
	shutdown: watch::Sender<bool>,
	handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
	/// Wire the components around one store.
	///
	/// Without a wallet the sync loop is disabled and allocation and payment checks are off.
	/// Without a reconciler addresses are still recorded but no zone writes happen.
	pub fn new<S>(
		store: Arc<S>,
		wallet: Option<WalletHandle>,
		reconciler: Option<DnsReconciler>,
		schedule: Schedule,
	) -> Self
	where
		S: ChannelLedger + UserStore + 'static,
	{
		let ledger: Arc<dyn ChannelLedger> = store.clone();
		let users: Arc<dyn UserStore> = store;

		let (allocator, sync_loop, watcher) = match wallet {
			Some(wallet) => (
				Some(Allocator::new(ledger, wallet.clone())),
				SyncLoop::new(wallet.clone()),
				Some(Arc::new(PaymentWatcher::new(users.clone(), wallet))),
			),
			None => (None, SyncLoop::disabled("no wallet configured"), None),
		};

		let reconciler = reconciler.map(Arc::new);
		let batch = reconciler
			.as_ref()
			.map(|reconciler| BatchSyncDriver::new(users.clone(), reconciler.clone()));

		Self {
			store: users,
			allocator,
			sync_loop: Arc::new(sync_loop),
			watcher,
			reconciler,
			batch,
			schedule,
		}
	}

	/// Spawn the periodic tasks. Each fires immediately, then on its interval.
	pub fn start(&self) -> PipelineTasks {
		let (shutdown, _) = watch::channel(false);
		let mut handles = Vec::new();

		if self.sync_loop.is_enabled() {
			let sync_loop = self.sync_loop.clone();
			handles.push(spawn_periodic(
				"wallet sync",
				self.schedule.sync_interval,
				shutdown.subscribe(),
				move || {
					let sync_loop = sync_loop.clone();
					async move {
						if let TickOutcome::Skipped = sync_loop.tick().await {
							debug!("Previous wallet sync still running");
						}
					}
				},
			));
		}

		if let Some(watcher) = &self.watcher {
			let watcher = watcher.clone();
			handles.push(spawn_periodic(
				"payment check",
				self.schedule.watch_interval,
				shutdown.subscribe(),
				move || {
					let watcher = watcher.clone();
					async move {
						if let Err(e) = watcher.tick().await {
							error!("Payment check failed: {}", e);
						}
					}
				},
			));
		}

		PipelineTasks { shutdown, handles }
	}

	/// Payment address for `user_id`, allocating a channel on first call.
	pub async fn allocate(&self, user_id: &str) -> Result<String, PipelineError> {
		let allocator = self.allocator.as_ref().ok_or(PipelineError::WalletDisabled)?;
		Ok(allocator.allocate(user_id).await?)
	}

	/// Store the user's alias data, then reconcile the zone in the background.
	///
	/// Returns once the address is persisted. The reconcile runs on its own task so the caller
	/// going away does not cancel a zone write; its result is only logged. The handle is returned
	/// for callers that want to wait on it, and is `None` when DNS management is off.
	pub async fn record_address_and_reconcile(
		&self,
		user_id: &str,
		display_name: &str,
		address: &str,
	) -> Result<Option<JoinHandle<()>>, PipelineError> {
		alias_label(display_name)?;
		self.store
			.record_address(user_id, display_name, address)
			.await?;

		let Some(reconciler) = &self.reconciler else {
			warn!(
				"Recorded address for user {} but DNS alias management is disabled",
				user_id
			);
			return Ok(None);
		};

		let reconciler = reconciler.clone();
		let (user_id, display_name, address) = (
			user_id.to_string(),
			display_name.to_string(),
			address.to_string(),
		);
		Ok(Some(tokio::spawn(async move {
			match reconciler
				.reconcile(&user_id, &display_name, &address)
				.await
			{
				Ok(outcome) => debug!("Alias reconcile for user {}: {:?}", user_id, outcome),
				Err(e) => error!("Alias reconcile for user {} failed: {}", user_id, e),
			}
		})))
	}

	pub async fn sync_status(&self) -> SyncStatusSnapshot {
		self.sync_loop.snapshot().await
	}

	/// Run one wallet sync now and return the resulting status.
	pub async fn sync_once(&self) -> SyncStatusSnapshot {
		self.sync_loop.tick().await;
		self.sync_loop.snapshot().await
	}

	pub async fn sync_all(&self) -> Result<SyncAllReport, PipelineError> {
		let batch = self.batch.as_ref().ok_or(PipelineError::DnsDisabled)?;
		Ok(batch.sync_all().await?)
	}
}

impl PipelineTasks {
	pub fn len(&self) -> usize {
		self.handles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.handles.is_empty()
	}

	/// Signal every task and wait for them to finish their current tick.
	pub async fn shutdown(self) {
		info!("Stopping {} background tasks", self.handles.len());
		let _ = self.shutdown.send(true);
		for handle in self.handles {
			if let Err(e) = handle.await {
				error!("Background task ended abnormally: {}", e);
			}
		}
	}
}

fn spawn_periodic<F, Fut>(
	name: &'static str,
	period: Duration,
	mut shutdown: watch::Receiver<bool>,
	mut job: F,
) -> JoinHandle<()>
where
	F: FnMut() -> Fut + Send + 'static,
	Fut: Future<Output = ()> + Send + 'static,
{
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(period);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
		info!("Started {} task, every {}s", name, period.as_secs());

		loop {
			tokio::select! {
				_ = shutdown.changed() => break,
				_ = interval.tick() => job().await,
			}
		}
		info!("Stopped {} task", name);
	})
}
