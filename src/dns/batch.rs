//! Operator-triggered sweep that reconciles every provisioned user's alias.

use super::reconciler::{DnsReconciler, ReconcileOutcome};
use crate::store::{StoreError, UserStore};

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Aggregate result of a sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncAllReport {
	pub success_count: usize,
	pub failure_count: usize,
	/// One line per user, in processing order.
	pub log: Vec<String>,
}

pub struct BatchSyncDriver {
	store: Arc<dyn UserStore>,
	reconciler: Arc<DnsReconciler>,
}

impl BatchSyncDriver {
	pub fn new(store: Arc<dyn UserStore>, reconciler: Arc<DnsReconciler>) -> Self {
		Self { store, reconciler }
	}

	/// Reconcile all users with a recorded address, one at a time.
	///
	/// A failing user is logged in the report and the sweep moves on; only failing to list the
	/// users aborts it.
	pub async fn sync_all(&self) -> Result<SyncAllReport, StoreError> {
		let users = self.store.provisioned_users().await?;
		info!("Reconciling payment aliases for {} users", users.len());

		let mut report = SyncAllReport::default();
		for user in users {
			match self
				.reconciler
				.reconcile(&user.user_id, &user.display_name, &user.address)
				.await
			{
				Ok(outcome) => {
					report.success_count += 1;
					report.log.push(match outcome {
						ReconcileOutcome::Applied { .. } => format!("✓ {}", user.display_name),
						ReconcileOutcome::Unchanged => {
							format!("✓ {} (unchanged)", user.display_name)
						}
					});
				}
				Err(e) => {
					error!("Alias sync for user {} failed: {}", user.user_id, e);
					report.failure_count += 1;
					report.log.push(format!("✗ {}: {}", user.display_name, e));
				}
			}
		}

		info!(
			"Alias sweep finished: {} succeeded, {} failed",
			report.success_count, report.failure_count
		);
		Ok(report)
	}
}
