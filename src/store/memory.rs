use super::{
	ChannelLedger, ProvisionedUser, StoreError, UserChannel, UserRecord, UserStore, UserTable,
};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Non-persistent store, for embedding and tests.
#[derive(Default)]
pub struct MemoryUserStore {
	table: Mutex<UserTable>,
}

impl MemoryUserStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn register_user(&self, user_id: &str) -> bool {
		self.table.lock().await.register(user_id)
	}

	pub async fn remove_user(&self, user_id: &str) -> Option<UserRecord> {
		self.table.lock().await.remove(user_id)
	}

	pub async fn user(&self, user_id: &str) -> Option<UserRecord> {
		self.table.lock().await.get(user_id).cloned()
	}
}

#[async_trait::async_trait]
impl ChannelLedger for MemoryUserStore {
	async fn channel_index(&self, user_id: &str) -> Result<Option<u32>, StoreError> {
		self.table.lock().await.channel_index(user_id)
	}

	async fn max_channel_index(&self) -> Result<Option<u32>, StoreError> {
		Ok(self.table.lock().await.max_channel_index())
	}

	async fn insert_channel(&self, user_id: &str, channel_index: u32) -> Result<(), StoreError> {
		self.table.lock().await.insert_channel(user_id, channel_index)
	}
}

#[async_trait::async_trait]
impl UserStore for MemoryUserStore {
	async fn pending_activations(&self) -> Result<Vec<UserChannel>, StoreError> {
		Ok(self.table.lock().await.pending_activations())
	}

	async fn activate(&self, user_id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
		self.table.lock().await.activate(user_id, at)
	}

	async fn record_address(
		&self,
		user_id: &str,
		display_name: &str,
		address: &str,
	) -> Result<(), StoreError> {
		self.table
			.lock()
			.await
			.record_address(user_id, display_name, address)
	}

	async fn provisioned_users(&self) -> Result<Vec<ProvisionedUser>, StoreError> {
		Ok(self.table.lock().await.provisioned_users())
	}
}
