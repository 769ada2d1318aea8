//! JSON file implementation of the user table.
//!
//! The whole table is kept in memory and rewritten on every mutation: the new contents go to a
//! sibling temp file which is then renamed over the data file, so a crash mid-write leaves the
//! previous version intact. A mutation is only applied in memory once the write has succeeded.

use super::{
	ChannelLedger, ProvisionedUser, StoreError, UserChannel, UserRecord, UserStore, UserTable,
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// File-backed user store
pub struct FileUserStore {
	path: PathBuf,
	table: Mutex<UserTable>,
}

impl FileUserStore {
	/// Open the store at `path`, starting empty if the file does not exist yet.
	pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		let table = match tokio::fs::read_to_string(&path).await {
			Ok(content) => {
				let table: UserTable = serde_json::from_str(&content)?;
				info!("Loaded user table from {:?}", path);
				table
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				info!("No user table at {:?}, starting empty", path);
				UserTable::default()
			}
			Err(e) => return Err(e.into()),
		};

		Ok(Self {
			path,
			table: Mutex::new(table),
		})
	}

	pub async fn register_user(&self, user_id: &str) -> Result<bool, StoreError> {
		self.mutate(|table| Ok(table.register(user_id))).await
	}

	pub async fn remove_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
		self.mutate(|table| Ok(table.remove(user_id))).await
	}

	pub async fn user(&self, user_id: &str) -> Option<UserRecord> {
		self.table.lock().await.get(user_id).cloned()
	}

	/// Apply `change` to a copy of the table, persist it, then swap it in.
	async fn mutate<T>(
		&self,
		change: impl FnOnce(&mut UserTable) -> Result<T, StoreError>,
	) -> Result<T, StoreError> {
		let mut guard = self.table.lock().await;
		let mut next = guard.clone();
		let outcome = change(&mut next)?;

		self.write(&next).await?;
		*guard = next;
		Ok(outcome)
	}

	async fn write(&self, table: &UserTable) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent).await?;
		}

		let tmp_path = self.path.with_extension("json.tmp");
		tokio::fs::write(&tmp_path, serde_json::to_vec_pretty(table)?).await?;
		tokio::fs::rename(&tmp_path, &self.path).await?;

		debug!("Saved user table to {:?}", self.path);
		Ok(())
	}
}

#[async_trait::async_trait]
impl ChannelLedger for FileUserStore {
	async fn channel_index(&self, user_id: &str) -> Result<Option<u32>, StoreError> {
		self.table.lock().await.channel_index(user_id)
	}

	async fn max_channel_index(&self) -> Result<Option<u32>, StoreError> {
		Ok(self.table.lock().await.max_channel_index())
	}

	async fn insert_channel(&self, user_id: &str, channel_index: u32) -> Result<(), StoreError> {
		self.mutate(|table| table.insert_channel(user_id, channel_index))
			.await
	}
}

#[async_trait::async_trait]
impl UserStore for FileUserStore {
	async fn pending_activations(&self) -> Result<Vec<UserChannel>, StoreError> {
		Ok(self.table.lock().await.pending_activations())
	}

	async fn activate(&self, user_id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
		// Skip the rewrite when the user is already active.
		if self
			.table
			.lock()
			.await
			.get(user_id)
			.is_some_and(|user| user.is_premium)
		{
			return Ok(false);
		}
		self.mutate(|table| table.activate(user_id, at)).await
	}

	async fn record_address(
		&self,
		user_id: &str,
		display_name: &str,
		address: &str,
	) -> Result<(), StoreError> {
		self.mutate(|table| table.record_address(user_id, display_name, address))
			.await
	}

	async fn provisioned_users(&self) -> Result<Vec<ProvisionedUser>, StoreError> {
		Ok(self.table.lock().await.provisioned_users())
	}
}
