//! Persistence for the user table the pipeline shares with its collaborators.
//!
//! Two repository traits split the table by concern: [`ChannelLedger`] is the user → channel
//! index mapping the allocator writes, and [`UserStore`] carries the activation and alias fields
//! the payment watcher and DNS reconciliation read and write. Both are implemented by
//! [`MemoryUserStore`] and the JSON-backed [`FileUserStore`].

mod file;
mod memory;
mod table;

pub use file::FileUserStore;
pub use memory::MemoryUserStore;
pub use table::UserTable;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's assigned payment channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserChannel {
	pub user_id: String,
	pub channel_index: u32,
}

/// A user whose payment alias should exist in the zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedUser {
	pub user_id: String,
	pub display_name: String,
	pub address: String,
}

/// One row of the user table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
	pub user_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub channel_index: Option<u32>,
	#[serde(default)]
	pub is_premium: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub activated_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Unknown user: {0}")]
	UnknownUser(String),

	#[error("User {user_id} already holds channel {index}")]
	AlreadyAssigned { user_id: String, index: u32 },

	#[error("Channel index {0} is not available")]
	IndexUnavailable(u32),
}

/// Repository for the user → channel index mapping.
#[async_trait::async_trait]
pub trait ChannelLedger: Send + Sync {
	/// Channel assigned to `user_id`, if any. Fails with `UnknownUser` for users not in the table.
	async fn channel_index(&self, user_id: &str) -> Result<Option<u32>, StoreError>;

	/// Highest index ever assigned, including indices of deleted users.
	async fn max_channel_index(&self) -> Result<Option<u32>, StoreError>;

	/// Durably record a new assignment. Indices at or below the high-water mark are rejected.
	async fn insert_channel(&self, user_id: &str, channel_index: u32) -> Result<(), StoreError>;
}

/// Repository for activation and alias state.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
	/// Users with a channel and `is_premium = false`.
	async fn pending_activations(&self) -> Result<Vec<UserChannel>, StoreError>;

	/// Flip `is_premium`. Returns `false` without writing when the user was already active.
	async fn activate(&self, user_id: &str, at: DateTime<Utc>) -> Result<bool, StoreError>;

	async fn record_address(
		&self,
		user_id: &str,
		display_name: &str,
		address: &str,
	) -> Result<(), StoreError>;

	/// Users with a recorded payment address.
	async fn provisioned_users(&self) -> Result<Vec<ProvisionedUser>, StoreError>;
}
