use super::{ProvisionedUser, StoreError, UserChannel, UserRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// In-memory user table shared by the store implementations.
///
/// `max_assigned_index` is a high-water mark: it survives user deletion so a freed index is
/// never handed out again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserTable {
	#[serde(default)]
	max_assigned_index: u32,
	#[serde(default)]
	users: BTreeMap<String, UserRecord>,
}

impl UserTable {
	/// Add a user row. Returns `false` if the user already exists.
	pub fn register(&mut self, user_id: &str) -> bool {
		if self.users.contains_key(user_id) {
			return false;
		}
		self.users.insert(
			user_id.to_string(),
			UserRecord {
				user_id: user_id.to_string(),
				..Default::default()
			},
		);
		true
	}

	pub fn remove(&mut self, user_id: &str) -> Option<UserRecord> {
		self.users.remove(user_id)
	}

	pub fn get(&self, user_id: &str) -> Option<&UserRecord> {
		self.users.get(user_id)
	}

	fn get_mut(&mut self, user_id: &str) -> Result<&mut UserRecord, StoreError> {
		self.users
			.get_mut(user_id)
			.ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))
	}

	pub fn channel_index(&self, user_id: &str) -> Result<Option<u32>, StoreError> {
		self.users
			.get(user_id)
			.map(|user| user.channel_index)
			.ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))
	}

	pub fn max_channel_index(&self) -> Option<u32> {
		let highest_row = self
			.users
			.values()
			.filter_map(|user| user.channel_index)
			.max()
			.unwrap_or(0);
		Some(highest_row.max(self.max_assigned_index)).filter(|index| *index > 0)
	}

	pub fn insert_channel(&mut self, user_id: &str, index: u32) -> Result<(), StoreError> {
		if index == 0 || Some(index) <= self.max_channel_index() {
			return Err(StoreError::IndexUnavailable(index));
		}

		let user = self.get_mut(user_id)?;
		if let Some(existing) = user.channel_index {
			return Err(StoreError::AlreadyAssigned {
				user_id: user_id.to_string(),
				index: existing,
			});
		}
		user.channel_index = Some(index);
		self.max_assigned_index = index;
		Ok(())
	}

	pub fn pending_activations(&self) -> Vec<UserChannel> {
		self.users
			.values()
			.filter(|user| !user.is_premium)
			.filter_map(|user| {
				user.channel_index.map(|channel_index| UserChannel {
					user_id: user.user_id.clone(),
					channel_index,
				})
			})
			.collect()
	}

	pub fn activate(&mut self, user_id: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
		let user = self.get_mut(user_id)?;
		if user.is_premium {
			return Ok(false);
		}
		user.is_premium = true;
		user.activated_at = Some(at);
		Ok(true)
	}

	pub fn record_address(
		&mut self,
		user_id: &str,
		display_name: &str,
		address: &str,
	) -> Result<(), StoreError> {
		let user = self.get_mut(user_id)?;
		user.display_name = Some(display_name.to_string());
		user.address = Some(address.to_string());
		Ok(())
	}

	pub fn provisioned_users(&self) -> Vec<ProvisionedUser> {
		self.users
			.values()
			.filter_map(|user| {
				user.address.as_ref().map(|address| ProvisionedUser {
					user_id: user.user_id.clone(),
					display_name: user
						.display_name
						.clone()
						.unwrap_or_else(|| user.user_id.clone()),
					address: address.clone(),
				})
			})
			.collect()
	}
}
