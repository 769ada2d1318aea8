//!
//! JSON-RPC client for a running `monero-wallet-rpc` instance.
//!
//! The wallet daemon owns the keys and the blockchain scan. This client only forwards the handful
//! of calls the pipeline needs and maps them onto the [`WalletEngine`] trait. Calls must not be
//! issued concurrently against the same wallet, which is why the pipeline only ever reaches this
//! client through a [`super::WalletHandle`].

use super::WalletEngine;
use super::types::{Transfer, WalletError};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// monero-wallet-rpc client
#[derive(Clone)]
pub struct WalletRpcClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Full URL of the `/json_rpc` endpoint.
	rpc_url: String,
	/// Optional basic-auth credentials.
	credentials: Option<(String, String)>,
}

#[derive(Deserialize)]
struct BalanceResult {
	balance: u64,
}

#[derive(Deserialize)]
struct HeightResult {
	height: u64,
}

#[derive(Deserialize)]
struct AddressEntry {
	address: String,
	address_index: u32,
}

#[derive(Deserialize)]
struct AddressResult {
	address: String,
	#[serde(default)]
	addresses: Vec<AddressEntry>,
}

#[derive(Deserialize)]
struct TransfersResult {
	#[serde(rename = "in", default)]
	incoming: Vec<Transfer>,
	#[serde(default)]
	pool: Vec<Transfer>,
	#[serde(rename = "out", default)]
	outgoing: Vec<Transfer>,
}

impl WalletRpcClient {
	/// Create a new wallet RPC client.
	///
	/// # Arguments
	/// * `base_url` - Base URL of the wallet daemon, e.g. `http://127.0.0.1:18083`.
	/// * `credentials` - Optional `(user, password)` for the daemon's RPC login.
	/// * `timeout` - Upper bound for a single HTTP round trip.
	pub fn new(
		base_url: &str,
		credentials: Option<(String, String)>,
		timeout: Duration,
	) -> Result<Self, WalletError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			rpc_url: format!("{}/json_rpc", base_url.trim_end_matches('/')),
			credentials,
		})
	}

	/// Execute a JSON-RPC call and return its `result` member.
	///
	/// # Errors
	/// `WalletError::RpcError` when the daemon answers with an `error` object,
	/// `WalletError::NoData` when neither `result` nor `error` is present.
	pub async fn call(
		&self,
		method: &'static str,
		params: serde_json::Value,
	) -> Result<serde_json::Value, WalletError> {
		let request_body = json!({
			"jsonrpc": "2.0",
			"id": "0",
			"method": method,
			"params": params,
		});

		debug!("Calling wallet RPC method {}", method);

		let mut request = self.http_client.post(&self.rpc_url).json(&request_body);
		if let Some((user, password)) = &self.credentials {
			request = request.basic_auth(user, Some(password));
		}

		let response = request.send().await?.error_for_status()?;
		let mut response_json: serde_json::Value = response.json().await?;

		if let Some(error) = response_json.get("error") {
			return Err(WalletError::RpcError {
				code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
				message: error
					.get("message")
					.and_then(|m| m.as_str())
					.unwrap_or("unknown wallet error")
					.to_string(),
			});
		}

		response_json
			.get_mut("result")
			.map(serde_json::Value::take)
			.ok_or(WalletError::NoData(method))
	}
}

#[async_trait::async_trait]
impl WalletEngine for WalletRpcClient {
	async fn sync(&self) -> Result<(), WalletError> {
		let result = self.call("refresh", json!({})).await?;
		debug!(
			"Wallet refresh fetched {} blocks",
			result.get("blocks_fetched").and_then(|b| b.as_u64()).unwrap_or(0)
		);
		Ok(())
	}

	async fn save(&self) -> Result<(), WalletError> {
		self.call("store", json!({})).await?;
		Ok(())
	}

	async fn balance(&self) -> Result<u64, WalletError> {
		let result = self.call("get_balance", json!({ "account_index": 0 })).await?;
		Ok(serde_json::from_value::<BalanceResult>(result)?.balance)
	}

	async fn height(&self) -> Result<u64, WalletError> {
		let result = self.call("get_height", json!({})).await?;
		Ok(serde_json::from_value::<HeightResult>(result)?.height)
	}

	async fn subaddress(&self, account: u32, index: u32) -> Result<String, WalletError> {
		let result = self
			.call(
				"get_address",
				json!({ "account_index": account, "address_index": [index] }),
			)
			.await?;
		let parsed: AddressResult = serde_json::from_value(result)?;

		// Index 0 is the account's primary address and is reported at the top level.
		if index == 0 && parsed.addresses.is_empty() {
			return Ok(parsed.address);
		}

		parsed
			.addresses
			.into_iter()
			.find(|entry| entry.address_index == index)
			.map(|entry| entry.address)
			.ok_or(WalletError::NoData("get_address"))
	}

	async fn transfers(
		&self,
		account: u32,
		index: u32,
		incoming_only: bool,
	) -> Result<Vec<Transfer>, WalletError> {
		let result = self
			.call(
				"get_transfers",
				json!({
					"in": true,
					"pool": true,
					"out": !incoming_only,
					"account_index": account,
					"subaddr_indices": [index],
				}),
			)
			.await?;
		let parsed: TransfersResult = serde_json::from_value(result)?;

		let mut transfers = parsed.incoming;
		transfers.extend(parsed.pool);
		if !incoming_only {
			transfers.extend(parsed.outgoing);
		}
		Ok(transfers)
	}
}
