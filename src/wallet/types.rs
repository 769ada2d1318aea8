use serde::{Deserialize, Serialize};

/// Incoming transfer as reported by the wallet engine for one subaddress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
	#[serde(default)]
	pub txid: String,
	/// Amount in atomic units.
	#[serde(default)]
	pub amount: u64,
	/// Blocks mined on top of the transfer's block. Pool transfers report 0.
	#[serde(default)]
	pub confirmations: u64,
	#[serde(default)]
	pub height: u64,
}

/// Height and balance observed after a completed sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletSnapshot {
	pub height: u64,
	pub balance_atomic_units: u64,
}

/// Error types for wallet engine access
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
	#[error("Wallet RPC error {code}: {message}")]
	RpcError { code: i64, message: String },

	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("No result returned for {0}")]
	NoData(&'static str),

	#[error("Wallet call {0} timed out after {1}s")]
	Timeout(&'static str, u64),
}
