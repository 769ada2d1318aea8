//! Configuration
//!
//! CLI arguments with environment variable fallbacks using clap. A `.env` file is loaded by the
//! binary before parsing. Missing credentials are not fatal: the component that needs them is
//! disabled and reports so through its status.

use crate::dns::{AliasSettings, CpanelCredentials, ZONE_TIMEOUT};
use crate::wallet::WalletTimeouts;

use clap::{Parser, Subcommand};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Links user accounts to Monero payment channels and publishes their OpenAlias records
#[derive(Parser, Debug, Clone)]
#[command(name = "xmr-alias-sync")]
#[command(about = "Payment channel allocation, payment detection and DNS alias reconciliation")]
pub struct Args {
	#[command(subcommand)]
	pub command: Option<Command>,

	/// Base URL of monero-wallet-rpc. Without it wallet sync and payment checks are disabled
	#[arg(long, env = "WALLET_RPC_URL")]
	pub wallet_rpc_url: Option<String>,

	/// RPC login user for monero-wallet-rpc
	#[arg(long, env = "WALLET_RPC_USER")]
	pub wallet_rpc_user: Option<String>,

	/// RPC login password for monero-wallet-rpc
	#[arg(long, env = "WALLET_RPC_PASSWORD", hide_env_values = true)]
	pub wallet_rpc_password: Option<String>,

	/// Timeout for wallet queries and address derivation
	#[arg(long, env = "WALLET_TIMEOUT_SECS", default_value = "30")]
	pub wallet_timeout_secs: u64,

	/// Timeout for a full wallet sync cycle
	#[arg(long, env = "WALLET_SYNC_TIMEOUT_SECS", default_value = "600")]
	pub wallet_sync_timeout_secs: u64,

	/// Seconds between wallet syncs
	#[arg(long, env = "SYNC_INTERVAL_SECS", default_value = "120")]
	pub sync_interval_secs: u64,

	/// Seconds between payment checks
	#[arg(long, env = "WATCH_INTERVAL_SECS", default_value = "120")]
	pub watch_interval_secs: u64,

	/// Hosting panel base URL, e.g. https://host.example.com:2083
	#[arg(long, env = "CPANEL_URL")]
	pub cpanel_url: Option<String>,

	#[arg(long, env = "CPANEL_USER")]
	pub cpanel_user: Option<String>,

	#[arg(long, env = "CPANEL_API_TOKEN", hide_env_values = true)]
	pub cpanel_api_token: Option<String>,

	/// Zone holding the payment aliases
	#[arg(long, env = "DNS_ZONE")]
	pub dns_zone: Option<String>,

	/// Address the per-user A records point to
	#[arg(long, env = "ALIAS_TARGET_IP")]
	pub alias_target_ip: Option<Ipv4Addr>,

	/// TTL of alias records
	#[arg(long, env = "DNS_TTL", default_value = "14400")]
	pub dns_ttl: u32,

	/// Timeout for zone API requests
	#[arg(long, env = "ZONE_TIMEOUT_SECS", default_value_t = ZONE_TIMEOUT.as_secs())]
	pub zone_timeout_secs: u64,

	/// JSON file holding the user table
	#[arg(long, env = "DATA_FILE", default_value = "data/users.json")]
	pub data_file: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(long, env = "LOG_LEVEL", default_value = "info")]
	pub log_level: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
	/// Run the sync and payment tasks until interrupted (default)
	Run,
	/// Reconcile the aliases of all provisioned users once and print the report
	SyncAll,
	/// Allocate (or look up) the payment address of a user
	Allocate {
		#[arg(long)]
		user: String,
	},
	/// Run one wallet sync and print the status snapshot
	Status,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("{0} is not set")]
	Missing(&'static str),

	#[error("{field}: {reason}")]
	Invalid { field: &'static str, reason: String },
}

/// Wallet connection settings.
#[derive(Debug, Clone)]
pub struct WalletSettings {
	pub rpc_url: String,
	pub credentials: Option<(String, String)>,
	pub timeouts: WalletTimeouts,
}

/// Zone API connection plus alias settings.
#[derive(Debug, Clone)]
pub struct ZoneSettings {
	pub panel_url: String,
	pub credentials: CpanelCredentials,
	pub timeout: Duration,
	pub alias: AliasSettings,
}

/// Periodic task intervals.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
	pub sync_interval: Duration,
	pub watch_interval: Duration,
}

impl Default for Schedule {
	fn default() -> Self {
		Self {
			sync_interval: Duration::from_secs(120),
			watch_interval: Duration::from_secs(120),
		}
	}
}

impl Args {
	pub fn command(&self) -> Command {
		self.command.clone().unwrap_or(Command::Run)
	}

	pub fn wallet_settings(&self) -> Result<WalletSettings, ConfigError> {
		let rpc_url = self
			.wallet_rpc_url
			.clone()
			.ok_or(ConfigError::Missing("WALLET_RPC_URL"))?;

		let credentials = match (&self.wallet_rpc_user, &self.wallet_rpc_password) {
			(Some(user), Some(password)) => Some((user.clone(), password.clone())),
			(None, None) => None,
			_ => {
				return Err(ConfigError::Invalid {
					field: "WALLET_RPC_USER",
					reason: "user and password must be set together".to_string(),
				});
			}
		};

		Ok(WalletSettings {
			rpc_url,
			credentials,
			timeouts: WalletTimeouts {
				sync: Duration::from_secs(self.wallet_sync_timeout_secs),
				call: Duration::from_secs(self.wallet_timeout_secs),
			},
		})
	}

	pub fn zone_settings(&self) -> Result<ZoneSettings, ConfigError> {
		let panel_url = self.cpanel_url.clone().ok_or(ConfigError::Missing("CPANEL_URL"))?;
		let user = self.cpanel_user.clone().ok_or(ConfigError::Missing("CPANEL_USER"))?;
		let api_token = self
			.cpanel_api_token
			.clone()
			.ok_or(ConfigError::Missing("CPANEL_API_TOKEN"))?;
		let zone = self.dns_zone.clone().ok_or(ConfigError::Missing("DNS_ZONE"))?;
		let target_ip = self
			.alias_target_ip
			.ok_or(ConfigError::Missing("ALIAS_TARGET_IP"))?;

		if zone.trim_end_matches('.').is_empty() {
			return Err(ConfigError::Invalid {
				field: "DNS_ZONE",
				reason: "zone name is empty".to_string(),
			});
		}

		Ok(ZoneSettings {
			panel_url,
			credentials: CpanelCredentials { user, api_token },
			timeout: Duration::from_secs(self.zone_timeout_secs),
			alias: AliasSettings {
				zone,
				target_ip,
				ttl: self.dns_ttl,
			},
		})
	}

	pub fn schedule(&self) -> Schedule {
		Schedule {
			sync_interval: Duration::from_secs(self.sync_interval_secs.max(1)),
			watch_interval: Duration::from_secs(self.watch_interval_secs.max(1)),
		}
	}
}
