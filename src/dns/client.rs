//!
//! HTTP client for the hosting panel's DNS zone API.
//!
//! Reads go through UAPI `DNS/parse_zone`, writes through `DNS/mass_edit_zone`, which applies all
//! removals and additions of one call as a single transaction guarded by the zone serial. A
//! rejected serial is reported as [`ZoneError::ConcurrentModification`] so the reconciler can
//! re-read and retry; every other failure is a plain [`ZoneError::Api`].

use super::ZoneApi;
use super::types::{EditOp, ZoneError, ZoneVersion};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Default bound for a zone API round trip.
pub const ZONE_TIMEOUT: Duration = Duration::from_secs(10);

/// Record payload of a `mass_edit_zone` addition.
#[derive(Serialize)]
struct AddedRecord<'a> {
	dname: &'a str,
	ttl: u32,
	record_type: &'a str,
	data: [&'a str; 1],
}

/// Credentials for the panel API.
#[derive(Debug, Clone)]
pub struct CpanelCredentials {
	pub user: String,
	pub api_token: String,
}

/// cPanel UAPI zone client
#[derive(Clone)]
pub struct CpanelZoneClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Panel base URL, e.g. `https://host.example.com:2083`.
	base_url: String,
	credentials: CpanelCredentials,
}

impl CpanelZoneClient {
	/// Create a new zone client.
	///
	/// # Arguments
	/// * `base_url` - The panel's base URL.
	/// * `credentials` - API user and token.
	/// * `timeout` - Upper bound for every request.
	pub fn new(
		base_url: &str,
		credentials: CpanelCredentials,
		timeout: Duration,
	) -> Result<Self, ZoneError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			base_url: base_url.trim_end_matches('/').to_string(),
			credentials,
		})
	}

	/// Execute a UAPI function and return the decoded response.
	///
	/// # Errors
	/// Returns `ZoneError::Api` on a non-success HTTP status or when the response reports
	/// `status: 0`, and `ZoneError::ConcurrentModification` when the failure is a serial mismatch.
	pub async fn execute(
		&self,
		function: &str,
		params: &[(String, String)],
	) -> Result<Value, ZoneError> {
		let url = format!("{}/execute/DNS/{}", self.base_url, function);
		debug!("Calling zone API {}", function);

		let response = self
			.http_client
			.get(&url)
			.header(
				"Authorization",
				format!(
					"cpanel {}:{}",
					self.credentials.user, self.credentials.api_token
				),
			)
			.query(params)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(ZoneError::Api(format!("HTTP error: {}", response.status())));
		}

		let response_json: Value = response.json().await?;

		let status = response_json
			.get("status")
			.or_else(|| response_json.pointer("/result/status"))
			.and_then(Value::as_i64)
			.unwrap_or(0);
		if status != 1 {
			let errors = error_messages(&response_json);
			if errors.iter().any(|e| is_serial_mismatch(e)) {
				return Err(ZoneError::ConcurrentModification(errors.join("; ")));
			}
			return Err(ZoneError::Api(if errors.is_empty() {
				format!("{} failed without error detail", function)
			} else {
				errors.join("; ")
			}));
		}

		Ok(response_json)
	}
}

#[async_trait::async_trait]
impl ZoneApi for CpanelZoneClient {
	async fn read_zone(&self, zone: &str) -> Result<Value, ZoneError> {
		self.execute("parse_zone", &[("zone".to_string(), zone.to_string())])
			.await
	}

	async fn submit_edit(
		&self,
		zone: &str,
		version: ZoneVersion,
		ops: &[EditOp],
	) -> Result<(), ZoneError> {
		let mut params = vec![
			("zone".to_string(), zone.to_string()),
			("serial".to_string(), version.to_string()),
		];
		let (mut removals, mut additions) = (0, 0);

		for op in ops {
			match op {
				EditOp::Remove { line } => {
					params.push((indexed("remove", removals), line.to_string()));
					removals += 1;
				}
				EditOp::Add {
					name,
					record_type,
					payload,
					ttl,
					..
				} => {
					let record = serde_json::to_string(&AddedRecord {
						dname: name,
						ttl: *ttl,
						record_type,
						data: [payload],
					})?;
					params.push((indexed("add", additions), record));
					additions += 1;
				}
			}
		}

		self.execute("mass_edit_zone", &params).await?;
		info!(
			"Zone {} edited at serial {} ({} removed, {} added)",
			zone, version, removals, additions
		);
		Ok(())
	}
}

/// UAPI repeats a parameter as `name`, `name-1`, `name-2`, ...
fn indexed(name: &str, position: usize) -> String {
	if position == 0 {
		name.to_string()
	} else {
		format!("{}-{}", name, position)
	}
}

fn error_messages(response: &Value) -> Vec<String> {
	response
		.get("errors")
		.or_else(|| response.pointer("/result/errors"))
		.and_then(Value::as_array)
		.map(|errors| {
			errors
				.iter()
				.filter_map(Value::as_str)
				.map(str::to_string)
				.collect()
		})
		.unwrap_or_default()
}

fn is_serial_mismatch(message: &str) -> bool {
	let message = message.to_ascii_lowercase();
	message.contains("serial") && (message.contains("match") || message.contains("refresh"))
}
