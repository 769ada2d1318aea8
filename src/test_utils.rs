//! In-crate test doubles for the wallet engine and the zone API.

use crate::dns::{EditOp, ZoneApi, ZoneError, ZoneVersion, zone::canonical_name};
use crate::wallet::{Transfer, WalletEngine, WalletError};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct WalletState {
	height: u64,
	balance: u64,
	transfers: HashMap<u32, Vec<Transfer>>,
	failing_transfers: HashMap<u32, String>,
	sync_failure: Option<String>,
	subaddress_failures: usize,
}

/// Scriptable wallet engine that also records how calls overlapped.
#[derive(Default)]
pub struct MockWallet {
	state: Mutex<WalletState>,
	call_delay: Option<Duration>,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
	syncs: AtomicUsize,
	saves: AtomicUsize,
	transfer_queries: AtomicUsize,
}

struct CallGuard<'a>(&'a AtomicUsize);

impl Drop for CallGuard<'_> {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::SeqCst);
	}
}

impl MockWallet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_call_delay(mut self, delay: Duration) -> Self {
		self.call_delay = Some(delay);
		self
	}

	pub fn address_for(account: u32, index: u32) -> String {
		format!("8mock{}x{}", account, index)
	}

	pub fn set_chain(&self, height: u64, balance: u64) {
		let mut state = self.state.lock().unwrap();
		state.height = height;
		state.balance = balance;
	}

	pub fn set_transfers(&self, index: u32, transfers: Vec<Transfer>) {
		self.state.lock().unwrap().transfers.insert(index, transfers);
	}

	pub fn fail_transfers_for(&self, index: u32, message: &str) {
		self.state
			.lock()
			.unwrap()
			.failing_transfers
			.insert(index, message.to_string());
	}

	pub fn fail_sync(&self, message: &str) {
		self.state.lock().unwrap().sync_failure = Some(message.to_string());
	}

	pub fn clear_sync_failure(&self) {
		self.state.lock().unwrap().sync_failure = None;
	}

	pub fn fail_next_subaddress_calls(&self, count: usize) {
		self.state.lock().unwrap().subaddress_failures = count;
	}

	pub fn max_concurrent_calls(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}

	pub fn sync_count(&self) -> usize {
		self.syncs.load(Ordering::SeqCst)
	}

	pub fn save_count(&self) -> usize {
		self.saves.load(Ordering::SeqCst)
	}

	pub fn transfer_query_count(&self) -> usize {
		self.transfer_queries.load(Ordering::SeqCst)
	}

	async fn enter(&self) -> CallGuard<'_> {
		let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(now, Ordering::SeqCst);
		if let Some(delay) = self.call_delay {
			tokio::time::sleep(delay).await;
		}
		CallGuard(&self.in_flight)
	}
}

#[async_trait::async_trait]
impl WalletEngine for MockWallet {
	async fn sync(&self) -> Result<(), WalletError> {
		let _call = self.enter().await;
		self.syncs.fetch_add(1, Ordering::SeqCst);
		match self.state.lock().unwrap().sync_failure.clone() {
			Some(message) => Err(WalletError::RpcError { code: -1, message }),
			None => Ok(()),
		}
	}

	async fn save(&self) -> Result<(), WalletError> {
		let _call = self.enter().await;
		self.saves.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn balance(&self) -> Result<u64, WalletError> {
		let _call = self.enter().await;
		Ok(self.state.lock().unwrap().balance)
	}

	async fn height(&self) -> Result<u64, WalletError> {
		let _call = self.enter().await;
		Ok(self.state.lock().unwrap().height)
	}

	async fn subaddress(&self, account: u32, index: u32) -> Result<String, WalletError> {
		let _call = self.enter().await;
		let mut state = self.state.lock().unwrap();
		if state.subaddress_failures > 0 {
			state.subaddress_failures -= 1;
			return Err(WalletError::RpcError {
				code: -1,
				message: "wallet busy".to_string(),
			});
		}
		Ok(Self::address_for(account, index))
	}

	async fn transfers(
		&self,
		_account: u32,
		index: u32,
		_incoming_only: bool,
	) -> Result<Vec<Transfer>, WalletError> {
		let _call = self.enter().await;
		self.transfer_queries.fetch_add(1, Ordering::SeqCst);
		let state = self.state.lock().unwrap();
		if let Some(message) = state.failing_transfers.get(&index) {
			return Err(WalletError::RpcError {
				code: -1,
				message: message.clone(),
			});
		}
		Ok(state.transfers.get(&index).cloned().unwrap_or_default())
	}
}

struct MockRecord {
	line: u64,
	dname: String,
	record_type: String,
	data: String,
}

struct ZoneState {
	serial: u64,
	has_soa: bool,
	next_line: u64,
	records: Vec<MockRecord>,
	conflicts: usize,
	rejected: HashMap<String, String>,
	submissions: Vec<(ZoneVersion, Vec<EditOp>)>,
	reads: usize,
}

/// Zone API double serving UAPI-shaped listings and applying accepted batches.
pub struct MockZoneApi {
	zone: String,
	state: Mutex<ZoneState>,
}

impl MockZoneApi {
	pub fn new(zone: &str, serial: u64) -> Self {
		Self {
			zone: zone.to_string(),
			state: Mutex::new(ZoneState {
				serial,
				has_soa: true,
				next_line: 2,
				records: Vec::new(),
				conflicts: 0,
				rejected: HashMap::new(),
				submissions: Vec::new(),
				reads: 0,
			}),
		}
	}

	pub fn without_soa(zone: &str) -> Self {
		let api = Self::new(zone, 0);
		api.state.lock().unwrap().has_soa = false;
		api
	}

	pub fn add_record(&self, dname: &str, record_type: &str, data: &str) {
		let mut state = self.state.lock().unwrap();
		let line = state.next_line;
		state.next_line += 1;
		state.records.push(MockRecord {
			line,
			dname: dname.to_string(),
			record_type: record_type.to_string(),
			data: data.to_string(),
		});
	}

	/// Fail the next `count` submissions as if another writer bumped the serial first.
	pub fn conflict_next_submissions(&self, count: usize) {
		self.state.lock().unwrap().conflicts = count;
	}

	/// Reject any batch adding records on `name`.
	pub fn reject_name(&self, name: &str, message: &str) {
		self.state
			.lock()
			.unwrap()
			.rejected
			.insert(name.to_string(), message.to_string());
	}

	pub fn lines_for(&self, name: &str, types: &[&str]) -> Vec<u64> {
		self.state
			.lock()
			.unwrap()
			.records
			.iter()
			.filter(|r| {
				canonical_name(&r.dname, &self.zone) == name
					&& types.contains(&r.record_type.as_str())
			})
			.map(|r| r.line)
			.collect()
	}

	pub fn submissions(&self) -> Vec<(ZoneVersion, Vec<EditOp>)> {
		self.state.lock().unwrap().submissions.clone()
	}

	pub fn read_count(&self) -> usize {
		self.state.lock().unwrap().reads
	}
}

#[async_trait::async_trait]
impl ZoneApi for MockZoneApi {
	async fn read_zone(&self, _zone: &str) -> Result<Value, ZoneError> {
		let mut state = self.state.lock().unwrap();
		state.reads += 1;

		let mut entries = vec![json!({ "line_index": 0, "type": "comment", "text_b64": STANDARD.encode("; zone") })];
		if state.has_soa {
			entries.push(json!({
				"line_index": 1,
				"type": "record",
				"record_type": "SOA",
				"dname_b64": STANDARD.encode(&self.zone),
				"data_b64": [
					STANDARD.encode("ns1.example."),
					STANDARD.encode("hostmaster.example."),
					STANDARD.encode(state.serial.to_string()),
					STANDARD.encode("3600"),
				],
			}));
		}
		for record in &state.records {
			entries.push(json!({
				"line_index": record.line,
				"type": "record",
				"record_type": record.record_type,
				"dname_b64": STANDARD.encode(&record.dname),
				"data_b64": [STANDARD.encode(&record.data)],
			}));
		}

		Ok(json!({ "status": 1, "errors": null, "data": entries }))
	}

	async fn submit_edit(
		&self,
		_zone: &str,
		version: ZoneVersion,
		ops: &[EditOp],
	) -> Result<(), ZoneError> {
		let mut state = self.state.lock().unwrap();
		state.submissions.push((version, ops.to_vec()));

		if state.conflicts > 0 {
			state.conflicts -= 1;
			state.serial += 1;
			return Err(ZoneError::ConcurrentModification(
				"serial number does not match".to_string(),
			));
		}
		if version != state.serial {
			return Err(ZoneError::ConcurrentModification(format!(
				"serial {} does not match {}",
				version, state.serial
			)));
		}
		for op in ops {
			if let EditOp::Add { name, .. } = op {
				if let Some(message) = state.rejected.get(name) {
					return Err(ZoneError::Api(message.clone()));
				}
			}
		}

		for op in ops {
			match op {
				EditOp::Remove { line } => state.records.retain(|r| r.line != *line),
				EditOp::Add {
					name,
					record_type,
					payload,
					..
				} => {
					let line = state.next_line;
					state.next_line += 1;
					state.records.push(MockRecord {
						line,
						dname: name.clone(),
						record_type: record_type.clone(),
						data: payload.clone(),
					});
				}
			}
		}
		state.serial += 1;
		Ok(())
	}
}
