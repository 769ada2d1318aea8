//! Zone listing normalization.
//!
//! Zone APIs disagree on where records live in the response and what their fields are called:
//! UAPI `parse_zone` returns base64 payload arrays under `data`, API2 `fetchzone_records` returns
//! plain typed fields (`address`, `txtdata`, `serial`) with the record type under `type`, and
//! either may be wrapped in a `result` envelope. Everything downstream works on the
//! [`NormalizedZone`] produced here and never looks at the raw shape.

use super::types::{NormalizedZone, ZoneError, ZoneRecord, ZoneVersion};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::Value;
use tracing::debug;

/// Positional slot of the serial in an SOA payload (`mname rname serial refresh ...`).
const SOA_SERIAL_SLOT: usize = 2;

/// Entry kinds that carry no resource record. API2 also marks directives with a leading `:` or
/// `$` (`:RAW`, `$TTL`).
const NON_RECORD_KINDS: &[&str] = &["comment", "control", "directive"];

/// Typed payload fields used by listings that do not return a `data` array.
const TYPED_DATA_FIELDS: &[&str] = &["address", "cname", "txtdata", "exchange", "nsdname", "target"];

/// Parse a raw listing of `zone` into canonical records and the zone version.
pub fn normalize(raw: &Value, zone: &str) -> Result<NormalizedZone, ZoneError> {
	let entries = locate_entries(raw)
		.ok_or_else(|| ZoneError::Malformed("no record list in zone response".to_string()))?;

	let mut records = Vec::with_capacity(entries.len());
	let mut serials = Vec::new();

	for entry in entries {
		let Some(record_type) = record_type(entry) else {
			continue;
		};
		let Some(record_name) = name(entry)? else {
			debug!("Skipping nameless {} entry in zone {}", record_type, zone);
			continue;
		};

		let record = ZoneRecord {
			line: line(entry)?,
			name: canonical_name(&record_name, zone),
			record_type,
			data: data(entry)?,
		};

		if record.record_type == "SOA" {
			serials.push(soa_serial(entry, &record)?);
		}
		records.push(record);
	}

	let version = match serials.as_slice() {
		[serial] => *serial,
		[] => return Err(ZoneError::Malformed("zone has no SOA record".to_string())),
		_ => {
			return Err(ZoneError::Malformed(format!(
				"zone has {} SOA records",
				serials.len()
			)));
		}
	};

	debug!(
		"Normalized zone {} at serial {} ({} records)",
		zone,
		version,
		records.len()
	);
	Ok(NormalizedZone { records, version })
}

/// Absolute, lowercase form of a record name relative to `zone`.
pub fn canonical_name(name: &str, zone: &str) -> String {
	let zone = zone.trim_end_matches('.').to_ascii_lowercase();
	let name = name.trim().to_ascii_lowercase();

	if name.is_empty() || name == "@" {
		format!("{}.", zone)
	} else if name.ends_with('.') {
		name
	} else if name == zone || name.ends_with(&format!(".{}", zone)) {
		format!("{}.", name)
	} else {
		format!("{}.{}.", name, zone)
	}
}

fn locate_entries(raw: &Value) -> Option<&Vec<Value>> {
	if let Some(entries) = raw.as_array() {
		return Some(entries);
	}
	["data", "records", "zone"]
		.iter()
		.find_map(|key| raw.get(key).and_then(Value::as_array))
		.or_else(|| raw.get("result").and_then(locate_entries))
}

fn field<'a>(entry: &'a Value, names: &[&str]) -> Option<&'a Value> {
	names.iter().find_map(|name| entry.get(name)).filter(|v| !v.is_null())
}

fn record_type(entry: &Value) -> Option<String> {
	if let Some(record_type) = field(entry, &["record_type"]).and_then(Value::as_str) {
		return Some(record_type.to_ascii_uppercase());
	}
	let kind = field(entry, &["type"]).and_then(Value::as_str)?;
	if kind.eq_ignore_ascii_case("record")
		|| kind.starts_with([':', '$'])
		|| NON_RECORD_KINDS.iter().any(|k| kind.eq_ignore_ascii_case(k))
	{
		return None;
	}
	Some(kind.to_ascii_uppercase())
}

fn line(entry: &Value) -> Result<u64, ZoneError> {
	field(entry, &["line_index", "line", "Line"])
		.and_then(as_u64)
		.ok_or_else(|| ZoneError::Malformed(format!("record without line: {}", entry)))
}

fn name(entry: &Value) -> Result<Option<String>, ZoneError> {
	if let Some(name) = field(entry, &["name", "dname"]).and_then(Value::as_str) {
		return Ok(Some(name.to_string()));
	}
	field(entry, &["dname_b64"])
		.and_then(Value::as_str)
		.map(decode_b64)
		.transpose()
}

fn data(entry: &Value) -> Result<Vec<String>, ZoneError> {
	if let Some(value) = field(entry, &["data"]) {
		return Ok(scalars(value));
	}
	if let Some(value) = field(entry, &["data_b64"]) {
		return scalars(value).iter().map(|s| decode_b64(s)).collect();
	}
	Ok(TYPED_DATA_FIELDS
		.iter()
		.filter_map(|name| field(entry, &[*name]))
		.flat_map(scalars)
		.collect())
}

fn soa_serial(entry: &Value, record: &ZoneRecord) -> Result<ZoneVersion, ZoneError> {
	field(entry, &["serial"])
		.and_then(as_u64)
		.or_else(|| {
			record
				.data
				.get(SOA_SERIAL_SLOT)
				.and_then(|slot| slot.trim().parse().ok())
		})
		.ok_or_else(|| ZoneError::Malformed("SOA record carries no serial".to_string()))
}

fn scalars(value: &Value) -> Vec<String> {
	match value {
		Value::Array(items) => items.iter().flat_map(scalars).collect(),
		Value::String(s) => vec![s.clone()],
		Value::Number(n) => vec![n.to_string()],
		_ => Vec::new(),
	}
}

fn as_u64(value: &Value) -> Option<u64> {
	value
		.as_u64()
		.or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn decode_b64(encoded: &str) -> Result<String, ZoneError> {
	let bytes = STANDARD
		.decode(encoded)
		.map_err(|e| ZoneError::Malformed(format!("invalid base64 field: {}", e)))?;
	String::from_utf8(bytes)
		.map_err(|e| ZoneError::Malformed(format!("non UTF-8 field: {}", e)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn b64(s: &str) -> String {
		STANDARD.encode(s)
	}

	#[test]
	fn test_uapi_listing_with_base64_fields() {
		let raw = json!({
			"status": 1,
			"errors": null,
			"data": [
				{ "line_index": 0, "type": "comment", "text_b64": b64("; cPanel") },
				{ "line_index": 1, "type": "control", "text_b64": b64("$TTL 14400") },
				{
					"line_index": 2, "type": "record", "record_type": "SOA",
					"dname_b64": b64("example.com."), "ttl": 86400,
					"data_b64": [b64("ns1.example.com."), b64("admin.example.com."), b64("2024050107"), b64("3600"), b64("1800"), b64("1209600"), b64("86400")]
				},
				{
					"line_index": 9, "type": "record", "record_type": "TXT",
					"dname_b64": b64("alice"), "ttl": 14400,
					"data_b64": [b64("oa1:xmr recipient_address=4A;"), b64(" recipient_name=alice;")]
				}
			]
		});

		let zone = normalize(&raw, "example.com").unwrap();

		assert_eq!(zone.version, 2024050107);
		assert_eq!(zone.records.len(), 2);
		let txt = &zone.records[1];
		assert_eq!(txt.line, 9);
		assert_eq!(txt.name, "alice.example.com.");
		assert_eq!(txt.record_type, "TXT");
		assert_eq!(
			txt.joined_data(),
			"oa1:xmr recipient_address=4A; recipient_name=alice;"
		);
	}

	#[test]
	fn test_api2_listing_with_typed_fields_and_result_envelope() {
		let raw = json!({
			"result": {
				"data": [
					{ "Line": 3, "type": "SOA", "name": "example.com.", "serial": "2024050108" },
					{ "Line": 12, "type": "A", "name": "Bob.example.com.", "address": "203.0.113.7" },
					{ "Line": 13, "type": "TXT", "name": "bob", "txtdata": "hello" }
				]
			}
		});

		let zone = normalize(&raw, "example.com.").unwrap();

		assert_eq!(zone.version, 2024050108);
		assert_eq!(zone.records[1].name, "bob.example.com.");
		assert_eq!(zone.records[1].data, vec!["203.0.113.7"]);
		assert_eq!(zone.records[2].name, "bob.example.com.");
		assert_eq!(zone.records[2].data, vec!["hello"]);
	}

	#[test]
	fn test_api2_directive_entries_are_skipped() {
		let raw = json!({
			"result": {
				"data": [
					{ "Line": 1, "type": ":RAW", "raw": "; cPanel first:11.40 (update_time):1396459032" },
					{ "Line": 2, "type": "$TTL", "ttl": "14400" },
					{ "Line": 3, "type": "SOA", "name": "example.com.", "serial": "2024050109" },
					{ "Line": 4, "type": "TXT", "txtdata": "orphan" },
					{ "Line": 5, "type": "A", "name": "alice", "address": "203.0.113.7" }
				]
			}
		});

		let zone = normalize(&raw, "example.com").unwrap();

		assert_eq!(zone.version, 2024050109);
		let lines: Vec<u64> = zone.records.iter().map(|r| r.line).collect();
		assert_eq!(lines, vec![3, 5]);
		assert_eq!(zone.records[1].name, "alice.example.com.");
	}

	#[test]
	fn test_serial_from_positional_plain_data() {
		let raw = json!([
			{ "line": 1, "type": "SOA", "name": "@", "data": ["ns1.example.com.", "admin.example.com.", 77, 3600] }
		]);

		let zone = normalize(&raw, "example.com").unwrap();
		assert_eq!(zone.version, 77);
		assert_eq!(zone.records[0].name, "example.com.");
	}

	#[test]
	fn test_missing_soa_is_malformed() {
		let raw = json!({ "data": [{ "line": 1, "type": "A", "name": "www", "address": "203.0.113.1" }] });
		assert!(matches!(
			normalize(&raw, "example.com"),
			Err(ZoneError::Malformed(_))
		));
	}

	#[test]
	fn test_soa_without_serial_is_malformed() {
		let raw = json!({ "data": [{ "line": 1, "type": "SOA", "name": "@", "data": ["ns1.", "admin."] }] });
		assert!(matches!(
			normalize(&raw, "example.com"),
			Err(ZoneError::Malformed(_))
		));
	}

	#[test]
	fn test_duplicate_soa_is_malformed() {
		let raw = json!({ "data": [
			{ "line": 1, "type": "SOA", "name": "@", "serial": 1 },
			{ "line": 2, "type": "SOA", "name": "@", "serial": 2 }
		] });
		assert!(matches!(
			normalize(&raw, "example.com"),
			Err(ZoneError::Malformed(_))
		));
	}

	#[test]
	fn test_response_without_records_is_malformed() {
		assert!(matches!(
			normalize(&json!({ "status": 0 }), "example.com"),
			Err(ZoneError::Malformed(_))
		));
	}

	#[test]
	fn test_canonical_name() {
		assert_eq!(canonical_name("@", "example.com"), "example.com.");
		assert_eq!(canonical_name("Alice", "example.com"), "alice.example.com.");
		assert_eq!(canonical_name("alice.example.com", "example.com"), "alice.example.com.");
		assert_eq!(canonical_name("other.org.", "example.com"), "other.org.");
	}
}
