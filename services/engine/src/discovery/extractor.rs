//! Metadata Extractor
//!
//! Turns one raw provider record into a [`ResourceRecord`]. Every optional
//! field is read by its own guard: a malformed field is logged, left at its
//! default, and the rest of the record is still extracted.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::types::{DatabaseAttributes, Endpoint, ResourceRecord};

/// Keys tried, in order, for the resource identifier
const ID_KEYS: [&str; 4] = ["DBInstanceIdentifier", "DBInstanceArn", "id", "Id"];

#[derive(Debug, Error)]
enum FieldError {
    #[error("expected {expected}, found {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid value: {0}")]
    Invalid(String),
}

type FieldResult<T> = Result<Option<T>, FieldError>;

/// Extract a record; never fails
pub fn extract(raw: &Value, account_id: &str, region: &str) -> ResourceRecord {
    let Some(object) = raw.as_object() else {
        let id = synthesized_id();
        debug!(account_id, region, %id, found = type_name(raw), "Raw record is not an object");
        return ResourceRecord::minimal(id, account_id, region).with_extraction_error(format!(
            "unexpected record shape: expected object, found {}",
            type_name(raw)
        ));
    };

    let mut record = match identifier(object) {
        Some(id) => ResourceRecord::minimal(id, account_id, region),
        None => ResourceRecord::minimal(synthesized_id(), account_id, region)
            .with_extraction_error("record has no identifier"),
    };

    let id = record.id.clone();
    let guard = |field: &'static str| FieldGuard { id: &id, field };

    record.tags = guard("TagList").read(tags(object)).unwrap_or_default();
    record.type_attributes = DatabaseAttributes {
        engine: guard("Engine").read(string_field(object, "Engine")),
        engine_version: guard("EngineVersion").read(string_field(object, "EngineVersion")),
        instance_class: guard("DBInstanceClass").read(string_field(object, "DBInstanceClass")),
        status: guard("DBInstanceStatus").read(string_field(object, "DBInstanceStatus")),
        endpoint: guard("Endpoint").read(endpoint(object)),
        vpc_id: guard("DBSubnetGroup.VpcId").read(subnet_field(object, "VpcId")),
        subnet_group: guard("DBSubnetGroup.DBSubnetGroupName")
            .read(subnet_field(object, "DBSubnetGroupName")),
        created_at: guard("InstanceCreateTime").read(timestamp(object, "InstanceCreateTime")),
        multi_az: guard("MultiAZ").read(bool_field(object, "MultiAZ")),
        storage_encrypted: guard("StorageEncrypted").read(bool_field(object, "StorageEncrypted")),
        allocated_storage_gb: guard("AllocatedStorage").read(u64_field(object, "AllocatedStorage")),
    };

    record
}

struct FieldGuard<'a> {
    id: &'a str,
    field: &'static str,
}

impl FieldGuard<'_> {
    fn read<T>(&self, result: FieldResult<T>) -> Option<T> {
        match result {
            Ok(value) => value,
            Err(e) => {
                debug!(resource_id = %self.id, field = self.field, error = %e, "Field extraction failed, using default");
                None
            }
        }
    }
}

fn synthesized_id() -> String {
    format!("unidentified-{}", Uuid::new_v4())
}

fn identifier(object: &Map<String, Value>) -> Option<String> {
    ID_KEYS.iter().find_map(|key| {
        object
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn wrong_type(expected: &'static str, found: &Value) -> FieldError {
    FieldError::WrongType {
        expected,
        found: type_name(found),
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> FieldResult<String> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(wrong_type("string", other)),
    }
}

fn bool_field(object: &Map<String, Value>, key: &str) -> FieldResult<bool> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(wrong_type("boolean", other)),
    }
}

fn u64_field(object: &Map<String, Value>, key: &str) -> FieldResult<u64> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| FieldError::Invalid(format!("{} is not a non-negative integer", n))),
        Some(other) => Err(wrong_type("number", other)),
    }
}

fn timestamp(object: &Map<String, Value>, key: &str) -> FieldResult<DateTime<Utc>> {
    let Some(raw) = string_field(object, key)? else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| FieldError::Invalid(format!("{:?}: {}", raw, e)))
}

fn endpoint(object: &Map<String, Value>) -> FieldResult<Endpoint> {
    let endpoint = match object.get("Endpoint") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(e)) => e,
        Some(other) => return Err(wrong_type("object", other)),
    };

    let Some(address) = string_field(endpoint, "Address")? else {
        return Err(FieldError::Invalid("endpoint has no Address".to_string()));
    };

    let port = match endpoint.get("Port") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => {
            let port = n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| FieldError::Invalid(format!("port {} out of range", n)))?;
            Some(port)
        }
        Some(other) => return Err(wrong_type("number", other)),
    };

    Ok(Some(Endpoint { address, port }))
}

fn subnet_field(object: &Map<String, Value>, key: &str) -> FieldResult<String> {
    match object.get("DBSubnetGroup") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(group)) => string_field(group, key),
        Some(other) => Err(wrong_type("object", other)),
    }
}

/// Tags as `[{"Key": .., "Value": ..}]` or a flat object. Malformed list
/// entries are skipped.
fn tags(object: &Map<String, Value>) -> FieldResult<BTreeMap<String, String>> {
    let raw = match object.get("TagList").or_else(|| object.get("Tags")) {
        None | Some(Value::Null) => return Ok(None),
        Some(raw) => raw,
    };

    let mut tags = BTreeMap::new();
    match raw {
        Value::Array(entries) => {
            for entry in entries {
                let key = entry.get("Key").and_then(Value::as_str);
                let value = entry.get("Value").and_then(Value::as_str).unwrap_or_default();
                match key {
                    Some(key) if !key.is_empty() => {
                        tags.insert(key.to_string(), value.to_string());
                    }
                    _ => debug!(entry = %entry, "Skipping malformed tag entry"),
                }
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                if let Some(value) = value.as_str() {
                    tags.insert(key.clone(), value.to_string());
                }
            }
        }
        other => return Err(wrong_type("array or object", other)),
    }
    Ok(Some(tags))
}
