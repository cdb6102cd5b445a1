//! JSON body codec with wire-key conversion.
//!
//! # Design
//! Payload types name their fields in the internal camelCase convention
//! (typically via `#[serde(rename_all = "camelCase")]`). On the way out every
//! object key is rewritten to snake_case; on the way in every key is
//! rewritten back before the typed deserialization runs. The rewrite works
//! on `serde_json::Value`, so it applies to nested objects and arrays alike.
//!
//! Leading and trailing underscores are kept as-is and only the inner part
//! of a key is converted, so `_id` survives both directions.
//!
//! The rewrite cannot tell struct fields from map entries. Keys of a
//! `HashMap`/`BTreeMap` field are converted like any other key, so a map
//! keyed by user data (`{"Ada Lovelace": 1}` goes out as
//! `{"ada_lovelace": 1}`) does not round-trip. Endpoints that carry such
//! maps should use `KeyStrategy::Preserve` and name wire fields with serde
//! attributes instead.

use heck::{ToLowerCamelCase, ToSnakeCase};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// How object keys are mapped between payload types and the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// camelCase in memory, snake_case on the wire.
    #[default]
    SnakeCaseWire,
    /// Keys are sent and received unchanged.
    Preserve,
}

/// Convert an internal key to its wire form (`firstName` -> `first_name`).
pub fn to_wire_key(key: &str) -> String {
    convert_inner(key, |s| s.to_snake_case())
}

/// Convert a wire key to its internal form (`first_name` -> `firstName`).
pub fn to_internal_key(key: &str) -> String {
    convert_inner(key, |s| s.to_lower_camel_case())
}

fn convert_inner(key: &str, convert: impl Fn(&str) -> String) -> String {
    let trimmed = key.trim_matches('_');
    if trimmed.is_empty() {
        return key.to_string();
    }
    let start = key.len() - key.trim_start_matches('_').len();
    let end = key.trim_end_matches('_').len();
    format!("{}{}{}", &key[..start], convert(trimmed), &key[end..])
}

/// Rewrite every object key in `value`, recursing through arrays. Map
/// entries are rewritten too; see the module docs.
pub fn rewrite_keys(value: Value, convert: &impl Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (convert(&k), rewrite_keys(v, convert)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| rewrite_keys(v, convert)).collect())
        }
        other => other,
    }
}

/// Apply `strategy` to a value headed for the wire.
pub fn wire_value(value: Value, strategy: KeyStrategy) -> Value {
    match strategy {
        KeyStrategy::SnakeCaseWire => rewrite_keys(value, &to_wire_key),
        KeyStrategy::Preserve => value,
    }
}

/// Apply `strategy` to a value received from the wire.
pub fn internal_value(value: Value, strategy: KeyStrategy) -> Value {
    match strategy {
        KeyStrategy::SnakeCaseWire => rewrite_keys(value, &to_internal_key),
        KeyStrategy::Preserve => value,
    }
}

/// Serialize a payload to JSON bytes with wire keys.
pub fn encode_json<B: Serialize + ?Sized>(
    payload: &B,
    strategy: KeyStrategy,
) -> Result<Vec<u8>, ApiError> {
    let value =
        serde_json::to_value(payload).map_err(|e| ApiError::BodyEncoding(e.to_string()))?;
    serde_json::to_vec(&wire_value(value, strategy))
        .map_err(|e| ApiError::BodyEncoding(e.to_string()))
}

/// Deserialize JSON bytes with wire keys into `R`.
///
/// An empty (or all-whitespace) body is read as JSON `null`, so `()` and
/// `Option<T>` targets accept bodiless 2xx responses.
pub fn decode_json<R: DeserializeOwned>(
    body: &[u8],
    strategy: KeyStrategy,
) -> Result<R, ApiError> {
    let value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(body).map_err(ApiError::Decoding)?
    };
    serde_json::from_value(internal_value(value, strategy)).map_err(ApiError::Decoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Profile {
        first_name: String,
        avatar_url: Option<String>,
        address: Address,
        tags: Vec<Tag>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Address {
        street_line: String,
        zip_code2: String,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Tag {
        display_name: String,
    }

    fn profile() -> Profile {
        Profile {
            first_name: "Ada".to_string(),
            avatar_url: None,
            address: Address {
                street_line: "12 Analytical Way".to_string(),
                zip_code2: "NW1".to_string(),
            },
            tags: vec![Tag {
                display_name: "math".to_string(),
            }],
        }
    }

    #[test]
    fn keys_convert_in_both_directions() {
        for (internal, wire) in [
            ("firstName", "first_name"),
            ("id", "id"),
            ("avatarUrl", "avatar_url"),
            ("zipCode2", "zip_code2"),
            ("_id", "_id"),
            ("_privateField", "_private_field"),
            ("createdAt_", "created_at_"),
            ("__", "__"),
        ] {
            assert_eq!(to_wire_key(internal), wire, "{internal} -> wire");
            assert_eq!(to_internal_key(wire), internal, "{wire} -> internal");
        }
    }

    #[test]
    fn encode_rewrites_nested_keys() {
        let bytes = encode_json(&profile(), KeyStrategy::SnakeCaseWire).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({
                "first_name": "Ada",
                "avatar_url": null,
                "address": {"street_line": "12 Analytical Way", "zip_code2": "NW1"},
                "tags": [{"display_name": "math"}]
            })
        );
    }

    #[test]
    fn decode_restores_encoded_payload() {
        let bytes = encode_json(&profile(), KeyStrategy::SnakeCaseWire).unwrap();
        let back: Profile = decode_json(&bytes, KeyStrategy::SnakeCaseWire).unwrap();
        assert_eq!(back, profile());
    }

    #[test]
    fn preserve_leaves_keys_alone() {
        let bytes = encode_json(&json!({"firstName": "Ada"}), KeyStrategy::Preserve).unwrap();
        assert_eq!(bytes, br#"{"firstName":"Ada"}"#);
    }

    #[test]
    fn map_keys_are_rewritten_like_fields() {
        let scores: BTreeMap<String, u32> = [("Ada Lovelace".to_string(), 1)].into();
        let bytes = encode_json(&json!({"byName": scores}), KeyStrategy::SnakeCaseWire).unwrap();
        assert_eq!(bytes, br#"{"by_name":{"ada_lovelace":1}}"#);
    }

    #[test]
    fn preserve_round_trips_user_keyed_maps() {
        let scores: BTreeMap<String, u32> =
            [("Ada Lovelace".to_string(), 1), ("grace_hopper".to_string(), 2)].into();
        let bytes = encode_json(&scores, KeyStrategy::Preserve).unwrap();
        let back: BTreeMap<String, u32> = decode_json(&bytes, KeyStrategy::Preserve).unwrap();
        assert_eq!(back, scores);
    }

    #[test]
    fn decode_missing_field_is_decoding_error() {
        let err = decode_json::<Profile>(br#"{"first_name":"Ada"}"#, KeyStrategy::SnakeCaseWire)
            .unwrap_err();
        assert!(matches!(err, ApiError::Decoding(_)));
    }

    #[test]
    fn decode_malformed_json_is_decoding_error() {
        let err = decode_json::<Value>(b"{not json", KeyStrategy::SnakeCaseWire).unwrap_err();
        assert!(matches!(err, ApiError::Decoding(_)));
    }

    #[test]
    fn empty_body_decodes_as_null() {
        decode_json::<()>(b"", KeyStrategy::SnakeCaseWire).unwrap();
        let nothing: Option<Tag> = decode_json(b"  \n", KeyStrategy::SnakeCaseWire).unwrap();
        assert!(nothing.is_none());
        assert!(decode_json::<Tag>(b"", KeyStrategy::SnakeCaseWire).is_err());
    }

    #[test]
    fn unserializable_payload_is_body_encoding_error() {
        let mut map = BTreeMap::new();
        map.insert((1, 2), "tuple keys are not JSON object keys");
        let err = encode_json(&map, KeyStrategy::SnakeCaseWire).unwrap_err();
        assert!(matches!(err, ApiError::BodyEncoding(_)));
    }
}
