//! Canonical JSON encoding and payload-keyed item hashing.
//!
//! Two item balances with the same `name` but different `payload` are distinct. Fungibility is
//! therefore keyed on `sha256(name ++ canonical_json(payload))`, where `canonical_json` sorts
//! object keys at *every* nesting depth. We hand-roll the canonicalization instead of leaning on
//! `serde_json`'s own object ordering: whether `serde_json::Map` iterates in sorted order depends
//! on the `preserve_order` cargo feature, and that feature is chosen workspace-wide by whichever
//! dependency enables it first, not by this crate.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

pub type Payload = Value;

pub fn empty_payload() -> Payload {
    Value::Object(serde_json::Map::new())
}

pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn write_json_string(s: &str, out: &mut String) {
    // serde_json's string escaping is correct and we don't want to reimplement it;
    // `Value::String` serialization never fails.
    out.push_str(&serde_json::to_string(s).expect("string serialization is infallible"));
}

/// A SHA-256 item hash, hex-encoded at the serde boundary like the rest of the id types.
///
/// Binds to Postgres as `BYTEA`. sqlx has no blanket impl for `[u8; N]`, only for
/// `&[u8]`/`Vec<u8>`, so the conversion is implemented by hand below rather than derived.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ItemHash(pub [u8; 32]);

impl sqlx::Type<sqlx::Postgres> for ItemHash {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&[u8] as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for ItemHash {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&[u8] as sqlx::Encode<sqlx::Postgres>>::encode(&self.0[..], buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ItemHash {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let bytes = <&[u8] as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "item hash column did not contain 32 bytes")?;
        Ok(Self(array))
    }
}

impl ItemHash {
    pub fn compute(name: &str, payload: &Payload) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(canonical_json(payload).as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ItemHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ItemHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ItemHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(de::Error::custom)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| de::Error::custom("item hash must be 32 bytes"))?;
        Ok(Self(array))
    }
}

/// Asymmetric JSON containment: is every key/element of `demand` present, with a matching
/// (recursively contained) value, somewhere in `offer`? Mirrors the semantics of MySQL's
/// `JSON_CONTAINS(offer, demand)`, used to match an order's payload filter against a candidate
/// item's payload.
pub fn contains(offer: &Value, demand: &Value) -> bool {
    match (offer, demand) {
        (Value::Object(offer_map), Value::Object(demand_map)) => demand_map
            .iter()
            .all(|(key, value)| offer_map.get(key).map_or(false, |o| contains(o, value))),
        (Value::Array(offer_items), Value::Array(demand_items)) => demand_items
            .iter()
            .all(|d| offer_items.iter().any(|o| contains(o, d))),
        (Value::Array(offer_items), scalar) => offer_items.iter().any(|o| o == scalar),
        (offer, demand) => offer == demand,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalizes_nested_keys_regardless_of_input_order() {
        let a = json!({"b": 1, "a": {"z": 1, "y": 2}});
        let b = json!({"a": {"y": 2, "z": 1}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn hash_is_stable_under_reordering() {
        let a = ItemHash::compute("bread", &json!({"color": "white", "fresh": true}));
        let b = ItemHash::compute("bread", &json!({"fresh": true, "color": "white"}));
        assert_eq!(a, b);
    }

    #[test]
    fn hash_differs_on_payload() {
        let a = ItemHash::compute("bread", &json!({"color": "white"}));
        let b = ItemHash::compute("bread", &json!({"color": "brown"}));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_payload_hashes_consistently_with_missing_fields() {
        let a = ItemHash::compute("coin", &empty_payload());
        let b = ItemHash::compute("coin", &json!({}));
        assert_eq!(a, b);
    }

    #[test]
    fn hash_roundtrips_through_hex_serde() {
        let hash = ItemHash::compute("gem", &json!({"cut": "round"}));
        let encoded = serde_json::to_string(&hash).unwrap();
        let decoded: ItemHash = serde_json::from_str(&encoded).unwrap();
        assert_eq!(hash, decoded);
    }

    #[test]
    fn demand_subset_is_contained() {
        let offer = json!({"color": "white", "grade": "a"});
        let demand = json!({"color": "white"});
        assert!(contains(&offer, &demand));
    }

    #[test]
    fn extra_demand_key_is_not_contained() {
        let offer = json!({"color": "white"});
        let demand = json!({"color": "white", "grade": "a"});
        assert!(!contains(&offer, &demand));
    }

    #[test]
    fn mismatched_value_is_not_contained() {
        let offer = json!({"color": "white"});
        let demand = json!({"color": "brown"});
        assert!(!contains(&offer, &demand));
    }

    #[test]
    fn empty_demand_is_always_contained() {
        assert!(contains(&json!({"color": "white"}), &empty_payload()));
        assert!(contains(&empty_payload(), &empty_payload()));
    }
}
