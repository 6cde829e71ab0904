use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use btuuid::BluetoothUuid;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, ErrorKind, Result};

pub fn to_uuid(uuid: &BluetoothUuid) -> Uuid {
    Uuid::from(*uuid)
}

/// Converts `uuid` to its shortest Bluetooth form: UUIDs on the Bluetooth base UUID shorten to
/// 16 or 32 bits.
pub fn to_bluetooth_uuid(uuid: &Uuid) -> BluetoothUuid {
    BluetoothUuid::from_u128(uuid.as_u128())
}

/// Parses a UUID as written by the native side: either RFC 4122 or a 16/32-bit short form.
pub(crate) fn parse_uuid(text: &str) -> Option<Uuid> {
    match text.len() {
        4 => u16::from_str_radix(text, 16)
            .ok()
            .map(|short| BluetoothUuid::from_u16(short).into()),
        8 => u32::from_str_radix(text, 16)
            .ok()
            .map(|short| BluetoothUuid::from_u32(short).into()),
        _ => Uuid::parse_str(text).ok(),
    }
}

pub(crate) fn encode_bytes(bytes: &[u8]) -> Value {
    Value::String(STANDARD.encode(bytes))
}

/// Decodes a binary payload, which the bridge sends as base64 text or as an array of octets.
pub(crate) fn decode_bytes(value: Value) -> Result<Vec<u8>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(text) => STANDARD
            .decode(text)
            .map_err(|err| Error::with_message(ErrorKind::InvalidResponse, err.to_string())),
        value @ Value::Array(_) => Ok(serde_json::from_value(value)?),
        other => Err(Error::with_message(
            ErrorKind::InvalidResponse,
            format!("expected binary data, found {other}"),
        )),
    }
}

pub(crate) mod uuid_text {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(uuid: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(uuid)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_uuid(&text)
            .ok_or_else(|| D::Error::custom(format!("invalid UUID `{text}`")))
    }
}

pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(D::Error::custom)
    }
}

pub(crate) mod base64_option {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| STANDARD.decode(text).map_err(D::Error::custom))
            .transpose()
    }
}

pub(crate) mod base64_map {
    use std::collections::BTreeMap;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<K, S>(map: &BTreeMap<K, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize + Ord,
        S: Serializer,
    {
        let encoded: BTreeMap<&K, String> = map
            .iter()
            .map(|(key, bytes)| (key, STANDARD.encode(bytes)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, K, D>(deserializer: D) -> Result<BTreeMap<K, Vec<u8>>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        D: Deserializer<'de>,
    {
        BTreeMap::<K, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, text)| Ok((key, STANDARD.decode(text).map_err(D::Error::custom)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use btuuid::{BluetoothUuid16, BluetoothUuid32, BluetoothUuid128};
    use serde_json::json;

    use super::*;

    #[test]
    fn short_uuids_expand_onto_the_base_uuid() {
        let uuid = to_uuid(&BluetoothUuid::from_u16(0x180d));
        assert_eq!(uuid.to_string(), "0000180d-0000-1000-8000-00805f9b34fb");
        assert_eq!(
            to_bluetooth_uuid(&uuid),
            BluetoothUuid::Uuid16(BluetoothUuid16::new(0x180d))
        );
    }

    #[test]
    fn thirty_two_bit_uuids_stay_thirty_two_bit() {
        let uuid = to_uuid(&BluetoothUuid::from_u32(0x1234_5678));
        assert_eq!(uuid.to_string(), "12345678-0000-1000-8000-00805f9b34fb");
        assert_eq!(
            to_bluetooth_uuid(&uuid),
            BluetoothUuid::Uuid32(BluetoothUuid32::new(0x1234_5678))
        );
    }

    #[test]
    fn vendor_uuids_stay_128_bit() {
        let uuid = Uuid::parse_str("6e400001-b5a3-f393-e0a9-e50e24dcca9e").unwrap();
        assert_eq!(
            to_bluetooth_uuid(&uuid),
            BluetoothUuid::Uuid128(BluetoothUuid128::new(
                0x6e400001_b5a3_f393_e0a9_e50e24dcca9e
            ))
        );
    }

    #[test]
    fn parses_short_and_long_forms() {
        assert_eq!(
            parse_uuid("2902"),
            Some(to_uuid(&BluetoothUuid::from_u16(0x2902)))
        );
        assert_eq!(
            parse_uuid("0000180F-0000-1000-8000-00805F9B34FB"),
            Some(to_uuid(&BluetoothUuid::from_u16(0x180f)))
        );
        assert_eq!(parse_uuid("not a uuid"), None);
    }

    #[test]
    fn binary_payloads_accept_base64_and_octet_arrays() {
        assert_eq!(decode_bytes(json!("AQID")).unwrap(), vec![1, 2, 3]);
        assert_eq!(decode_bytes(json!([1, 2, 3])).unwrap(), vec![1, 2, 3]);
        assert_eq!(decode_bytes(Value::Null).unwrap(), Vec::<u8>::new());
        assert_eq!(
            decode_bytes(json!(5)).unwrap_err().kind(),
            ErrorKind::InvalidResponse
        );
        assert_eq!(
            decode_bytes(json!("***")).unwrap_err().kind(),
            ErrorKind::InvalidResponse
        );
        assert_eq!(encode_bytes(&[1, 2, 3]), json!("AQID"));
    }
}
