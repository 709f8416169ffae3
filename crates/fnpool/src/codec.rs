//! Payload codec for the worker boundary
//!
//! Arguments and results never cross the boundary by reference. They are
//! encoded to bincode bytes on one side and decoded into fresh values on the
//! other, so a worker can never observe or mutate the caller's objects.
//!
//! The encoding keeps every value intact: `Option` variants carry an explicit
//! tag, so `Some(None)` stays distinct from `None`, and floats are stored as
//! their raw bits, so NaN and the infinities survive. Types that need a
//! self-describing format (`#[serde(untagged)]`, `#[serde(flatten)]`,
//! `serde_json::Value`) fail to decode with [`ExecutionError::Deserialize`].

use serde::{de::DeserializeOwned, Serialize};

use crate::error::ExecutionError;

/// A serialized value in transit between the controller and a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Serialize a value into a payload
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, ExecutionError> {
        bincode::serialize(value)
            .map(Self)
            .map_err(|e| ExecutionError::Serialize(e.to_string()))
    }

    /// Deserialize the payload into a new value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ExecutionError> {
        bincode::deserialize(&self.0).map_err(|e| ExecutionError::Deserialize(e.to_string()))
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::ser::{Error as _, Serializer};

    use super::*;

    struct Opaque;

    impl Serialize for Opaque {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("opaque handles cannot be copied"))
        }
    }

    #[test]
    fn test_decode_produces_independent_copy() {
        let mut original = vec![1, 2, 3];
        let payload = Payload::encode(&original).unwrap();

        let mut copy: Vec<i32> = payload.decode().unwrap();
        copy.push(4);
        original.push(5);

        assert_eq!(copy, vec![1, 2, 3, 4]);
        assert_eq!(original, vec![1, 2, 3, 5]);
    }

    #[test]
    fn test_nested_option_is_preserved() {
        for value in [None, Some(None), Some(Some(7u32))] {
            let copy: Option<Option<u32>> = Payload::encode(&value).unwrap().decode().unwrap();
            assert_eq!(copy, value);
        }
    }

    #[test]
    fn test_non_finite_floats_are_preserved() {
        let values = (f64::INFINITY, f64::NEG_INFINITY, -0.0f64);
        let copy: (f64, f64, f64) = Payload::encode(&values).unwrap().decode().unwrap();
        assert_eq!(copy.0, f64::INFINITY);
        assert_eq!(copy.1, f64::NEG_INFINITY);
        assert!(copy.2 == 0.0 && copy.2.is_sign_negative());

        let nan: f64 = Payload::encode(&f64::NAN).unwrap().decode().unwrap();
        assert!(nan.is_nan());
    }

    #[test]
    fn test_non_string_map_keys_are_preserved() {
        let map = HashMap::from([((1, 2), "pair".to_string())]);
        let copy: HashMap<(i32, i32), String> = Payload::encode(&map).unwrap().decode().unwrap();
        assert_eq!(copy, map);
    }

    #[test]
    fn test_encode_failure() {
        let err = Payload::encode(&Opaque).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Serialize(ref msg) if msg.contains("opaque handles cannot be copied")
        ));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let payload = Payload::encode(&true).unwrap();
        assert!(!payload.is_empty());

        let err = payload.decode::<u64>().unwrap_err();
        assert!(matches!(err, ExecutionError::Deserialize(_)));
    }
}
