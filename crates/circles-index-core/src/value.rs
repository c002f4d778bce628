//! Semantic column types and the values that flow into the store.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::types::address_to_hex;

/// The closed set of semantic column types.
///
/// Every column of every table maps to one of these; the storage layer
/// translates them to the engine's native types (Postgres: BIGINT, NUMERIC,
/// TEXT, TEXT, BOOLEAN, BYTEA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// 64-bit signed integer.
    Int,
    /// Arbitrary-precision unsigned integer (up to 256 bits at decode time).
    BigInt,
    /// UTF-8 text.
    String,
    /// An EVM address, persisted as lowercase `0x…` text.
    Address,
    Boolean,
    /// Raw byte blob.
    Bytes,
}

/// A single typed value bound into a parameterized statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Int(i64),
    BigInt(U256),
    Text(String),
    Address(Address),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl ColumnValue {
    /// The semantic type this value naturally carries.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Int(_) => ValueType::Int,
            Self::BigInt(_) => ValueType::BigInt,
            Self::Text(_) => ValueType::String,
            Self::Address(_) => ValueType::Address,
            Self::Bool(_) => ValueType::Boolean,
            Self::Bytes(_) => ValueType::Bytes,
        }
    }

    /// Renders the value as it would appear in a log line or diagnostic dump.
    pub fn display(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::BigInt(v) => v.to_string(),
            Self::Text(v) => v.clone(),
            Self::Address(v) => address_to_hex(v),
            Self::Bool(v) => v.to_string(),
            Self::Bytes(v) => format!("0x{}", hex::encode(v)),
        }
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ColumnValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<U256> for ColumnValue {
    fn from(v: U256) -> Self {
        Self::BigInt(v)
    }
}

impl From<String> for ColumnValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Address> for ColumnValue {
    fn from(v: Address) -> Self {
        Self::Address(v)
    }
}

impl From<bool> for ColumnValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for ColumnValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn value_types_match_variants() {
        assert_eq!(ColumnValue::Int(1).value_type(), ValueType::Int);
        assert_eq!(
            ColumnValue::BigInt(U256::from(10u64)).value_type(),
            ValueType::BigInt
        );
        assert_eq!(
            ColumnValue::Address(address!("0000000000000000000000000000000000000001"))
                .value_type(),
            ValueType::Address
        );
    }

    #[test]
    fn display_renders_addresses_lowercase() {
        let v = ColumnValue::Address(address!("AbCdEf0123456789aBcDeF0123456789abcdef01"));
        assert_eq!(v.display(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }
}
