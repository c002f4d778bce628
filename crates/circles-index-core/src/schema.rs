//! Event schemas — topic hashes and typed column layouts.
//!
//! An [`EventSchema`] is constructed once at startup, either from explicit
//! columns or parsed from a Solidity-style event definition. The
//! [`SchemaRegistry`] owns the full set for a deployment and is passed by
//! reference into parsers and the pipeline; there is no global lookup table.

use std::collections::HashMap;

use alloy_primitives::{keccak256, B256};

use crate::error::IndexError;
use crate::event::EventKind;
use crate::value::ValueType;

// ─── EventSchema ─────────────────────────────────────────────────────────────

/// One column of an event schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventColumn {
    /// Column name in the event definition (camelCase, as in the ABI).
    pub name: String,
    pub ty: ValueType,
    /// Whether the argument lives in a topic slot rather than the data payload.
    pub indexed: bool,
    /// Whether the column is part of the table's primary key.
    pub primary_key: bool,
}

impl EventColumn {
    pub fn new(name: &str, ty: ValueType, indexed: bool, primary_key: bool) -> Self {
        Self {
            name: name.to_string(),
            ty,
            indexed,
            primary_key,
        }
    }
}

/// Static description of one decodable event: name, topic hash, columns.
///
/// Column order is stable and defines both decode order and storage order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    /// Deployment namespace, e.g. `"CrcV1"`.
    pub namespace: String,
    /// Event name, e.g. `"HubTransfer"`.
    pub name: String,
    /// keccak256 of the canonical event signature.
    pub topic: B256,
    pub columns: Vec<EventColumn>,
}

impl EventSchema {
    pub fn new(namespace: &str, name: &str, topic: B256, columns: Vec<EventColumn>) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            topic,
            columns,
        }
    }

    /// Parses a Solidity event definition into a schema.
    ///
    /// Example input:
    /// `event Trust(address indexed canSendTo, address indexed user, uint256 limit)`
    ///
    /// The topic hash is computed over the canonical signature
    /// (`Trust(address,address,uint256)`), and the five positional meta
    /// columns are prepended ahead of the event's own arguments.
    pub fn from_signature(namespace: &str, definition: &str) -> Result<Self, IndexError> {
        let trimmed = definition.trim().trim_end_matches(';');
        let body = trimmed
            .strip_prefix("event ")
            .ok_or_else(|| IndexError::Schema("event definition must start with 'event '".into()))?;

        let open = body
            .find('(')
            .ok_or_else(|| IndexError::Schema("missing opening parenthesis".into()))?;
        let close = body
            .rfind(')')
            .ok_or_else(|| IndexError::Schema("missing closing parenthesis".into()))?;
        if close < open {
            return Err(IndexError::Schema("malformed parentheses".into()));
        }

        let name = body[..open].trim();
        if name.is_empty() {
            return Err(IndexError::Schema("missing event name".into()));
        }

        let mut columns = meta_columns();
        let mut signature = String::from(name);
        signature.push('(');

        let parameters = body[open + 1..close].trim();
        if !parameters.is_empty() {
            for (i, parameter) in parameters.split(',').enumerate() {
                let parts: Vec<&str> = parameter.split_whitespace().collect();
                if i > 0 {
                    signature.push(',');
                }
                match parts.as_slice() {
                    [ty, arg_name] => {
                        signature.push_str(ty);
                        columns.push(EventColumn::new(arg_name, map_solidity_type(ty)?, false, false));
                    }
                    [ty, "indexed", arg_name] => {
                        signature.push_str(ty);
                        columns.push(EventColumn::new(arg_name, map_solidity_type(ty)?, true, false));
                    }
                    _ => {
                        return Err(IndexError::Schema(format!(
                            "invalid column definition '{}'",
                            parameter.trim()
                        )));
                    }
                }
            }
        }
        signature.push(')');

        Ok(Self::new(namespace, name, keccak256(signature.as_bytes()), columns))
    }
}

/// The positional columns every event table starts with.
pub fn meta_columns() -> Vec<EventColumn> {
    vec![
        EventColumn::new("blockNumber", ValueType::Int, false, true),
        EventColumn::new("timestamp", ValueType::Int, true, false),
        EventColumn::new("transactionIndex", ValueType::Int, false, true),
        EventColumn::new("logIndex", ValueType::Int, false, true),
        EventColumn::new("transactionHash", ValueType::String, true, false),
    ]
}

fn map_solidity_type(ty: &str) -> Result<ValueType, IndexError> {
    match ty {
        "address" => Ok(ValueType::Address),
        "uint8" | "uint16" | "uint32" | "uint64" => Ok(ValueType::Int),
        "uint72" | "uint128" | "uint256" => Ok(ValueType::BigInt),
        "string" => Ok(ValueType::String),
        "bool" => Ok(ValueType::Boolean),
        "bytes" | "bytes32" => Ok(ValueType::Bytes),
        other => Err(IndexError::Schema(format!(
            "'{other}' is not a supported argument type"
        ))),
    }
}

// ─── SchemaRegistry ──────────────────────────────────────────────────────────

/// Constructed-once lookup over every registered event schema.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: HashMap<EventKind, EventSchema>,
    by_topic: HashMap<B256, Vec<EventKind>>,
}

impl SchemaRegistry {
    /// Builds a registry from `(kind, schema)` pairs, enforcing topic
    /// uniqueness within each namespace.
    ///
    /// Topics are NOT globally unique: the V1 and V2 hubs both emit
    /// `Trust(address,address,uint256)` and thus share a topic hash. Parsers
    /// resolve that by emitter address, so the registry only rejects a
    /// duplicate topic inside a single namespace, where no such tiebreaker
    /// exists.
    pub fn new(
        pairs: impl IntoIterator<Item = (EventKind, EventSchema)>,
    ) -> Result<Self, IndexError> {
        let mut schemas = HashMap::new();
        let mut by_topic: HashMap<B256, Vec<EventKind>> = HashMap::new();
        let mut seen: HashMap<(String, B256), EventKind> = HashMap::new();
        for (kind, schema) in pairs {
            if let Some(existing) = seen.insert((schema.namespace.clone(), schema.topic), kind) {
                return Err(IndexError::Schema(format!(
                    "duplicate topic hash within {} for {existing:?} and {kind:?}",
                    schema.namespace
                )));
            }
            by_topic.entry(schema.topic).or_default().push(kind);
            schemas.insert(kind, schema);
        }
        Ok(Self { schemas, by_topic })
    }

    /// Builds the full registry for a Circles deployment: V1 hub, V2 hub,
    /// and the name registry.
    pub fn build() -> Result<Self, IndexError> {
        let mut pairs = crate::parsers::v1::schemas()?;
        pairs.extend(crate::parsers::v2::schemas()?);
        pairs.extend(crate::parsers::name_registry::schemas()?);
        Self::new(pairs)
    }

    pub fn schema(&self, kind: EventKind) -> &EventSchema {
        &self.schemas[&kind]
    }

    pub fn topic(&self, kind: EventKind) -> B256 {
        self.schemas[&kind].topic
    }

    /// Every kind registered under `topic`. More than one entry only for the
    /// shared V1/V2 `Trust` topic.
    pub fn kinds_for_topic(&self, topic: &B256) -> &[EventKind] {
        self.by_topic.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates every registered `(kind, schema)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (EventKind, &EventSchema)> {
        self.schemas.iter().map(|(k, s)| (*k, s))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
