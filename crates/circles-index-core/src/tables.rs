//! Physical table model.
//!
//! Each [`EventSchema`] maps to one database table: the schema's columns in
//! order, names folded to snake_case for the database. `extract_row` turns a
//! typed event into its column values in exactly that order, so the writer
//! never consults the schema at insert time.

use crate::event::{EventKind, IndexEvent};
use crate::schema::EventSchema;
use crate::value::{ColumnValue, ValueType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// snake_case database column name.
    pub name: String,
    pub ty: ValueType,
    pub indexed: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Derives the table backing `kind` from its event schema.
    pub fn for_event(kind: EventKind, schema: &EventSchema) -> Self {
        Self {
            name: kind.table().to_owned(),
            columns: schema
                .columns
                .iter()
                .map(|column| ColumnDef {
                    name: to_snake_case(&column.name),
                    ty: column.ty,
                    indexed: column.indexed,
                    primary_key: column.primary_key,
                })
                .collect(),
        }
    }

    /// The block bookkeeping table. One row per imported block; `block_hash`
    /// is what reorg detection compares against the chain.
    pub fn block_table() -> Self {
        Self {
            name: "block".to_owned(),
            columns: vec![
                ColumnDef {
                    name: "block_number".to_owned(),
                    ty: ValueType::Int,
                    indexed: true,
                    primary_key: true,
                },
                ColumnDef {
                    name: "timestamp".to_owned(),
                    ty: ValueType::Int,
                    indexed: true,
                    primary_key: false,
                },
                ColumnDef {
                    name: "block_hash".to_owned(),
                    ty: ValueType::String,
                    indexed: true,
                    primary_key: false,
                },
            ],
        }
    }

    /// Primary key column names, in column order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Every table a deployment needs: one per event kind plus the block table.
pub fn all_tables(registry: &crate::schema::SchemaRegistry) -> Vec<TableSchema> {
    let mut tables: Vec<TableSchema> = EventKind::ALL
        .iter()
        .map(|&kind| TableSchema::for_event(kind, registry.schema(kind)))
        .collect();
    tables.push(TableSchema::block_table());
    tables
}

/// camelCase → snake_case, as used for database identifiers.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Materializes `event` as one row in its table's column order.
pub fn extract_row(event: &IndexEvent) -> Vec<ColumnValue> {
    let meta = event.meta();
    let mut row: Vec<ColumnValue> = vec![
        meta.block_number.into(),
        meta.timestamp.into(),
        meta.transaction_index.into(),
        meta.log_index.into(),
    ];
    // The batch table keys on batch_index too; it sits between log_index and
    // transaction_hash.
    if let IndexEvent::Erc1155TransferBatch(e) = event {
        row.push(e.batch_index.into());
    }
    row.push(meta.transaction_hash.clone().into());

    match event {
        IndexEvent::V1Signup(e) => {
            row.push(e.user.into());
            row.push(e.token.into());
        }
        IndexEvent::V1OrganizationSignup(e) => {
            row.push(e.organization.into());
        }
        IndexEvent::V1Trust(e) => {
            row.push(e.can_send_to.into());
            row.push(e.user.into());
            row.push(e.limit.into());
        }
        IndexEvent::V1HubTransfer(e) => {
            row.push(e.from.into());
            row.push(e.to.into());
            row.push(e.amount.into());
        }
        IndexEvent::Erc20Transfer(e) => {
            row.push(e.token_address.into());
            row.push(e.from.into());
            row.push(e.to.into());
            row.push(e.amount.into());
        }
        IndexEvent::V2RegisterHuman(e) => {
            row.push(e.avatar.into());
        }
        IndexEvent::V2RegisterOrganization(e) => {
            row.push(e.organization.into());
            row.push(e.name.clone().into());
        }
        IndexEvent::V2RegisterGroup(e) => {
            row.push(e.group.into());
            row.push(e.mint.into());
            row.push(e.treasury.into());
            row.push(e.name.clone().into());
            row.push(e.symbol.clone().into());
        }
        IndexEvent::V2PersonalMint(e) => {
            row.push(e.human.into());
            row.push(e.amount.into());
            row.push(e.start_period.into());
            row.push(e.end_period.into());
        }
        IndexEvent::V2InviteHuman(e) => {
            row.push(e.inviter.into());
            row.push(e.invited.into());
        }
        IndexEvent::V2Trust(e) => {
            row.push(e.truster.into());
            row.push(e.trustee.into());
            row.push(e.expiry_time.into());
        }
        IndexEvent::V2Stopped(e) => {
            row.push(e.avatar.into());
        }
        IndexEvent::Erc1155ApprovalForAll(e) => {
            row.push(e.account.into());
            row.push(e.operator.into());
            row.push(e.approved.into());
        }
        IndexEvent::Erc1155TransferSingle(e) => {
            row.push(e.operator.into());
            row.push(e.from.into());
            row.push(e.to.into());
            row.push(e.id.into());
            row.push(e.value.into());
        }
        IndexEvent::Erc1155TransferBatch(e) => {
            row.push(e.operator.into());
            row.push(e.from.into());
            row.push(e.to.into());
            row.push(e.id.into());
            row.push(e.value.into());
        }
        IndexEvent::Erc1155Uri(e) => {
            row.push(e.value.clone().into());
            row.push(e.id.into());
        }
        IndexEvent::V2DiscountCost(e) => {
            row.push(e.account.into());
            row.push(e.id.into());
            row.push(e.discount_cost.into());
        }
        IndexEvent::RegisterShortName(e) => {
            row.push(e.avatar.into());
            row.push(e.short_name.into());
            row.push(e.nonce.into());
        }
        IndexEvent::UpdateMetadataDigest(e) => {
            row.push(e.avatar.into());
            row.push(e.metadata_digest.clone().into());
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Erc1155TransferBatch, EventMeta, V2Trust};
    use crate::schema::SchemaRegistry;
    use alloy_primitives::{address, U256};

    fn meta() -> EventMeta {
        EventMeta {
            block_number: 42,
            timestamp: 1_700_000_000,
            transaction_index: 3,
            log_index: 7,
            transaction_hash: "0xabc".into(),
        }
    }

    #[test]
    fn snake_case_folding() {
        assert_eq!(to_snake_case("blockNumber"), "block_number");
        assert_eq!(to_snake_case("canSendTo"), "can_send_to");
        assert_eq!(to_snake_case("timestamp"), "timestamp");
        assert_eq!(to_snake_case("tokenAddress"), "token_address");
    }

    #[test]
    fn row_matches_schema_column_count_for_every_kind() {
        let registry = SchemaRegistry::build().unwrap();
        let events = crate::parsers::tests::sample_events();
        assert_eq!(events.len(), EventKind::ALL.len());
        for event in events {
            let schema = registry.schema(event.kind());
            let table = TableSchema::for_event(event.kind(), schema);
            let row = extract_row(&event);
            assert_eq!(
                row.len(),
                table.columns.len(),
                "column count mismatch for {}",
                event.kind()
            );
            for (value, column) in row.iter().zip(&table.columns) {
                assert_eq!(
                    value.value_type(),
                    column.ty,
                    "type mismatch at {}.{}",
                    table.name,
                    column.name
                );
            }
        }
    }

    #[test]
    fn trust_row_order_follows_schema_not_struct() {
        let truster = address!("0000000000000000000000000000000000000011");
        let trustee = address!("0000000000000000000000000000000000000022");
        let event = IndexEvent::V2Trust(V2Trust {
            meta: meta(),
            truster,
            trustee,
            expiry_time: U256::from(99u64),
        });
        let row = extract_row(&event);
        assert_eq!(row[5], ColumnValue::Address(truster));
        assert_eq!(row[6], ColumnValue::Address(trustee));
        assert_eq!(row[7], ColumnValue::BigInt(U256::from(99u64)));
    }

    #[test]
    fn batch_index_sits_between_log_index_and_hash() {
        let a = address!("0000000000000000000000000000000000000001");
        let event = IndexEvent::Erc1155TransferBatch(Erc1155TransferBatch {
            meta: meta(),
            batch_index: 2,
            operator: a,
            from: a,
            to: a,
            id: U256::from(1u64),
            value: U256::from(5u64),
        });
        let row = extract_row(&event);
        assert_eq!(row[3], ColumnValue::Int(7)); // log_index
        assert_eq!(row[4], ColumnValue::Int(2)); // batch_index
        assert_eq!(row[5], ColumnValue::Text("0xabc".into()));
    }

    #[test]
    fn block_table_shape() {
        let table = TableSchema::block_table();
        assert_eq!(table.name, "block");
        assert_eq!(table.primary_key(), vec!["block_number"]);
        assert_eq!(
            table.column_names(),
            vec!["block_number", "timestamp", "block_hash"]
        );
    }
}
